use super::Tensor;
use ndarray::*;

pub fn tensor1(xs: &[f32]) -> Tensor {
    Tensor::from(arr1(xs))
}

pub fn tensor2<const W: usize>(xs: &[[f32; W]]) -> Tensor {
    Tensor::from(arr2(xs))
}

pub fn tensor3<const H: usize, const W: usize>(xs: &[[[f32; W]; H]]) -> Tensor {
    Tensor::from(arr3(xs))
}

/// A `[c, h, w]` tensor whose values are their own flat index, scaled.
pub fn ramp3(c: usize, h: usize, w: usize, scale: f32) -> Tensor {
    Tensor::from(Array3::from_shape_fn((c, h, w), |(z, y, x)| {
        ((z * h + y) * w + x) as f32 * scale
    }))
}
