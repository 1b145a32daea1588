//! `Tensor`, the buffer flowing between layers.
use crate::TVec;
use anyhow::{bail, format_err};
use itertools::Itertools;
use ndarray::prelude::*;
use std::fmt;

pub mod litteral;

/// Highest rank a tensor can have.
pub const MAX_RANK: usize = 4;

/// A dense, row-major f32 tensor of rank 1 to 4.
///
/// Shapes follow the usual layer conventions: `[w]`, `[h, w]`, `[c, h, w]`
/// and `[d, c, h, w]`. The last two axes are the spatial plane regions refer
/// to.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    shape: TVec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Create a zero-filled tensor.
    pub fn zero(shape: &[usize]) -> anyhow::Result<Tensor> {
        Self::check_rank(shape)?;
        let len = shape.iter().product();
        Ok(Tensor { shape: shape.into(), data: vec![0f32; len] })
    }

    /// Create a tensor filled with a constant.
    pub fn filled(shape: &[usize], value: f32) -> anyhow::Result<Tensor> {
        let mut t = Self::zero(shape)?;
        t.data.iter_mut().for_each(|x| *x = value);
        Ok(t)
    }

    /// Create a tensor from a shape and a flat row-major buffer.
    pub fn from_shape_vec(shape: &[usize], data: Vec<f32>) -> anyhow::Result<Tensor> {
        Self::check_rank(shape)?;
        let len: usize = shape.iter().product();
        if len != data.len() {
            bail!(
                "Shape {:?} requires {} elements, got {}",
                shape,
                len,
                data.len()
            );
        }
        Ok(Tensor { shape: shape.into(), data })
    }

    /// Create a tensor from a shape and a flat row-major slice.
    pub fn from_shape(shape: &[usize], data: &[f32]) -> anyhow::Result<Tensor> {
        Self::from_shape_vec(shape, data.to_vec())
    }

    fn check_rank(shape: &[usize]) -> anyhow::Result<()> {
        if shape.is_empty() || shape.len() > MAX_RANK {
            bail!("Tensor rank must be between 1 and {}, got shape {:?}", MAX_RANK, shape)
        }
        Ok(())
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Height and width of the spatial plane (last two axes). A rank 1
    /// tensor is a single row.
    pub fn plane(&self) -> (usize, usize) {
        match self.rank() {
            1 => (1, self.shape[0]),
            r => (self.shape[r - 2], self.shape[r - 1]),
        }
    }

    /// Number of spatial planes stacked in the tensor.
    pub fn planes(&self) -> usize {
        let (h, w) = self.plane();
        if h * w == 0 {
            0
        } else {
            self.len() / (h * w)
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_slice_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    pub fn to_array_view(&self) -> anyhow::Result<ArrayViewD<f32>> {
        Ok(ArrayViewD::from_shape(IxDyn(&self.shape), &self.data)?)
    }

    pub fn to_array_view_mut(&mut self) -> anyhow::Result<ArrayViewMutD<f32>> {
        Ok(ArrayViewMutD::from_shape(IxDyn(&self.shape), &mut self.data)?)
    }

    pub fn into_array(self) -> anyhow::Result<ArrayD<f32>> {
        Ok(ArrayD::from_shape_vec(IxDyn(&self.shape), self.data)?)
    }

    /// Reinterpret the buffer with another shape of the same length.
    pub fn into_shape(self, shape: &[usize]) -> anyhow::Result<Tensor> {
        Self::from_shape_vec(shape, self.data)
    }

    /// Element-wise comparison with a tolerance, for tests and dumps.
    pub fn close_enough(&self, other: &Tensor, approx: f32) -> anyhow::Result<()> {
        if self.shape != other.shape {
            bail!("Shape mismatch {:?} != {:?}", self.shape(), other.shape())
        }
        if let Some((ix, (a, b))) = self
            .data
            .iter()
            .zip(other.data.iter())
            .enumerate()
            .find(|(_, (a, b))| !((*a - *b).abs() <= approx || (a.is_nan() && b.is_nan())))
        {
            return Err(format_err!("Mismatch at flat index {}: {} != {}", ix, a, b));
        }
        Ok(())
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let content = self.data.iter().take(12).join(", ");
        let ellipsis = if self.data.len() > 12 { ", ..." } else { "" };
        write!(f, "{} f32 [{}{}]", self.shape.iter().join(","), content, ellipsis)
    }
}

impl<D: Dimension> From<Array<f32, D>> for Tensor {
    fn from(it: Array<f32, D>) -> Tensor {
        let shape = it.shape().into();
        let data = it.iter().copied().collect();
        Tensor { shape, data }
    }
}
