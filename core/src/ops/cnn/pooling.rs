use super::{chw, Window2D};
use crate::internal::*;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PoolingType {
    #[default]
    Max,
    Avg,
}

/// Max or average pooling, per channel. Padded positions are not part of
/// the window: max ignores them and average divides by the count of
/// positions actually inside the plane.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pooling {
    pub pooling_type: PoolingType,
    pub window: Window2D,
    /// Pool each whole plane to a single value.
    pub global: bool,
}

impl Pooling {
    fn pool(&self, plane: &[f32], (h, w): (usize, usize), oy: usize, ox: usize) -> f32 {
        let (kh, kw) = if self.global { (h, w) } else { (self.window.y.kernel, self.window.x.kernel) };
        let mut acc = match self.pooling_type {
            PoolingType::Max => f32::NEG_INFINITY,
            PoolingType::Avg => 0.0,
        };
        let mut count = 0usize;
        for ky in 0..kh {
            for kx in 0..kw {
                let (iy, ix) = if self.global {
                    (ky as isize, kx as isize)
                } else {
                    self.window.input_position(oy, ox, ky, kx)
                };
                if iy < 0 || ix < 0 || iy >= h as isize || ix >= w as isize {
                    continue;
                }
                let v = plane[iy as usize * w + ix as usize];
                match self.pooling_type {
                    PoolingType::Max => acc = acc.max(v),
                    PoolingType::Avg => acc += v,
                }
                count += 1;
            }
        }
        match self.pooling_type {
            PoolingType::Avg if count > 0 => acc / count as f32,
            PoolingType::Avg => 0.0,
            PoolingType::Max => acc,
        }
    }
}

impl Layer for Pooling {
    fn name(&self) -> Cow<str> {
        "Pooling".into()
    }

    fn info(&self) -> Vec<String> {
        if self.global {
            vec![format!("global {:?}", self.pooling_type)]
        } else {
            vec![
                format!("{:?}", self.pooling_type),
                format!("kernel={}x{}", self.window.y.kernel, self.window.x.kernel),
                format!("stride={}x{}", self.window.y.stride, self.window.x.stride),
                format!("pad={}x{}", self.window.y.pad, self.window.x.pad),
            ]
        }
    }

    fn load_param(&mut self, pd: &ParamDict) -> CnResult<()> {
        self.pooling_type = match pd.get_i32(0, 0)? {
            0 => PoolingType::Max,
            1 => PoolingType::Avg,
            other => bail!("Unknown pooling type {}", other),
        };
        self.window = Window2D::load(pd, (1, 11), (2, 12), None, (3, 13))?;
        self.global = pd.get_bool(4, false)?;
        Ok(())
    }

    fn one_blob_only(&self) -> bool {
        true
    }

    fn forward_one(&self, input: TValue) -> CnResult<TValue> {
        let (c, h, w) = chw(&input)?;
        let (oh, ow) = if self.global { (1, 1) } else { self.window.output_plane(h, w)? };
        let mut output = Tensor::zero(&[c, oh, ow])?;
        let x = input.as_slice();
        current_executor().for_each_chunk_mut(output.as_slice_mut(), oh * ow, |ch, out| {
            let plane = &x[ch * h * w..][..h * w];
            for oy in 0..oh {
                for ox in 0..ow {
                    out[oy * ow + ox] = self.pool(plane, (h, w), oy, ox);
                }
            }
        });
        Ok(output.into())
    }

    fn propagate_region(&self, bottoms: &[Region], top_count: usize) -> CnResult<TVec<Region>> {
        ensure!(bottoms.len() == 1, "Pooling expects one input region, got {}", bottoms.len());
        let top = if !self.global {
            self.window.map_region(&bottoms[0])
        } else if bottoms[0].is_unchanged() {
            Region::unchanged()
        } else {
            Region::Full
        };
        Ok(tvec![top; top_count])
    }
}
