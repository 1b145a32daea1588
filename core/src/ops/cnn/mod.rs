//! Sliding window layers over `[c, h, w]` tensors.
use crate::internal::*;

mod conv;
mod pooling;

pub use self::conv::Convolution;
pub use self::pooling::{Pooling, PoolingType};

/// Window geometry on the spatial plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window2D {
    pub y: WindowAxis,
    pub x: WindowAxis,
}

impl Default for Window2D {
    fn default() -> Window2D {
        let axis = WindowAxis::new(1, 1, 1, 0);
        Window2D { y: axis, x: axis }
    }
}

impl Window2D {
    /// Read a window from the `_w`/`_h` parameter pairs. A missing `_h` id
    /// defaults to the `_w` value.
    pub fn load(
        pd: &ParamDict,
        kernel: (i32, i32),
        stride: (i32, i32),
        dilation: Option<(i32, i32)>,
        pad: (i32, i32),
    ) -> CnResult<Window2D> {
        fn pair(pd: &ParamDict, (w_id, h_id): (i32, i32), default: usize) -> CnResult<(usize, usize)> {
            let w = pd.get_usize(w_id, default)?;
            Ok((w, pd.get_usize(h_id, w)?))
        }
        let (kw, kh) = pair(pd, kernel, 1)?;
        let (sw, sh) = pair(pd, stride, 1)?;
        let (dw, dh) = match dilation {
            Some(ids) => pair(pd, ids, 1)?,
            None => (1, 1),
        };
        let (pw, ph) = pair(pd, pad, 0)?;
        ensure!(kw > 0 && kh > 0 && sw > 0 && sh > 0 && dw > 0 && dh > 0, "Invalid window {}x{}", kh, kw);
        Ok(Window2D { y: WindowAxis::new(kh, sh, dh, ph), x: WindowAxis::new(kw, sw, dw, pw) })
    }

    /// Output plane size for a `h x w` input.
    pub fn output_plane(&self, h: usize, w: usize) -> CnResult<(usize, usize)> {
        fn axis(a: &WindowAxis, len: usize) -> Option<usize> {
            let span = a.dilation * (a.kernel - 1) + 1;
            (len + 2 * a.pad).checked_sub(span).map(|d| d / a.stride + 1)
        }
        match (axis(&self.y, h), axis(&self.x, w)) {
            (Some(oh), Some(ow)) => Ok((oh, ow)),
            _ => bail!("Window {}x{} does not fit a {}x{} input", self.y.kernel, self.x.kernel, h, w),
        }
    }

    pub fn map_region(&self, region: &Region) -> Region {
        region.map_window(&self.y, &self.x)
    }

    /// Input coordinates read by output `(oy, ox)` at kernel offset
    /// `(ky, kx)`, possibly outside the plane.
    #[inline]
    pub fn input_position(&self, oy: usize, ox: usize, ky: usize, kx: usize) -> (isize, isize) {
        (
            (oy * self.y.stride + ky * self.y.dilation) as isize - self.y.pad as isize,
            (ox * self.x.stride + kx * self.x.dilation) as isize - self.x.pad as isize,
        )
    }
}

/// Split a `[c, h, w]` tensor shape.
pub(crate) fn chw(t: &Tensor) -> CnResult<(usize, usize, usize)> {
    match *t.shape() {
        [c, h, w] => Ok((c, h, w)),
        [h, w] => Ok((1, h, w)),
        ref other => bail!("Expected a [c, h, w] tensor, got shape {:?}", other),
    }
}
