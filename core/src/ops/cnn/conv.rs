use super::{chw, Window2D};
use crate::internal::*;

/// Direct 2D convolution over a `[c, h, w]` input, producing
/// `[num_output, oh, ow]`.
///
/// Weights are laid out `[num_output, c, kh, kw]`. The input channel count
/// is not a parameter: it follows from the weight size.
///
/// In cache mode the layer keeps its previous output and only recomputes
/// the positions whose receptive field meets a changed input region. Both
/// paths run the exact same arithmetic per position, so a partial update is
/// bit-identical to a full one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Convolution {
    pub num_output: usize,
    pub window: Window2D,
    pub bias_term: bool,
    pub weight_data_size: usize,
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

impl Convolution {
    fn kernel_len(&self) -> usize {
        self.window.y.kernel * self.window.x.kernel
    }

    pub fn input_channels(&self) -> CnResult<usize> {
        let per_channel = self.num_output * self.kernel_len();
        ensure!(
            per_channel > 0 && self.weight_data_size % per_channel == 0,
            "Weight size {} does not match {} outputs of {} kernels",
            self.weight_data_size,
            self.num_output,
            self.kernel_len()
        );
        Ok(self.weight_data_size / per_channel)
    }

    pub fn output_shape(&self, input: &Tensor) -> CnResult<[usize; 3]> {
        let (c, h, w) = chw(input)?;
        let expected = self.input_channels()?;
        ensure!(c == expected, "Convolution expects {} input channels, got {}", expected, c);
        let (oh, ow) = self.window.output_plane(h, w)?;
        Ok([self.num_output, oh, ow])
    }

    fn check_loaded(&self) -> CnResult<()> {
        ensure!(
            self.weights.len() == self.weight_data_size,
            "Convolution weights not loaded ({} of {})",
            self.weights.len(),
            self.weight_data_size
        );
        ensure!(
            !self.bias_term || self.bias.len() == self.num_output,
            "Convolution bias not loaded ({} of {})",
            self.bias.len(),
            self.num_output
        );
        Ok(())
    }

    /// Compute the output positions inside `rects`, leaving the rest of
    /// `output` untouched. Rects must lie inside the output plane.
    fn compute(&self, input: &Tensor, output: &mut Tensor, rects: &[Rect]) -> CnResult<()> {
        self.check_loaded()?;
        let (in_c, h, w) = chw(input)?;
        let (oh, ow) = output.plane();
        let (kh, kw) = (self.window.y.kernel, self.window.x.kernel);
        let kernel_size = in_c * kh * kw;
        let x = input.as_slice();
        current_executor().for_each_chunk_mut(output.as_slice_mut(), oh * ow, |oc, plane| {
            let kernel = &self.weights[oc * kernel_size..][..kernel_size];
            let bias = if self.bias_term { self.bias[oc] } else { 0.0 };
            for rect in rects {
                for oy in rect.y0 as usize..rect.y1 as usize {
                    for ox in rect.x0 as usize..rect.x1 as usize {
                        let mut sum = bias;
                        for ic in 0..in_c {
                            for ky in 0..kh {
                                for kx in 0..kw {
                                    let (iy, ix) = self.window.input_position(oy, ox, ky, kx);
                                    if iy < 0 || ix < 0 || iy >= h as isize || ix >= w as isize {
                                        continue;
                                    }
                                    sum += x[(ic * h + iy as usize) * w + ix as usize]
                                        * kernel[(ic * kh + ky) * kw + kx];
                                }
                            }
                        }
                        plane[oy * ow + ox] = sum;
                    }
                }
            }
        });
        Ok(())
    }
}

impl Layer for Convolution {
    fn name(&self) -> Cow<str> {
        "Convolution".into()
    }

    fn info(&self) -> Vec<String> {
        vec![
            format!("num_output={}", self.num_output),
            format!("kernel={}x{}", self.window.y.kernel, self.window.x.kernel),
            format!("stride={}x{}", self.window.y.stride, self.window.x.stride),
            format!("dilation={}x{}", self.window.y.dilation, self.window.x.dilation),
            format!("pad={}x{}", self.window.y.pad, self.window.x.pad),
        ]
    }

    fn load_param(&mut self, pd: &ParamDict) -> CnResult<()> {
        self.num_output = pd.get_usize(0, 0)?;
        self.window = Window2D::load(pd, (1, 11), (3, 13), Some((2, 12)), (4, 14))?;
        self.bias_term = pd.get_bool(5, false)?;
        self.weight_data_size = pd.get_usize(6, 0)?;
        self.input_channels()?;
        Ok(())
    }

    fn load_model(&mut self, mb: &mut dyn ModelBin) -> CnResult<()> {
        self.weights = mb.load(self.weight_data_size, WeightKind::Auto)?;
        if self.bias_term {
            self.bias = mb.load(self.num_output, WeightKind::Raw)?;
        }
        Ok(())
    }

    fn one_blob_only(&self) -> bool {
        true
    }

    fn forward_one(&self, input: TValue) -> CnResult<TValue> {
        let shape = self.output_shape(&input)?;
        let mut output = Tensor::zero(&shape)?;
        self.compute(&input, &mut output, &[Rect::plane(shape[1], shape[2])])?;
        Ok(output.into())
    }

    fn needs_cache(&self) -> bool {
        true
    }

    fn propagate_region(&self, bottoms: &[Region], top_count: usize) -> CnResult<TVec<Region>> {
        ensure!(bottoms.len() == 1, "Convolution expects one input region, got {}", bottoms.len());
        Ok(tvec![self.window.map_region(&bottoms[0]); top_count])
    }

    fn forward_cached(
        &self,
        input: TValue,
        cached: Option<&TValue>,
        region: &Region,
    ) -> CnResult<TValue> {
        let shape = self.output_shape(&input)?;
        let cached = match cached {
            Some(cached) if cached.shape() == &shape[..] && !region.is_full() => cached,
            _ => return self.forward_one(input),
        };
        let rects = region.dirty_rects(shape[1], shape[2]);
        if rects.is_empty() {
            trace!("Convolution reusing cached output");
            return Ok(cached.clone());
        }
        trace!("Convolution recomputing {}", region);
        let mut output = cached.clone().into_tensor();
        self.compute(&input, &mut output, &rects)?;
        Ok(output.into())
    }
}
