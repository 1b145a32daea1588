use crate::internal::*;
use cachenet_ndarray::{concatenate, Axis};

/// Concatenates its inputs along `axis`. Axis 0 is the outermost axis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Concat {
    pub axis: usize,
}

impl Layer for Concat {
    fn name(&self) -> Cow<str> {
        "Concat".into()
    }

    fn info(&self) -> Vec<String> {
        vec![format!("axis={}", self.axis)]
    }

    fn load_param(&mut self, pd: &ParamDict) -> CnResult<()> {
        self.axis = pd.get_usize(0, 0)?;
        Ok(())
    }

    fn forward(&self, inputs: TVec<TValue>, top_count: usize) -> CnResult<TVec<TValue>> {
        ensure!(top_count == 1, "Concat has one output, {} requested", top_count);
        ensure!(!inputs.is_empty(), "Concat needs at least one input");
        if inputs.len() == 1 {
            return Ok(inputs);
        }
        let rank = inputs[0].rank();
        ensure!(self.axis < rank, "Concat axis {} out of range for rank {}", self.axis, rank);
        let views = inputs.iter().map(|t| t.to_array_view()).collect::<CnResult<Vec<_>>>()?;
        let output = concatenate(Axis(self.axis), &views)
            .with_context(|| {
            format!("Concatenating shapes {:?}", inputs.iter().map(|t| t.shape()).collect::<Vec<_>>())
        })?;
        Ok(tvec!(Tensor::from(output).into()))
    }

    /// Positions move when the concatenation runs along a spatial axis, so
    /// any change is reported as full.
    fn propagate_region(&self, bottoms: &[Region], top_count: usize) -> CnResult<TVec<Region>> {
        let top = if bottoms.iter().all(|r| r.is_unchanged()) && !bottoms.is_empty() {
            Region::unchanged()
        } else {
            Region::Full
        };
        Ok(tvec![top; top_count])
    }
}
