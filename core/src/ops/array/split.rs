use crate::internal::*;

/// Fans its input out to every top. The tops share the input buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Split;

impl Layer for Split {
    fn name(&self) -> Cow<str> {
        "Split".into()
    }

    fn forward(&self, inputs: TVec<TValue>, top_count: usize) -> CnResult<TVec<TValue>> {
        ensure!(inputs.len() == 1, "Split expects one input, got {}", inputs.len());
        Ok(tvec![inputs[0].clone(); top_count])
    }
}
