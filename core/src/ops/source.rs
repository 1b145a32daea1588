use crate::internal::*;

/// Graph entry point. Its top is bound by `Extractor::input`; the layer
/// itself never computes anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Input {
    pub w: usize,
    pub h: usize,
    pub c: usize,
}

impl Layer for Input {
    fn name(&self) -> Cow<str> {
        "Input".into()
    }

    fn info(&self) -> Vec<String> {
        vec![format!("{}x{}x{}", self.c, self.h, self.w)]
    }

    fn load_param(&mut self, pd: &ParamDict) -> CnResult<()> {
        self.w = pd.get_usize(0, 0)?;
        self.h = pd.get_usize(1, 0)?;
        self.c = pd.get_usize(2, 0)?;
        Ok(())
    }

    fn forward(&self, _inputs: TVec<TValue>, _top_count: usize) -> CnResult<TVec<TValue>> {
        bail!("No value bound to input ({}x{}x{})", self.c, self.h, self.w)
    }
}
