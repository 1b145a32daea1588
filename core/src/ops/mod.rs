//! Layers: the operator contract and the reference implementations.
use std::fmt;

use downcast_rs::{impl_downcast, Downcast};

use crate::internal::*;

pub mod array;
pub mod cnn;
pub mod element_wise;
pub mod math;
pub mod source;

/// A computation node of the graph.
///
/// Layers are created empty by the registry, then receive their parameters
/// (`load_param`) and their weights (`load_model`) exactly once while the
/// graph loads. After that they are read-only: every `forward*` method takes
/// `&self`, so a loaded graph can serve independent extractors from several
/// threads.
///
/// Two flags drive how the engine calls a layer. `one_blob_only` layers are
/// called through the single tensor variants (`forward_one`,
/// `forward_inplace_one`, `forward_cached`), the others through the vector
/// variants. `support_inplace` layers may be handed tensors to mutate; the
/// engine guarantees these tensors are exclusively owned.
///
/// The region hooks (`needs_cache`, `propagate_region`, `forward_cached`)
/// only matter when an extractor runs in cache mode.
pub trait Layer: fmt::Debug + Send + Sync + 'static + Downcast {
    /// Type name, as used in the text parameter format.
    fn name(&self) -> Cow<str>;

    /// Short strings describing the loaded configuration, for dumps.
    fn info(&self) -> Vec<String> {
        vec![]
    }

    fn load_param(&mut self, _pd: &ParamDict) -> CnResult<()> {
        Ok(())
    }

    fn load_model(&mut self, _mb: &mut dyn ModelBin) -> CnResult<()> {
        Ok(())
    }

    fn one_blob_only(&self) -> bool {
        false
    }

    fn support_inplace(&self) -> bool {
        false
    }

    /// Compute `top_count` outputs. Inputs are shared: they may be aliased
    /// into the outputs but never mutated.
    fn forward(&self, inputs: TVec<TValue>, top_count: usize) -> CnResult<TVec<TValue>> {
        if self.support_inplace() {
            let mut tensors: TVec<Tensor> = inputs.into_iter().map(|t| t.into_tensor()).collect();
            self.forward_inplace(&mut tensors)?;
            let outputs: TVec<TValue> = tensors.into_iter().map(|t| t.into()).collect();
            ensure!(outputs.len() == top_count, "{} produced {} outputs", self.name(), outputs.len());
            Ok(outputs)
        } else {
            bail!("{} does not implement forward", self.name())
        }
    }

    fn forward_one(&self, input: TValue) -> CnResult<TValue> {
        if self.support_inplace() {
            let mut tensor = input.into_tensor();
            self.forward_inplace_one(&mut tensor)?;
            Ok(tensor.into())
        } else {
            bail!("{} does not implement forward_one", self.name())
        }
    }

    fn forward_inplace(&self, _tensors: &mut [Tensor]) -> CnResult<()> {
        bail!("{} does not implement forward_inplace", self.name())
    }

    fn forward_inplace_one(&self, _tensor: &mut Tensor) -> CnResult<()> {
        bail!("{} does not implement forward_inplace_one", self.name())
    }

    /// Whether the engine must keep this layer's output between rounds.
    fn needs_cache(&self) -> bool {
        false
    }

    /// Map the changed regions of the bottoms to the regions of the tops
    /// that may have changed.
    ///
    /// The default is right for layers where an output position only
    /// depends on the same position of the inputs: every top gets the union
    /// of the bottom regions. Layers mixing neighbouring positions must
    /// dilate the regions by their receptive field.
    fn propagate_region(&self, bottoms: &[Region], top_count: usize) -> CnResult<TVec<Region>> {
        Ok(tvec![Region::union_all(bottoms); top_count])
    }

    /// Compute the output, only recomputing `region` when `cached` holds
    /// the previous round output. Only called on `one_blob_only` layers
    /// that `needs_cache`.
    fn forward_cached(
        &self,
        input: TValue,
        _cached: Option<&TValue>,
        _region: &Region,
    ) -> CnResult<TValue> {
        self.forward_one(input)
    }
}

impl_downcast!(Layer);

impl<L: Layer> From<L> for Box<dyn Layer> {
    fn from(it: L) -> Box<dyn Layer> {
        Box::new(it)
    }
}

impl fmt::Display for Box<dyn Layer> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.name())
    }
}
