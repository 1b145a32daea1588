//! The graph: layers, blobs, and the loaders building them.
mod graph;
mod loader;
mod param;
pub mod weights;

pub use self::graph::{Blob, Graph, Node};
pub use self::param::{ParamDict, ParamValue, Word, ARRAY_TAG, END_TAG};
pub use self::weights::{ModelBin, StreamModelBin, WeightKind};
