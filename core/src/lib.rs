//! # cachenet
//!
//! Lazy, demand-driven evaluation of pre-trained layer graphs, with
//! optional incremental recomputation of the regions that changed between
//! two successive inputs.
//!
//! ## Example
//!
//! ```
//! use cachenet_core::prelude::*;
//!
//! let mut graph = Graph::default();
//! graph
//!     .load_param_text("2 2\nInput data 0 1 data 0=4 1=1 2=1\nReLU relu 1 1 data out\n".as_bytes())
//!     .unwrap();
//!
//! let mut extractor = graph.extractor();
//! extractor.input_by_name("data", tensor1(&[-1.0, 2.0, -3.0, 4.0])).unwrap();
//! let out = extractor.extract_by_name("out").unwrap();
//! assert_eq!(out.as_slice(), &[0.0, 2.0, 0.0, 4.0]);
//! ```
//!
//! A graph is loaded once (parameters, then weights) and is read-only
//! afterwards. Each inference round runs on its own `Extractor`, which only
//! computes what the requested outputs depend on.

#[macro_use]
extern crate derive_new;
#[macro_use]
extern crate log;

pub extern crate cachenet_data;

pub mod config;
pub mod model;
pub mod multithread;
pub mod ops;
pub mod plan;
pub mod registry;

pub use anyhow;

/// Result type used everywhere in cachenet.
pub type CnResult<T> = anyhow::Result<T>;
/// Error type used everywhere in cachenet.
pub type CnError = anyhow::Error;

pub mod prelude {
    pub use crate::config::ExtractorConfig;
    pub use crate::model::{Blob, Graph, Node};
    pub use crate::ops::Layer;
    pub use crate::plan::Extractor;
    pub use crate::registry::{LayerRegistry, LayerType, CUSTOM_BIT};
    pub use crate::{CnError, CnResult};
    pub use cachenet_data::prelude::*;
}

pub mod internal {
    pub use crate::model::{ModelBin, ParamDict, WeightKind};
    pub use crate::multithread::{current_executor, Executor};
    pub use crate::prelude::*;
    pub use anyhow::{bail, ensure, format_err, Context as CnErrorContext};
    pub use cachenet_data::internal::*;
    pub use std::borrow::Cow;
    pub use std::sync::Arc;
}

#[cfg(test)]
#[allow(dead_code)]
fn setup_test_logger() {
    let _ = env_logger::Builder::from_env("CACHENET_LOG").try_init();
}
