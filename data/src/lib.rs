#[macro_use]
extern crate derive_new;

#[macro_use]
mod macros;

/// A Smallvec instantiation with 4 embeddable values.
///
/// Used about everywhere in cachenet, for layer bottoms and tops, tensor
/// dimensions or region lists.
pub type TVec<T> = smallvec::SmallVec<[T; 4]>;

pub mod prelude {
    pub use crate::region::{Rect, Region, WindowAxis};
    pub use crate::tensor::litteral::*;
    pub use crate::tensor::Tensor;
    pub use crate::tvec;
    pub use crate::value::{IntoTValue, TValue};
    pub use crate::TVec;
}

pub mod internal {
    pub use crate::prelude::*;
    pub use ndarray as cachenet_ndarray;
    pub use smallvec as cachenet_smallvec;
}

pub use anyhow;
pub use itertools;
pub use ndarray;

mod region;
mod tensor;
mod value;
