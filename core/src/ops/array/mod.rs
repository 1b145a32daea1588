//! Layers moving data around without computing on it.
mod concat;
mod split;

pub use self::concat::Concat;
pub use self::split::Split;
