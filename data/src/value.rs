use crate::tensor::Tensor;
use std::sync::Arc;

/// A shared, immutable tensor handle.
///
/// Cloning a `TValue` never copies the buffer: every blob slot, local
/// variable or cache entry holding a clone shares the same storage, and the
/// storage lives as long as its longest holder. Mutation goes through
/// `into_tensor`, which hands out the buffer itself when the handle is the
/// sole owner and a deep copy otherwise.
#[derive(Clone, PartialEq)]
pub struct TValue(Arc<Tensor>);

impl std::fmt::Debug for TValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl TValue {
    /// True when no other holder shares this buffer.
    pub fn is_exclusive(&self) -> bool {
        Arc::strong_count(&self.0) == 1
    }

    /// Number of live holders of the buffer.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// True if both handles point to the same buffer.
    pub fn ptr_eq(a: &TValue, b: &TValue) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Take ownership of the buffer for mutation, cloning it if shared.
    pub fn into_tensor(self) -> Tensor {
        Arc::try_unwrap(self.0).unwrap_or_else(|t| (*t).clone())
    }
}

impl From<Tensor> for TValue {
    fn from(t: Tensor) -> Self {
        TValue(Arc::new(t))
    }
}

impl std::ops::Deref for TValue {
    type Target = Tensor;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::borrow::Borrow<Tensor> for TValue {
    fn borrow(&self) -> &Tensor {
        &self.0
    }
}

pub trait IntoTValue {
    fn into_tvalue(self) -> TValue;
}

impl IntoTValue for Tensor {
    fn into_tvalue(self) -> TValue {
        self.into()
    }
}

impl IntoTValue for TValue {
    fn into_tvalue(self) -> TValue {
        self
    }
}
