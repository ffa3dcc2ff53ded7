//! Small fixed-capacity containers used by the per-partition epoch state.
//!
//! Both containers allocate their full capacity up front and report allocation
//! failure as an [`AllocError`] instead of aborting, so a pass over a very large
//! dataset fails `init` cleanly.

pub mod bitset;
pub mod dense_set;

pub use bitset::DynamicBitSet;
pub use dense_set::DenseIndexSet;

use thiserror::Error;

/// Allocation failure while sizing a fixed-capacity container.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to allocate {what} for {capacity} entries")]
pub struct AllocError {
    pub what: &'static str,
    pub capacity: usize,
}

/// Allocates a vector of `len` copies of `value`, reporting failure instead of aborting.
pub(crate) fn try_filled_vec<T: Clone>(
    what: &'static str,
    len: usize,
    value: T,
) -> Result<Vec<T>, AllocError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| AllocError { what, capacity: len })?;
    v.resize(len, value);
    Ok(v)
}
