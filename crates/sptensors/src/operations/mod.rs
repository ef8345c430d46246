//! Tensor operations.
//!
//! ```text
//! staged entries ──pack──▶ PackedTensor ──NonzeroIter──▶ (coordinate, value)
//! ```
//!
//! Packing is the only storage-building operation implemented here; assembly
//! and evaluation are delegated to compiled kernels (see [`crate::kernel`]).

mod pack;

pub use pack::pack;
