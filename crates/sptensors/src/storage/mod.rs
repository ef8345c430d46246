//! Storage types for tensor data.
//!
//! ```text
//! PackedTensor
//! ├── LevelIndex (per level)
//! │   ├── Dense  - implicit extent
//! │   └── Sparse - SparseIndex { segments: Array, crd: Array }
//! └── values     - Array
//!
//! Array       - typed, shared memory region with a reclamation Policy
//! TypedValue  - dynamically typed handle to one Array slot or scalar
//! ```

mod array;
mod packed;
mod typed_value;

pub use array::{Array, Policy};
pub use packed::{LevelIndex, PackedTensor, SparseIndex};
pub use typed_value::TypedValue;
