//! sptensors - level-format sparse tensor storage
//!
//! This crate stores tensors whose dimensions are each kept either densely or
//! compressed, in a configurable level order. Entries are staged as
//! coordinates, packed into segment/coordinate/value arrays, and read back
//! through a format-aware iterator.
//!
//! # Architecture
//!
//! ```text
//! scalar      ComponentType registry, Value, Component
//! storage     Array (typed buffer), TypedValue, PackedTensor
//! format      Level / Format
//! operations  pack
//! iterator    NonzeroIter
//! kernel      Expression / Compiler / Kernel collaborator traits
//! tensor      TensorBase pipeline: Staging → Packed → Compiled → Assembled → Evaluated
//! ```
//!
//! # Example
//!
//! ```
//! use sptensors::{Format, Tensor};
//!
//! // A 2x2 matrix with dense rows and compressed columns
//! let mut a: Tensor<f64> = Tensor::new("A", &[2, 2], Format::csr()).unwrap();
//! a.insert(&[0, 0], 1.0).unwrap();
//! a.insert(&[1, 1], 3.0).unwrap();
//! a.insert(&[0, 1], 2.0).unwrap();
//! a.pack().unwrap();
//!
//! let level = a.packed().sparse_index(1).unwrap();
//! assert_eq!(level.segments(), &[0, 2, 3]);
//! assert_eq!(level.crd(), &[0, 1, 1]);
//!
//! let entries: Vec<_> = a.iter().unwrap().collect();
//! assert_eq!(entries[1], (vec![0, 1], 2.0));
//! ```

pub mod config;
pub mod coordinate;
pub mod error;
pub mod format;
pub mod io;
pub mod iterator;
pub mod kernel;
pub mod operations;
pub mod random;
pub mod scalar;
pub mod storage;
pub mod strides;
pub mod tensor;
pub mod typed_tensor;

pub use config::{DuplicatePolicy, TensorConfig};
pub use coordinate::{Coordinate, Entry};
pub use error::{Result, TensorError};
pub use format::{Format, Level, LevelKind};
pub use iterator::NonzeroIter;
pub use kernel::{CompileRequest, Compiler, Expression, IndexVar, Kernel};
pub use scalar::{Component, ComponentType, Value};
pub use storage::{Array, LevelIndex, PackedTensor, Policy, SparseIndex, TypedValue};
pub use tensor::{PipelineState, TensorBase};
pub use typed_tensor::{Tensor, TypedIter};
