//! Dynamically typed sparse tensor with a staged build pipeline.
//!
//! ```text
//! Staging ──pack──▶ Packed ──compile──▶ Compiled ──assemble──▶ Assembled ──evaluate──▶ Evaluated
//!    ▲                                                                                    │
//!    └────────────────────────────── restage (from any later state) ─────────────────────┘
//! ```
//!
//! Entries are inserted while staging, then compacted into level-format
//! storage by `pack`. Expression compilation, assembly and evaluation are
//! delegated to a [`Compiler`] and the [`Kernel`] it returns.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TensorConfig;
use crate::coordinate::Entry;
use crate::error::{Result, TensorError};
use crate::format::Format;
use crate::iterator::NonzeroIter;
use crate::kernel::{CompileRequest, Compiler, Expression, IndexVar, Kernel};
use crate::operations::pack;
use crate::scalar::{ComponentType, Value};
use crate::storage::PackedTensor;

/// Position of a tensor in its build pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Staging,
    Packed,
    Compiled,
    Assembled,
    Evaluated,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineState::Staging => "staging",
            PipelineState::Packed => "packed",
            PipelineState::Compiled => "compiled",
            PipelineState::Assembled => "assembled",
            PipelineState::Evaluated => "evaluated",
        })
    }
}

/// A named tensor with runtime component type and level format.
///
/// # Example
///
/// ```
/// use sptensors::{ComponentType, Format, PipelineState, TensorBase};
///
/// let mut a = TensorBase::new("A", &[2, 2], Format::csr(), ComponentType::Double).unwrap();
/// a.insert(&[0, 0], 1.0).unwrap();
/// a.insert(&[0, 1], 2.0).unwrap();
/// a.insert(&[1, 1], 3.0).unwrap();
/// a.pack().unwrap();
///
/// assert_eq!(a.state(), PipelineState::Packed);
/// let level = a.packed().sparse_index(1).unwrap();
/// assert_eq!(level.segments(), &[0, 2, 3]);
/// assert_eq!(level.crd(), &[0, 1, 1]);
/// ```
pub struct TensorBase {
    name: String,
    dimensions: Vec<usize>,
    format: Format,
    component_type: ComponentType,
    config: TensorConfig,
    staged: Vec<Entry>,
    expression: Option<Arc<dyn Expression>>,
    index_vars: Vec<IndexVar>,
    kernel: Option<Box<dyn Kernel>>,
    storage: Arc<PackedTensor>,
    state: PipelineState,
}

impl TensorBase {
    /// Create an empty tensor in the staging state.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::InvalidFormat` if the format order differs from
    /// the number of dimensions, or a dimension does not fit the `int` index
    /// arrays.
    pub fn new(
        name: impl Into<String>,
        dimensions: &[usize],
        format: Format,
        component_type: ComponentType,
    ) -> Result<Self> {
        if format.order() != dimensions.len() {
            return Err(TensorError::invalid_format(format!(
                "format {format} has order {} but {} dimensions were given",
                format.order(),
                dimensions.len()
            )));
        }
        if let Some(&size) = dimensions.iter().find(|&&d| i32::try_from(d).is_err()) {
            return Err(TensorError::invalid_format(format!(
                "dimension size {size} exceeds the index range"
            )));
        }
        Ok(Self {
            name: name.into(),
            dimensions: dimensions.to_vec(),
            format,
            component_type,
            config: TensorConfig::default(),
            staged: Vec::new(),
            expression: None,
            index_vars: Vec::new(),
            kernel: None,
            storage: Arc::new(PackedTensor::default()),
            state: PipelineState::Staging,
        })
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: TensorConfig) -> Self {
        self.config = config;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn dimensions(&self) -> &[usize] {
        &self.dimensions
    }

    /// Number of dimensions.
    #[inline]
    pub fn order(&self) -> usize {
        self.dimensions.len()
    }

    #[inline]
    pub fn format(&self) -> &Format {
        &self.format
    }

    #[inline]
    pub fn component_type(&self) -> ComponentType {
        self.component_type
    }

    #[inline]
    pub fn config(&self) -> &TensorConfig {
        &self.config
    }

    #[inline]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Entries inserted since the last pack, in insertion order.
    pub fn staged(&self) -> &[Entry] {
        &self.staged
    }

    pub fn expression(&self) -> Option<&Arc<dyn Expression>> {
        self.expression.as_ref()
    }

    pub fn index_vars(&self) -> &[IndexVar] {
        &self.index_vars
    }

    /// Current packed storage. Empty until the first `pack`.
    pub fn packed(&self) -> &Arc<PackedTensor> {
        &self.storage
    }

    /// Number of stored values in the packed storage.
    pub fn stored_count(&self) -> usize {
        self.storage.value_count()
    }

    /// Reserve room for `additional` staged entries.
    pub fn reserve(&mut self, additional: usize) {
        self.staged.reserve(additional);
    }

    /// Stage one value.
    ///
    /// # Errors
    ///
    /// * `TensorError::InvalidState` outside the staging state
    /// * `TensorError::WrongNumberOfIndices` if `coord` has the wrong length
    /// * `TensorError::IndexOutOfBounds` if a coordinate exceeds its dimension
    /// * `TensorError::TypeMismatch` if the value has another component type
    ///
    /// On error nothing is staged.
    pub fn insert(&mut self, coord: &[usize], value: impl Into<Value>) -> Result<()> {
        self.require(PipelineState::Staging, "insert into")?;
        let entry = Entry::new(coord, value.into());
        self.check_entry(&entry)?;
        self.staged.push(entry);
        Ok(())
    }

    /// Stage a batch of entries; either all are staged or none.
    ///
    /// Returns the number of entries staged.
    pub fn insert_entries(&mut self, entries: impl IntoIterator<Item = Entry>) -> Result<usize> {
        self.require(PipelineState::Staging, "insert into")?;
        let before = self.staged.len();
        for entry in entries {
            if let Err(e) = self.check_entry(&entry) {
                self.staged.truncate(before);
                return Err(e);
            }
            self.staged.push(entry);
        }
        let count = self.staged.len() - before;
        debug!(tensor = %self.name, count, "staged entries");
        Ok(count)
    }

    fn check_entry(&self, entry: &Entry) -> Result<()> {
        if entry.coord.len() != self.order() {
            return Err(TensorError::WrongNumberOfIndices {
                expected: self.order(),
                actual: entry.coord.len(),
            });
        }
        for (dim, (&index, &dim_size)) in entry.coord.iter().zip(&self.dimensions).enumerate() {
            if index >= dim_size {
                return Err(TensorError::IndexOutOfBounds {
                    index,
                    dim,
                    dim_size,
                });
            }
        }
        let actual = entry.value.component_type();
        if actual != self.component_type {
            return Err(TensorError::TypeMismatch {
                expected: self.component_type,
                actual,
            });
        }
        Ok(())
    }

    /// Compact the staged entries into packed storage.
    ///
    /// Consumes the staged entries on success. On error the entries stay
    /// staged and the state is unchanged.
    pub fn pack(&mut self) -> Result<()> {
        self.require(PipelineState::Staging, "pack")?;
        let packed = pack(
            &self.format,
            &self.dimensions,
            self.component_type,
            &self.staged,
            self.config.duplicates,
        )?;
        if self.config.validate_storage {
            packed.validate_for(&self.format, &self.dimensions)?;
        }
        debug!(
            tensor = %self.name,
            staged = self.staged.len(),
            values = packed.value_count(),
            "packed"
        );
        self.staged.clear();
        self.storage = Arc::new(packed);
        self.transition(PipelineState::Packed);
        Ok(())
    }

    /// Return to the staging state with every stored entry staged again.
    ///
    /// Packing right after restaging reproduces the current storage.
    /// The compiled kernel is dropped; the expression is kept.
    ///
    /// Stored entries are checked like inserts; on error nothing changes.
    pub fn restage(&mut self) -> Result<()> {
        if self.state == PipelineState::Staging {
            return Err(self.invalid_state("restage"));
        }
        let entries = self
            .iter()?
            .map(|(coord, value)| {
                let entry = Entry::new(&coord, value);
                self.check_entry(&entry)?;
                Ok(entry)
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(tensor = %self.name, count = entries.len(), "restaged entries");
        self.staged = entries;
        self.kernel = None;
        self.storage = Arc::new(PackedTensor::default());
        self.transition(PipelineState::Staging);
        Ok(())
    }

    /// Attach the expression that computes this tensor.
    ///
    /// Only valid before compilation.
    pub fn set_expr(&mut self, expression: Arc<dyn Expression>) -> Result<()> {
        if self.state > PipelineState::Packed {
            return Err(self.invalid_state("set the expression of"));
        }
        self.expression = Some(expression);
        Ok(())
    }

    /// Set the index variables the expression is written over.
    pub fn set_index_vars(&mut self, index_vars: Vec<IndexVar>) -> Result<()> {
        if self.state > PipelineState::Packed {
            return Err(self.invalid_state("set the index variables of"));
        }
        self.index_vars = index_vars;
        Ok(())
    }

    /// Compile the attached expression.
    ///
    /// # Errors
    ///
    /// * `TensorError::InvalidState` unless packed
    /// * `TensorError::MissingExpression` if no expression is attached
    /// * any error reported by the compiler
    pub fn compile(&mut self, compiler: &dyn Compiler) -> Result<()> {
        self.require(PipelineState::Packed, "compile")?;
        let expression = self
            .expression
            .as_deref()
            .ok_or_else(|| TensorError::MissingExpression {
                name: self.name.clone(),
            })?;
        let request = CompileRequest {
            name: &self.name,
            format: &self.format,
            dimensions: &self.dimensions,
            component_type: self.component_type,
            expression,
            index_vars: &self.index_vars,
        };
        let kernel = compiler.compile(&request)?;
        debug!(tensor = %self.name, expression = %expression, "compiled");
        self.kernel = Some(kernel);
        self.transition(PipelineState::Compiled);
        Ok(())
    }

    /// Run the index phase of the compiled kernel.
    pub fn assemble(&mut self) -> Result<()> {
        self.require(PipelineState::Compiled, "assemble")?;
        let storage = self.run_kernel(|kernel, storage| kernel.assemble(storage))?;
        if self.config.validate_storage {
            storage.validate_for(&self.format, &self.dimensions)?;
        }
        self.storage = Arc::new(storage);
        self.transition(PipelineState::Assembled);
        Ok(())
    }

    /// Run the value phase of the compiled kernel.
    pub fn evaluate(&mut self) -> Result<()> {
        self.require(PipelineState::Assembled, "evaluate")?;
        let storage = self.run_kernel(|kernel, storage| kernel.evaluate(storage))?;
        self.storage = Arc::new(storage);
        self.transition(PipelineState::Evaluated);
        Ok(())
    }

    /// Run a kernel phase on a private copy of the storage.
    ///
    /// The tensor's storage is only replaced once the phase succeeds.
    fn run_kernel(
        &self,
        phase: impl FnOnce(&dyn Kernel, &mut PackedTensor) -> Result<()>,
    ) -> Result<PackedTensor> {
        let kernel = self
            .kernel
            .as_deref()
            .ok_or_else(|| TensorError::MissingExpression {
                name: self.name.clone(),
            })?;
        let mut storage = self.storage.deep_clone();
        phase(kernel, &mut storage)?;
        Ok(storage)
    }

    /// Iterate the stored entries of the packed storage.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::InvalidState` while staging.
    pub fn iter(&self) -> Result<NonzeroIter> {
        if self.state == PipelineState::Staging {
            return Err(self.invalid_state("iterate"));
        }
        NonzeroIter::new(&self.format, &self.dimensions, Arc::clone(&self.storage))
    }

    fn require(&self, state: PipelineState, operation: &'static str) -> Result<()> {
        if self.state != state {
            return Err(self.invalid_state(operation));
        }
        Ok(())
    }

    fn invalid_state(&self, operation: &'static str) -> TensorError {
        TensorError::InvalidState {
            operation,
            state: self.state,
        }
    }

    fn transition(&mut self, to: PipelineState) {
        debug!(tensor = %self.name, from = %self.state, to = %to, "pipeline transition");
        self.state = to;
    }
}

impl fmt::Debug for TensorBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorBase")
            .field("name", &self.name)
            .field("dimensions", &self.dimensions)
            .field("format", &self.format)
            .field("component_type", &self.component_type)
            .field("state", &self.state)
            .field("staged", &self.staged.len())
            .field("expression", &self.expression)
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for TensorBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.dimensions.iter().map(ToString::to_string).collect();
        write!(
            f,
            "{} ({}) {} {} [{}]",
            self.name,
            dims.join("x"),
            self.format,
            self.component_type,
            self.state
        )?;
        if !self.staged.is_empty() {
            f.write_str("\nCoordinates:")?;
            for entry in &self.staged {
                write!(f, "\n{entry}")?;
            }
        }
        if self.state != PipelineState::Staging {
            write!(f, "\n{}", self.storage)?;
        }
        Ok(())
    }
}
