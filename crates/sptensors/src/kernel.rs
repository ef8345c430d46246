//! Expression compiler interface.
//!
//! This crate does not compile index expressions itself. A tensor carries an
//! opaque [`Expression`] and its index variables; `TensorBase::compile` hands
//! them to a [`Compiler`], and the returned [`Kernel`] then runs in two phases:
//!
//! ```text
//! compile()  → Compiler::compile(&CompileRequest) → Box<dyn Kernel>
//! assemble() → Kernel::assemble(&mut PackedTensor)   index arrays
//! evaluate() → Kernel::evaluate(&mut PackedTensor)   values
//! ```

use std::any::Any;
use std::fmt;

use crate::error::Result;
use crate::format::Format;
use crate::scalar::ComponentType;
use crate::storage::PackedTensor;

/// A named index variable of an expression, e.g. `i` in `A(i,j) = B(i,j)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexVar {
    name: String,
}

impl IndexVar {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for IndexVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// An index expression attached to a tensor.
///
/// Opaque to this crate; compilers downcast through [`Expression::as_any`].
pub trait Expression: fmt::Debug + fmt::Display + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// Everything a compiler sees about the tensor being computed.
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    pub name: &'a str,
    pub format: &'a Format,
    pub dimensions: &'a [usize],
    pub component_type: ComponentType,
    pub expression: &'a dyn Expression,
    pub index_vars: &'a [IndexVar],
}

/// Turns an expression into a runnable kernel.
pub trait Compiler {
    /// Compile the expression of `request`.
    ///
    /// Implementations report their own failures as `TensorError::Kernel`.
    fn compile(&self, request: &CompileRequest<'_>) -> Result<Box<dyn Kernel>>;
}

/// A compiled expression.
pub trait Kernel: fmt::Debug + Send {
    /// Build the index arrays of the result.
    ///
    /// The storage passed in is the tensor's packed storage; kernels replace
    /// its indices (and typically allocate its values) wholesale.
    fn assemble(&self, storage: &mut PackedTensor) -> Result<()>;

    /// Compute the values of the result into already assembled storage.
    fn evaluate(&self, storage: &mut PackedTensor) -> Result<()>;
}
