//! Tests for the tensor build pipeline.
//!
//! Covers:
//! - Staging → Packed → Compiled → Assembled → Evaluated with a test compiler
//! - Out-of-order calls and the state they leave behind
//! - Missing expressions and compiler/kernel failures
//! - Assembled storage that does not fit the tensor's shape
//! - Restaging from a later state

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use approx::assert_relative_eq;
use sptensors::{
    Array, CompileRequest, Compiler, ComponentType, Expression, Format, IndexVar, Kernel,
    LevelIndex, PackedTensor, PipelineState, Result, SparseIndex, TensorBase, TensorConfig,
    TensorError,
};

/// `A(i,j) = factor * B(i,j)` where `A` and `B` share a format.
#[derive(Debug)]
struct Scaled {
    source: Arc<PackedTensor>,
    factor: f64,
}

impl fmt::Display for Scaled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} * B(i,j)", self.factor)
    }
}

impl Expression for Scaled {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
struct Opaque;

impl fmt::Display for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("opaque")
    }
}

impl Expression for Opaque {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct ScaleCompiler;

impl Compiler for ScaleCompiler {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<Box<dyn Kernel>> {
        let expr = request
            .expression
            .as_any()
            .downcast_ref::<Scaled>()
            .ok_or_else(|| TensorError::kernel(format!("cannot compile {}", request.expression)))?;
        if request.component_type != ComponentType::Double {
            return Err(TensorError::kernel("only double tensors are supported"));
        }
        Ok(Box::new(ScaleKernel {
            source: Arc::clone(&expr.source),
            factor: expr.factor,
        }))
    }
}

#[derive(Debug)]
struct ScaleKernel {
    source: Arc<PackedTensor>,
    factor: f64,
}

impl Kernel for ScaleKernel {
    fn assemble(&self, storage: &mut PackedTensor) -> Result<()> {
        storage.set_indices(self.source.indices().to_vec());
        storage.set_values(Array::zeros(
            ComponentType::Double,
            self.source.value_count(),
        ));
        Ok(())
    }

    fn evaluate(&self, storage: &mut PackedTensor) -> Result<()> {
        let src = self.source.values().as_slice::<f64>()?;
        let dst = storage.values_mut().as_mut_slice::<f64>()?;
        if src.len() != dst.len() {
            return Err(TensorError::kernel("result was not assembled"));
        }
        for (d, s) in dst.iter_mut().zip(src) {
            *d = s * self.factor;
        }
        Ok(())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn source() -> Arc<PackedTensor> {
    let mut b = TensorBase::new("B", &[2, 3], Format::csr(), ComponentType::Double).unwrap();
    b.insert(&[0, 2], 1.0).unwrap();
    b.insert(&[1, 0], 2.0).unwrap();
    b.insert(&[1, 1], 3.0).unwrap();
    b.pack().unwrap();
    Arc::clone(b.packed())
}

fn packed_result() -> TensorBase {
    let mut a = TensorBase::new("A", &[2, 3], Format::csr(), ComponentType::Double).unwrap();
    a.pack().unwrap();
    a
}

/// The full pipeline runs each phase in order.
#[test]
fn test_full_pipeline() {
    init_tracing();
    let mut a = packed_result();
    a.set_expr(Arc::new(Scaled {
        source: source(),
        factor: 2.0,
    }))
    .unwrap();
    a.set_index_vars(vec![IndexVar::new("i"), IndexVar::new("j")])
        .unwrap();

    a.compile(&ScaleCompiler).unwrap();
    assert_eq!(a.state(), PipelineState::Compiled);
    a.assemble().unwrap();
    assert_eq!(a.state(), PipelineState::Assembled);
    assert_eq!(a.packed().sparse_index(1).unwrap().crd(), &[2, 0, 1]);
    a.evaluate().unwrap();
    assert_eq!(a.state(), PipelineState::Evaluated);

    let entries: Vec<_> = a
        .iter()
        .unwrap()
        .map(|(c, v)| (c, v.as_f64()))
        .collect();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].0, vec![0, 2]);
    assert_relative_eq!(entries[0].1, 2.0);
    assert_relative_eq!(entries[1].1, 4.0);
    assert_relative_eq!(entries[2].1, 6.0);
}

/// Compiling without an expression fails and keeps the packed state.
#[test]
fn test_compile_without_expression() {
    let mut a = packed_result();
    let err = a.compile(&ScaleCompiler).unwrap_err();
    assert!(matches!(err, TensorError::MissingExpression { ref name } if name == "A"));
    assert_eq!(a.state(), PipelineState::Packed);
}

/// Compiler failures propagate and keep the packed state.
#[test]
fn test_compiler_error() {
    let mut a = packed_result();
    a.set_expr(Arc::new(Opaque)).unwrap();
    let err = a.compile(&ScaleCompiler).unwrap_err();
    assert!(matches!(err, TensorError::Kernel { .. }));
    assert_eq!(a.state(), PipelineState::Packed);
}

/// Every phase rejects being called from the wrong state.
#[test]
fn test_out_of_order_calls() {
    let mut a = TensorBase::new("A", &[2, 3], Format::csr(), ComponentType::Double).unwrap();
    assert!(matches!(
        a.assemble(),
        Err(TensorError::InvalidState {
            operation: "assemble",
            state: PipelineState::Staging
        })
    ));
    assert!(a.evaluate().is_err());
    assert!(a.restage().is_err());

    a.pack().unwrap();
    assert!(a.assemble().is_err());
    assert!(a.evaluate().is_err());
    assert_eq!(a.state(), PipelineState::Packed);

    a.set_expr(Arc::new(Scaled {
        source: source(),
        factor: 1.0,
    }))
    .unwrap();
    a.compile(&ScaleCompiler).unwrap();
    assert!(a.evaluate().is_err());
    assert!(a.compile(&ScaleCompiler).is_err());
    assert!(matches!(
        a.set_expr(Arc::new(Opaque)),
        Err(TensorError::InvalidState { .. })
    ));
    assert_eq!(a.state(), PipelineState::Compiled);
}

/// A failing kernel phase leaves state and storage untouched.
#[test]
fn test_kernel_failure_keeps_storage() {
    #[derive(Debug)]
    struct Failing;
    impl Kernel for Failing {
        fn assemble(&self, storage: &mut PackedTensor) -> Result<()> {
            storage.set_values(Array::new());
            Err(TensorError::kernel("assembly failed"))
        }
        fn evaluate(&self, _: &mut PackedTensor) -> Result<()> {
            Ok(())
        }
    }
    struct FailingCompiler;
    impl Compiler for FailingCompiler {
        fn compile(&self, _: &CompileRequest<'_>) -> Result<Box<dyn Kernel>> {
            Ok(Box::new(Failing))
        }
    }

    let mut a = TensorBase::new("A", &[2], Format::dense(1), ComponentType::Double).unwrap();
    a.insert(&[1], 5.0).unwrap();
    a.pack().unwrap();
    a.set_expr(Arc::new(Opaque)).unwrap();
    a.compile(&FailingCompiler).unwrap();

    assert!(a.assemble().is_err());
    assert_eq!(a.state(), PipelineState::Compiled);
    assert_eq!(
        a.packed().values().as_slice::<f64>().unwrap(),
        &[0.0, 5.0]
    );
}

/// Restaging an evaluated tensor stages its computed entries.
#[test]
fn test_restage_after_evaluate() {
    init_tracing();
    let mut a = packed_result();
    a.set_expr(Arc::new(Scaled {
        source: source(),
        factor: 10.0,
    }))
    .unwrap();
    a.compile(&ScaleCompiler).unwrap();
    a.assemble().unwrap();
    a.evaluate().unwrap();

    a.restage().unwrap();
    assert_eq!(a.state(), PipelineState::Staging);
    assert_eq!(a.staged().len(), 3);
    assert!(a.expression().is_some());

    a.pack().unwrap();
    assert_eq!(
        a.packed().values().as_slice::<f64>().unwrap(),
        &[10.0, 20.0, 30.0]
    );
}

/// Assembles a fixed set of index arrays and values.
#[derive(Debug, Clone)]
struct Fixed {
    indices: Vec<LevelIndex>,
    values: Vec<f64>,
}

impl Kernel for Fixed {
    fn assemble(&self, storage: &mut PackedTensor) -> Result<()> {
        storage.set_indices(self.indices.clone());
        storage.set_values(Array::from_vec(self.values.clone()));
        Ok(())
    }

    fn evaluate(&self, _: &mut PackedTensor) -> Result<()> {
        Ok(())
    }
}

impl Compiler for Fixed {
    fn compile(&self, _: &CompileRequest<'_>) -> Result<Box<dyn Kernel>> {
        Ok(Box::new(self.clone()))
    }
}

fn compiled_vector(format: Format, kernel: &Fixed, validate: bool) -> TensorBase {
    let mut a = TensorBase::new("V", &[2], format, ComponentType::Double)
        .unwrap()
        .with_config(TensorConfig::default().with_validation(validate));
    a.pack().unwrap();
    a.set_expr(Arc::new(Opaque)).unwrap();
    a.compile(kernel).unwrap();
    a
}

/// Assembled coordinates outside the declared dimension are rejected.
#[test]
fn test_assemble_rejects_out_of_range_crd() {
    let kernel = Fixed {
        indices: vec![LevelIndex::Sparse(SparseIndex::new(vec![0, 1], vec![7]))],
        values: vec![5.0],
    };
    let mut a = compiled_vector(Format::sparse(1), &kernel, true);

    let err = a.assemble().unwrap_err();
    assert!(matches!(err, TensorError::InvalidStorage { .. }));
    assert_eq!(a.state(), PipelineState::Compiled);
    assert_eq!(a.iter().unwrap().count(), 0);
}

/// A dense extent that disagrees with the declared dimension is rejected.
#[test]
fn test_assemble_rejects_wrong_dense_extent() {
    let kernel = Fixed {
        indices: vec![LevelIndex::Dense { size: 3 }],
        values: vec![1.0, 2.0, 3.0],
    };
    let mut a = compiled_vector(Format::dense(1), &kernel, true);

    assert!(matches!(
        a.assemble(),
        Err(TensorError::InvalidStorage { .. })
    ));
    assert_eq!(a.state(), PipelineState::Compiled);
    assert_eq!(
        a.packed().values().as_slice::<f64>().unwrap(),
        &[0.0, 0.0]
    );
}

/// Without validation, restaging bad storage fails instead of staging
/// out-of-bounds entries.
#[test]
fn test_restage_rejects_out_of_range_entries() {
    let kernel = Fixed {
        indices: vec![LevelIndex::Sparse(SparseIndex::new(vec![0, 1], vec![7]))],
        values: vec![5.0],
    };
    let mut a = compiled_vector(Format::sparse(1), &kernel, false);
    a.assemble().unwrap();

    let err = a.restage().unwrap_err();
    assert!(matches!(
        err,
        TensorError::IndexOutOfBounds {
            index: 7,
            dim: 0,
            dim_size: 2
        }
    ));
    assert_eq!(a.state(), PipelineState::Assembled);
    assert!(a.staged().is_empty());
}
