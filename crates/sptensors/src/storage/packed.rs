//! Packed (compacted) tensor storage.
//!
//! ```text
//! PackedTensor
//! ├── indices[lvl]  one per level
//! │   ├── Dense { size }                  implicit extent, no arrays
//! │   └── Sparse { segments, crd }        CSR-style offsets and coordinates
//! └── values                              one element per root-to-leaf path
//! ```

use std::fmt;
use std::ops::Range;

use crate::error::{Result, TensorError};
use crate::format::{Format, LevelKind};
use crate::scalar::{ComponentType, Value};
use crate::storage::Array;

/// Segment and coordinate arrays of one sparse level.
///
/// Both arrays hold `int` components.
#[derive(Debug, Clone)]
pub struct SparseIndex {
    segments: Array,
    crd: Array,
}

impl SparseIndex {
    pub fn new(segments: Vec<i32>, crd: Vec<i32>) -> Self {
        Self {
            segments: Array::from_vec(segments),
            crd: Array::from_vec(crd),
        }
    }

    /// Wrap existing `int` arrays.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::TypeMismatch` if either array is not `int`.
    pub fn from_arrays(segments: Array, crd: Array) -> Result<Self> {
        for array in [&segments, &crd] {
            if let Some(ty) = array.component_type() {
                if ty != ComponentType::Int {
                    return Err(TensorError::TypeMismatch {
                        expected: ComponentType::Int,
                        actual: ty,
                    });
                }
            }
        }
        Ok(Self { segments, crd })
    }

    /// Offsets partitioning `crd` by parent position.
    #[inline]
    pub fn segments(&self) -> &[i32] {
        self.segments.as_slice::<i32>().unwrap_or(&[])
    }

    /// Child coordinates.
    #[inline]
    pub fn crd(&self) -> &[i32] {
        self.crd.as_slice::<i32>().unwrap_or(&[])
    }

    pub fn segments_array(&self) -> &Array {
        &self.segments
    }

    pub fn crd_array(&self) -> &Array {
        &self.crd
    }

    /// Positions in `crd` that belong to `parent`.
    pub fn segment(&self, parent: usize) -> Result<Range<usize>> {
        let segments = self.segments();
        match (segments.get(parent), segments.get(parent + 1)) {
            (Some(&begin), Some(&end)) => {
                let begin = usize::try_from(begin)
                    .map_err(|_| TensorError::invalid_storage("negative segment offset"))?;
                let end = usize::try_from(end)
                    .map_err(|_| TensorError::invalid_storage("negative segment offset"))?;
                Ok(begin..end)
            }
            _ => Err(TensorError::invalid_storage(format!(
                "parent position {parent} has no segment (segments has {} entries)",
                segments.len()
            ))),
        }
    }

    /// Number of parent positions this level is partitioned by.
    pub fn parent_count(&self) -> usize {
        self.segments().len().saturating_sub(1)
    }

    /// Check the segment and coordinate invariants.
    pub fn validate(&self) -> Result<()> {
        let segments = self.segments();
        let crd = self.crd();
        if segments.first() != Some(&0) {
            return Err(TensorError::invalid_storage("segments must start at 0"));
        }
        if segments.windows(2).any(|w| w[0] > w[1]) {
            return Err(TensorError::invalid_storage("segments must be non-decreasing"));
        }
        if segments.last().map(|&s| s as usize) != Some(crd.len()) {
            return Err(TensorError::invalid_storage(format!(
                "last segment {:?} does not match {} coordinates",
                segments.last(),
                crd.len()
            )));
        }
        for parent in 0..self.parent_count() {
            let range = self.segment(parent)?;
            if crd[range].windows(2).any(|w| w[0] >= w[1]) {
                return Err(TensorError::invalid_storage(format!(
                    "coordinates of parent {parent} are not strictly increasing"
                )));
            }
        }
        Ok(())
    }

    fn deep_clone(&self) -> Self {
        Self {
            segments: self.segments.deep_clone(),
            crd: self.crd.deep_clone(),
        }
    }
}

/// Index data of one level.
#[derive(Debug, Clone)]
pub enum LevelIndex {
    /// No arrays; the extent is the declared dimension size.
    Dense { size: usize },
    Sparse(SparseIndex),
}

impl LevelIndex {
    /// Number of positions this level stores, given the parent's count.
    pub fn size(&self, parent_size: usize) -> usize {
        match self {
            LevelIndex::Dense { size } => parent_size * size,
            LevelIndex::Sparse(index) => index.crd().len(),
        }
    }

    pub fn as_sparse(&self) -> Option<&SparseIndex> {
        match self {
            LevelIndex::Sparse(index) => Some(index),
            LevelIndex::Dense { .. } => None,
        }
    }
}

/// The compacted index and value arrays of a tensor.
///
/// Read-only once produced by packing or assembly; kernels that rebuild
/// storage use the `set_*` methods on a uniquely owned instance.
#[derive(Debug, Clone, Default)]
pub struct PackedTensor {
    indices: Vec<LevelIndex>,
    values: Array,
}

impl PackedTensor {
    pub fn new(indices: Vec<LevelIndex>, values: Array) -> Self {
        Self { indices, values }
    }

    /// Per-level index data, in level order.
    #[inline]
    pub fn indices(&self) -> &[LevelIndex] {
        &self.indices
    }

    #[inline]
    pub fn level(&self, lvl: usize) -> Option<&LevelIndex> {
        self.indices.get(lvl)
    }

    /// Index arrays of a sparse level.
    pub fn sparse_index(&self, lvl: usize) -> Option<&SparseIndex> {
        self.indices.get(lvl).and_then(LevelIndex::as_sparse)
    }

    #[inline]
    pub fn values(&self) -> &Array {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Array {
        &mut self.values
    }

    pub fn value(&self, ptr: usize) -> Option<Value> {
        self.values.get(ptr)
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    /// Number of leaf positions implied by the index arrays.
    pub fn position_count(&self) -> usize {
        self.indices.iter().fold(1, |parent, level| level.size(parent))
    }

    pub fn set_indices(&mut self, indices: Vec<LevelIndex>) {
        self.indices = indices;
    }

    pub fn set_values(&mut self, values: Array) {
        self.values = values;
    }

    /// Copy all arrays into freshly owned memory.
    pub fn deep_clone(&self) -> Self {
        Self {
            indices: self
                .indices
                .iter()
                .map(|level| match level {
                    LevelIndex::Dense { size } => LevelIndex::Dense { size: *size },
                    LevelIndex::Sparse(index) => LevelIndex::Sparse(index.deep_clone()),
                })
                .collect(),
            values: self.values.deep_clone(),
        }
    }

    /// Check the storage against a tensor's format and dimensions.
    ///
    /// In addition to [`PackedTensor::validate`], every level must have the
    /// format's kind, dense extents must equal the declared size of their
    /// dimension, and every stored coordinate must lie inside it.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::InvalidStorage` describing the first violation.
    pub fn validate_for(&self, format: &Format, dimensions: &[usize]) -> Result<()> {
        if self.indices.len() != format.order() || dimensions.len() != format.order() {
            return Err(TensorError::invalid_storage(format!(
                "{} level indices for a format of order {} over {} dimensions",
                self.indices.len(),
                format.order(),
                dimensions.len()
            )));
        }
        for (lvl, (level, index)) in format.levels().iter().zip(&self.indices).enumerate() {
            let dim_size = dimensions[level.dimension()];
            match (level.kind(), index) {
                (LevelKind::Dense, LevelIndex::Dense { size }) => {
                    if *size != dim_size {
                        return Err(TensorError::invalid_storage(format!(
                            "level {lvl}: dense extent {size} differs from dimension size {dim_size}"
                        )));
                    }
                }
                (LevelKind::Sparse, LevelIndex::Sparse(sparse)) => {
                    if let Some(&c) = sparse
                        .crd()
                        .iter()
                        .find(|&&c| !usize::try_from(c).is_ok_and(|c| c < dim_size))
                    {
                        return Err(TensorError::invalid_storage(format!(
                            "level {lvl}: coordinate {c} outside dimension of size {dim_size}"
                        )));
                    }
                }
                (kind, _) => {
                    return Err(TensorError::invalid_storage(format!(
                        "level {lvl} is {kind} in the format but not in the storage"
                    )));
                }
            }
        }
        self.validate()
    }

    /// Check every sparse level and the value count.
    pub fn validate(&self) -> Result<()> {
        let mut parent = 1;
        for (lvl, level) in self.indices.iter().enumerate() {
            if let LevelIndex::Sparse(index) = level {
                index.validate().map_err(|e| match e {
                    TensorError::InvalidStorage { message } => {
                        TensorError::invalid_storage(format!("level {lvl}: {message}"))
                    }
                    other => other,
                })?;
                if index.parent_count() != parent {
                    return Err(TensorError::invalid_storage(format!(
                        "level {lvl}: {} segments for {parent} parent positions",
                        index.parent_count()
                    )));
                }
            }
            parent = level.size(parent);
        }
        if self.values.len() != parent {
            return Err(TensorError::invalid_storage(format!(
                "{} values for {parent} leaf positions",
                self.values.len()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for PackedTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (lvl, level) in self.indices.iter().enumerate() {
            match level {
                LevelIndex::Dense { size } => writeln!(f, "L{lvl} dense ({size})")?,
                LevelIndex::Sparse(index) => writeln!(
                    f,
                    "L{lvl} sparse segments {} crd {}",
                    index.segments_array(),
                    index.crd_array()
                )?,
            }
        }
        write!(f, "values {}", self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csr_example() -> PackedTensor {
        PackedTensor::new(
            vec![
                LevelIndex::Dense { size: 2 },
                LevelIndex::Sparse(SparseIndex::new(vec![0, 2, 3], vec![0, 1, 1])),
            ],
            Array::from_vec(vec![1.0f64, 2.0, 3.0]),
        )
    }

    #[test]
    fn test_segment_ranges() {
        let packed = csr_example();
        let index = packed.sparse_index(1).unwrap();
        assert_eq!(index.segment(0).unwrap(), 0..2);
        assert_eq!(index.segment(1).unwrap(), 2..3);
        assert!(index.segment(2).is_err());
        assert!(packed.sparse_index(0).is_none());
    }

    #[test]
    fn test_validate_ok() {
        let packed = csr_example();
        packed.validate().unwrap();
        assert_eq!(packed.position_count(), 3);
    }

    #[test]
    fn test_validate_unsorted_crd() {
        let index = SparseIndex::new(vec![0, 2], vec![1, 0]);
        assert!(matches!(
            index.validate(),
            Err(TensorError::InvalidStorage { .. })
        ));
    }

    #[test]
    fn test_validate_value_count() {
        let packed = PackedTensor::new(
            vec![LevelIndex::Dense { size: 3 }],
            Array::from_vec(vec![1.0f64]),
        );
        assert!(packed.validate().is_err());
    }

    #[test]
    fn test_validate_for_shape() {
        let packed = csr_example();
        packed.validate_for(&Format::csr(), &[2, 2]).unwrap();

        // Column coordinate 1 does not fit a single column.
        let err = packed.validate_for(&Format::csr(), &[2, 1]).unwrap_err();
        assert!(matches!(err, TensorError::InvalidStorage { .. }));
        // Dense extent 2 against a declared row count of 3.
        assert!(packed.validate_for(&Format::csr(), &[3, 2]).is_err());
        // Level kinds must agree with the format.
        assert!(packed.validate_for(&Format::dense(2), &[2, 2]).is_err());
    }

    #[test]
    fn test_validate_for_negative_crd() {
        let packed = PackedTensor::new(
            vec![LevelIndex::Sparse(SparseIndex::new(vec![0, 1], vec![-1]))],
            Array::from_vec(vec![1.0f64]),
        );
        assert!(packed.validate_for(&Format::sparse(1), &[4]).is_err());
    }

    #[test]
    fn test_from_arrays_rejects_float() {
        let err = SparseIndex::from_arrays(
            Array::from_vec(vec![0i32, 1]),
            Array::from_vec(vec![0.5f32]),
        )
        .unwrap_err();
        assert!(matches!(err, TensorError::TypeMismatch { .. }));
    }

    #[test]
    fn test_display() {
        let text = csr_example().to_string();
        assert!(text.contains("L0 dense (2)"));
        assert!(text.contains("segments [0, 2, 3] crd [0, 1, 1]"));
        assert!(text.ends_with("values [1, 2, 3]"));
    }
}
