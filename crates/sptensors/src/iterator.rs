//! Traversal of packed storage.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::trace;

use crate::error::{Result, TensorError};
use crate::format::{Format, LevelKind};
use crate::scalar::Value;
use crate::storage::{LevelIndex, PackedTensor};

/// Iterator over the stored entries of a packed tensor.
///
/// All entries are materialized when the iterator is created, in level order
/// (the order in which packing emitted the values). Coordinates are reported
/// in logical dimension order regardless of the format's level order.
///
/// The iterator keeps its storage alive, so repacking the tensor it came
/// from does not affect it. Two iterators compare equal when they read the
/// same storage and have the same number of entries left.
///
/// # Example
///
/// ```
/// use sptensors::{Format, TensorBase, ComponentType, Value};
///
/// let mut t = TensorBase::new("A", &[2, 2], Format::csr(), ComponentType::Double).unwrap();
/// t.insert(&[1, 1], 3.0).unwrap();
/// t.insert(&[0, 0], 1.0).unwrap();
/// t.pack().unwrap();
///
/// let entries: Vec<_> = t.iter().unwrap().collect();
/// assert_eq!(entries[0], (vec![0, 0], Value::Double(1.0)));
/// assert_eq!(entries[1], (vec![1, 1], Value::Double(3.0)));
/// ```
#[derive(Debug, Clone)]
pub struct NonzeroIter {
    storage: Arc<PackedTensor>,
    queue: VecDeque<(Vec<usize>, Value)>,
}

struct Walker<'a> {
    format: &'a Format,
    dimensions: &'a [usize],
    storage: &'a PackedTensor,
    coord: Vec<usize>,
    queue: VecDeque<(Vec<usize>, Value)>,
}

impl NonzeroIter {
    /// Walk `storage` under `format`.
    ///
    /// # Errors
    ///
    /// * `TensorError::NotSupported` if the format has a level kind without
    ///   a traversal
    /// * `TensorError::InvalidStorage` if the index arrays do not match the
    ///   format or reference missing values
    pub fn new(format: &Format, dimensions: &[usize], storage: Arc<PackedTensor>) -> Result<Self> {
        if format.order() != dimensions.len() {
            return Err(TensorError::invalid_format(format!(
                "format of order {} does not match {} dimensions",
                format.order(),
                dimensions.len()
            )));
        }
        if storage.indices().len() != format.order() {
            return Err(TensorError::invalid_storage(format!(
                "{} level indices for a format of order {}",
                storage.indices().len(),
                format.order()
            )));
        }

        let mut walker = Walker {
            format,
            dimensions,
            storage: &storage,
            coord: vec![0; format.order()],
            queue: VecDeque::new(),
        };
        walker.walk(0, 0)?;
        let queue = walker.queue;
        trace!(entries = queue.len(), "materialized iterator");

        Ok(Self { storage, queue })
    }

    /// An iterator with nothing left to yield over `storage`.
    pub fn exhausted(storage: Arc<PackedTensor>) -> Self {
        Self {
            storage,
            queue: VecDeque::new(),
        }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// Storage this iterator reads from.
    pub fn storage(&self) -> &Arc<PackedTensor> {
        &self.storage
    }
}

impl Walker<'_> {
    fn walk(&mut self, lvl: usize, ptr: usize) -> Result<()> {
        let storage = self.storage;
        if lvl == self.format.order() {
            let value = storage.value(ptr).ok_or_else(|| {
                TensorError::invalid_storage(format!(
                    "value position {ptr} out of range for {} values",
                    storage.value_count()
                ))
            })?;
            self.queue.push_back((self.coord.clone(), value));
            return Ok(());
        }

        let level = self.format.levels()[lvl];
        let dim = level.dimension();
        match (level.kind(), &storage.indices()[lvl]) {
            (LevelKind::Dense, LevelIndex::Dense { .. }) => {
                let extent = self.dimensions[dim];
                for c in 0..extent {
                    self.coord[dim] = c;
                    self.walk(lvl + 1, ptr * extent + c)?;
                }
            }
            (LevelKind::Sparse, LevelIndex::Sparse(index)) => {
                let crd = index.crd();
                for position in index.segment(ptr)? {
                    let c = crd
                        .get(position)
                        .and_then(|&c| usize::try_from(c).ok())
                        .ok_or_else(|| {
                            TensorError::invalid_storage(format!(
                                "no valid coordinate at level {lvl}, position {position}"
                            ))
                        })?;
                    self.coord[dim] = c;
                    self.walk(lvl + 1, position)?;
                }
            }
            (LevelKind::Fixed, _) => {
                return Err(TensorError::NotSupported {
                    what: format!("iterating {} levels", LevelKind::Fixed),
                });
            }
            (kind, _) => {
                return Err(TensorError::invalid_storage(format!(
                    "level {lvl} is {kind} in the format but not in the storage"
                )));
            }
        }
        Ok(())
    }
}

impl Iterator for NonzeroIter {
    type Item = (Vec<usize>, Value);

    fn next(&mut self) -> Option<Self::Item> {
        self.queue.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.queue.len(), Some(self.queue.len()))
    }
}

impl ExactSizeIterator for NonzeroIter {}

impl PartialEq for NonzeroIter {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage) && self.queue.len() == other.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Level;
    use crate::storage::{Array, SparseIndex};

    fn csr_example() -> Arc<PackedTensor> {
        Arc::new(PackedTensor::new(
            vec![
                LevelIndex::Dense { size: 2 },
                LevelIndex::Sparse(SparseIndex::new(vec![0, 2, 3], vec![0, 1, 1])),
            ],
            Array::from_vec(vec![1.0f64, 2.0, 3.0]),
        ))
    }

    #[test]
    fn test_csr_walk() {
        let it = NonzeroIter::new(&Format::csr(), &[2, 2], csr_example()).unwrap();
        assert_eq!(it.len(), 3);
        let entries: Vec<_> = it.collect();
        assert_eq!(
            entries,
            vec![
                (vec![0, 0], Value::Double(1.0)),
                (vec![0, 1], Value::Double(2.0)),
                (vec![1, 1], Value::Double(3.0)),
            ]
        );
    }

    #[test]
    fn test_dense_walk_uses_level_dimension() {
        // Column-major dense 2x3: level 0 walks dimension 1.
        let format = Format::new(vec![Level::dense(1), Level::dense(0)]).unwrap();
        let storage = Arc::new(PackedTensor::new(
            vec![LevelIndex::Dense { size: 3 }, LevelIndex::Dense { size: 2 }],
            Array::from_vec((0..6).collect::<Vec<i32>>()),
        ));
        let coords: Vec<_> = NonzeroIter::new(&format, &[2, 3], storage)
            .unwrap()
            .map(|(c, v)| (c, v.as_f64() as i32))
            .collect();
        assert_eq!(coords[0], (vec![0, 0], 0));
        assert_eq!(coords[1], (vec![1, 0], 1));
        assert_eq!(coords[2], (vec![0, 1], 2));
        assert_eq!(coords[5], (vec![1, 2], 5));
    }

    #[test]
    fn test_equality() {
        let storage = csr_example();
        let mut a = NonzeroIter::new(&Format::csr(), &[2, 2], storage.clone()).unwrap();
        let b = NonzeroIter::new(&Format::csr(), &[2, 2], storage.clone()).unwrap();
        assert_eq!(a, b);
        a.next();
        assert_ne!(a, b);

        let other = NonzeroIter::new(&Format::csr(), &[2, 2], csr_example()).unwrap();
        assert_ne!(b, other);

        a.by_ref().for_each(drop);
        assert_eq!(a, NonzeroIter::exhausted(storage));
    }

    #[test]
    fn test_fixed_level_not_supported() {
        let format = Format::new(vec![Level::new(LevelKind::Fixed, 0)]).unwrap();
        let storage = Arc::new(PackedTensor::new(
            vec![LevelIndex::Dense { size: 1 }],
            Array::from_vec(vec![1.0f64]),
        ));
        let err = NonzeroIter::new(&format, &[1], storage).unwrap_err();
        assert!(matches!(err, TensorError::NotSupported { .. }));
    }

    #[test]
    fn test_mismatched_storage() {
        let storage = Arc::new(PackedTensor::new(
            vec![LevelIndex::Dense { size: 2 }, LevelIndex::Dense { size: 2 }],
            Array::from_vec(vec![0.0f64; 4]),
        ));
        let err = NonzeroIter::new(&Format::csr(), &[2, 2], storage).unwrap_err();
        assert!(matches!(err, TensorError::InvalidStorage { .. }));
    }
}
