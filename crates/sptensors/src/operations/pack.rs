//! Packing staged coordinates into level-format storage.
//!
//! Entries are sorted by coordinate in the format's level order and then
//! split recursively, one level at a time:
//!
//! ```text
//! pack_level(lvl, entries[begin..end])
//! ├── lvl == order  → emit one value (zero if the range is empty)
//! ├── Dense         → for i in 0..size: recurse on entries with coord == i
//! └── Sparse        → for each distinct coord c: crd.push(c), recurse;
//!                     then segments.push(crd.len())
//! ```
//!
//! Values are emitted in the same depth-first order as the index arrays, so
//! value `i` belongs to the `i`-th root-to-leaf path.

use tracing::{debug, instrument};

use crate::config::DuplicatePolicy;
use crate::coordinate::Entry;
use crate::error::{Result, TensorError};
use crate::format::{Format, LevelKind};
use crate::scalar::{ComponentType, Value};
use crate::storage::{Array, LevelIndex, PackedTensor, SparseIndex};

enum LevelBuilder {
    Dense { size: usize },
    Sparse { segments: Vec<i32>, crd: Vec<i32> },
}

struct Packer<'a> {
    format: &'a Format,
    entries: &'a [Entry],
    sorted: Vec<usize>,
    duplicates: DuplicatePolicy,
    zero: Value,
    levels: Vec<LevelBuilder>,
    values: Vec<Value>,
}

/// Pack staged entries into the given format.
///
/// # Arguments
///
/// * `format` - Level format; its order must equal `dimensions.len()`
/// * `dimensions` - Declared size of each logical dimension
/// * `component_type` - Type of every staged value
/// * `entries` - Staged entries in insertion order
/// * `duplicates` - Resolution of repeated coordinates
///
/// # Errors
///
/// * `TensorError::WrongNumberOfIndices` for entries of the wrong order
/// * `TensorError::IndexOutOfBounds` for coordinates outside `dimensions`
/// * `TensorError::TypeMismatch` for values of another component type
/// * `TensorError::NotSupported` for level kinds without a packer
/// * `TensorError::DuplicateCoordinate` under [`DuplicatePolicy::Reject`]
///
/// # Example
///
/// ```
/// use sptensors::config::DuplicatePolicy;
/// use sptensors::coordinate::Entry;
/// use sptensors::operations::pack;
/// use sptensors::{ComponentType, Format, Value};
///
/// let entries = [
///     Entry::new(&[0, 0], Value::Double(1.0)),
///     Entry::new(&[1, 1], Value::Double(3.0)),
///     Entry::new(&[0, 1], Value::Double(2.0)),
/// ];
/// let packed = pack(
///     &Format::csr(),
///     &[2, 2],
///     ComponentType::Double,
///     &entries,
///     DuplicatePolicy::LastWins,
/// )
/// .unwrap();
///
/// let level = packed.sparse_index(1).unwrap();
/// assert_eq!(level.segments(), &[0, 2, 3]);
/// assert_eq!(level.crd(), &[0, 1, 1]);
/// assert_eq!(packed.values().as_slice::<f64>().unwrap(), &[1.0, 2.0, 3.0]);
/// ```
#[instrument(skip_all, fields(format = %format, staged = entries.len()))]
pub fn pack(
    format: &Format,
    dimensions: &[usize],
    component_type: ComponentType,
    entries: &[Entry],
    duplicates: DuplicatePolicy,
) -> Result<PackedTensor> {
    if format.order() != dimensions.len() {
        return Err(TensorError::invalid_format(format!(
            "format of order {} does not match {} dimensions",
            format.order(),
            dimensions.len()
        )));
    }
    let levels = format
        .levels()
        .iter()
        .map(|level| match level.kind() {
            LevelKind::Dense => Ok(LevelBuilder::Dense {
                size: dimensions[level.dimension()],
            }),
            LevelKind::Sparse => Ok(LevelBuilder::Sparse {
                segments: vec![0],
                crd: Vec::new(),
            }),
            LevelKind::Fixed => Err(TensorError::NotSupported {
                what: format!("packing {} levels", LevelKind::Fixed),
            }),
        })
        .collect::<Result<Vec<_>>>()?;
    for entry in entries {
        check_entry(entry, dimensions, component_type)?;
    }

    let order = format.dimension_order();
    let mut sorted: Vec<usize> = (0..entries.len()).collect();
    // Stable: repeated coordinates stay in insertion order.
    sorted.sort_by(|&a, &b| entries[a].cmp_in_order(&entries[b], &order));

    let mut packer = Packer {
        format,
        entries,
        sorted,
        duplicates,
        zero: Value::zero(component_type),
        levels,
        values: Vec::with_capacity(entries.len()),
    };
    packer.pack_level(0, 0, entries.len())?;

    let values = Array::from_values(component_type, &packer.values)?;
    let indices = packer
        .levels
        .into_iter()
        .map(|level| match level {
            LevelBuilder::Dense { size } => LevelIndex::Dense { size },
            LevelBuilder::Sparse { segments, crd } => {
                LevelIndex::Sparse(SparseIndex::new(segments, crd))
            }
        })
        .collect();
    let packed = PackedTensor::new(indices, values);

    debug!(values = packed.value_count(), "packed tensor");
    Ok(packed)
}

fn check_entry(entry: &Entry, dimensions: &[usize], component_type: ComponentType) -> Result<()> {
    if entry.coord.len() != dimensions.len() {
        return Err(TensorError::WrongNumberOfIndices {
            expected: dimensions.len(),
            actual: entry.coord.len(),
        });
    }
    for (dim, (&index, &dim_size)) in entry.coord.iter().zip(dimensions).enumerate() {
        if index >= dim_size {
            return Err(TensorError::IndexOutOfBounds {
                index,
                dim,
                dim_size,
            });
        }
    }
    if entry.value.component_type() != component_type {
        return Err(TensorError::TypeMismatch {
            expected: component_type,
            actual: entry.value.component_type(),
        });
    }
    Ok(())
}

impl Packer<'_> {
    fn entry(&self, i: usize) -> &Entry {
        &self.entries[self.sorted[i]]
    }

    /// End of the run starting at `begin` whose coordinate in `dim` is `coord`.
    fn run_end(&self, begin: usize, end: usize, dim: usize, coord: usize) -> usize {
        let mut j = begin;
        while j < end && self.entry(j).coord[dim] == coord {
            j += 1;
        }
        j
    }

    fn pack_level(&mut self, lvl: usize, begin: usize, end: usize) -> Result<()> {
        if lvl == self.format.order() {
            let value = self.resolve(begin, end)?;
            self.values.push(value);
            return Ok(());
        }

        let dim = self.format.levels()[lvl].dimension();
        let dense_size = match &self.levels[lvl] {
            LevelBuilder::Dense { size } => Some(*size),
            LevelBuilder::Sparse { .. } => None,
        };
        match dense_size {
            Some(size) => {
                let mut j = begin;
                for i in 0..size {
                    let run_end = self.run_end(j, end, dim, i);
                    self.pack_level(lvl + 1, j, run_end)?;
                    j = run_end;
                }
            }
            None => {
                let mut j = begin;
                while j < end {
                    let coord = self.entry(j).coord[dim];
                    let run_end = self.run_end(j, end, dim, coord);
                    self.push_crd(lvl, coord)?;
                    self.pack_level(lvl + 1, j, run_end)?;
                    j = run_end;
                }
                if let LevelBuilder::Sparse { segments, crd } = &mut self.levels[lvl] {
                    segments.push(to_index(crd.len())?);
                }
            }
        }
        Ok(())
    }

    fn push_crd(&mut self, lvl: usize, coord: usize) -> Result<()> {
        let coord = to_index(coord)?;
        if let LevelBuilder::Sparse { crd, .. } = &mut self.levels[lvl] {
            crd.push(coord);
        }
        Ok(())
    }

    /// The value stored for the entries in `begin..end`, which share one coordinate.
    fn resolve(&self, begin: usize, end: usize) -> Result<Value> {
        if begin == end {
            return Ok(self.zero);
        }
        if end - begin > 1 {
            match self.duplicates {
                DuplicatePolicy::LastWins => {}
                DuplicatePolicy::Sum => {
                    return (begin + 1..end).try_fold(self.entry(begin).value, |acc, i| {
                        acc.checked_add(self.entry(i).value)
                    });
                }
                DuplicatePolicy::Reject => {
                    return Err(TensorError::DuplicateCoordinate {
                        coordinate: self.entry(begin).coord.to_vec(),
                    });
                }
            }
        }
        Ok(self.entry(end - 1).value)
    }
}

fn to_index(value: usize) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| TensorError::invalid_storage(format!("index {value} exceeds i32 range")))
}
