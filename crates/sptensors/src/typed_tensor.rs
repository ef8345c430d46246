//! Statically typed front-end over [`TensorBase`].

use std::marker::PhantomData;
use std::ops::Deref;

use crate::config::TensorConfig;
use crate::coordinate::Entry;
use crate::error::{Result, TensorError};
use crate::format::Format;
use crate::iterator::NonzeroIter;
use crate::scalar::Component;
use crate::tensor::TensorBase;

/// A tensor whose component type is fixed by `T`.
///
/// Read access to the underlying [`TensorBase`] goes through `Deref`.
///
/// # Example
///
/// ```
/// use sptensors::{Format, Tensor};
///
/// let mut b: Tensor<i32> = Tensor::new("B", &[3], Format::sparse(1)).unwrap();
/// b.insert_all([([2], 7), ([0], 5)]).unwrap();
/// b.pack().unwrap();
///
/// let entries: Vec<_> = b.iter().unwrap().collect();
/// assert_eq!(entries, vec![(vec![0], 5), (vec![2], 7)]);
/// ```
#[derive(Debug)]
pub struct Tensor<T: Component> {
    base: TensorBase,
    _phantom: PhantomData<T>,
}

impl<T: Component> Tensor<T> {
    pub fn new(name: impl Into<String>, dimensions: &[usize], format: Format) -> Result<Self> {
        Ok(Self {
            base: TensorBase::new(name, dimensions, format, T::TYPE)?,
            _phantom: PhantomData,
        })
    }

    /// Wrap a dynamically typed tensor.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::TypeMismatch` if its component type is not `T`.
    pub fn from_base(base: TensorBase) -> Result<Self> {
        if base.component_type() != T::TYPE {
            return Err(TensorError::TypeMismatch {
                expected: T::TYPE,
                actual: base.component_type(),
            });
        }
        Ok(Self {
            base,
            _phantom: PhantomData,
        })
    }

    pub fn with_config(self, config: TensorConfig) -> Self {
        Self {
            base: self.base.with_config(config),
            _phantom: PhantomData,
        }
    }

    pub fn insert(&mut self, coord: &[usize], value: T) -> Result<()> {
        self.base.insert(coord, value.into_value())
    }

    /// Stage a batch of coordinate/value pairs; either all are staged or none.
    pub fn insert_all<C, I>(&mut self, entries: I) -> Result<usize>
    where
        C: AsRef<[usize]>,
        I: IntoIterator<Item = (C, T)>,
    {
        self.base.insert_entries(
            entries
                .into_iter()
                .map(|(coord, value)| Entry::new(coord.as_ref(), value.into_value())),
        )
    }

    pub fn pack(&mut self) -> Result<()> {
        self.base.pack()
    }

    pub fn restage(&mut self) -> Result<()> {
        self.base.restage()
    }

    /// Iterate stored entries as `(coordinate, T)` pairs.
    pub fn iter(&self) -> Result<TypedIter<T>> {
        if let Some(actual) = self.base.packed().values().component_type() {
            if actual != T::TYPE {
                return Err(TensorError::TypeMismatch {
                    expected: T::TYPE,
                    actual,
                });
            }
        }
        Ok(TypedIter {
            inner: self.base.iter()?,
            _phantom: PhantomData,
        })
    }

    /// Mutable access for pipeline stages beyond packing.
    pub fn base_mut(&mut self) -> &mut TensorBase {
        &mut self.base
    }

    pub fn into_base(self) -> TensorBase {
        self.base
    }
}

impl<T: Component> Deref for Tensor<T> {
    type Target = TensorBase;

    fn deref(&self) -> &TensorBase {
        &self.base
    }
}

/// Iterator over the entries of a [`Tensor`].
#[derive(Debug, Clone)]
pub struct TypedIter<T: Component> {
    inner: NonzeroIter,
    _phantom: PhantomData<T>,
}

impl<T: Component> Iterator for TypedIter<T> {
    type Item = (Vec<usize>, T);

    fn next(&mut self) -> Option<Self::Item> {
        // Value types were checked against `T` when the iterator was created.
        self.inner
            .by_ref()
            .find_map(|(coord, value)| T::from_value(value).map(|v| (coord, v)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T: Component> ExactSizeIterator for TypedIter<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scalar::ComponentType;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_base_checks_type() {
        let base = TensorBase::new("A", &[2], Format::dense(1), ComponentType::Float).unwrap();
        assert!(Tensor::<f64>::from_base(base).is_err());

        let base = TensorBase::new("A", &[2], Format::dense(1), ComponentType::Float).unwrap();
        assert!(Tensor::<f32>::from_base(base).is_ok());
    }

    #[test]
    fn test_dense_float_values() {
        let mut t: Tensor<f32> = Tensor::new("T", &[2, 2], Format::dense(2)).unwrap();
        t.insert(&[1, 0], 0.5).unwrap();
        t.pack().unwrap();
        let values: Vec<f32> = t.iter().unwrap().map(|(_, v)| v).collect();
        assert_eq!(values.len(), 4);
        assert_relative_eq!(values[2], 0.5);
        assert_relative_eq!(values[0], 0.0);
    }

    #[test]
    fn test_bool_tensor() {
        let mut t: Tensor<bool> = Tensor::new("M", &[4], Format::sparse(1)).unwrap();
        t.insert_all([([3], true), ([1], true)]).unwrap();
        t.pack().unwrap();
        let coords: Vec<_> = t.iter().unwrap().map(|(c, _)| c[0]).collect();
        assert_eq!(coords, vec![1, 3]);
    }
}
