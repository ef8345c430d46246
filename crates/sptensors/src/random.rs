//! Random sparse tensor construction.
//!
//! This module provides functions for filling tensors with random entries at
//! random coordinates.

use rand::Rng;
use rand::seq::index;
use rand_distr::StandardNormal;
use tracing::debug;

use crate::error::{Result, TensorError};
use crate::format::Format;
use crate::scalar::Component;
use crate::strides::linear_to_cartesian;
use crate::typed_tensor::Tensor;

/// Trait for component types that can be sampled as nonzero random values.
pub trait RandomComponent: Component {
    /// Sample a random value that is not the type's zero.
    fn sample_nonzero<R: Rng>(rng: &mut R) -> Self;
}

impl RandomComponent for f64 {
    fn sample_nonzero<R: Rng>(rng: &mut R) -> Self {
        rng.sample(StandardNormal)
    }
}

impl RandomComponent for f32 {
    fn sample_nonzero<R: Rng>(rng: &mut R) -> Self {
        rng.sample(StandardNormal)
    }
}

impl RandomComponent for i32 {
    fn sample_nonzero<R: Rng>(rng: &mut R) -> Self {
        let v = rng.random_range(1..=100);
        if rng.random_bool(0.5) { v } else { -v }
    }
}

impl RandomComponent for bool {
    fn sample_nonzero<R: Rng>(_rng: &mut R) -> Self {
        true
    }
}

/// Create a staged tensor with `density * len` entries at distinct random
/// coordinates.
///
/// Floating-point values are standard normal. The tensor is returned
/// unpacked so the caller can adjust it before packing.
///
/// # Errors
///
/// Returns `TensorError::InvalidFormat` if the number of positions overflows
/// `usize`, besides the errors of [`Tensor::new`].
///
/// # Panics
///
/// Panics if `density` is not in `[0, 1]`.
///
/// # Example
///
/// ```
/// use rand::SeedableRng;
/// use rand::rngs::StdRng;
/// use sptensors::{Format, Tensor};
/// use sptensors::random::random_sparse;
///
/// let mut rng = StdRng::seed_from_u64(42);
/// let mut t: Tensor<f64> = random_sparse("R", &[10, 10], Format::csr(), 0.2, &mut rng).unwrap();
/// assert_eq!(t.staged().len(), 20);
/// t.pack().unwrap();
/// assert_eq!(t.stored_count(), 20);
/// ```
pub fn random_sparse<T: RandomComponent, R: Rng>(
    name: impl Into<String>,
    dimensions: &[usize],
    format: Format,
    density: f64,
    rng: &mut R,
) -> Result<Tensor<T>> {
    assert!(
        (0.0..=1.0).contains(&density),
        "density {density} is not in [0, 1]"
    );
    let mut tensor = Tensor::new(name, dimensions, format)?;
    let len = dimensions
        .iter()
        .try_fold(1usize, |len, &d| len.checked_mul(d))
        .ok_or_else(|| {
            TensorError::invalid_format(format!(
                "tensor of dimensions {dimensions:?} is too large to sample"
            ))
        })?;
    let count = ((len as f64) * density).round() as usize;

    let positions = index::sample(rng, len, count.min(len));
    let values: Vec<T> = (0..positions.len()).map(|_| T::sample_nonzero(rng)).collect();
    tensor.insert_all(
        positions
            .iter()
            .map(|linear| linear_to_cartesian(linear, dimensions))
            .zip(values),
    )?;
    debug!(tensor = %tensor.name(), count, "random entries");
    Ok(tensor)
}
