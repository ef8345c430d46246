//! Linear/cartesian index conversion.
//!
//! Uses column-major (Fortran) order: the first dimension varies fastest.

/// Convert a linear index to cartesian coordinates using column-major order.
///
/// # Examples
///
/// ```
/// use sptensors::strides::linear_to_cartesian;
///
/// assert_eq!(linear_to_cartesian(0, &[3, 4]), vec![0, 0]);
/// assert_eq!(linear_to_cartesian(4, &[3, 4]), vec![1, 1]);
/// ```
pub fn linear_to_cartesian(mut linear: usize, shape: &[usize]) -> Vec<usize> {
    let mut indices = Vec::with_capacity(shape.len());

    for &dim in shape.iter() {
        indices.push(linear % dim);
        linear /= dim;
    }

    indices
}
