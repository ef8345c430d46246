//! Staged coordinate/value entries.

use std::cmp::Ordering;
use std::fmt;

use smallvec::SmallVec;

use crate::scalar::Value;

/// Coordinate of one element, one index per logical dimension.
pub type Coordinate = SmallVec<[usize; 4]>;

/// A coordinate/value pair inserted before packing.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub coord: Coordinate,
    pub value: Value,
}

impl Entry {
    pub fn new(coord: &[usize], value: Value) -> Self {
        Self {
            coord: Coordinate::from_slice(coord),
            value,
        }
    }

    /// Lexicographic comparison of coordinates visiting dimensions in `order`.
    pub fn cmp_in_order(&self, other: &Entry, order: &[usize]) -> Ordering {
        order
            .iter()
            .map(|&dim| self.coord[dim].cmp(&other.coord[dim]))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, c) in self.coord.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{c}")?;
        }
        write!(f, "): {}", self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmp_in_storage_order() {
        let a = Entry::new(&[0, 1], Value::Int(1));
        let b = Entry::new(&[1, 0], Value::Int(2));
        assert_eq!(a.cmp_in_order(&b, &[0, 1]), Ordering::Less);
        assert_eq!(a.cmp_in_order(&b, &[1, 0]), Ordering::Greater);
        assert_eq!(a.cmp_in_order(&a, &[1, 0]), Ordering::Equal);
    }

    #[test]
    fn test_display() {
        let e = Entry::new(&[0, 2], Value::Double(1.5));
        assert_eq!(e.to_string(), "(0,2): 1.5");
    }
}
