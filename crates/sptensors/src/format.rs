//! Level formats.
//!
//! A [`Format`] lists, in storage order, how each dimension of a tensor is
//! stored. Level `i` binds to logical dimension `levels[i].dimension`, so the
//! storage order may differ from the logical order (e.g. CSC).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TensorError};

/// Storage scheme of one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelKind {
    /// Every coordinate in `[0, size)` is stored implicitly.
    Dense,
    /// Only present coordinates are stored, compressed by parent.
    Sparse,
    /// Fixed number of coordinates per parent. Declared, not yet packable.
    Fixed,
}

impl LevelKind {
    fn letter(self) -> char {
        match self {
            LevelKind::Dense => 'd',
            LevelKind::Sparse => 's',
            LevelKind::Fixed => 'f',
        }
    }
}

impl fmt::Display for LevelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelKind::Dense => f.write_str("dense"),
            LevelKind::Sparse => f.write_str("sparse"),
            LevelKind::Fixed => f.write_str("fixed"),
        }
    }
}

/// One level of a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Level {
    kind: LevelKind,
    dimension: usize,
}

impl Level {
    pub fn new(kind: LevelKind, dimension: usize) -> Self {
        Self { kind, dimension }
    }

    pub fn dense(dimension: usize) -> Self {
        Self::new(LevelKind::Dense, dimension)
    }

    pub fn sparse(dimension: usize) -> Self {
        Self::new(LevelKind::Sparse, dimension)
    }

    #[inline]
    pub fn kind(&self) -> LevelKind {
        self.kind
    }

    /// Logical dimension this level stores.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.dimension)
    }
}

/// Ordered per-dimension storage description of a tensor.
///
/// # Example
///
/// ```
/// use sptensors::{Format, Level, LevelKind};
///
/// let csr: Format = "ds".parse().unwrap();
/// assert_eq!(csr, Format::csr());
/// assert_eq!(csr.level(1).unwrap().kind(), LevelKind::Sparse);
///
/// let csc = Format::new(vec![Level::dense(1), Level::sparse(0)]).unwrap();
/// assert_eq!(csc.dimension_order(), vec![1, 0]);
///
/// assert!(Format::new(vec![Level::dense(0), Level::sparse(0)]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Level>", into = "Vec<Level>")]
pub struct Format {
    levels: Vec<Level>,
}

impl Format {
    /// Create a format from levels in storage order.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::InvalidFormat` unless the level dimensions are a
    /// permutation of `0..levels.len()`.
    pub fn new(levels: Vec<Level>) -> Result<Self> {
        let order = levels.len();
        let mut seen = vec![false; order];
        for level in &levels {
            let dim = level.dimension;
            if dim >= order {
                return Err(TensorError::invalid_format(format!(
                    "level dimension {dim} out of range for order {order}"
                )));
            }
            if std::mem::replace(&mut seen[dim], true) {
                return Err(TensorError::invalid_format(format!(
                    "dimension {dim} is stored by more than one level"
                )));
            }
        }
        Ok(Self { levels })
    }

    /// Levels of the given kinds in identity dimension order.
    pub fn from_kinds(kinds: &[LevelKind]) -> Self {
        Self {
            levels: kinds
                .iter()
                .enumerate()
                .map(|(dim, &kind)| Level::new(kind, dim))
                .collect(),
        }
    }

    pub fn dense(order: usize) -> Self {
        Self::from_kinds(&vec![LevelKind::Dense; order])
    }

    pub fn sparse(order: usize) -> Self {
        Self::from_kinds(&vec![LevelKind::Sparse; order])
    }

    /// Dense rows, compressed columns.
    pub fn csr() -> Self {
        Self::from_kinds(&[LevelKind::Dense, LevelKind::Sparse])
    }

    /// Dense columns, compressed rows.
    pub fn csc() -> Self {
        Self {
            levels: vec![Level::dense(1), Level::sparse(0)],
        }
    }

    #[inline]
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    #[inline]
    pub fn level(&self, lvl: usize) -> Option<&Level> {
        self.levels.get(lvl)
    }

    #[inline]
    pub fn order(&self) -> usize {
        self.levels.len()
    }

    /// Logical dimension stored at each level.
    pub fn dimension_order(&self) -> Vec<usize> {
        self.levels.iter().map(Level::dimension).collect()
    }

    pub fn is_all_dense(&self) -> bool {
        self.levels.iter().all(|l| l.kind == LevelKind::Dense)
    }
}

impl FromStr for Format {
    type Err = TensorError;

    /// Parse one letter per level (`d`ense, `s`parse, `f`ixed).
    fn from_str(s: &str) -> Result<Self> {
        let kinds = s
            .chars()
            .map(|c| match c.to_ascii_lowercase() {
                'd' => Ok(LevelKind::Dense),
                's' => Ok(LevelKind::Sparse),
                'f' => Ok(LevelKind::Fixed),
                other => Err(TensorError::invalid_format(format!(
                    "unknown level kind '{other}' in \"{s}\""
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_kinds(&kinds))
    }
}

impl TryFrom<Vec<Level>> for Format {
    type Error = TensorError;

    fn try_from(levels: Vec<Level>) -> Result<Self> {
        Self::new(levels)
    }
}

impl From<Format> for Vec<Level> {
    fn from(format: Format) -> Self {
        format.levels
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let identity = self.levels.iter().enumerate().all(|(i, l)| l.dimension == i);
        if identity {
            let letters: String = self.levels.iter().map(|l| l.kind.letter()).collect();
            return f.write_str(&letters);
        }
        f.write_str("(")?;
        for (i, level) in self.levels.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{level}")?;
        }
        f.write_str(")")
    }
}
