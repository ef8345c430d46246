//! FROSTT `.tns` text format.
//!
//! One entry per line: the 1-based coordinate of each mode followed by the
//! value, separated by whitespace.
//!
//! ```text
//! # comment
//! 1 1 1.0
//! 1 2 2.0
//! 2 2 3.0
//! ```
//!
//! The order is taken from the first entry and each dimension is the largest
//! coordinate seen in that mode.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;

use crate::coordinate::Entry;
use crate::error::{Result, TensorError};
use crate::format::Format;
use crate::scalar::Value;
use crate::tensor::TensorBase;
use crate::typed_tensor::Tensor;

/// Read a `.tns` stream into a staged double tensor with all-sparse levels.
///
/// Explicit zeros are skipped but still extend the dimensions. The tensor is
/// not packed.
///
/// # Errors
///
/// Returns `TensorError::Parse` for malformed lines (naming the 1-based line
/// number), a zero coordinate, or input without any entry.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use sptensors::io::tns;
///
/// let data = "1 1 1.0\n1 2 2.0\n2 2 3.0\n";
/// let mut t = tns::read(Cursor::new(data), "A").unwrap();
/// assert_eq!(t.dimensions(), &[2, 2]);
/// t.pack().unwrap();
/// assert_eq!(t.stored_count(), 3);
/// ```
pub fn read(reader: impl Read, name: &str) -> Result<Tensor<f64>> {
    let reader = BufReader::new(reader);
    let mut order = None;
    let mut dimensions: Vec<usize> = Vec::new();
    let mut entries = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = i + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        let order = *order.get_or_insert(tokens.len() - 1);
        if order == 0 || tokens.len() != order + 1 {
            return Err(TensorError::Parse {
                line: line_no,
                message: format!(
                    "expected {} coordinates and a value, found {} tokens",
                    order.max(1),
                    tokens.len()
                ),
            });
        }
        if dimensions.is_empty() {
            dimensions = vec![0; order];
        }

        let mut coord = Vec::with_capacity(order);
        for (mode, token) in tokens[..order].iter().enumerate() {
            let index: usize = token.parse().map_err(|_| TensorError::Parse {
                line: line_no,
                message: format!("invalid coordinate \"{token}\""),
            })?;
            if index == 0 {
                return Err(TensorError::Parse {
                    line: line_no,
                    message: format!("coordinate of mode {mode} is 0; coordinates are 1-based"),
                });
            }
            dimensions[mode] = dimensions[mode].max(index);
            coord.push(index - 1);
        }

        let token = tokens[order];
        let value: f64 = token.parse().map_err(|_| TensorError::Parse {
            line: line_no,
            message: format!("invalid value \"{token}\""),
        })?;
        if value != 0.0 {
            entries.push(Entry::new(&coord, Value::Double(value)));
        }
    }

    let order = order.ok_or_else(|| TensorError::Parse {
        line: 1,
        message: "no entries".to_string(),
    })?;
    let mut tensor = Tensor::new(name, &dimensions, Format::sparse(order))?;
    tensor.base_mut().reserve(entries.len());
    let count = tensor.base_mut().insert_entries(entries)?;
    debug!(tensor = name, order, count, "read tns");
    Ok(tensor)
}

/// Write every stored entry of a packed tensor, one per line.
///
/// Floating-point values that are integral are written with a trailing `.0`.
///
/// # Errors
///
/// Returns `TensorError::InvalidState` if the tensor has not been packed.
pub fn write(mut writer: impl Write, tensor: &TensorBase) -> Result<()> {
    let mut count = 0;
    for (coord, value) in tensor.iter()? {
        for c in &coord {
            write!(writer, "{} ", c + 1)?;
        }
        writeln!(writer, "{}", format_value(value))?;
        count += 1;
    }
    writer.flush()?;
    debug!(tensor = %tensor.name(), count, "wrote tns");
    Ok(())
}

fn format_value(value: Value) -> String {
    match value {
        Value::Double(v) if v.fract() == 0.0 => format!("{v}.0"),
        Value::Float(v) if v.fract() == 0.0 => format!("{v}.0"),
        Value::Bool(v) => u8::from(v).to_string(),
        other => other.to_string(),
    }
}

/// Read a `.tns` file; the tensor is named after the file stem.
pub fn read_file(path: impl AsRef<Path>) -> Result<Tensor<f64>> {
    let path = path.as_ref();
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    read(File::open(path)?, &name)
}

pub fn write_file(path: impl AsRef<Path>, tensor: &TensorBase) -> Result<()> {
    write(BufWriter::new(File::create(path)?), tensor)
}
