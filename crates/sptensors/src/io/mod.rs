//! Text file formats.

pub mod tns;
