//! Codec layer: byte cursor and legacy text decoding.
//!
//! # Submodules
//!
//! - [`bytes`][]: Bounds-checked little-endian reads
//! - [`lmbcs`][]: LMBCS to Unicode text conversion

pub mod bytes;
pub mod lmbcs;
