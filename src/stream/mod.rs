//! Byte stream access for instruction decoding.
//!
//! - [`parser`] - The [`Parser`] cursor with bounds queries and checked reads
//! - [`io`] - The [`io::ByteIO`] trait and the low-level [`io::read_le_at`] helper
//!
//! The stream layer knows nothing about x86; it only guarantees that every read is
//! bounds-checked and that a failed read leaves the caller's position untouched.

pub mod io;
pub mod parser;

pub use parser::Parser;
