//! Synchronous soundfile transfer engine.
//!
//! This crate moves whole blocks of sample frames between soundfiles and
//! caller-owned float arrays ("tables"):
//!
//! - **[`read_soundfile`]**: open, detect or assert a format, and copy
//!   frames into a set of tables, with onset skip, truncation, resizing,
//!   and metadata passthrough
//! - **[`write_soundfile`]**: peak-scan, optionally normalize, and stream
//!   tables out through a format plug-in, finalizing the header on close
//! - **[`parse_read_args`] / [`parse_write_args`]**: the order-sensitive
//!   flag surface shared by every front end
//! - **[`Table`] / [`TableSet`]**: the host-array stand-ins, and
//!   [`PathResolver`] for search-path file lookup
//!
//! The streaming (ring-buffer) engine lives in `ondas-stream`; this crate
//! is entirely synchronous and performs no locking.

mod args;
mod ascii;
mod read;
mod resolve;
mod table;
mod write;

pub use args::{parse_read_args, parse_write_args, ReadRequest, WriteRequest, MAX_META_GROUPS};
pub use read::{read_soundfile, ReadOutcome, SoundFileInfo};
pub use resolve::PathResolver;
pub use table::{Table, TableSet};
pub use write::{write_soundfile, WriteOutcome};

pub use ondas_core::{Endian, Error, Result, SampleWidth};

/// Transfer chunk size in bytes; every chunk is a whole number of frames.
pub(crate) const SAMPLE_BUF_SIZE: usize = 1024;
