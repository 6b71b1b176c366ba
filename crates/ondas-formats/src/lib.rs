//! Container format plug-ins and soundfile descriptors.
//!
//! This crate provides:
//!
//! - **[`SoundFile`]**: the per-file descriptor carrying the open handle,
//!   the resolved format, sample geometry, and the remaining byte limit
//! - **[`SoundFormat`]**: the plug-in contract every container format
//!   implements (header sniff/read/write/update, sample I/O, metadata,
//!   extension and endianness policy)
//! - **[`FormatRegistry`]**: the process-wide ordered registry of built-in
//!   formats; registration order is sniff priority and default preference
//! - **Built-ins**: WAVE, AIFF, CAF, NeXT/Sun, plus the headerless raw
//!   passthrough outside the registry
//! - **[`open_soundfile`]** / **[`create_soundfile`]**: the shared open
//!   and create routines used by both the batch and streaming engines
//!
//! Compressed payloads and sample-rate conversion are out of scope; the
//! plug-ins read and write uncompressed 16/24-bit PCM and 32-bit float.

mod aiff;
mod caf;
mod format;
mod next;
mod raw;
mod soundfile;
mod wave;

pub use format::{FormatRegistry, FrameCount, SoundFormat, MAX_FORMATS};
pub use raw::raw_format;
pub use soundfile::{
    create_soundfile, open_soundfile, HeaderStyle, OpenSpec, RawSpec, SoundFile,
};

pub use ondas_core::{Endian, Error, Result, SampleWidth};
