//! Core types and sample codecs for the ondas soundfile toolkit.
//!
//! This crate provides:
//!
//! - **Sample codecs**: bit-exact conversion between interleaved 16/24-bit
//!   PCM or 32-bit IEEE float frames and `f32` channel buffers, in either
//!   byte order ([`codec`])
//! - **Geometry types**: [`Endian`], [`SampleWidth`], and the channel and
//!   byte-limit bounds every descriptor obeys
//! - **Errors**: the domain error enum [`Error`] shared by the whole
//!   workspace
//!
//! Everything here is plain data and arithmetic; file handles, container
//! headers, and threads live in the higher-level crates.

pub mod codec;
mod error;

pub use error::{Error, Result};

use std::fmt;

/// Most channels any soundfile descriptor will carry.
pub const MAX_CHANNELS: usize = 64;

/// Byte-limit value meaning "no declared payload bound".
pub const MAX_BYTE_LIMIT: u64 = i64::MAX as u64;

/// Byte order of samples on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    /// Most significant byte first.
    Big,
    /// Least significant byte first.
    Little,
}

impl Endian {
    /// The byte order of the machine we are running on.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endian::Big
        } else {
            Endian::Little
        }
    }

    /// One-letter code used in info tuples (`b` or `l`).
    pub const fn code(self) -> char {
        match self {
            Endian::Big => 'b',
            Endian::Little => 'l',
        }
    }

    /// Parse a one-letter endianness request: `b`, `l`, or `n` (native).
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "b" => Some(Endian::Big),
            "l" => Some(Endian::Little),
            "n" => Some(Endian::native()),
            _ => None,
        }
    }
}

impl fmt::Display for Endian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Width of one stored sample.
///
/// Two and three byte samples are signed linear PCM; four bytes always
/// means IEEE 754 binary32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleWidth {
    /// 16-bit signed integer.
    I16,
    /// 24-bit signed integer.
    I24,
    /// 32-bit IEEE float.
    F32,
}

impl SampleWidth {
    /// Bytes occupied by one sample.
    pub const fn bytes(self) -> usize {
        match self {
            SampleWidth::I16 => 2,
            SampleWidth::I24 => 3,
            SampleWidth::F32 => 4,
        }
    }

    /// Validate a byte count from the command surface.
    pub fn from_bytes(n: usize) -> Result<Self> {
        match n {
            2 => Ok(SampleWidth::I16),
            3 => Ok(SampleWidth::I24),
            4 => Ok(SampleWidth::F32),
            _ => Err(Error::Usage(format!(
                "bytes per sample must be 2, 3 or 4 (got {n})"
            ))),
        }
    }

    /// Bit depth, for header fields.
    pub const fn bits(self) -> usize {
        self.bytes() * 8
    }
}

/// Validate a channel count from a header or the command surface.
pub fn check_channels(n: usize) -> Result<usize> {
    if (1..=MAX_CHANNELS).contains(&n) {
        Ok(n)
    } else {
        Err(Error::Usage(format!(
            "channel count must be between 1 and {MAX_CHANNELS} (got {n})"
        )))
    }
}
