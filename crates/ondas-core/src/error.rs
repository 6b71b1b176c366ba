//! Error types shared across the ondas workspace.

use thiserror::Error;

/// Errors surfaced by soundfile operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The path resolver could not locate the file.
    #[error("can't find file '{0}'")]
    PathNotFound(String),

    /// The file did not begin with any recognizable container header.
    #[error("bad header format")]
    BadHeader,

    /// Recognized container, but the sample encoding is not one we read.
    #[error("unsupported sample format: {0}")]
    UnsupportedSampleFormat(String),

    /// OS-level read, write, or seek failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The format has no metadata chunks.
    #[error("format '{0}' does not support metadata")]
    MetadataUnsupported(&'static str),

    /// A named array does not exist in the table set.
    #[error("no such array '{0}'")]
    ArrayNotFound(String),

    /// An array could not be grown or shrunk to the requested length.
    #[error("could not resize array '{0}'")]
    ResizeFailed(String),

    /// No registered format goes by this name.
    #[error("unknown soundfile format '{0}'")]
    UnknownFormat(String),

    /// Malformed flags or arguments on the command surface.
    #[error("usage: {0}")]
    Usage(String),
}

/// Convenience result type for soundfile operations.
pub type Result<T> = std::result::Result<T, Error>;
