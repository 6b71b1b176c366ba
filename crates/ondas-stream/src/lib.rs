//! Realtime soundfile streaming.
//!
//! A bounded byte FIFO bridges a hard-deadline audio callback and a
//! dedicated I/O worker so that blocking disk access never runs on the
//! audio thread:
//!
//! - **[`PlaybackStream`]**: the worker reads the file into the FIFO and
//!   the per-tick [`PlaybackStream::perform`] decodes frames into signal
//!   vectors (disk to audio)
//! - **[`CaptureStream`]**: the per-tick [`CaptureStream::perform`]
//!   encodes signal vectors into the FIFO and the worker writes them out
//!   (audio to disk)
//!
//! Both directions share one control protocol: a request word served by
//! the worker, an audio-side state word, and two condition variables
//! around a single mutex. All disk I/O happens with the mutex released;
//! the audio thread only blocks when the FIFO is starved (playback) or
//! saturated (capture), which is reported but not fatal.

mod capture;
mod playback;
mod shared;
mod worker;

pub use capture::{CaptureOptions, CaptureStream};
pub use playback::PlaybackStream;
pub use shared::{FrameLayout, Request, StreamState, StreamStatus};

pub use ondas_core::{Endian, Error, Result, SampleWidth};
pub use ondas_formats::{HeaderStyle, OpenSpec, RawSpec};

/// Bytes the worker asks of the OS per read.
pub const READ_SIZE: usize = 65536;

/// Bytes the worker hands to the OS per write.
pub const WRITE_SIZE: usize = 65536;

/// Default FIFO bytes per channel.
pub const DEF_BUF_PER_CHAN: usize = 262144;

/// Smallest FIFO a stream will accept.
pub const MIN_BUF_SIZE: usize = 4 * READ_SIZE;

/// Largest FIFO a stream will accept.
pub const MAX_BUF_SIZE: usize = 16_777_216;

/// Pessimistic upper bound on the host's DSP tick size, used when
/// aligning the FIFO to whole blocks.
pub const MAX_VEC_SIZE: usize = 128;

/// Default FIFO size for a channel count.
pub fn default_buffer_size(channels: usize) -> usize {
    (DEF_BUF_PER_CHAN * channels.max(1)).clamp(MIN_BUF_SIZE, MAX_BUF_SIZE)
}
