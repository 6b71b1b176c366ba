//! State shared between the audio thread and the I/O worker.

use std::path::PathBuf;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use ondas_core::{Endian, Error, SampleWidth};
use ondas_formats::{OpenSpec, SoundFormat};

use crate::MAX_VEC_SIZE;

/// The control word served by the I/O worker.
///
/// The worker flips an `Open` to `Busy` while serving it and back to
/// `Nothing` on completion; `Close` and `Quit` are likewise acknowledged
/// by reverting to `Nothing`. Any external transition away from `Busy`
/// aborts the job in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// No work pending.
    Nothing,
    /// Open the pending file and stream it.
    Open,
    /// Finish and close the current file.
    Close,
    /// Close and terminate the worker.
    Quit,
    /// The worker is streaming an open file.
    Busy,
}

/// The audio-side lifecycle word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Not streaming; perform emits silence (playback) or drops input
    /// (capture).
    Idle,
    /// A file is opening; waiting for `start`.
    Startup,
    /// Frames are flowing through the FIFO.
    Stream,
}

/// Copyable frame geometry snapshot installed by the worker on a
/// successful open. The perform path re-reads it after every
/// condition-variable wake, since an intervening open may have replaced
/// it.
#[derive(Debug, Clone, Copy)]
pub struct FrameLayout {
    /// Interleaved channel count.
    pub channels: usize,
    /// Stored sample width.
    pub width: SampleWidth,
    /// Stored byte order.
    pub endian: Endian,
    /// Declared sample rate (informational).
    pub sample_rate: usize,
}

impl FrameLayout {
    /// Bytes in one interleaved frame.
    pub fn bytes_per_frame(&self) -> usize {
        self.channels * self.width.bytes()
    }
}

/// A pending open job, handed from the command surface to the worker.
pub(crate) enum OpenJob {
    /// Playback: open an existing file for reading.
    Read {
        path: PathBuf,
        spec: OpenSpec,
    },
    /// Capture: create a file and write a maximum-length header.
    Write {
        path: PathBuf,
        format: &'static dyn SoundFormat,
        width: SampleWidth,
        endian: Endian,
        sample_rate: usize,
    },
}

/// Diagnostic snapshot for the `print` surface.
#[derive(Debug, Clone)]
pub struct StreamStatus {
    /// Audio-side state word.
    pub state: StreamState,
    /// Worker request word.
    pub request: Request,
    /// Producer index into the FIFO.
    pub head: usize,
    /// Consumer index into the FIFO.
    pub tail: usize,
    /// Active FIFO size in bytes.
    pub fifo_size: usize,
    /// Current DSP tick size in frames.
    pub vec_size: usize,
    /// End-of-stream flag.
    pub eof: bool,
    /// Frames the capture worker has written so far.
    pub frames_written: u64,
    /// Geometry of the open file, if any.
    pub layout: Option<FrameLayout>,
    /// Unreported file error, if any.
    pub error: Option<String>,
}

/// Everything protected by the stream mutex.
pub(crate) struct Shared {
    pub request: Request,
    pub state: StreamState,
    pub pending: Option<OpenJob>,
    pub pending_meta: Vec<Vec<String>>,
    pub layout: Option<FrameLayout>,
    pub buf: Vec<u8>,
    pub fifo_size: usize,
    pub head: usize,
    pub tail: usize,
    pub eof: bool,
    pub error: Option<Error>,
    pub frames_written: u64,
    pub sig_countdown: usize,
    pub sig_period: usize,
    pub vec_size: usize,
    pub channels: usize,
    pub done: bool,
}

/// The mutex, its two condition variables, and the shared state.
///
/// The audio side signals `request_cv` to wake the worker; the worker
/// signals `answer_cv` to wake the audio side. Disk I/O always happens
/// with the mutex released.
pub(crate) struct StreamCore {
    pub shared: Mutex<Shared>,
    pub request_cv: Condvar,
    pub answer_cv: Condvar,
}

impl StreamCore {
    pub fn new(channels: usize, bufsize: usize) -> Self {
        StreamCore {
            shared: Mutex::new(Shared {
                request: Request::Nothing,
                state: StreamState::Idle,
                pending: None,
                pending_meta: Vec::new(),
                layout: None,
                buf: vec![0u8; bufsize],
                fifo_size: 0,
                head: 0,
                tail: 0,
                eof: false,
                error: None,
                frames_written: 0,
                sig_countdown: 0,
                sig_period: 0,
                vec_size: 64,
                channels,
                done: false,
            }),
            request_cv: Condvar::new(),
            answer_cv: Condvar::new(),
        }
    }

    /// Take the lock; a poisoned mutex is usable, the state words stay
    /// coherent because every transition is a single store.
    pub fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Worker-side wait for a request signal.
    pub fn wait_request<'a>(&self, guard: MutexGuard<'a, Shared>) -> MutexGuard<'a, Shared> {
        self.request_cv
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Audio-side wait for an answer signal.
    pub fn wait_answer<'a>(&self, guard: MutexGuard<'a, Shared>) -> MutexGuard<'a, Shared> {
        self.answer_cv
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> StreamStatus {
        let guard = self.lock();
        StreamStatus {
            state: guard.state,
            request: guard.request,
            head: guard.head,
            tail: guard.tail,
            fifo_size: guard.fifo_size,
            vec_size: guard.vec_size,
            eof: guard.eof,
            frames_written: guard.frames_written,
            layout: guard.layout,
            error: guard.error.as_ref().map(ToString::to_string),
        }
    }

    /// Record a new DSP tick size (clamped to a power of two within the
    /// FIFO alignment bound) and refresh the signalling cadence.
    pub fn set_block_size(&self, frames: usize) {
        let frames = frames.clamp(1, MAX_VEC_SIZE);
        let frames = if frames.is_power_of_two() {
            frames
        } else {
            frames.next_power_of_two() / 2
        };
        let mut guard = self.lock();
        guard.vec_size = frames;
        if let Some(layout) = guard.layout {
            let denom = 16 * layout.bytes_per_frame() * frames;
            guard.sig_period = (guard.fifo_size / denom.max(1)).max(1);
            guard.sig_countdown = guard.sig_period;
        }
    }

    /// Collect the pending done notification, if any.
    pub fn take_done(&self) -> bool {
        let mut guard = self.lock();
        std::mem::take(&mut guard.done)
    }
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "state: {:?}  request: {:?}", self.state, self.request)?;
        writeln!(
            f,
            "fifo: head {} tail {} of {} bytes  tick {} frames",
            self.head, self.tail, self.fifo_size, self.vec_size
        )?;
        match self.layout {
            Some(l) => writeln!(
                f,
                "file: {} ch, {} bytes/sample, {} Hz, {} endian",
                l.channels,
                l.width.bytes(),
                l.sample_rate,
                l.endian
            )?,
            None => writeln!(f, "file: none")?,
        }
        write!(
            f,
            "eof: {}  frames written: {}  error: {}",
            self.eof,
            self.frames_written,
            self.error.as_deref().unwrap_or("none")
        )
    }
}
