//! Streaming capture: signal vectors to disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use ondas_core::{codec, Endian, Error, Result, SampleWidth, MAX_CHANNELS};
use ondas_formats::SoundFormat;

use crate::shared::{OpenJob, Request, StreamCore, StreamState, StreamStatus};
use crate::worker::capture_worker;
use crate::{MAX_BUF_SIZE, MIN_BUF_SIZE};

/// How a capture file is created.
#[derive(Clone)]
pub struct CaptureOptions {
    /// Container format.
    pub format: &'static dyn SoundFormat,
    /// Stored sample width.
    pub width: SampleWidth,
    /// Requested byte order; the format's policy has the last word.
    pub endian: Option<Endian>,
    /// Declared sample rate.
    pub sample_rate: usize,
    /// Metadata groups to store ahead of the first frame.
    pub meta: Vec<Vec<String>>,
}

/// A soundfile recorder whose disk I/O runs on a dedicated worker
/// thread.
///
/// `open` creates the file with a maximum-length header, `start` lets
/// the perform path feed it, and `stop` drains the FIFO, patches the
/// header to the true frame count, and closes. The perform path is meant
/// to be called from the audio callback.
pub struct CaptureStream {
    core: Arc<StreamCore>,
    worker: Option<JoinHandle<()>>,
}

impl CaptureStream {
    /// Create a recorder for `channels` signal inlets with a FIFO of
    /// roughly `bufsize` bytes (clamped to the supported range).
    pub fn new(channels: usize, bufsize: usize) -> Result<Self> {
        let channels = channels.clamp(1, MAX_CHANNELS);
        let core = Arc::new(StreamCore::new(
            channels,
            bufsize.clamp(MIN_BUF_SIZE, MAX_BUF_SIZE),
        ));
        let thread_core = Arc::clone(&core);
        let worker = std::thread::Builder::new()
            .name("ondas-capture-io".into())
            .spawn(move || capture_worker(&thread_core))
            .map_err(Error::Io)?;
        Ok(CaptureStream {
            core,
            worker: Some(worker),
        })
    }

    /// Create the capture file and enter `Startup`.
    ///
    /// A stream already recording is stopped first; the call then waits
    /// for the worker to acknowledge before installing the new job, so a
    /// previous file is always finalized before its successor opens.
    pub fn open(&self, path: PathBuf, options: CaptureOptions) {
        let core = &*self.core;
        let mut guard = core.lock();
        if guard.state != StreamState::Idle {
            guard.state = StreamState::Idle;
            guard.request = Request::Close;
            core.request_cv.notify_all();
        }
        while guard.request != Request::Nothing {
            core.request_cv.notify_all();
            guard = core.wait_answer(guard);
        }
        let endian = options.format.endianness(options.endian);
        guard.pending = Some(OpenJob::Write {
            path,
            format: options.format,
            width: options.width,
            endian,
            sample_rate: options.sample_rate,
        });
        guard.pending_meta = options.meta;
        guard.frames_written = 0;
        guard.eof = false;
        guard.error = None;
        guard.done = false;
        guard.request = Request::Open;
        guard.state = StreamState::Startup;
        core.request_cv.notify_all();
    }

    /// Queue a metadata group; only meaningful between `open` and
    /// `start`.
    pub fn meta(&self, group: Vec<String>) -> Result<()> {
        let mut guard = self.core.lock();
        if guard.state != StreamState::Startup {
            return Err(Error::Usage(
                "meta is only accepted between open and start".into(),
            ));
        }
        guard.pending_meta.push(group);
        self.core.request_cv.notify_all();
        Ok(())
    }

    /// Begin streaming from the perform path.
    pub fn start(&self) -> Result<()> {
        let mut guard = self.core.lock();
        match guard.state {
            StreamState::Startup => {
                guard.state = StreamState::Stream;
                Ok(())
            }
            _ => Err(Error::Usage("start requires an open file".into())),
        }
    }

    /// Stop recording: the worker drains the FIFO, patches the header,
    /// and closes the file.
    pub fn stop(&self) {
        let mut guard = self.core.lock();
        guard.state = StreamState::Idle;
        guard.request = Request::Close;
        self.core.request_cv.notify_all();
    }

    /// Record the host's DSP tick size.
    pub fn set_block_size(&self, frames: usize) {
        self.core.set_block_size(frames);
    }

    /// Number of signal inlets.
    pub fn channels(&self) -> usize {
        self.core.lock().channels
    }

    /// Frames the worker has committed to disk so far.
    pub fn frames_written(&self) -> u64 {
        self.core.lock().frames_written
    }

    /// Collect the pending error notification, if any.
    pub fn take_done(&self) -> bool {
        self.core.take_done()
    }

    /// Diagnostic snapshot (the `print` surface).
    pub fn status(&self) -> StreamStatus {
        self.core.status()
    }

    /// The per-tick audio callback: encode one tick's worth of frames
    /// into the FIFO, waiting on the worker only when the FIFO is
    /// saturated. Missing inlets record silence. All vectors must share
    /// one length, the current tick size.
    pub fn perform(&self, inputs: &[&[f32]]) {
        let vec_size = inputs.first().map_or(0, |input| input.len());
        let core = &*self.core;
        let mut guard = core.lock();
        if guard.state != StreamState::Stream {
            return;
        }

        // Wait for room, keeping one byte back so a full buffer stays
        // distinguishable from an empty one.
        loop {
            if guard.eof {
                break;
            }
            let Some(layout) = guard.layout else {
                core.request_cv.notify_all();
                guard = core.wait_answer(guard);
                continue;
            };
            let want = vec_size * layout.bytes_per_frame();
            let mut room = guard.tail as i64 - guard.head as i64;
            if room <= 0 {
                room += guard.fifo_size as i64;
            }
            if room as usize >= want + 1 {
                break;
            }
            core.request_cv.notify_all();
            guard = core.wait_answer(guard);
        }

        if guard.eof {
            if let Some(error) = guard.error.take() {
                tracing::error!(%error, "soundfile capture error");
            }
            guard.state = StreamState::Idle;
            guard.done = true;
            core.request_cv.notify_all();
            return;
        }
        let Some(layout) = guard.layout else {
            return;
        };

        let want = vec_size * layout.bytes_per_frame();
        let head = guard.head;
        for ch in 0..layout.channels {
            match inputs.get(ch) {
                Some(src) => codec::encode_channel(
                    &mut guard.buf[head..head + want],
                    ch,
                    layout.channels,
                    layout.width,
                    layout.endian,
                    &src[..vec_size],
                    1.0,
                ),
                None => codec::encode_silent_channel(
                    &mut guard.buf[head..head + want],
                    ch,
                    layout.channels,
                    layout.width,
                    layout.endian,
                    vec_size,
                ),
            }
        }
        let mut new_head = head + want;
        if new_head >= guard.fifo_size {
            new_head = 0;
        }
        guard.head = new_head;
        guard.sig_countdown = guard.sig_countdown.saturating_sub(1);
        if guard.sig_countdown == 0 {
            core.request_cv.notify_all();
            guard.sig_countdown = guard.sig_period;
        }
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        let core = &*self.core;
        let mut guard = core.lock();
        guard.request = Request::Quit;
        core.request_cv.notify_all();
        while guard.request != Request::Nothing {
            core.request_cv.notify_all();
            guard = core.wait_answer(guard);
        }
        drop(guard);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
