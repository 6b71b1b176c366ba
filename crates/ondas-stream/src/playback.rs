//! Streaming playback: disk to signal vectors.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use ondas_core::{codec, Error, Result, MAX_CHANNELS};
use ondas_formats::OpenSpec;

use crate::shared::{Request, StreamCore, StreamState, StreamStatus};
use crate::worker::playback_worker;
use crate::{MAX_BUF_SIZE, MIN_BUF_SIZE};

/// A soundfile player whose disk I/O runs on a dedicated worker thread.
///
/// `open` hands a file to the worker, `start` lets the perform path
/// consume it, and a "done" notification is left for the host to collect
/// once the file runs out. The perform path is meant to be called from
/// the audio callback; every other method belongs to the control thread.
pub struct PlaybackStream {
    core: Arc<StreamCore>,
    worker: Option<JoinHandle<()>>,
}

impl PlaybackStream {
    /// Create a player for `channels` signal outlets with a FIFO of
    /// roughly `bufsize` bytes (clamped to the supported range).
    pub fn new(channels: usize, bufsize: usize) -> Result<Self> {
        Self::with_raw_bufsize(channels, bufsize.clamp(MIN_BUF_SIZE, MAX_BUF_SIZE))
    }

    /// Unclamped constructor for in-crate tests that shrink the FIFO.
    pub(crate) fn with_raw_bufsize(channels: usize, bufsize: usize) -> Result<Self> {
        let channels = channels.clamp(1, MAX_CHANNELS);
        let core = Arc::new(StreamCore::new(channels, bufsize));
        let thread_core = Arc::clone(&core);
        let worker = std::thread::Builder::new()
            .name("ondas-playback-io".into())
            .spawn(move || playback_worker(&thread_core))
            .map_err(Error::Io)?;
        Ok(PlaybackStream {
            core,
            worker: Some(worker),
        })
    }

    /// Hand a file to the worker and enter `Startup`.
    ///
    /// An open always supersedes whatever the worker is doing: a busy
    /// worker observes the request change and abandons its job without
    /// surfacing an error.
    pub fn open(&self, path: PathBuf, spec: OpenSpec) {
        let mut guard = self.core.lock();
        guard.pending = Some(crate::shared::OpenJob::Read { path, spec });
        guard.request = Request::Open;
        guard.state = StreamState::Startup;
        guard.eof = false;
        guard.error = None;
        guard.done = false;
        self.core.request_cv.notify_all();
    }

    /// Begin streaming to the perform path.
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

    /// Stop streaming and ask the worker to close the file.
    pub fn stop(&self) {
        let mut guard = self.core.lock();
        guard.state = StreamState::Idle;
        guard.request = Request::Close;
        self.core.request_cv.notify_all();
    }

    /// Record the host's DSP tick size (a power of two up to the FIFO
    /// alignment bound).
    pub fn set_block_size(&self, frames: usize) {
        self.core.set_block_size(frames);
    }

    /// Number of signal outlets.
    pub fn channels(&self) -> usize {
        self.core.lock().channels
    }

    /// Collect the pending end-of-file notification. Set once per
    /// stream, on the tick that drains the FIFO after EOF.
    pub fn take_done(&self) -> bool {
        self.core.take_done()
    }

    /// Diagnostic snapshot (the `print` surface).
    pub fn status(&self) -> StreamStatus {
        self.core.status()
    }

    /// The per-tick audio callback: decode one tick's worth of frames
    /// into the outlet vectors, waiting on the worker only when the FIFO
    /// is starved. Outlets beyond the file's channel count are silent.
    /// All vectors must share one length, the current tick size.
    pub fn perform(&self, outputs: &mut [&mut [f32]]) {
        let vec_size = outputs.first().map_or(0, |out| out.len());
        let core = &*self.core;
        let mut guard = core.lock();
        if guard.state != StreamState::Stream {
            drop(guard);
            for out in outputs.iter_mut() {
                out.fill(0.0);
            }
            return;
        }

        // Wait until a whole tick is buffered or the stream has ended,
        // re-reading the layout after every wake.
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
            let starving = guard.head >= guard.tail && guard.head + 1 < guard.tail + want;
            if !starving {
                break;
            }
            core.request_cv.notify_all();
            guard = core.wait_answer(guard);
        }

        let layout = guard.layout;
        let want = layout.map_or(0, |l| vec_size * l.bytes_per_frame());
        let short = match layout {
            None => true,
            Some(_) => guard.head >= guard.tail && guard.head + 1 < guard.tail + want,
        };

        if guard.eof && short {
            // The file ran out: report any stored error once, decode the
            // partial frames left over, and go idle. The done flag is the
            // deferred notification the host collects outside the audio
            // context.
            if let Some(error) = guard.error.take() {
                tracing::error!(%error, "soundfile streaming error");
            }
            guard.state = StreamState::Idle;
            guard.done = true;
            let mut filled = 0usize;
            if let Some(l) = layout {
                let bpf = l.bytes_per_frame();
                let avail = guard.head - guard.tail;
                filled = (avail / bpf).min(vec_size);
                if filled > 0 {
                    let from = guard.tail;
                    let region = from..from + filled * bpf;
                    for (ch, out) in outputs.iter_mut().enumerate() {
                        if ch < l.channels {
                            codec::decode_channel(
                                &guard.buf[region.clone()],
                                ch,
                                l.channels,
                                l.width,
                                l.endian,
                                &mut out[..filled],
                            );
                        }
                    }
                }
            }
            for (ch, out) in outputs.iter_mut().enumerate() {
                let start = match layout {
                    Some(l) if ch < l.channels => filled,
                    _ => 0,
                };
                out[start..].fill(0.0);
            }
            core.request_cv.notify_all();
            return;
        }

        let Some(l) = layout else {
            for out in outputs.iter_mut() {
                out.fill(0.0);
            }
            return;
        };
        let tail = guard.tail;
        for (ch, out) in outputs.iter_mut().enumerate() {
            if ch < l.channels {
                codec::decode_channel(
                    &guard.buf[tail..tail + want],
                    ch,
                    l.channels,
                    l.width,
                    l.endian,
                    out,
                );
            } else {
                out.fill(0.0);
            }
        }
        let mut new_tail = tail + want;
        if new_tail >= guard.fifo_size {
            new_tail = 0;
        }
        guard.tail = new_tail;
        guard.sig_countdown = guard.sig_countdown.saturating_sub(1);
        if guard.sig_countdown == 0 {
            core.request_cv.notify_all();
            guard.sig_countdown = guard.sig_period;
        }
    }
}

impl Drop for PlaybackStream {
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
