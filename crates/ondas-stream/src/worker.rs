//! The dedicated I/O worker serving the request state machine.
//!
//! The worker owns the open descriptor outright; shared state only ever
//! carries a copyable layout snapshot. Disk calls run with the mutex
//! released against a worker-local scratch buffer, and the FIFO region
//! is copied under the lock before the head or tail index moves. After
//! every blocking call the worker re-reads the request word: an external
//! transition away from `Busy` abandons the job in progress.

use std::sync::MutexGuard;

use ondas_formats::{create_soundfile, open_soundfile, FrameCount, SoundFile};

use crate::shared::{FrameLayout, OpenJob, Request, Shared, StreamCore};
use crate::{MAX_VEC_SIZE, READ_SIZE, WRITE_SIZE};

/// Worker main loop for playback (disk to FIFO).
pub(crate) fn playback_worker(core: &StreamCore) {
    let mut scratch = vec![0u8; READ_SIZE];
    let mut guard = core.lock();
    loop {
        match guard.request {
            Request::Nothing | Request::Busy => {
                guard = core.wait_request(guard);
            }
            Request::Close => {
                guard.request = Request::Nothing;
                core.answer_cv.notify_all();
            }
            Request::Quit => {
                guard.request = Request::Nothing;
                core.answer_cv.notify_all();
                return;
            }
            Request::Open => {
                guard = serve_playback(core, guard, &mut scratch);
            }
        }
    }
}

/// Worker main loop for capture (FIFO to disk).
pub(crate) fn capture_worker(core: &StreamCore) {
    let mut scratch = vec![0u8; WRITE_SIZE];
    let mut guard = core.lock();
    loop {
        match guard.request {
            Request::Nothing | Request::Busy => {
                guard = core.wait_request(guard);
            }
            Request::Close => {
                guard.request = Request::Nothing;
                core.answer_cv.notify_all();
            }
            Request::Quit => {
                guard.request = Request::Nothing;
                core.answer_cv.notify_all();
                return;
            }
            Request::Open => {
                guard = serve_capture(core, guard, &mut scratch);
            }
        }
    }
}

fn layout_of(sf: &SoundFile) -> FrameLayout {
    FrameLayout {
        channels: sf.channels(),
        width: sf.width(),
        endian: sf.endian(),
        sample_rate: sf.sample_rate(),
    }
}

/// Install a freshly opened descriptor's geometry and reset the FIFO.
/// Returns false when the buffer cannot hold a single aligned block.
fn install(guard: &mut MutexGuard<'_, Shared>, sf: &SoundFile) -> bool {
    let bpf = sf.bytes_per_frame();
    let block = bpf * MAX_VEC_SIZE;
    let fifo_size = guard.buf.len() - guard.buf.len() % block;
    if fifo_size == 0 {
        return false;
    }
    guard.layout = Some(layout_of(sf));
    guard.head = 0;
    guard.tail = 0;
    guard.fifo_size = fifo_size;
    let denom = 16 * bpf * guard.vec_size.max(1);
    guard.sig_period = (fifo_size / denom.max(1)).max(1);
    guard.sig_countdown = guard.sig_period;
    true
}

fn serve_playback<'a>(
    core: &'a StreamCore,
    mut guard: MutexGuard<'a, Shared>,
    scratch: &mut [u8],
) -> MutexGuard<'a, Shared> {
    guard.request = Request::Busy;
    guard.error = None;
    let Some(OpenJob::Read { path, spec }) = guard.pending.take() else {
        if guard.request == Request::Busy {
            guard.request = Request::Nothing;
        }
        core.answer_cv.notify_all();
        return guard;
    };

    drop(guard);
    let opened = open_soundfile(&path, &spec);
    guard = core.lock();

    let mut sf = match opened {
        Ok(sf) => sf,
        Err(e) => {
            if guard.request == Request::Busy {
                tracing::debug!(error = %e, "stream open failed");
                guard.eof = true;
                guard.error = Some(e);
                guard.request = Request::Nothing;
            }
            core.answer_cv.notify_all();
            return guard;
        }
    };
    if guard.request != Request::Busy {
        drop(guard);
        sf.close();
        return core.lock();
    }
    if !install(&mut guard, &sf) {
        guard.eof = true;
        guard.error = Some(ondas_core::Error::Usage(
            "stream buffer smaller than one block".into(),
        ));
        guard.request = Request::Nothing;
        core.answer_cv.notify_all();
        drop(guard);
        sf.close();
        return core.lock();
    }
    tracing::debug!(path = %path.display(), "streaming playback started");

    loop {
        if guard.request != Request::Busy || guard.eof {
            break;
        }
        let fifo_size = guard.fifo_size;
        let head = guard.head;
        let tail = guard.tail;

        // Pick a read size that can never fill the buffer completely:
        // head == tail must keep meaning "empty".
        let want = if head >= tail {
            if tail == 0 && fifo_size - head <= READ_SIZE {
                core.answer_cv.notify_all();
                guard = core.wait_request(guard);
                continue;
            }
            (fifo_size - head).min(READ_SIZE)
        } else {
            if tail - head - 1 < READ_SIZE {
                core.answer_cv.notify_all();
                guard = core.wait_request(guard);
                continue;
            }
            READ_SIZE
        };
        let want = (want as u64).min(sf.bytes_limit()) as usize;

        drop(guard);
        let result = sf.read_samples(&mut scratch[..want]);
        guard = core.lock();
        if guard.request != Request::Busy {
            break;
        }
        match result {
            Err(e) => {
                guard.error = Some(e.into());
                guard.eof = true;
                break;
            }
            Ok(0) => {
                guard.eof = true;
                break;
            }
            Ok(n) => {
                let head = guard.head;
                guard.buf[head..head + n].copy_from_slice(&scratch[..n]);
                let mut new_head = head + n;
                if new_head >= guard.fifo_size {
                    new_head = 0;
                }
                guard.head = new_head;
                sf.consume(n as u64);
                if sf.bytes_limit() == 0 {
                    guard.eof = true;
                }
            }
        }
        core.answer_cv.notify_all();
    }

    drop(guard);
    sf.close();
    guard = core.lock();
    if guard.request == Request::Busy {
        guard.request = Request::Nothing;
    }
    core.answer_cv.notify_all();
    guard
}

fn serve_capture<'a>(
    core: &'a StreamCore,
    mut guard: MutexGuard<'a, Shared>,
    scratch: &mut [u8],
) -> MutexGuard<'a, Shared> {
    guard.request = Request::Busy;
    guard.error = None;
    let channels = guard.channels;
    let Some(OpenJob::Write {
        path,
        format,
        width,
        endian,
        sample_rate,
    }) = guard.pending.take()
    else {
        if guard.request == Request::Busy {
            guard.request = Request::Nothing;
        }
        core.answer_cv.notify_all();
        return guard;
    };

    drop(guard);
    let created = create_soundfile(
        &path,
        format,
        channels,
        width,
        endian,
        sample_rate,
        FrameCount::Max,
    );
    guard = core.lock();

    let mut sf = match created {
        Ok(sf) => sf,
        Err(e) => {
            if guard.request == Request::Busy {
                tracing::debug!(error = %e, "capture open failed");
                guard.eof = true;
                guard.error = Some(e);
                guard.request = Request::Nothing;
            }
            core.answer_cv.notify_all();
            return guard;
        }
    };
    if guard.request != Request::Busy {
        drop(guard);
        sf.close();
        return core.lock();
    }
    guard.frames_written = 0;
    if !install(&mut guard, &sf) {
        guard.eof = true;
        guard.error = Some(ondas_core::Error::Usage(
            "stream buffer smaller than one block".into(),
        ));
        guard.request = Request::Nothing;
        core.answer_cv.notify_all();
        drop(guard);
        sf.close();
        return core.lock();
    }
    let bpf = sf.bytes_per_frame();
    tracing::debug!(path = %path.display(), "streaming capture started");
    core.answer_cv.notify_all();

    let mut wrote_samples = false;
    loop {
        // Apply queued metadata ahead of the first payload byte.
        if !guard.pending_meta.is_empty() {
            let groups = std::mem::take(&mut guard.pending_meta);
            drop(guard);
            for group in &groups {
                if wrote_samples {
                    tracing::warn!("metadata arrived after samples; ignoring");
                    break;
                }
                if let Err(e) = sf.write_metadata(group) {
                    tracing::warn!(error = %e, "could not write metadata group");
                }
            }
            guard = core.lock();
            continue;
        }

        let request = guard.request;
        let head = guard.head;
        let tail = guard.tail;
        let fifo_size = guard.fifo_size;
        let draining = request == Request::Close && head != tail;
        if !(request == Request::Busy || draining) {
            break;
        }
        let ready = head < tail || head - tail >= WRITE_SIZE || draining;
        if !ready {
            core.answer_cv.notify_all();
            guard = core.wait_request(guard);
            continue;
        }

        let end = if head < tail { fifo_size } else { head };
        let n = (end - tail).min(WRITE_SIZE);
        scratch[..n].copy_from_slice(&guard.buf[tail..tail + n]);

        drop(guard);
        let result = sf.write_samples(&scratch[..n]);
        guard = core.lock();
        match result {
            Err(e) => {
                guard.error = Some(e.into());
                guard.eof = true;
                break;
            }
            Ok(written) => {
                wrote_samples = true;
                let mut new_tail = tail + written;
                if new_tail >= guard.fifo_size {
                    new_tail = 0;
                }
                guard.tail = new_tail;
                guard.frames_written += (written / bpf) as u64;
                if written < n {
                    guard.error = Some(ondas_core::Error::Io(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "short soundfile write",
                    )));
                    guard.eof = true;
                    break;
                }
            }
        }
        core.answer_cv.notify_all();
    }

    let frames = guard.frames_written;
    drop(guard);
    if let Err(e) = sf.update_header(frames) {
        tracing::warn!(error = %e, "could not patch header on close");
    }
    sf.close();
    guard = core.lock();
    if matches!(guard.request, Request::Busy | Request::Close) {
        guard.request = Request::Nothing;
    }
    core.answer_cv.notify_all();
    guard
}
