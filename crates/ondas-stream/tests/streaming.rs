//! Integration tests for the ring-buffer streaming engine.

use std::path::PathBuf;
use std::time::Duration;

use ondas_core::SampleWidth;
use ondas_formats::FormatRegistry;
use ondas_io::{
    read_soundfile, write_soundfile, PathResolver, ReadRequest, Table, TableSet, WriteRequest,
};
use ondas_stream::{
    default_buffer_size, CaptureOptions, CaptureStream, OpenSpec, PlaybackStream, Request,
};
use tempfile::{tempdir, TempDir};

const TICK: usize = 64;

fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..2500 {
        if cond() {
            return;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    panic!("timed out waiting for {what}");
}

/// Write a 16-bit WAVE file of DC at `level`, returning its path.
fn write_dc(dir: &TempDir, name: &str, level: f32, frames: usize, rate: usize) -> PathBuf {
    let resolver = PathResolver::new(dir.path());
    let mut tables = TableSet::new();
    tables.insert(Table::from_samples("src", vec![level; frames]));
    let req = WriteRequest {
        arrays: vec!["src".into()],
        sample_rate: Some(rate),
        ..WriteRequest::new(name)
    };
    let wrote = write_soundfile(&resolver, &req, &tables, rate).unwrap();
    assert_eq!(wrote.frames, frames as u64);
    dir.path().join(name)
}

// ---------------------------------------------------------------------------
// Playback
// ---------------------------------------------------------------------------

#[test]
fn playback_delivers_every_frame_then_done_once() {
    let dir = tempdir().unwrap();
    let resolver = PathResolver::new(dir.path());

    // An 8000-frame stereo ramp, quantized exactly at 16 bits.
    let frames = 8000usize;
    let left: Vec<f32> = (0..frames).map(|i| (i % 16384) as f32 / 32768.0).collect();
    let right: Vec<f32> = left.iter().map(|x| -x).collect();
    let mut tables = TableSet::new();
    tables.insert(Table::from_samples("l", left.clone()));
    tables.insert(Table::from_samples("r", right.clone()));
    let req = WriteRequest {
        arrays: vec!["l".into(), "r".into()],
        ..WriteRequest::new("ramp.wav")
    };
    write_soundfile(&resolver, &req, &tables, 44100).unwrap();

    let stream = PlaybackStream::new(2, default_buffer_size(2)).unwrap();
    stream.set_block_size(TICK);
    stream.open(dir.path().join("ramp.wav"), OpenSpec::default());
    stream.start().unwrap();

    let mut got_l = Vec::new();
    let mut got_r = Vec::new();
    let mut done_count = 0;
    for _ in 0..(frames / TICK + 10) {
        let mut a = [0.0f32; TICK];
        let mut b = [0.0f32; TICK];
        {
            let mut outs: [&mut [f32]; 2] = [&mut a, &mut b];
            stream.perform(&mut outs);
        }
        let status = stream.status();
        if status.fifo_size > 0 {
            assert!(status.head < status.fifo_size, "head stays inside the FIFO");
            assert!(status.tail < status.fifo_size, "tail stays inside the FIFO");
        }
        if stream.take_done() {
            done_count += 1;
            break;
        }
        got_l.extend_from_slice(&a);
        got_r.extend_from_slice(&b);
    }

    assert_eq!(done_count, 1, "the done notification fires exactly once");
    assert_eq!(got_l.len(), frames, "no frame skipped or repeated");
    let tolerance = 1.0 / 32768.0;
    for (a, b) in got_l.iter().zip(&left) {
        assert!((a - b).abs() <= tolerance);
    }
    for (a, b) in got_r.iter().zip(&right) {
        assert!((a - b).abs() <= tolerance);
    }
    assert!(stream.status().error.is_none(), "no underrun surfaced");

    // After the stream drains, perform emits silence and the done flag
    // stays clear.
    let mut a = [1.0f32; TICK];
    let mut b = [1.0f32; TICK];
    {
        let mut outs: [&mut [f32]; 2] = [&mut a, &mut b];
        stream.perform(&mut outs);
    }
    assert_eq!(a, [0.0; TICK]);
    assert!(!stream.take_done());
}

#[test]
fn second_open_supersedes_the_first() {
    let dir = tempdir().unwrap();
    let first = write_dc(&dir, "first.wav", 0.25, 256, 44100);
    let second = write_dc(&dir, "second.wav", -0.5, 256, 22050);

    let stream = PlaybackStream::new(1, default_buffer_size(1)).unwrap();
    stream.set_block_size(TICK);

    stream.open(first, OpenSpec::default());
    wait_for("first file to buffer", || stream.status().head > 0);

    // Supersede before start: the pending read is abandoned quietly.
    stream.open(second, OpenSpec::default());
    wait_for("second file to buffer", || {
        let status = stream.status();
        status.layout.is_some_and(|l| l.sample_rate == 22050) && status.head > 0
    });

    stream.start().unwrap();
    let mut heard = Vec::new();
    for _ in 0..10 {
        let mut out = [0.0f32; TICK];
        {
            let mut outs: [&mut [f32]; 1] = [&mut out];
            stream.perform(&mut outs);
        }
        if stream.take_done() {
            break;
        }
        heard.extend_from_slice(&out);
    }

    assert_eq!(heard.len(), 256);
    let tolerance = 1.0 / 32768.0;
    for x in &heard {
        assert!((x + 0.5).abs() <= tolerance, "playback came from the second file");
    }
    assert!(
        stream.status().error.is_none(),
        "abandoning the first open surfaces no file error"
    );
}

#[test]
fn open_failure_reports_once_and_goes_idle() {
    let dir = tempdir().unwrap();
    let stream = PlaybackStream::new(1, default_buffer_size(1)).unwrap();
    stream.set_block_size(TICK);
    stream.open(dir.path().join("missing.wav"), OpenSpec::default());
    wait_for("open to fail", || stream.status().eof);
    stream.start().unwrap();

    let mut out = [1.0f32; TICK];
    {
        let mut outs: [&mut [f32]; 1] = [&mut out];
        stream.perform(&mut outs);
    }
    assert_eq!(out, [0.0; TICK]);
    assert!(stream.take_done(), "a failed stream still fires done");
    assert!(stream.status().error.is_none(), "the error is reported once");
}

#[test]
fn start_without_open_is_an_error() {
    let stream = PlaybackStream::new(1, default_buffer_size(1)).unwrap();
    assert!(stream.start().is_err());
}

#[test]
fn dropping_an_idle_stream_joins_the_worker() {
    let playback = PlaybackStream::new(2, default_buffer_size(2)).unwrap();
    drop(playback);
    let capture = CaptureStream::new(2, default_buffer_size(2)).unwrap();
    drop(capture);
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

fn wave_options(meta: Vec<Vec<String>>) -> CaptureOptions {
    CaptureOptions {
        format: FormatRegistry::global().by_name("wave").unwrap(),
        width: SampleWidth::I16,
        endian: None,
        sample_rate: 44100,
        meta,
    }
}

#[test]
fn capture_drains_on_stop_and_patches_header() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("take.wav");

    let stream = CaptureStream::new(1, default_buffer_size(1)).unwrap();
    stream.set_block_size(TICK);
    stream.open(path.clone(), wave_options(vec![]));
    stream.start().unwrap();

    let ticks = 20usize;
    for _ in 0..ticks {
        let tick = [0.5f32; TICK];
        let ins: [&[f32]; 1] = [&tick];
        stream.perform(&ins);
    }
    stream.stop();
    wait_for("capture to finalize", || {
        stream.status().request == Request::Nothing
    });
    assert_eq!(stream.frames_written(), (ticks * TICK) as u64);
    drop(stream);

    let resolver = PathResolver::new(dir.path());
    let mut tables = TableSet::new();
    tables.insert(Table::new("back", 0));
    let req = ReadRequest {
        arrays: vec!["back".into()],
        resize: true,
        ..ReadRequest::new("take.wav")
    };
    let read = read_soundfile(&resolver, &req, &mut tables).unwrap();
    assert_eq!(read.frames, (ticks * TICK) as u64, "header patched to the true count");
    let tolerance = 1.0 / 32768.0;
    for x in tables.get("back").unwrap().data() {
        assert!((x - 0.5).abs() <= tolerance);
    }
}

#[test]
fn capture_metadata_lands_before_the_payload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tagged.wav");

    let stream = CaptureStream::new(1, default_buffer_size(1)).unwrap();
    stream.set_block_size(TICK);
    stream.open(
        path,
        wave_options(vec![vec!["title".into(), "field take".into()]]),
    );
    stream
        .meta(vec!["artist".into(), "ondas".into()])
        .expect("meta accepted between open and start");
    stream.start().unwrap();

    for _ in 0..4 {
        let tick = [0.25f32; TICK];
        let ins: [&[f32]; 1] = [&tick];
        stream.perform(&ins);
    }
    stream.stop();
    wait_for("capture to finalize", || {
        stream.status().request == Request::Nothing
    });
    drop(stream);

    let resolver = PathResolver::new(dir.path());
    let mut tables = TableSet::new();
    let req = ReadRequest {
        want_metadata: true,
        ..ReadRequest::new("tagged.wav")
    };
    let read = read_soundfile(&resolver, &req, &mut tables).unwrap();
    assert_eq!(read.frames, 256);
    assert!(read
        .metadata
        .contains(&("title".to_string(), "field take".to_string())));
    assert!(read
        .metadata
        .contains(&("artist".to_string(), "ondas".to_string())));
}

#[test]
fn capture_reopen_finalizes_the_previous_take() {
    let dir = tempdir().unwrap();
    let stream = CaptureStream::new(1, default_buffer_size(1)).unwrap();
    stream.set_block_size(TICK);

    stream.open(dir.path().join("one.wav"), wave_options(vec![]));
    stream.start().unwrap();
    for _ in 0..3 {
        let tick = [0.1f32; TICK];
        let ins: [&[f32]; 1] = [&tick];
        stream.perform(&ins);
    }

    // Re-opening while streaming stops and finalizes the first take.
    stream.open(dir.path().join("two.wav"), wave_options(vec![]));
    stream.start().unwrap();
    for _ in 0..5 {
        let tick = [0.2f32; TICK];
        let ins: [&[f32]; 1] = [&tick];
        stream.perform(&ins);
    }
    stream.stop();
    wait_for("capture to finalize", || {
        stream.status().request == Request::Nothing
    });
    drop(stream);

    let resolver = PathResolver::new(dir.path());
    let mut tables = TableSet::new();
    let read = read_soundfile(&resolver, &ReadRequest::new("one.wav"), &mut tables).unwrap();
    assert_eq!(read.frames, 192);
    let read = read_soundfile(&resolver, &ReadRequest::new("two.wav"), &mut tables).unwrap();
    assert_eq!(read.frames, 320);
}

#[test]
fn meta_after_start_is_rejected() {
    let dir = tempdir().unwrap();
    let stream = CaptureStream::new(1, default_buffer_size(1)).unwrap();
    stream.set_block_size(TICK);
    stream.open(dir.path().join("x.wav"), wave_options(vec![]));
    stream.start().unwrap();
    assert!(stream.meta(vec!["title".into(), "late".into()]).is_err());
    stream.stop();
    wait_for("capture to finalize", || {
        stream.status().request == Request::Nothing
    });
}
