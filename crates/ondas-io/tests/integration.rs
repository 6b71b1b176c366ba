//! Integration tests for the synchronous batch reader and writer.

use ondas_core::{Endian, SampleWidth};
use ondas_io::{
    parse_read_args, parse_write_args, read_soundfile, write_soundfile, PathResolver, ReadRequest,
    Table, TableSet, WriteRequest,
};
use tempfile::tempdir;

fn tokens(parts: &[&str]) -> Vec<String> {
    parts.iter().map(ToString::to_string).collect()
}

// ---------------------------------------------------------------------------
// Write-then-read round trips
// ---------------------------------------------------------------------------

#[test]
fn dc_roundtrip_16bit_little_endian() {
    // Two channels of DC at +0.5 and -0.5, 1000 frames, 16-bit WAVE.
    let dir = tempdir().unwrap();
    let resolver = PathResolver::new(dir.path());

    let mut tables = TableSet::new();
    tables.insert(Table::from_samples("pos", vec![0.5; 1000]));
    tables.insert(Table::from_samples("neg", vec![-0.5; 1000]));

    let req = parse_write_args(&tokens(&["-little", "dc.wav", "pos", "neg"])).unwrap();
    let wrote = write_soundfile(&resolver, &req, &tables, 44100).unwrap();
    assert_eq!(wrote.frames, 1000);
    assert!(!wrote.normalized);
    assert!((wrote.peak - 0.5).abs() < 1e-6);

    let mut back = TableSet::new();
    back.insert(Table::new("a", 0));
    back.insert(Table::new("b", 0));
    let req = parse_read_args(&tokens(&["-resize", "dc.wav", "a", "b"])).unwrap();
    let read = read_soundfile(&resolver, &req, &mut back).unwrap();

    assert_eq!(read.frames, 1000);
    assert_eq!(read.info.sample_rate, 44100);
    assert_eq!(read.info.header_size, 44);
    assert_eq!(read.info.channels, 2);
    assert_eq!(read.info.bytes_per_sample, 2);
    assert_eq!(read.info.endian, Endian::Little);

    let tolerance = 1.0 / 32768.0;
    for &x in back.get("a").unwrap().data() {
        assert!((x - 0.5).abs() <= tolerance);
    }
    for &x in back.get("b").unwrap().data() {
        assert!((x + 0.5).abs() <= tolerance);
    }
}

#[test]
fn float_roundtrip_is_bit_exact_across_formats() {
    let dir = tempdir().unwrap();
    let resolver = PathResolver::new(dir.path());
    let source: Vec<f32> = (0..512).map(|i| ((i as f32) * 0.013).sin() * 0.9).collect();

    for name in ["t.wav", "t.caf", "t.au"] {
        let mut tables = TableSet::new();
        tables.insert(Table::from_samples("src", source.clone()));
        let req = WriteRequest {
            arrays: vec!["src".into()],
            width: SampleWidth::F32,
            ..WriteRequest::new(name)
        };
        let wrote = write_soundfile(&resolver, &req, &tables, 48000).unwrap();
        assert_eq!(wrote.frames, 512, "{name}");

        let mut back = TableSet::new();
        back.insert(Table::new("dst", 0));
        let req = ReadRequest {
            arrays: vec!["dst".into()],
            resize: true,
            ..ReadRequest::new(name)
        };
        read_soundfile(&resolver, &req, &mut back).unwrap();
        let loaded = back.get("dst").unwrap();
        assert_eq!(loaded.len(), 512, "{name}");
        for (a, b) in source.iter().zip(loaded.data()) {
            assert_eq!(a.to_bits(), b.to_bits(), "{name}");
        }
    }
}

#[test]
fn aiff_roundtrip_24bit() {
    let dir = tempdir().unwrap();
    let resolver = PathResolver::new(dir.path());
    let source: Vec<f32> = (0..200).map(|i| (i as f32 / 200.0) - 0.5).collect();

    let mut tables = TableSet::new();
    tables.insert(Table::from_samples("src", source.clone()));
    let req = parse_write_args(&tokens(&["-bytes", "3", "tone.aiff", "src"])).unwrap();
    write_soundfile(&resolver, &req, &tables, 44100).unwrap();

    let mut back = TableSet::new();
    back.insert(Table::new("dst", 0));
    let req = parse_read_args(&tokens(&["-resize", "tone.aiff", "dst"])).unwrap();
    let read = read_soundfile(&resolver, &req, &mut back).unwrap();
    assert_eq!(read.info.channels, 1);
    assert_eq!(read.info.bytes_per_sample, 3);
    assert_eq!(read.info.endian, Endian::Big);

    let tolerance = 1.0 / 8_388_608.0;
    for (a, b) in source.iter().zip(back.get("dst").unwrap().data()) {
        assert!((a - b).abs() <= tolerance);
    }
}

// ---------------------------------------------------------------------------
// Raw reads
// ---------------------------------------------------------------------------

#[test]
fn raw_read_of_little_endian_floats() {
    // 128 little-endian float32 samples 0, 1/128, ..., 127/128 with no
    // header at all.
    let dir = tempdir().unwrap();
    let mut bytes = Vec::new();
    let source: Vec<f32> = (0..128).map(|i| i as f32 / 128.0).collect();
    for &x in &source {
        bytes.extend_from_slice(&x.to_bits().to_le_bytes());
    }
    std::fs::write(dir.path().join("ramp.bin"), &bytes).unwrap();

    let mut tables = TableSet::new();
    tables.insert(Table::new("ramp", 128));

    let resolver = PathResolver::new(dir.path());
    let req =
        parse_read_args(&tokens(&["-raw", "0", "1", "4", "l", "ramp.bin", "ramp"])).unwrap();
    let read = read_soundfile(&resolver, &req, &mut tables).unwrap();

    assert_eq!(read.frames, 128);
    let table = tables.get_mut("ramp").unwrap();
    assert!(table.take_dirty(), "transfer flags the array for redraw");
    assert_eq!(table.data(), &source[..]);
}

#[test]
fn raw_read_skips_declared_header() {
    let dir = tempdir().unwrap();
    let mut bytes = vec![0xEEu8; 16]; // junk "header"
    for i in 0..4i16 {
        bytes.extend_from_slice(&(i * 1000).to_be_bytes());
    }
    std::fs::write(dir.path().join("off.bin"), &bytes).unwrap();

    let mut tables = TableSet::new();
    tables.insert(Table::new("a", 4));
    let resolver = PathResolver::new(dir.path());
    let req = parse_read_args(&tokens(&["-raw", "16", "1", "2", "b", "off.bin", "a"])).unwrap();
    let read = read_soundfile(&resolver, &req, &mut tables).unwrap();
    assert_eq!(read.frames, 4);
    let got = tables.get("a").unwrap().data().to_vec();
    assert!((got[0]).abs() < 1e-6);
    assert!((got[1] - 1000.0 / 32768.0).abs() < 1e-4);
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

#[test]
fn normalize_scales_peak_to_full_range() {
    // A peak of 2.0 with -normalize lands exactly on 32767, sign kept.
    let dir = tempdir().unwrap();
    let resolver = PathResolver::new(dir.path());

    let mut tables = TableSet::new();
    tables.insert(Table::from_samples("src", vec![2.0, -2.0, 1.0, 0.0]));
    let req = parse_write_args(&tokens(&["-normalize", "loud.wav", "src"])).unwrap();
    let wrote = write_soundfile(&resolver, &req, &tables, 44100).unwrap();
    assert!(wrote.normalized);
    assert!((wrote.peak - 2.0).abs() < 1e-6);

    let bytes = std::fs::read(dir.path().join("loud.wav")).unwrap();
    let payload = &bytes[44..];
    let samples: Vec<i16> = payload
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();
    assert_eq!(samples[0], 32767);
    assert_eq!(samples[1], -32767);
    assert_eq!(samples[3], 0);
    assert_eq!(samples.iter().map(|s| s.unsigned_abs()).max(), Some(32767));
}

#[test]
fn clipping_peak_turns_normalization_on() {
    let dir = tempdir().unwrap();
    let resolver = PathResolver::new(dir.path());

    let mut tables = TableSet::new();
    tables.insert(Table::from_samples("src", vec![1.5, -0.75]));
    let req = parse_write_args(&tokens(&["hot.wav", "src"])).unwrap();
    let wrote = write_soundfile(&resolver, &req, &tables, 44100).unwrap();
    assert!(wrote.normalized, "integer write with peak > 1 normalizes");

    // Float output keeps the overshoot verbatim instead.
    let req = WriteRequest {
        arrays: vec!["src".into()],
        width: SampleWidth::F32,
        ..WriteRequest::new("hot32.wav")
    };
    let wrote = write_soundfile(&resolver, &req, &tables, 44100).unwrap();
    assert!(!wrote.normalized);

    let mut back = TableSet::new();
    back.insert(Table::new("dst", 0));
    let req = ReadRequest {
        arrays: vec!["dst".into()],
        resize: true,
        ..ReadRequest::new("hot32.wav")
    };
    read_soundfile(&resolver, &req, &mut back).unwrap();
    assert_eq!(back.get("dst").unwrap().data()[0], 1.5);
}

// ---------------------------------------------------------------------------
// Onset, caps, and array-length handling
// ---------------------------------------------------------------------------

#[test]
fn skip_and_nframes_bound_the_transfer() {
    let dir = tempdir().unwrap();
    let resolver = PathResolver::new(dir.path());
    let source: Vec<f32> = (0..100).map(|i| i as f32 / 128.0).collect();

    let mut tables = TableSet::new();
    tables.insert(Table::from_samples("src", source));
    let req = parse_write_args(&tokens(&[
        "-skip", "10", "-nframes", "20", "-bytes", "4", "cut.wav", "src",
    ]))
    .unwrap();
    let wrote = write_soundfile(&resolver, &req, &tables, 44100).unwrap();
    assert_eq!(wrote.frames, 20);

    let mut back = TableSet::new();
    back.insert(Table::new("dst", 0));
    let req = parse_read_args(&tokens(&["-resize", "cut.wav", "dst"])).unwrap();
    let read = read_soundfile(&resolver, &req, &mut back).unwrap();
    assert_eq!(read.frames, 20);
    assert_eq!(back.get("dst").unwrap().data()[0], 10.0 / 128.0);

    // Reading with an onset drops the first frames.
    let req = parse_read_args(&tokens(&["-skip", "5", "-resize", "cut.wav", "dst"])).unwrap();
    let read = read_soundfile(&resolver, &req, &mut back).unwrap();
    assert_eq!(read.frames, 15);
    assert_eq!(back.get("dst").unwrap().data()[0], 15.0 / 128.0);
}

#[test]
fn fixed_arrays_zero_pad_the_tail() {
    let dir = tempdir().unwrap();
    let resolver = PathResolver::new(dir.path());

    let mut tables = TableSet::new();
    tables.insert(Table::from_samples("src", vec![0.25; 8]));
    let req = parse_write_args(&tokens(&["-bytes", "4", "short.wav", "src"])).unwrap();
    write_soundfile(&resolver, &req, &tables, 44100).unwrap();

    // A 12-sample destination without -resize keeps its length; the tail
    // beyond the file is cleared.
    let mut back = TableSet::new();
    back.insert(Table::from_samples("dst", vec![9.0; 12]));
    let req = parse_read_args(&tokens(&["short.wav", "dst"])).unwrap();
    let read = read_soundfile(&resolver, &req, &mut back).unwrap();
    assert_eq!(read.frames, 8);
    let data = back.get("dst").unwrap().data();
    assert_eq!(&data[..8], &[0.25; 8]);
    assert_eq!(&data[8..], &[0.0; 4]);
}

#[test]
fn mismatched_arrays_resize_to_smallest() {
    let dir = tempdir().unwrap();
    let resolver = PathResolver::new(dir.path());

    let mut tables = TableSet::new();
    tables.insert(Table::from_samples("src", vec![0.5; 16]));
    let req = parse_write_args(&tokens(&["-bytes", "4", "mono.wav", "src"])).unwrap();
    write_soundfile(&resolver, &req, &tables, 44100).unwrap();

    let mut back = TableSet::new();
    back.insert(Table::new("a", 6));
    back.insert(Table::new("b", 10));
    let req = parse_read_args(&tokens(&["mono.wav", "a", "b"])).unwrap();
    let read = read_soundfile(&resolver, &req, &mut back).unwrap();
    assert_eq!(read.frames, 6);
    assert_eq!(back.get("b").unwrap().len(), 6, "resized to the smallest");
    // The second array has no channel in a mono file and reads silence.
    assert_eq!(back.get("b").unwrap().data(), &[0.0; 6]);
}

#[test]
fn arrays_beyond_file_channels_read_silence() {
    let dir = tempdir().unwrap();
    let resolver = PathResolver::new(dir.path());

    let mut tables = TableSet::new();
    tables.insert(Table::from_samples("src", vec![0.5; 4]));
    let req = parse_write_args(&tokens(&["-bytes", "4", "mono.wav", "src"])).unwrap();
    write_soundfile(&resolver, &req, &tables, 44100).unwrap();

    let mut back = TableSet::new();
    back.insert(Table::from_samples("a", vec![7.0; 4]));
    back.insert(Table::from_samples("b", vec![7.0; 4]));
    let req = parse_read_args(&tokens(&["-resize", "mono.wav", "a", "b"])).unwrap();
    read_soundfile(&resolver, &req, &mut back).unwrap();
    assert_eq!(back.get("a").unwrap().data(), &[0.5; 4]);
    assert_eq!(back.get("b").unwrap().data(), &[0.0; 4]);
}

#[test]
fn missing_array_is_an_error() {
    let dir = tempdir().unwrap();
    let resolver = PathResolver::new(dir.path());
    let mut tables = TableSet::new();
    tables.insert(Table::from_samples("src", vec![0.1; 4]));
    let req = parse_write_args(&tokens(&["x.wav", "src"])).unwrap();
    write_soundfile(&resolver, &req, &tables, 44100).unwrap();

    let req = parse_read_args(&tokens(&["x.wav", "ghost"])).unwrap();
    let err = read_soundfile(&resolver, &req, &mut tables).unwrap_err();
    assert!(matches!(err, ondas_io::Error::ArrayNotFound(_)));
}

// ---------------------------------------------------------------------------
// Format selection, extensions, metadata, probes
// ---------------------------------------------------------------------------

#[test]
fn extension_completion_and_inference() {
    let dir = tempdir().unwrap();
    let resolver = PathResolver::new(dir.path());

    let mut tables = TableSet::new();
    tables.insert(Table::from_samples("src", vec![0.5; 4]));

    // No extension, no flag: first registered format (WAVE) with its
    // extension appended.
    let req = parse_write_args(&tokens(&["bare", "src"])).unwrap();
    write_soundfile(&resolver, &req, &tables, 44100).unwrap();
    assert!(dir.path().join("bare.wav").is_file());

    // Extension steers the format.
    let req = parse_write_args(&tokens(&["byext.au", "src"])).unwrap();
    let wrote = write_soundfile(&resolver, &req, &tables, 44100).unwrap();
    assert_eq!(wrote.info.header_size, 28);

    // Flag beats extension mismatch.
    let req = parse_write_args(&tokens(&["-next", "flagged", "src"])).unwrap();
    write_soundfile(&resolver, &req, &tables, 44100).unwrap();
    assert!(dir.path().join("flagged.au").is_file());
}

#[test]
fn forced_format_must_sniff() {
    let dir = tempdir().unwrap();
    let resolver = PathResolver::new(dir.path());

    let mut tables = TableSet::new();
    tables.insert(Table::from_samples("src", vec![0.5; 4]));
    let req = parse_write_args(&tokens(&["tone.wav", "src"])).unwrap();
    write_soundfile(&resolver, &req, &tables, 44100).unwrap();

    // Asserting AIFF against a WAVE file is a bad-header error.
    let req = parse_read_args(&tokens(&["-aiff", "tone.wav", "src"])).unwrap();
    let err = read_soundfile(&resolver, &req, &mut tables).unwrap_err();
    assert!(matches!(err, ondas_io::Error::BadHeader));
}

#[test]
fn metadata_travels_through_write_and_read() {
    let dir = tempdir().unwrap();
    let resolver = PathResolver::new(dir.path());

    let mut tables = TableSet::new();
    tables.insert(Table::from_samples("src", vec![0.5; 4]));
    let req = parse_write_args(&tokens(&[
        "-meta", "title", "night", "-meta", "artist", "someone", "--", "tagged.wav", "src",
    ]))
    .unwrap();
    write_soundfile(&resolver, &req, &tables, 44100).unwrap();

    let req = parse_read_args(&tokens(&["-meta", "tagged.wav"])).unwrap();
    let mut empty = TableSet::new();
    let read = read_soundfile(&resolver, &req, &mut empty).unwrap();
    assert_eq!(read.frames, 4, "probe reports the file length");
    assert!(read
        .metadata
        .contains(&("title".to_string(), "night".to_string())));
    assert!(read
        .metadata
        .contains(&("artist".to_string(), "someone".to_string())));
}

#[test]
fn probe_without_arrays_reports_geometry() {
    let dir = tempdir().unwrap();
    let resolver = PathResolver::new(dir.path());

    let mut tables = TableSet::new();
    tables.insert(Table::from_samples("l", vec![0.0; 300]));
    tables.insert(Table::from_samples("r", vec![0.0; 300]));
    let req = parse_write_args(&tokens(&["-bytes", "3", "-rate", "96000", "st.wav", "l", "r"]))
        .unwrap();
    write_soundfile(&resolver, &req, &tables, 44100).unwrap();

    let req = parse_read_args(&tokens(&["st.wav"])).unwrap();
    let mut empty = TableSet::new();
    let read = read_soundfile(&resolver, &req, &mut empty).unwrap();
    assert_eq!(read.frames, 300);
    assert_eq!(read.info.sample_rate, 96000);
    assert_eq!(read.info.channels, 2);
    assert_eq!(read.info.bytes_per_sample, 3);
}

#[test]
fn unresolvable_path_is_a_path_error() {
    let dir = tempdir().unwrap();
    let resolver = PathResolver::new(dir.path());
    let mut tables = TableSet::new();
    let req = parse_read_args(&tokens(&["nowhere.wav"])).unwrap();
    assert!(matches!(
        read_soundfile(&resolver, &req, &mut tables),
        Err(ondas_io::Error::PathNotFound(_))
    ));
}
