//! The synchronous batch writer.

use ondas_core::{check_channels, codec, Error, Result, SampleWidth};
use ondas_formats::{create_soundfile, FormatRegistry, FrameCount};

use crate::args::WriteRequest;
use crate::read::SoundFileInfo;
use crate::resolve::PathResolver;
use crate::table::TableSet;
use crate::SAMPLE_BUF_SIZE;

/// What a write command reports back.
#[derive(Debug)]
pub struct WriteOutcome {
    /// Frames that actually landed on disk.
    pub frames: u64,
    /// The info tuple of the file as written.
    pub info: SoundFileInfo,
    /// Peak absolute sample value across the written window.
    pub peak: f32,
    /// True when the samples were scaled to full range.
    pub normalized: bool,
}

/// Stream sample frames from a set of tables out to a soundfile.
///
/// The format comes from an explicit flag, else the filename extension,
/// else the first registered format; its endianness policy has the last
/// word on byte order. The write length is the requested frame cap
/// bounded by the shortest array past the onset. A peak over full scale
/// on an integer format turns normalization on with a warning. Metadata
/// groups are applied between the header and the first frame; a failing
/// group is reported and skipped. A short OS write stops the transfer
/// but keeps the frames that landed, and the header is still patched to
/// the true count on close.
pub fn write_soundfile(
    resolver: &PathResolver,
    req: &WriteRequest,
    tables: &TableSet,
    host_rate: usize,
) -> Result<WriteOutcome> {
    let indices = tables.resolve(&req.arrays)?;
    if indices.is_empty() {
        return Err(Error::Usage("write needs at least one source array".into()));
    }
    let channels = check_channels(indices.len())?;

    let registry = FormatRegistry::global();
    let format = req
        .format
        .or_else(|| registry.by_extension(&req.filename))
        .unwrap_or_else(|| registry.default_format());
    let endian = format.endianness(req.endian);

    let min_len = indices.iter().map(|&i| tables.at(i).len()).min().unwrap_or(0) as u64;
    if req.onset_frames >= min_len {
        return Err(Error::Usage("no frames to write past the onset".into()));
    }
    let nframes = req.max_frames.min(min_len - req.onset_frames);
    let onset = req.onset_frames as usize;
    let end = onset + nframes as usize;

    let mut peak = 0.0f32;
    for &i in &indices {
        for &x in &tables.at(i).data()[onset..end] {
            peak = peak.max(x.abs());
        }
    }

    let mut normalize = req.normalize;
    if !normalize && peak > 1.0 && req.width != SampleWidth::F32 {
        tracing::warn!(peak, "peak exceeds full scale; normalizing");
        normalize = true;
    }
    let scale = if normalize && peak > 0.0 {
        32767.0 / (32768.0 * peak)
    } else {
        1.0
    };

    let filename = format.add_extension(&req.filename);
    let path = resolver.resolve_write(&filename);
    let sample_rate = req.sample_rate.unwrap_or(host_rate);
    let mut sf = create_soundfile(
        &path,
        format,
        channels,
        req.width,
        endian,
        sample_rate,
        FrameCount::Frames(nframes),
    )?;

    for group in &req.meta {
        if let Err(e) = sf.write_metadata(group) {
            tracing::warn!(error = %e, "could not write metadata group");
        }
    }

    let info = SoundFileInfo::from_soundfile(&sf);
    let bpf = sf.bytes_per_frame();
    let frames_per_chunk = (SAMPLE_BUF_SIZE / bpf).max(1);
    let mut chunk = vec![0u8; frames_per_chunk * bpf];

    let mut frames_done: u64 = 0;
    while frames_done < nframes {
        let this_frames = ((nframes - frames_done).min(frames_per_chunk as u64)) as usize;
        let this_bytes = this_frames * bpf;
        let from = onset + frames_done as usize;
        for (ch, &i) in indices.iter().enumerate() {
            codec::encode_channel(
                &mut chunk[..this_bytes],
                ch,
                channels,
                req.width,
                endian,
                &tables.at(i).data()[from..from + this_frames],
                scale,
            );
        }
        match sf.write_samples(&chunk[..this_bytes]) {
            Ok(n) if n == this_bytes => frames_done += this_frames as u64,
            Ok(n) => {
                tracing::error!(wanted = this_bytes, wrote = n, "short soundfile write");
                frames_done += (n / bpf) as u64;
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "soundfile write failed");
                break;
            }
        }
    }

    if frames_done != nframes {
        // Best effort: the header patch may itself fail after an I/O
        // error.
        if let Err(e) = sf.update_header(frames_done) {
            tracing::warn!(error = %e, "could not patch header after short write");
        }
    }
    sf.close();

    Ok(WriteOutcome {
        frames: frames_done,
        info,
        peak,
        normalized: normalize,
    })
}
