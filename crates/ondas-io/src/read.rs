//! The synchronous batch reader.

use ondas_core::{codec, Error, Result};
use ondas_formats::{open_soundfile, OpenSpec, SoundFile};

use crate::args::ReadRequest;
use crate::resolve::PathResolver;
use crate::table::TableSet;
use crate::SAMPLE_BUF_SIZE;

/// The five-field info tuple describing an opened soundfile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundFileInfo {
    /// Declared sample rate (informational only; zero for ASCII reads).
    pub sample_rate: usize,
    /// Header bytes preceding the first frame.
    pub header_size: u64,
    /// Channel count.
    pub channels: usize,
    /// Bytes per stored sample.
    pub bytes_per_sample: usize,
    /// Stored byte order.
    pub endian: ondas_core::Endian,
}

impl SoundFileInfo {
    pub(crate) fn from_soundfile(sf: &SoundFile) -> Self {
        SoundFileInfo {
            sample_rate: sf.sample_rate(),
            header_size: sf.header_size(),
            channels: sf.channels(),
            bytes_per_sample: sf.width().bytes(),
            endian: sf.endian(),
        }
    }
}

impl std::fmt::Display for SoundFileInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.sample_rate,
            self.header_size,
            self.channels,
            self.bytes_per_sample,
            self.endian.code()
        )
    }
}

/// What a read command reports back.
#[derive(Debug)]
pub struct ReadOutcome {
    /// Frames copied into the arrays (or frames in the file when no
    /// arrays were named).
    pub frames: u64,
    /// The info tuple.
    pub info: SoundFileInfo,
    /// Metadata key/value pairs, when requested and supported.
    pub metadata: Vec<(String, String)>,
}

/// Copy sample frames from a soundfile into a set of tables.
///
/// With `resize` the target arrays grow or shrink to the (possibly
/// capped) file length; otherwise the smallest current array length
/// bounds the transfer, and arrays of differing lengths are resized to
/// the smallest with a warning. After the last frame, the remainder of
/// every array is zeroed, as is the whole of any array beyond the file's
/// channel count, and every array is flagged for redraw.
///
/// Naming no arrays turns the call into a probe: the file is opened and
/// described but nothing is transferred.
pub fn read_soundfile(
    resolver: &PathResolver,
    req: &ReadRequest,
    tables: &mut TableSet,
) -> Result<ReadOutcome> {
    if req.ascii || req.filename.to_ascii_lowercase().ends_with(".txt") {
        return crate::ascii::read_ascii(resolver, req, tables);
    }

    let path = resolver.resolve_read(&req.filename)?;
    let spec = OpenSpec {
        header: req.header_style(),
        format: req.format,
        onset_frames: req.onset_frames,
    };
    let mut sf = open_soundfile(&path, &spec)?;
    let indices = tables.resolve(&req.arrays)?;

    let bpf = sf.bytes_per_frame();
    let frames_in_file = sf.bytes_limit() / bpf as u64;
    let info = SoundFileInfo::from_soundfile(&sf);

    let metadata = if req.want_metadata {
        match sf.read_metadata() {
            Ok(items) => items,
            Err(Error::MetadataUnsupported(name)) => {
                tracing::warn!(format = name, "format does not support metadata");
                Vec::new()
            }
            Err(e) => return Err(e),
        }
    } else {
        Vec::new()
    };

    if indices.is_empty() {
        sf.close();
        return Ok(ReadOutcome {
            frames: frames_in_file,
            info,
            metadata,
        });
    }

    let target = if req.resize {
        let target = frames_in_file.min(req.max_frames);
        for &i in &indices {
            tables.at_mut(i).resize(target as usize)?;
        }
        target
    } else {
        let min_len = indices.iter().map(|&i| tables.at(i).len()).min().unwrap_or(0);
        if indices.iter().any(|&i| tables.at(i).len() != min_len) {
            tracing::warn!("arrays have different lengths; resizing to the smallest");
            for &i in &indices {
                tables.at_mut(i).resize(min_len)?;
            }
        }
        frames_in_file.min(req.max_frames).min(min_len as u64)
    };

    let channels = sf.channels();
    let width = sf.width();
    let endian = sf.endian();
    let frames_per_chunk = (SAMPLE_BUF_SIZE / bpf).max(1);
    let mut chunk = vec![0u8; frames_per_chunk * bpf];

    let mut frames_done: u64 = 0;
    while frames_done < target {
        let want_frames = ((target - frames_done).min(frames_per_chunk as u64)) as usize;
        let want_bytes = want_frames * bpf;
        let got_bytes = read_fully(&mut sf, &mut chunk[..want_bytes])?;
        let got_frames = got_bytes / bpf;
        if got_frames == 0 {
            break;
        }
        for (slot, &i) in indices.iter().enumerate() {
            if slot < channels {
                let offset = frames_done as usize;
                codec::decode_channel(
                    &chunk,
                    slot,
                    channels,
                    width,
                    endian,
                    &mut tables.at_mut(i).data_mut()[offset..offset + got_frames],
                );
            }
        }
        sf.consume(got_bytes as u64);
        frames_done += got_frames as u64;
        if got_bytes < want_bytes {
            break;
        }
    }

    for (slot, &i) in indices.iter().enumerate() {
        let table = tables.at_mut(i);
        let start = if slot < channels {
            (frames_done as usize).min(table.len())
        } else {
            0
        };
        table.data_mut()[start..].fill(0.0);
        table.mark_dirty();
    }

    sf.close();
    Ok(ReadOutcome {
        frames: frames_done,
        info,
        metadata,
    })
}

fn read_fully(sf: &mut SoundFile, buf: &mut [u8]) -> Result<usize> {
    let mut got = 0;
    while got < buf.len() {
        match sf.read_samples(&mut buf[got..]) {
            Ok(0) => break,
            Ok(n) => got += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(got)
}
