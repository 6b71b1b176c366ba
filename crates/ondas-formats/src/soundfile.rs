//! The per-file soundfile descriptor and the shared open/create routines.

use std::any::Any;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use ondas_core::{check_channels, Endian, Error, Result, SampleWidth, MAX_BYTE_LIMIT};

use crate::format::{FormatRegistry, FrameCount, SoundFormat};
use crate::raw::raw_format;

/// How the open routine should treat the bytes before the payload.
#[derive(Debug, Clone, Copy)]
pub enum HeaderStyle {
    /// Sniff registered formats and parse the container header.
    Detect,
    /// Skip detection; the caller supplies the geometry.
    Raw(RawSpec),
}

/// Caller-supplied geometry for headerless (or forced-offset) files.
#[derive(Debug, Clone, Copy)]
pub struct RawSpec {
    /// Bytes to skip before the first frame.
    pub header_size: u64,
    /// Interleaved channel count.
    pub channels: usize,
    /// Stored sample width.
    pub width: SampleWidth,
    /// Stored byte order.
    pub endian: Endian,
}

/// Options for [`open_soundfile`].
#[derive(Clone, Copy)]
pub struct OpenSpec {
    /// Header handling.
    pub header: HeaderStyle,
    /// Force this format instead of probing (ignored for raw opens).
    pub format: Option<&'static dyn SoundFormat>,
    /// Frames to skip at the start of the payload.
    pub onset_frames: u64,
}

impl Default for OpenSpec {
    fn default() -> Self {
        OpenSpec {
            header: HeaderStyle::Detect,
            format: None,
            onset_frames: 0,
        }
    }
}

/// Per-file context used by every engine in the workspace.
///
/// Carries the open OS handle, the resolved format plug-in, the sample
/// geometry, the resolved header size, and the remaining payload byte
/// limit. The opaque state slot belongs to the plug-in while the file is
/// open and is released by [`SoundFile::close`].
pub struct SoundFile {
    file: Option<File>,
    format: &'static dyn SoundFormat,
    sample_rate: usize,
    channels: usize,
    width: SampleWidth,
    endian: Endian,
    header_size: u64,
    bytes_limit: u64,
    state: Option<Box<dyn Any + Send>>,
}

impl SoundFile {
    fn new(file: File, format: &'static dyn SoundFormat) -> Self {
        SoundFile {
            file: Some(file),
            format,
            sample_rate: 44100,
            channels: 1,
            width: SampleWidth::I16,
            endian: Endian::Big,
            header_size: 0,
            bytes_limit: MAX_BYTE_LIMIT,
            state: None,
        }
    }

    /// The format plug-in serving this file.
    pub fn format(&self) -> &'static dyn SoundFormat {
        self.format
    }

    /// Sample rate declared by the header (informational only).
    pub fn sample_rate(&self) -> usize {
        self.sample_rate
    }

    /// Interleaved channel count.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Stored sample width.
    pub fn width(&self) -> SampleWidth {
        self.width
    }

    /// Stored byte order.
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Header bytes preceding the first frame.
    pub fn header_size(&self) -> u64 {
        self.header_size
    }

    /// Bytes in one frame (channels times sample width).
    pub fn bytes_per_frame(&self) -> usize {
        self.channels * self.width.bytes()
    }

    /// Payload bytes still available to stream.
    pub fn bytes_limit(&self) -> u64 {
        self.bytes_limit
    }

    /// Whole frames still available to stream.
    pub fn frames_remaining(&self) -> u64 {
        self.bytes_limit / self.bytes_per_frame() as u64
    }

    /// True while the OS handle is open.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Set channel count, sample width, and byte order together.
    pub fn set_layout(&mut self, channels: usize, width: SampleWidth, endian: Endian) -> Result<()> {
        self.channels = check_channels(channels)?;
        self.width = width;
        self.endian = endian;
        Ok(())
    }

    /// Record the header's declared sample rate.
    pub fn set_sample_rate(&mut self, rate: usize) {
        self.sample_rate = rate;
    }

    /// Record the resolved header size.
    pub fn set_header_size(&mut self, size: u64) {
        self.header_size = size;
    }

    /// Set the remaining payload byte limit.
    pub fn set_bytes_limit(&mut self, limit: u64) {
        self.bytes_limit = limit;
    }

    /// Decrement the byte limit as payload streams, clamping at zero.
    pub fn consume(&mut self, bytes: u64) {
        self.bytes_limit = self.bytes_limit.saturating_sub(bytes);
    }

    /// The open OS handle, for plug-in I/O.
    pub fn file_mut(&mut self) -> std::io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotConnected, "file is closed"))
    }

    /// Install plug-in state for the lifetime of this open.
    pub fn set_state(&mut self, state: Box<dyn Any + Send>) {
        self.state = Some(state);
    }

    /// Borrow plug-in state downcast to its concrete type.
    pub fn state_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.state.as_mut().and_then(|s| s.downcast_mut::<T>())
    }

    /// Absolute seek within the file.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        self.file_mut()?.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    /// Seek to the first byte of `frame`.
    pub fn seek_to_frame(&mut self, frame: u64) -> Result<()> {
        let format = self.format;
        format.seek_to_frame(self, frame)
    }

    /// Read payload bytes through the plug-in.
    pub fn read_samples(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let format = self.format;
        format.read_samples(self, buf)
    }

    /// Write payload bytes through the plug-in.
    pub fn write_samples(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let format = self.format;
        format.write_samples(self, buf)
    }

    /// Patch header length fields to the actual frame count.
    pub fn update_header(&mut self, frames_written: u64) -> Result<()> {
        let format = self.format;
        format.update_header(self, frames_written)
    }

    /// Surface format metadata.
    pub fn read_metadata(&mut self) -> Result<Vec<(String, String)>> {
        let format = self.format;
        format.read_metadata(self)
    }

    /// Store one metadata group; only valid before the first sample
    /// write.
    pub fn write_metadata(&mut self, group: &[String]) -> Result<()> {
        let format = self.format;
        format.write_metadata(self, group)
    }

    /// Close the file. Ownership of the plug-in state transfers to the
    /// close path, so an open that supersedes a close never observes a
    /// stale state pointer.
    pub fn close(&mut self) {
        drop(self.state.take());
        self.file = None;
    }
}

impl Drop for SoundFile {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SoundFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundFile")
            .field("format", &self.format.name())
            .field("open", &self.is_open())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("width", &self.width)
            .field("endian", &self.endian)
            .field("header_size", &self.header_size)
            .field("bytes_limit", &self.bytes_limit)
            .finish()
    }
}

/// Open a soundfile for reading.
///
/// Detection reads at most the largest registered minimum header size,
/// then either verifies the forced format's sniff or probes plug-ins in
/// registration order. The winning plug-in parses the header; afterwards
/// the handle is positioned at the onset frame and the byte limit is
/// decremented by the skipped payload, clamping at zero. Raw opens skip
/// detection entirely and trust the caller's geometry.
pub fn open_soundfile(path: &Path, spec: &OpenSpec) -> Result<SoundFile> {
    let mut file = File::open(path)?;

    match spec.header {
        HeaderStyle::Raw(raw) => {
            let file_len = file.metadata()?.len();
            let mut sf = SoundFile::new(file, raw_format());
            sf.set_layout(raw.channels, raw.width, raw.endian)?;
            sf.set_header_size(raw.header_size);
            sf.set_bytes_limit(file_len.saturating_sub(raw.header_size));
            sf.seek_to_frame(spec.onset_frames)?;
            sf.consume(spec.onset_frames * sf.bytes_per_frame() as u64);
            Ok(sf)
        }
        HeaderStyle::Detect => {
            let mut probe = vec![0u8; FormatRegistry::global().max_min_header_size()];
            let got = read_up_to(&mut file, &mut probe)?;
            let probe = &probe[..got];

            let format = match spec.format {
                Some(forced) => {
                    if forced.sniff(probe) {
                        forced
                    } else {
                        return Err(Error::BadHeader);
                    }
                }
                None => FormatRegistry::global().sniff(probe).ok_or(Error::BadHeader)?,
            };

            file.seek(SeekFrom::Start(0))?;
            let mut sf = SoundFile::new(file, format);
            format.read_header(&mut sf)?;
            sf.seek_to_frame(spec.onset_frames)?;
            sf.consume(spec.onset_frames * sf.bytes_per_frame() as u64);
            tracing::debug!(
                format = format.name(),
                channels = sf.channels(),
                sample_rate = sf.sample_rate(),
                "opened soundfile"
            );
            Ok(sf)
        }
    }
}

/// Create a soundfile for writing and emit its header.
///
/// The file is opened write+create+truncate. `frames` declares the
/// intended length; pass [`FrameCount::Max`] when the length is unknown
/// (streaming capture) and patch it with `update_header` on close.
pub fn create_soundfile(
    path: &Path,
    format: &'static dyn SoundFormat,
    channels: usize,
    width: SampleWidth,
    endian: Endian,
    sample_rate: usize,
    frames: FrameCount,
) -> Result<SoundFile> {
    let file = File::options()
        .write(true)
        .read(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    let mut sf = SoundFile::new(file, format);
    sf.set_layout(channels, width, endian)?;
    sf.set_sample_rate(sample_rate);
    let header_size = format.write_header(&mut sf, frames)?;
    sf.set_header_size(header_size as u64);
    tracing::debug!(format = format.name(), header_size, "created soundfile");
    Ok(sf)
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut got = 0;
    while got < buf.len() {
        match file.read(&mut buf[got..]) {
            Ok(0) => break,
            Ok(n) => got += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(got)
}
