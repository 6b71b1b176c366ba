//! The format plug-in contract and the process-wide registry.

use std::io::{Read, Write};
use std::sync::OnceLock;

use ondas_core::{Endian, Error, Result};

use crate::soundfile::SoundFile;

/// Most formats the registry will hold.
pub const MAX_FORMATS: usize = 8;

/// Frame count declared when a header is first written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCount {
    /// The file will hold this many frames.
    Frames(u64),
    /// Length unknown at open time (streaming capture); the format
    /// declares its container maximum and the real count is patched in
    /// by `update_header` on close.
    Max,
}

impl FrameCount {
    /// Payload bytes for a frame geometry, clamped to `limit`.
    pub fn payload_bytes(self, bytes_per_frame: usize, limit: u64) -> u64 {
        match self {
            FrameCount::Frames(n) => (n.saturating_mul(bytes_per_frame as u64)).min(limit),
            FrameCount::Max => limit,
        }
    }
}

/// Contract implemented by every container format plug-in.
///
/// A plug-in is a stateless singleton; anything it needs to remember
/// about one open file (patch offsets, pending metadata) lives in the
/// descriptor's opaque state slot and is released when the file closes.
pub trait SoundFormat: Send + Sync {
    /// Printable name, also used for `-<name>` format flags.
    fn name(&self) -> &'static str;

    /// Smallest complete header this format produces. The open routine
    /// reads the largest registered minimum before sniffing.
    fn min_header_size(&self) -> usize;

    /// True iff `buf` plausibly begins a file of this format.
    fn sniff(&self, buf: &[u8]) -> bool;

    /// Parse the header with the handle at byte 0 and populate the
    /// descriptor's geometry, header size, and byte limit.
    fn read_header(&self, sf: &mut SoundFile) -> Result<()>;

    /// Emit a header declaring `frames` frames and return its size.
    fn write_header(&self, sf: &mut SoundFile, frames: FrameCount) -> Result<usize>;

    /// Patch length fields after the final frame count is known.
    /// Idempotent; a no-op on descriptors this plug-in did not create.
    fn update_header(&self, sf: &mut SoundFile, frames_written: u64) -> Result<()>;

    /// Absolute seek to the first byte of `frame`.
    fn seek_to_frame(&self, sf: &mut SoundFile, frame: u64) -> Result<()> {
        let pos = sf.header_size() + frame * sf.bytes_per_frame() as u64;
        sf.seek(pos)
    }

    /// Read payload bytes at the current position.
    fn read_samples(&self, sf: &mut SoundFile, buf: &mut [u8]) -> std::io::Result<usize> {
        sf.file_mut()?.read(buf)
    }

    /// Write payload bytes at the current position.
    fn write_samples(&self, sf: &mut SoundFile, buf: &[u8]) -> std::io::Result<usize> {
        sf.file_mut()?.write(buf)
    }

    /// Surface format-specific metadata as key/value pairs.
    fn read_metadata(&self, _sf: &mut SoundFile) -> Result<Vec<(String, String)>> {
        Err(Error::MetadataUnsupported(self.name()))
    }

    /// Store one metadata group. Only valid between `write_header` and
    /// the first sample write.
    fn write_metadata(&self, _sf: &mut SoundFile, _group: &[String]) -> Result<()> {
        Err(Error::MetadataUnsupported(self.name()))
    }

    /// Filename extensions this format owns.
    fn extensions(&self) -> &'static [&'static str];

    /// True iff the filename carries one of this format's extensions.
    fn has_extension(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        self.extensions().iter().any(|ext| lower.ends_with(ext))
    }

    /// Complete a filename with this format's preferred extension.
    fn add_extension(&self, name: &str) -> String {
        match self.extensions().first() {
            Some(ext) if !self.has_extension(name) => format!("{name}{ext}"),
            _ => name.to_string(),
        }
    }

    /// Map a caller's byte-order request to what this format will use.
    /// Formats with a fixed byte order warn when the request is
    /// overridden.
    fn endianness(&self, requested: Option<Endian>) -> Endian;
}

/// Ordered, bounded, process-wide set of container formats.
///
/// Registration order defines sniff priority and the default format for
/// writes with no format flag and no recognized extension. The registry
/// is append-only after initialization and safe to read from any thread.
pub struct FormatRegistry {
    formats: Vec<&'static dyn SoundFormat>,
}

impl FormatRegistry {
    fn with_builtins() -> Self {
        let mut registry = FormatRegistry {
            formats: Vec::with_capacity(MAX_FORMATS),
        };
        registry.register(crate::wave::format());
        registry.register(crate::aiff::format());
        registry.register(crate::caf::format());
        registry.register(crate::next::format());
        registry
    }

    /// The process-wide registry, initialized with the built-ins on
    /// first use.
    pub fn global() -> &'static FormatRegistry {
        static REGISTRY: OnceLock<FormatRegistry> = OnceLock::new();
        REGISTRY.get_or_init(FormatRegistry::with_builtins)
    }

    fn register(&mut self, format: &'static dyn SoundFormat) {
        if self.formats.len() >= MAX_FORMATS {
            tracing::warn!(name = format.name(), "format registry full, ignoring");
            return;
        }
        self.formats.push(format);
    }

    /// Registered formats in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &'static dyn SoundFormat> + '_ {
        self.formats.iter().copied()
    }

    /// The default format (first registered).
    pub fn default_format(&self) -> &'static dyn SoundFormat {
        self.formats[0]
    }

    /// Look a format up by name. `nextstep` is accepted as an alias for
    /// the NeXT/Sun format.
    pub fn by_name(&self, name: &str) -> Option<&'static dyn SoundFormat> {
        let name = if name == "nextstep" { "next" } else { name };
        self.iter().find(|f| f.name() == name)
    }

    /// Deduce a format from a filename extension.
    pub fn by_extension(&self, filename: &str) -> Option<&'static dyn SoundFormat> {
        self.iter().find(|f| f.has_extension(filename))
    }

    /// Probe formats in registration order against sniff bytes.
    pub fn sniff(&self, buf: &[u8]) -> Option<&'static dyn SoundFormat> {
        self.iter().find(|f| f.sniff(buf))
    }

    /// Largest minimum header size across registered formats; the open
    /// routine reads this many bytes before sniffing.
    pub fn max_min_header_size(&self) -> usize {
        self.iter().map(|f| f.min_header_size()).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_order_and_default() {
        let reg = FormatRegistry::global();
        let names: Vec<_> = reg.iter().map(|f| f.name()).collect();
        assert_eq!(names, ["wave", "aiff", "caf", "next"]);
        assert_eq!(reg.default_format().name(), "wave");
    }

    #[test]
    fn lookup_by_name_and_alias() {
        let reg = FormatRegistry::global();
        assert_eq!(reg.by_name("aiff").unwrap().name(), "aiff");
        assert_eq!(reg.by_name("nextstep").unwrap().name(), "next");
        assert!(reg.by_name("flac").is_none());
    }

    #[test]
    fn lookup_by_extension() {
        let reg = FormatRegistry::global();
        assert_eq!(reg.by_extension("x.wav").unwrap().name(), "wave");
        assert_eq!(reg.by_extension("x.AIF").unwrap().name(), "aiff");
        assert_eq!(reg.by_extension("take2.caf").unwrap().name(), "caf");
        assert_eq!(reg.by_extension("x.au").unwrap().name(), "next");
        assert!(reg.by_extension("x.mp3").is_none());
    }

    #[test]
    fn sniff_buffer_is_bounded() {
        let reg = FormatRegistry::global();
        let max = reg.max_min_header_size();
        assert!(max >= 28 && max <= 128);
    }
}
