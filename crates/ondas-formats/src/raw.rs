//! Headerless raw passthrough.
//!
//! Lives outside the registry: it never participates in sniffing and is
//! selected only when the caller supplies the geometry explicitly.

use ondas_core::{Endian, Error, Result};

use crate::format::{FrameCount, SoundFormat};
use crate::soundfile::SoundFile;

struct RawFormat;

/// The raw plug-in singleton.
pub fn raw_format() -> &'static dyn SoundFormat {
    static FORMAT: RawFormat = RawFormat;
    &FORMAT
}

impl SoundFormat for RawFormat {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn min_header_size(&self) -> usize {
        0
    }

    fn sniff(&self, _buf: &[u8]) -> bool {
        false
    }

    fn read_header(&self, _sf: &mut SoundFile) -> Result<()> {
        // Raw opens bypass header parsing entirely.
        Err(Error::BadHeader)
    }

    fn write_header(&self, _sf: &mut SoundFile, _frames: FrameCount) -> Result<usize> {
        Ok(0)
    }

    fn update_header(&self, _sf: &mut SoundFile, _frames_written: u64) -> Result<()> {
        Ok(())
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[]
    }

    fn endianness(&self, requested: Option<Endian>) -> Endian {
        requested.unwrap_or(Endian::native())
    }
}
