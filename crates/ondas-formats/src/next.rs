//! NeXT/Sun (.au/.snd) container plug-in.
//!
//! Six 32-bit header words plus an info string; the `.snd` magic appears
//! byte-reversed in little-endian files, and every header word follows
//! the file's byte order. A data size of 0xFFFFFFFF means "unknown".

use std::io::{Read, Seek, SeekFrom, Write};

use ondas_core::{Endian, Error, Result, SampleWidth};

use crate::format::{FrameCount, SoundFormat};
use crate::soundfile::SoundFile;

const MAGIC: u32 = 0x2E73_6E64; // ".snd"
const UNKNOWN_SIZE: u32 = u32::MAX;

const ENCODING_LINEAR_16: u32 = 3;
const ENCODING_LINEAR_24: u32 = 4;
const ENCODING_FLOAT: u32 = 6;

/// Six header words plus a four-byte info field.
const HEADER_SIZE: usize = 28;
const DATA_SIZE_POS: u64 = 8;

struct NextState;

struct NextFormat;

pub(crate) fn format() -> &'static dyn SoundFormat {
    static FORMAT: NextFormat = NextFormat;
    &FORMAT
}

fn get_u32(bytes: &[u8], endian: Endian) -> u32 {
    let word = [bytes[0], bytes[1], bytes[2], bytes[3]];
    match endian {
        Endian::Big => u32::from_be_bytes(word),
        Endian::Little => u32::from_le_bytes(word),
    }
}

fn put_u32(value: u32, endian: Endian) -> [u8; 4] {
    match endian {
        Endian::Big => value.to_be_bytes(),
        Endian::Little => value.to_le_bytes(),
    }
}

impl SoundFormat for NextFormat {
    fn name(&self) -> &'static str {
        "next"
    }

    fn min_header_size(&self) -> usize {
        HEADER_SIZE
    }

    fn sniff(&self, buf: &[u8]) -> bool {
        buf.len() >= 4
            && (get_u32(buf, Endian::Big) == MAGIC || get_u32(buf, Endian::Little) == MAGIC)
    }

    fn read_header(&self, sf: &mut SoundFile) -> Result<()> {
        let mut head = [0u8; 24];
        sf.file_mut()?.read_exact(&mut head)?;
        let endian = if get_u32(&head, Endian::Big) == MAGIC {
            Endian::Big
        } else if get_u32(&head, Endian::Little) == MAGIC {
            Endian::Little
        } else {
            return Err(Error::BadHeader);
        };

        let onset = get_u32(&head[4..], endian);
        let length = get_u32(&head[8..], endian);
        let encoding = get_u32(&head[12..], endian);
        let rate = get_u32(&head[16..], endian) as usize;
        let channels = get_u32(&head[20..], endian) as usize;
        if (onset as usize) < 24 {
            return Err(Error::BadHeader);
        }

        let width = match encoding {
            ENCODING_LINEAR_16 => SampleWidth::I16,
            ENCODING_LINEAR_24 => SampleWidth::I24,
            ENCODING_FLOAT => SampleWidth::F32,
            _ => {
                return Err(Error::UnsupportedSampleFormat(format!(
                    "NeXT encoding {encoding}"
                )))
            }
        };

        let file_len = sf.file_mut()?.metadata()?.len();
        sf.set_layout(channels, width, endian)?;
        sf.set_sample_rate(rate);
        sf.set_header_size(u64::from(onset));
        sf.set_bytes_limit(if length == UNKNOWN_SIZE {
            // Unknown length: the payload runs to end of file.
            file_len.saturating_sub(u64::from(onset))
        } else {
            u64::from(length)
        });
        Ok(())
    }

    fn write_header(&self, sf: &mut SoundFile, frames: FrameCount) -> Result<usize> {
        let endian = sf.endian();
        let data_bytes = match frames {
            FrameCount::Max => UNKNOWN_SIZE,
            FrameCount::Frames(n) => {
                (n.saturating_mul(sf.bytes_per_frame() as u64)).min(u64::from(u32::MAX)) as u32
            }
        };
        let encoding = match sf.width() {
            SampleWidth::I16 => ENCODING_LINEAR_16,
            SampleWidth::I24 => ENCODING_LINEAR_24,
            SampleWidth::F32 => ENCODING_FLOAT,
        };

        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(&put_u32(MAGIC, endian));
        header.extend_from_slice(&put_u32(HEADER_SIZE as u32, endian));
        header.extend_from_slice(&put_u32(data_bytes, endian));
        header.extend_from_slice(&put_u32(encoding, endian));
        header.extend_from_slice(&put_u32(sf.sample_rate() as u32, endian));
        header.extend_from_slice(&put_u32(sf.channels() as u32, endian));
        header.extend_from_slice(&[0u8; 4]); // empty info string
        debug_assert_eq!(header.len(), HEADER_SIZE);

        sf.file_mut()?.write_all(&header)?;
        sf.set_state(Box::new(NextState));
        Ok(HEADER_SIZE)
    }

    fn update_header(&self, sf: &mut SoundFile, frames_written: u64) -> Result<()> {
        let endian = sf.endian();
        let bpf = sf.bytes_per_frame() as u64;
        if sf.state_mut::<NextState>().is_none() {
            return Ok(());
        }
        let data_bytes = (frames_written * bpf).min(u64::from(u32::MAX)) as u32;
        let file = sf.file_mut()?;
        file.seek(SeekFrom::Start(DATA_SIZE_POS))?;
        file.write_all(&put_u32(data_bytes, endian))?;
        Ok(())
    }

    fn read_metadata(&self, sf: &mut SoundFile) -> Result<Vec<(String, String)>> {
        let onset = sf.header_size();
        let file = sf.file_mut()?;
        if onset <= 24 {
            return Ok(Vec::new());
        }
        let saved = file.stream_position()?;
        file.seek(SeekFrom::Start(24))?;
        let mut info = vec![0u8; (onset - 24) as usize];
        file.read_exact(&mut info)?;
        file.seek(SeekFrom::Start(saved))?;

        Ok(info
            .split(|&b| b == 0)
            .filter(|s| !s.is_empty())
            .map(|s| ("info".to_string(), String::from_utf8_lossy(s).into_owned()))
            .collect())
    }

    fn write_metadata(&self, sf: &mut SoundFile, group: &[String]) -> Result<()> {
        if group.is_empty() {
            return Err(Error::Usage("meta <text...>".into()));
        }
        if sf.state_mut::<NextState>().is_none() {
            return Err(Error::Usage("metadata must follow header creation".into()));
        }
        let endian = sf.endian();
        let onset = sf.header_size();

        // Append a NUL-terminated string to the info area, padded to a
        // word boundary, and push the data offset out; no samples have
        // been written yet.
        let mut text = group.join(" ").into_bytes();
        text.push(0);
        while text.len() % 4 != 0 {
            text.push(0);
        }
        let new_onset = onset + text.len() as u64;

        let file = sf.file_mut()?;
        file.seek(SeekFrom::Start(onset))?;
        file.write_all(&text)?;
        file.seek(SeekFrom::Start(4))?;
        file.write_all(&put_u32(new_onset as u32, endian))?;
        file.seek(SeekFrom::Start(new_onset))?;
        sf.set_header_size(new_onset);
        Ok(())
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".au", ".snd"]
    }

    fn endianness(&self, requested: Option<Endian>) -> Endian {
        requested.unwrap_or(Endian::Big)
    }
}
