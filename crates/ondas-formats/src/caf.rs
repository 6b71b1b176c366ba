//! Apple Core Audio Format plug-in.
//!
//! Big-endian chunk framing with an `lpcm` description; payload bytes may
//! be either endianness. A `data` chunk size of -1 is the container's
//! "unknown length" sentinel, which maps directly onto streaming capture.
//! Metadata travels in an `info` chunk of key/value C-strings.

use std::io::{Read, Seek, SeekFrom, Write};

use ondas_core::{Endian, Error, Result, SampleWidth};

use crate::format::{FrameCount, SoundFormat};
use crate::soundfile::SoundFile;

const FLAG_FLOAT: u32 = 1 << 0;
const FLAG_LITTLE_ENDIAN: u32 = 1 << 1;

/// Canonical header: file header(8) + desc(44) + data header(12) + edit
/// count(4).
const HEADER_SIZE: usize = 68;
/// Where the canonical `data` chunk begins.
const DESC_END: u64 = 52;

struct CafState {
    data_size_pos: u64,
    declared_data_bytes: i64,
    info: Vec<(String, String)>,
}

struct CafFormat;

pub(crate) fn format() -> &'static dyn SoundFormat {
    static FORMAT: CafFormat = CafFormat;
    &FORMAT
}

impl SoundFormat for CafFormat {
    fn name(&self) -> &'static str {
        "caf"
    }

    fn min_header_size(&self) -> usize {
        HEADER_SIZE
    }

    fn sniff(&self, buf: &[u8]) -> bool {
        buf.len() >= 8 && &buf[0..4] == b"caff" && buf[4..6] == [0, 1]
    }

    fn read_header(&self, sf: &mut SoundFile) -> Result<()> {
        let parsed = parse_header(sf.file_mut()?)?;
        sf.set_layout(parsed.channels, parsed.width, parsed.endian)?;
        sf.set_sample_rate(parsed.sample_rate);
        sf.set_header_size(parsed.header_size);
        sf.set_bytes_limit(parsed.data_bytes);
        Ok(())
    }

    fn write_header(&self, sf: &mut SoundFile, frames: FrameCount) -> Result<usize> {
        let bpf = sf.bytes_per_frame();
        let data_bytes: i64 = match frames {
            FrameCount::Max => -1,
            FrameCount::Frames(n) => {
                4 + (n.saturating_mul(bpf as u64)).min(i64::MAX as u64 - 4) as i64
            }
        };
        let mut flags = 0u32;
        if sf.width() == SampleWidth::F32 {
            flags |= FLAG_FLOAT;
        }
        if sf.endian() == Endian::Little {
            flags |= FLAG_LITTLE_ENDIAN;
        }

        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(b"caff");
        header.extend_from_slice(&1u16.to_be_bytes()); // version
        header.extend_from_slice(&0u16.to_be_bytes()); // flags
        header.extend_from_slice(b"desc");
        header.extend_from_slice(&32i64.to_be_bytes());
        header.extend_from_slice(&(sf.sample_rate() as f64).to_be_bytes());
        header.extend_from_slice(b"lpcm");
        header.extend_from_slice(&flags.to_be_bytes());
        header.extend_from_slice(&(bpf as u32).to_be_bytes()); // bytes per packet
        header.extend_from_slice(&1u32.to_be_bytes()); // frames per packet
        header.extend_from_slice(&(sf.channels() as u32).to_be_bytes());
        header.extend_from_slice(&(sf.width().bits() as u32).to_be_bytes());
        header.extend_from_slice(b"data");
        header.extend_from_slice(&data_bytes.to_be_bytes());
        header.extend_from_slice(&0u32.to_be_bytes()); // edit count
        debug_assert_eq!(header.len(), HEADER_SIZE);

        sf.file_mut()?.write_all(&header)?;
        sf.set_state(Box::new(CafState {
            data_size_pos: DESC_END + 4,
            declared_data_bytes: data_bytes,
            info: Vec::new(),
        }));
        Ok(HEADER_SIZE)
    }

    fn update_header(&self, sf: &mut SoundFile, frames_written: u64) -> Result<()> {
        let bpf = sf.bytes_per_frame() as u64;
        let Some(state) = sf.state_mut::<CafState>() else {
            return Ok(());
        };
        let data_size_pos = state.data_size_pos;
        let data_bytes = 4 + (frames_written * bpf).min(i64::MAX as u64 - 4) as i64;

        let file = sf.file_mut()?;
        file.seek(SeekFrom::Start(data_size_pos))?;
        file.write_all(&data_bytes.to_be_bytes())?;
        Ok(())
    }

    fn read_metadata(&self, sf: &mut SoundFile) -> Result<Vec<(String, String)>> {
        let file = sf.file_mut()?;
        let saved = file.stream_position()?;
        file.seek(SeekFrom::Start(8))?;

        let mut items = Vec::new();
        loop {
            let mut chunk = [0u8; 12];
            if file.read_exact(&mut chunk).is_err() {
                break;
            }
            let size = chunk_size(&chunk);
            if &chunk[0..4] == b"info" && size >= 4 {
                let mut body = vec![0u8; size as usize];
                file.read_exact(&mut body)?;
                parse_info(&body, &mut items);
                break;
            }
            if size < 0 {
                break; // unknown-length data chunk runs to EOF
            }
            file.seek(SeekFrom::Current(size))?;
        }
        file.seek(SeekFrom::Start(saved))?;
        Ok(items)
    }

    fn write_metadata(&self, sf: &mut SoundFile, group: &[String]) -> Result<()> {
        let Some((key, value)) = group.split_first() else {
            return Err(Error::Usage("meta <key> <value...>".into()));
        };
        let entry = (key.clone(), value.join(" "));

        let Some(state) = sf.state_mut::<CafState>() else {
            return Err(Error::Usage("metadata must follow header creation".into()));
        };
        state.info.push(entry);

        // Rebuild the info chunk and re-emit the data chunk header after
        // it; nothing has been written past the header yet.
        let mut body = Vec::new();
        body.extend_from_slice(&(state.info.len() as u32).to_be_bytes());
        for (key, value) in &state.info {
            body.extend_from_slice(key.as_bytes());
            body.push(0);
            body.extend_from_slice(value.as_bytes());
            body.push(0);
        }
        let declared = state.declared_data_bytes;

        let mut tail = Vec::new();
        tail.extend_from_slice(b"info");
        tail.extend_from_slice(&(body.len() as i64).to_be_bytes());
        tail.extend_from_slice(&body);
        let data_chunk_pos = DESC_END + tail.len() as u64;
        tail.extend_from_slice(b"data");
        tail.extend_from_slice(&declared.to_be_bytes());
        tail.extend_from_slice(&0u32.to_be_bytes()); // edit count

        let file = sf.file_mut()?;
        file.seek(SeekFrom::Start(DESC_END))?;
        file.write_all(&tail)?;

        sf.set_header_size(DESC_END + tail.len() as u64);
        if let Some(state) = sf.state_mut::<CafState>() {
            state.data_size_pos = data_chunk_pos + 4;
        }
        Ok(())
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".caf"]
    }

    fn endianness(&self, requested: Option<Endian>) -> Endian {
        requested.unwrap_or(Endian::Big)
    }
}

struct ParsedHeader {
    channels: usize,
    width: SampleWidth,
    endian: Endian,
    sample_rate: usize,
    header_size: u64,
    data_bytes: u64,
}

fn parse_header(file: &mut std::fs::File) -> Result<ParsedHeader> {
    let mut magic = [0u8; 8];
    file.read_exact(&mut magic)?;
    if &magic[0..4] != b"caff" || magic[4..6] != [0, 1] {
        return Err(Error::BadHeader);
    }

    let mut desc: Option<(usize, SampleWidth, Endian, usize)> = None;
    loop {
        let mut chunk = [0u8; 12];
        if file.read_exact(&mut chunk).is_err() {
            return Err(Error::BadHeader);
        }
        let id = &chunk[0..4];
        let size = chunk_size(&chunk);
        match id {
            b"desc" => {
                if size < 32 {
                    return Err(Error::BadHeader);
                }
                let mut body = vec![0u8; size as usize];
                file.read_exact(&mut body)?;
                let rate = f64::from_be_bytes([
                    body[0], body[1], body[2], body[3], body[4], body[5], body[6], body[7],
                ]);
                if &body[8..12] != b"lpcm" {
                    return Err(Error::UnsupportedSampleFormat(format!(
                        "CAF codec '{}'",
                        String::from_utf8_lossy(&body[8..12])
                    )));
                }
                let flags = be_u32(&body, 12);
                let channels = be_u32(&body, 24) as usize;
                let bits = be_u32(&body, 28);
                let is_float = flags & FLAG_FLOAT != 0;
                let width = match (is_float, bits) {
                    (false, 16) => SampleWidth::I16,
                    (false, 24) => SampleWidth::I24,
                    (true, 32) => SampleWidth::F32,
                    _ => {
                        return Err(Error::UnsupportedSampleFormat(format!(
                            "CAF {bits}-bit {} samples",
                            if is_float { "float" } else { "integer" }
                        )))
                    }
                };
                let endian = if flags & FLAG_LITTLE_ENDIAN != 0 {
                    Endian::Little
                } else {
                    Endian::Big
                };
                desc = Some((channels, width, endian, rate.round() as usize));
            }
            b"data" => {
                let (channels, width, endian, sample_rate) = desc.ok_or(Error::BadHeader)?;
                // The chunk body starts with a 4-byte edit count.
                let mut edit = [0u8; 4];
                file.read_exact(&mut edit)?;
                let header_size = file.stream_position()?;
                let data_bytes = if size < 0 {
                    // Unknown length: the payload runs to end of file.
                    file.metadata()?.len().saturating_sub(header_size)
                } else {
                    (size as u64).saturating_sub(4)
                };
                return Ok(ParsedHeader {
                    channels,
                    width,
                    endian,
                    sample_rate,
                    header_size,
                    data_bytes,
                });
            }
            _ => {
                if size < 0 {
                    return Err(Error::BadHeader);
                }
                file.seek(SeekFrom::Current(size))?;
            }
        }
    }
}

fn be_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn chunk_size(chunk: &[u8; 12]) -> i64 {
    i64::from_be_bytes([
        chunk[4], chunk[5], chunk[6], chunk[7], chunk[8], chunk[9], chunk[10], chunk[11],
    ])
}

fn parse_info(body: &[u8], items: &mut Vec<(String, String)>) {
    if body.len() < 4 {
        return;
    }
    let mut strings = body[4..].split(|&b| b == 0);
    while let (Some(key), Some(value)) = (strings.next(), strings.next()) {
        if key.is_empty() {
            break;
        }
        items.push((
            String::from_utf8_lossy(key).into_owned(),
            String::from_utf8_lossy(value).into_owned(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FrameCount;
    use crate::soundfile::{create_soundfile, open_soundfile, OpenSpec};
    use tempfile::tempdir;

    #[test]
    fn header_roundtrip_little_endian_float() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.caf");
        let mut sf = create_soundfile(
            &path,
            format(),
            2,
            SampleWidth::F32,
            Endian::Little,
            96000,
            FrameCount::Frames(5),
        )
        .unwrap();
        sf.write_samples(&[0u8; 40]).unwrap();
        sf.update_header(5).unwrap();
        sf.close();

        let sf = open_soundfile(&path, &OpenSpec::default()).unwrap();
        assert_eq!(sf.format().name(), "caf");
        assert_eq!(sf.channels(), 2);
        assert_eq!(sf.width(), SampleWidth::F32);
        assert_eq!(sf.endian(), Endian::Little);
        assert_eq!(sf.sample_rate(), 96000);
        assert_eq!(sf.header_size(), 68);
        assert_eq!(sf.bytes_limit(), 40);
    }

    #[test]
    fn unknown_length_sentinel_reads_to_eof() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stream.caf");
        let mut sf = create_soundfile(
            &path,
            format(),
            1,
            SampleWidth::I16,
            Endian::Big,
            44100,
            FrameCount::Max,
        )
        .unwrap();
        sf.write_samples(&[0u8; 20]).unwrap();
        sf.close();

        // The -1 sentinel resolves to whatever landed before close.
        let sf = open_soundfile(&path, &OpenSpec::default()).unwrap();
        assert_eq!(sf.bytes_limit(), 20);
    }

    #[test]
    fn metadata_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.caf");
        let mut sf = create_soundfile(
            &path,
            format(),
            1,
            SampleWidth::I16,
            Endian::Big,
            44100,
            FrameCount::Frames(2),
        )
        .unwrap();
        sf.write_metadata(&["tempo".into(), "120".into()]).unwrap();
        sf.write_samples(&[0u8; 4]).unwrap();
        sf.update_header(2).unwrap();
        sf.close();

        let mut sf = open_soundfile(&path, &OpenSpec::default()).unwrap();
        assert_eq!(sf.bytes_limit(), 4);
        let meta = sf.read_metadata().unwrap();
        assert_eq!(meta, vec![("tempo".to_string(), "120".to_string())]);
    }
}
