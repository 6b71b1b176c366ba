//! WAVE (RIFF) container plug-in.
//!
//! Reads any chunk layout with a `fmt ` chunk ahead of `data` (including
//! WAVE_FORMAT_EXTENSIBLE), writes the canonical 44-byte header, and
//! stores metadata as a `LIST`/`INFO` chunk inserted between `fmt ` and
//! `data` before any samples land.

use std::io::{Read, Seek, SeekFrom, Write};

use ondas_core::{Endian, Error, Result, SampleWidth};

use crate::format::{FrameCount, SoundFormat};
use crate::soundfile::SoundFile;

const FORMAT_PCM: u16 = 1;
const FORMAT_FLOAT: u16 = 3;
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Canonical header: RIFF(12) + fmt(24) + data header(8).
const HEADER_SIZE: usize = 44;
/// End of the canonical fmt chunk, where a LIST chunk is inserted.
const CHUNKS_END: u64 = 36;

/// INFO sub-chunk ids for well-known metadata keys.
const INFO_KEYS: &[(&str, [u8; 4])] = &[
    ("title", *b"INAM"),
    ("artist", *b"IART"),
    ("copyright", *b"ICOP"),
    ("comment", *b"ICMT"),
    ("date", *b"ICRD"),
    ("genre", *b"IGNR"),
    ("software", *b"ISFT"),
];

struct WaveState {
    data_size_pos: u64,
    declared_data_bytes: u32,
    info: Vec<([u8; 4], String)>,
}

struct WaveFormat;

pub(crate) fn format() -> &'static dyn SoundFormat {
    static FORMAT: WaveFormat = WaveFormat;
    &FORMAT
}

impl SoundFormat for WaveFormat {
    fn name(&self) -> &'static str {
        "wave"
    }

    fn min_header_size(&self) -> usize {
        HEADER_SIZE
    }

    fn sniff(&self, buf: &[u8]) -> bool {
        buf.len() >= 12 && &buf[0..4] == b"RIFF" && &buf[8..12] == b"WAVE"
    }

    fn read_header(&self, sf: &mut SoundFile) -> Result<()> {
        let parsed = parse_header(sf.file_mut()?)?;
        sf.set_layout(parsed.channels, parsed.width, Endian::Little)?;
        sf.set_sample_rate(parsed.sample_rate);
        sf.set_header_size(parsed.header_size);
        sf.set_bytes_limit(parsed.data_bytes);
        Ok(())
    }

    fn write_header(&self, sf: &mut SoundFile, frames: FrameCount) -> Result<usize> {
        let bpf = sf.bytes_per_frame();
        let data_bytes =
            frames.payload_bytes(bpf, u64::from(u32::MAX) - CHUNKS_END) as u32;
        let code = if sf.width() == SampleWidth::F32 {
            FORMAT_FLOAT
        } else {
            FORMAT_PCM
        };

        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(b"RIFF");
        header.extend_from_slice(&(CHUNKS_END as u32 + data_bytes).to_le_bytes());
        header.extend_from_slice(b"WAVE");
        header.extend_from_slice(b"fmt ");
        header.extend_from_slice(&16u32.to_le_bytes());
        header.extend_from_slice(&code.to_le_bytes());
        header.extend_from_slice(&(sf.channels() as u16).to_le_bytes());
        header.extend_from_slice(&(sf.sample_rate() as u32).to_le_bytes());
        header.extend_from_slice(&((sf.sample_rate() * bpf) as u32).to_le_bytes());
        header.extend_from_slice(&(bpf as u16).to_le_bytes());
        header.extend_from_slice(&(sf.width().bits() as u16).to_le_bytes());
        header.extend_from_slice(b"data");
        header.extend_from_slice(&data_bytes.to_le_bytes());
        debug_assert_eq!(header.len(), HEADER_SIZE);

        sf.file_mut()?.write_all(&header)?;
        sf.set_state(Box::new(WaveState {
            data_size_pos: HEADER_SIZE as u64 - 4,
            declared_data_bytes: data_bytes,
            info: Vec::new(),
        }));
        Ok(HEADER_SIZE)
    }

    fn update_header(&self, sf: &mut SoundFile, frames_written: u64) -> Result<()> {
        let bpf = sf.bytes_per_frame() as u64;
        let header_size = sf.header_size();
        let Some(state) = sf.state_mut::<WaveState>() else {
            return Ok(());
        };
        let data_size_pos = state.data_size_pos;
        let data_bytes = (frames_written * bpf).min(u64::from(u32::MAX)) as u32;
        let riff_bytes = (header_size - 8) as u32 + data_bytes;

        let file = sf.file_mut()?;
        file.seek(SeekFrom::Start(4))?;
        file.write_all(&riff_bytes.to_le_bytes())?;
        file.seek(SeekFrom::Start(data_size_pos))?;
        file.write_all(&data_bytes.to_le_bytes())?;
        Ok(())
    }

    fn read_metadata(&self, sf: &mut SoundFile) -> Result<Vec<(String, String)>> {
        let file = sf.file_mut()?;
        let saved = file.stream_position()?;
        file.seek(SeekFrom::Start(12))?;

        let mut items = Vec::new();
        loop {
            let mut chunk = [0u8; 8];
            if file.read_exact(&mut chunk).is_err() {
                break;
            }
            let size = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]) as u64;
            if &chunk[0..4] == b"LIST" && size >= 4 {
                let mut body = vec![0u8; size as usize];
                file.read_exact(&mut body)?;
                if &body[0..4] == b"INFO" {
                    parse_info_list(&body[4..], &mut items);
                }
                if size % 2 == 1 {
                    file.seek(SeekFrom::Current(1))?;
                }
            } else {
                file.seek(SeekFrom::Current((size + (size & 1)) as i64))?;
            }
        }
        file.seek(SeekFrom::Start(saved))?;
        Ok(items)
    }

    fn write_metadata(&self, sf: &mut SoundFile, group: &[String]) -> Result<()> {
        let Some((key, value)) = group.split_first() else {
            return Err(Error::Usage("meta <key> <value...>".into()));
        };
        let id = info_key_id(key)?;
        let value = value.join(" ");

        let Some(state) = sf.state_mut::<WaveState>() else {
            return Err(Error::Usage("metadata must follow header creation".into()));
        };
        state.info.push((id, value));

        // Rebuild the LIST chunk and re-emit the data chunk header after
        // it; nothing has been written past the header yet.
        let mut list_body = Vec::new();
        list_body.extend_from_slice(b"INFO");
        for (id, value) in &state.info {
            let mut bytes = value.clone().into_bytes();
            bytes.push(0);
            if bytes.len() % 2 == 1 {
                bytes.push(0);
            }
            list_body.extend_from_slice(id);
            list_body.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            list_body.extend_from_slice(&bytes);
        }
        let declared = state.declared_data_bytes;

        let mut tail = Vec::new();
        tail.extend_from_slice(b"LIST");
        tail.extend_from_slice(&(list_body.len() as u32).to_le_bytes());
        tail.extend_from_slice(&list_body);
        tail.extend_from_slice(b"data");
        tail.extend_from_slice(&declared.to_le_bytes());

        let header_size = CHUNKS_END + tail.len() as u64;
        let file = sf.file_mut()?;
        file.seek(SeekFrom::Start(CHUNKS_END))?;
        file.write_all(&tail)?;
        file.seek(SeekFrom::Start(4))?;
        file.write_all(&((header_size - 8) as u32 + declared).to_le_bytes())?;
        file.seek(SeekFrom::Start(header_size))?;

        sf.set_header_size(header_size);
        if let Some(state) = sf.state_mut::<WaveState>() {
            state.data_size_pos = header_size - 4;
        }
        Ok(())
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".wav", ".wave"]
    }

    fn endianness(&self, requested: Option<Endian>) -> Endian {
        if requested == Some(Endian::Big) {
            tracing::warn!("WAVE files are little-endian; ignoring byte-order request");
        }
        Endian::Little
    }
}

struct ParsedHeader {
    channels: usize,
    width: SampleWidth,
    sample_rate: usize,
    header_size: u64,
    data_bytes: u64,
}

fn parse_header(file: &mut std::fs::File) -> Result<ParsedHeader> {
    let mut riff = [0u8; 12];
    file.read_exact(&mut riff)?;
    if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
        return Err(Error::BadHeader);
    }

    let mut fmt: Option<(usize, SampleWidth, usize)> = None;
    loop {
        let mut chunk = [0u8; 8];
        if file.read_exact(&mut chunk).is_err() {
            return Err(Error::BadHeader);
        }
        let id = &chunk[0..4];
        let size = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]) as u64;
        match id {
            b"fmt " => {
                if size < 16 {
                    return Err(Error::BadHeader);
                }
                let mut body = vec![0u8; size as usize];
                file.read_exact(&mut body)?;
                let mut code = u16::from_le_bytes([body[0], body[1]]);
                let channels = u16::from_le_bytes([body[2], body[3]]) as usize;
                let rate = u32::from_le_bytes([body[4], body[5], body[6], body[7]]) as usize;
                let bits = u16::from_le_bytes([body[14], body[15]]);
                if code == FORMAT_EXTENSIBLE {
                    // The real format code is the first word of the
                    // sub-format GUID.
                    if size < 40 {
                        return Err(Error::BadHeader);
                    }
                    code = u16::from_le_bytes([body[24], body[25]]);
                }
                let width = match (code, bits) {
                    (FORMAT_PCM, 16) => SampleWidth::I16,
                    (FORMAT_PCM, 24) => SampleWidth::I24,
                    (FORMAT_FLOAT, 32) => SampleWidth::F32,
                    _ => {
                        return Err(Error::UnsupportedSampleFormat(format!(
                            "WAVE format code {code}, {bits} bits"
                        )))
                    }
                };
                if size % 2 == 1 {
                    file.seek(SeekFrom::Current(1))?;
                }
                fmt = Some((channels, width, rate));
            }
            b"data" => {
                let (channels, width, sample_rate) = fmt.ok_or(Error::BadHeader)?;
                return Ok(ParsedHeader {
                    channels,
                    width,
                    sample_rate,
                    header_size: file.stream_position()?,
                    data_bytes: size,
                });
            }
            _ => {
                file.seek(SeekFrom::Current((size + (size & 1)) as i64))?;
            }
        }
    }
}

fn info_key_id(key: &str) -> Result<[u8; 4]> {
    if let Some((_, id)) = INFO_KEYS.iter().find(|(name, _)| *name == key) {
        return Ok(*id);
    }
    let bytes = key.as_bytes();
    if bytes.len() == 4 && bytes.iter().all(u8::is_ascii_uppercase) {
        return Ok([bytes[0], bytes[1], bytes[2], bytes[3]]);
    }
    Err(Error::Usage(format!("unknown metadata key '{key}'")))
}

fn info_key_name(id: [u8; 4]) -> String {
    INFO_KEYS
        .iter()
        .find(|(_, known)| *known == id)
        .map_or_else(
            || String::from_utf8_lossy(&id).into_owned(),
            |(name, _)| (*name).to_string(),
        )
}

fn parse_info_list(mut body: &[u8], items: &mut Vec<(String, String)>) {
    while body.len() >= 8 {
        let id = [body[0], body[1], body[2], body[3]];
        let size = u32::from_le_bytes([body[4], body[5], body[6], body[7]]) as usize;
        body = &body[8..];
        if size > body.len() {
            break;
        }
        let text = String::from_utf8_lossy(&body[..size])
            .trim_end_matches('\0')
            .to_string();
        items.push((info_key_name(id), text));
        let advance = size + (size & 1);
        body = &body[advance.min(body.len())..];
    }
}
