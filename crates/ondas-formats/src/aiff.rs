//! AIFF (IFF) container plug-in.
//!
//! Big-endian 16/24-bit PCM. Uncompressed AIFF-C (`NONE`) is accepted on
//! read; compressed variants and float payloads are rejected. The sample
//! rate travels as an 80-bit extended float in the `COMM` chunk.

use std::io::{Read, Seek, SeekFrom, Write};

use ondas_core::{Endian, Error, Result, SampleWidth};

use crate::format::{FrameCount, SoundFormat};
use crate::soundfile::SoundFile;

/// Canonical header: FORM(12) + COMM(26) + SSND header(16).
const HEADER_SIZE: usize = 54;
const COMM_FRAMES_POS: u64 = 22;
const SSND_SIZE_POS: u64 = 42;

/// Marker state: present only on descriptors this plug-in created, so
/// `update_header` knows the canonical patch offsets apply.
struct AiffState;

struct AiffFormat;

pub(crate) fn format() -> &'static dyn SoundFormat {
    static FORMAT: AiffFormat = AiffFormat;
    &FORMAT
}

impl SoundFormat for AiffFormat {
    fn name(&self) -> &'static str {
        "aiff"
    }

    fn min_header_size(&self) -> usize {
        HEADER_SIZE
    }

    fn sniff(&self, buf: &[u8]) -> bool {
        buf.len() >= 12
            && &buf[0..4] == b"FORM"
            && (&buf[8..12] == b"AIFF" || &buf[8..12] == b"AIFC")
    }

    fn read_header(&self, sf: &mut SoundFile) -> Result<()> {
        let parsed = parse_header(sf.file_mut()?)?;
        sf.set_layout(parsed.channels, parsed.width, Endian::Big)?;
        sf.set_sample_rate(parsed.sample_rate);
        sf.set_header_size(parsed.header_size);
        sf.set_bytes_limit(parsed.data_bytes);
        Ok(())
    }

    fn write_header(&self, sf: &mut SoundFile, frames: FrameCount) -> Result<usize> {
        if sf.width() == SampleWidth::F32 {
            return Err(Error::UnsupportedSampleFormat(
                "AIFF floating-point output".into(),
            ));
        }
        let bpf = sf.bytes_per_frame();
        let data_bytes =
            frames.payload_bytes(bpf, u64::from(u32::MAX) - (HEADER_SIZE as u64 - 8)) as u32;
        let declared_frames = (u64::from(data_bytes) / bpf as u64) as u32;

        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(b"FORM");
        header.extend_from_slice(&(HEADER_SIZE as u32 - 8 + data_bytes).to_be_bytes());
        header.extend_from_slice(b"AIFF");
        header.extend_from_slice(b"COMM");
        header.extend_from_slice(&18u32.to_be_bytes());
        header.extend_from_slice(&(sf.channels() as i16).to_be_bytes());
        header.extend_from_slice(&declared_frames.to_be_bytes());
        header.extend_from_slice(&(sf.width().bits() as i16).to_be_bytes());
        header.extend_from_slice(&encode_f80(sf.sample_rate() as f64));
        header.extend_from_slice(b"SSND");
        header.extend_from_slice(&(8 + data_bytes).to_be_bytes());
        header.extend_from_slice(&0u32.to_be_bytes()); // offset
        header.extend_from_slice(&0u32.to_be_bytes()); // block size
        debug_assert_eq!(header.len(), HEADER_SIZE);

        sf.file_mut()?.write_all(&header)?;
        sf.set_state(Box::new(AiffState));
        Ok(HEADER_SIZE)
    }

    fn update_header(&self, sf: &mut SoundFile, frames_written: u64) -> Result<()> {
        let bpf = sf.bytes_per_frame() as u64;
        if sf.state_mut::<AiffState>().is_none() {
            return Ok(());
        }
        let data_bytes = (frames_written * bpf).min(u64::from(u32::MAX)) as u32;

        let file = sf.file_mut()?;
        file.seek(SeekFrom::Start(4))?;
        file.write_all(&(HEADER_SIZE as u32 - 8 + data_bytes).to_be_bytes())?;
        file.seek(SeekFrom::Start(COMM_FRAMES_POS))?;
        file.write_all(&(frames_written.min(u64::from(u32::MAX)) as u32).to_be_bytes())?;
        file.seek(SeekFrom::Start(SSND_SIZE_POS))?;
        file.write_all(&(8 + data_bytes).to_be_bytes())?;
        Ok(())
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".aif", ".aiff"]
    }

    fn endianness(&self, requested: Option<Endian>) -> Endian {
        if requested == Some(Endian::Little) {
            tracing::warn!("AIFF files are big-endian; ignoring byte-order request");
        }
        Endian::Big
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
    let mut form = [0u8; 12];
    file.read_exact(&mut form)?;
    if &form[0..4] != b"FORM" {
        return Err(Error::BadHeader);
    }
    let aifc = match &form[8..12] {
        b"AIFF" => false,
        b"AIFC" => true,
        _ => return Err(Error::BadHeader),
    };

    let mut comm: Option<(usize, SampleWidth, usize)> = None;
    let mut ssnd: Option<(u64, u64)> = None; // payload position, payload bytes
    loop {
        let mut chunk = [0u8; 8];
        if file.read_exact(&mut chunk).is_err() {
            break;
        }
        let id = &chunk[0..4];
        let size = u32::from_be_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]) as u64;
        match id {
            b"COMM" => {
                let need = if aifc { 22 } else { 18 };
                if size < need {
                    return Err(Error::BadHeader);
                }
                let mut body = vec![0u8; size as usize];
                file.read_exact(&mut body)?;
                let channels = i16::from_be_bytes([body[0], body[1]]) as usize;
                let bits = i16::from_be_bytes([body[6], body[7]]);
                let rate = decode_f80(&body[8..18]).round() as usize;
                if aifc && &body[18..22] != b"NONE" {
                    return Err(Error::UnsupportedSampleFormat(format!(
                        "compressed AIFF-C ({})",
                        String::from_utf8_lossy(&body[18..22])
                    )));
                }
                let width = match bits {
                    16 => SampleWidth::I16,
                    24 => SampleWidth::I24,
                    _ => {
                        return Err(Error::UnsupportedSampleFormat(format!(
                            "AIFF {bits}-bit samples"
                        )))
                    }
                };
                if size % 2 == 1 {
                    file.seek(SeekFrom::Current(1))?;
                }
                comm = Some((channels, width, rate));
            }
            b"SSND" => {
                if size < 8 {
                    return Err(Error::BadHeader);
                }
                let mut head = [0u8; 8];
                file.read_exact(&mut head)?;
                let offset = u64::from(u32::from_be_bytes([head[0], head[1], head[2], head[3]]));
                let payload_pos = file.stream_position()? + offset;
                let payload_bytes = (size - 8).saturating_sub(offset);
                ssnd = Some((payload_pos, payload_bytes));
                // Sample data is normally the last chunk; skip over it in
                // case COMM follows.
                let skip = size - 8 + (size & 1);
                file.seek(SeekFrom::Current(skip as i64))?;
            }
            _ => {
                file.seek(SeekFrom::Current((size + (size & 1)) as i64))?;
            }
        }
        if let (Some((channels, width, sample_rate)), Some((payload_pos, payload_bytes))) =
            (comm, ssnd)
        {
            return Ok(ParsedHeader {
                channels,
                width,
                sample_rate,
                header_size: payload_pos,
                data_bytes: payload_bytes,
            });
        }
    }
    Err(Error::BadHeader)
}

/// Encode a positive sample rate as an 80-bit IEEE extended float.
fn encode_f80(value: f64) -> [u8; 10] {
    if value <= 0.0 || !value.is_finite() {
        return [0; 10];
    }
    let bits = value.to_bits();
    let exp = ((bits >> 52) & 0x7FF) as i32 - 1023;
    let mantissa = (bits & ((1u64 << 52) - 1)) | (1u64 << 52);
    let exponent = (exp + 16383) as u16;
    let fraction = mantissa << 11;

    let mut out = [0u8; 10];
    out[0..2].copy_from_slice(&exponent.to_be_bytes());
    out[2..10].copy_from_slice(&fraction.to_be_bytes());
    out
}

/// Decode an 80-bit IEEE extended float (sign ignored; rates are
/// positive).
fn decode_f80(bytes: &[u8]) -> f64 {
    let exponent = u16::from_be_bytes([bytes[0], bytes[1]]) & 0x7FFF;
    let fraction = u64::from_be_bytes([
        bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7], bytes[8], bytes[9],
    ]);
    if exponent == 0 && fraction == 0 {
        return 0.0;
    }
    (fraction as f64) * 2f64.powi(i32::from(exponent) - 16383 - 63)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FrameCount;
    use crate::soundfile::{create_soundfile, open_soundfile, OpenSpec};
    use tempfile::tempdir;

    #[test]
    fn extended_float_common_rates() {
        for rate in [8000u32, 22050, 44100, 48000, 96000] {
            let encoded = encode_f80(f64::from(rate));
            assert_eq!(decode_f80(&encoded).round() as u32, rate);
        }
        // The canonical encoding of 44100.
        assert_eq!(
            encode_f80(44100.0),
            [0x40, 0x0E, 0xAC, 0x44, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn header_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.aif");
        let mut sf = create_soundfile(
            &path,
            format(),
            2,
            SampleWidth::I24,
            Endian::Big,
            48000,
            FrameCount::Frames(10),
        )
        .unwrap();
        sf.write_samples(&[0u8; 60]).unwrap();
        sf.update_header(10).unwrap();
        sf.close();

        let sf = open_soundfile(&path, &OpenSpec::default()).unwrap();
        assert_eq!(sf.format().name(), "aiff");
        assert_eq!(sf.channels(), 2);
        assert_eq!(sf.width(), SampleWidth::I24);
        assert_eq!(sf.endian(), Endian::Big);
        assert_eq!(sf.sample_rate(), 48000);
        assert_eq!(sf.header_size(), 54);
        assert_eq!(sf.bytes_limit(), 60);
    }

    #[test]
    fn float_write_is_unsupported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.aif");
        let err = create_soundfile(
            &path,
            format(),
            1,
            SampleWidth::F32,
            Endian::Big,
            44100,
            FrameCount::Frames(1),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedSampleFormat(_)));
    }

    #[test]
    fn metadata_is_unsupported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.aif");
        let mut sf = create_soundfile(
            &path,
            format(),
            1,
            SampleWidth::I16,
            Endian::Big,
            44100,
            FrameCount::Frames(1),
        )
        .unwrap();
        let err = sf.write_metadata(&["title".into(), "x".into()]).unwrap_err();
        assert!(matches!(err, Error::MetadataUnsupported("aiff")));
    }
}
