//! The order-sensitive flag surface shared by every front end.
//!
//! Flags parse left to right; `--` ends flag parsing; an unknown
//! `-token` is looked up in the format registry as a format-name flag
//! (with `-nextstep` accepted for the NeXT/Sun format). The metadata
//! flag on the write surface is variadic and collects tokens until the
//! next `-`-prefixed token.

use ondas_core::{Endian, Error, Result, SampleWidth, MAX_BYTE_LIMIT};
use ondas_formats::{FormatRegistry, HeaderStyle, RawSpec, SoundFormat};

/// Most metadata groups one write command will carry.
pub const MAX_META_GROUPS: usize = 8;

const READ_USAGE: &str = "read [-skip <frames>] [-ascii] [-raw <headerbytes> <channels> \
     <bytespersample> <b|l|n>] [-resize] [-maxsize <frames>] [-meta] [-<format>] [--] \
     <filename> [<array>...]";

const WRITE_USAGE: &str = "write [-skip <frames>] [-nframes <frames>] [-bytes <2|3|4>] \
     [-normalize] [-big] [-little] [-rate <hz>] [-meta <key> <value>...] [-<format>] [--] \
     <filename> <array>...";

/// A parsed `read` command.
pub struct ReadRequest {
    /// Soundfile name, resolved through the path resolver.
    pub filename: String,
    /// Destination array names, one per channel.
    pub arrays: Vec<String>,
    /// Frames to skip at the start of the file.
    pub onset_frames: u64,
    /// Treat the file as whitespace-separated ASCII floats.
    pub ascii: bool,
    /// Skip header detection and use this geometry.
    pub raw: Option<RawSpec>,
    /// Grow or shrink the arrays to the file length.
    pub resize: bool,
    /// Cap on frames to read; setting it implies `resize`.
    pub max_frames: u64,
    /// Also surface format metadata.
    pub want_metadata: bool,
    /// Force this format instead of sniffing.
    pub format: Option<&'static dyn SoundFormat>,
}

impl ReadRequest {
    /// A plain read of `filename` with default options.
    pub fn new(filename: impl Into<String>) -> Self {
        ReadRequest {
            filename: filename.into(),
            arrays: Vec::new(),
            onset_frames: 0,
            ascii: false,
            raw: None,
            resize: false,
            max_frames: MAX_BYTE_LIMIT,
            want_metadata: false,
            format: None,
        }
    }

    /// The open header style implied by the flags.
    pub fn header_style(&self) -> HeaderStyle {
        match self.raw {
            Some(raw) => HeaderStyle::Raw(raw),
            None => HeaderStyle::Detect,
        }
    }
}

/// A parsed `write` command.
pub struct WriteRequest {
    /// Soundfile name; the format's extension is appended if missing.
    pub filename: String,
    /// Source array names, one per channel.
    pub arrays: Vec<String>,
    /// Frames to skip at the start of the source arrays.
    pub onset_frames: u64,
    /// Cap on frames to write.
    pub max_frames: u64,
    /// Stored sample width.
    pub width: SampleWidth,
    /// Declared sample rate; `None` means the host rate.
    pub sample_rate: Option<usize>,
    /// Scale the peak to full range.
    pub normalize: bool,
    /// Requested byte order; the format's policy has the last word.
    pub endian: Option<Endian>,
    /// Explicit format; otherwise deduced from the filename extension,
    /// falling back to the first registered format.
    pub format: Option<&'static dyn SoundFormat>,
    /// Metadata groups, each `key value...`.
    pub meta: Vec<Vec<String>>,
}

impl WriteRequest {
    /// A plain write of `filename` with default options.
    pub fn new(filename: impl Into<String>) -> Self {
        WriteRequest {
            filename: filename.into(),
            arrays: Vec::new(),
            onset_frames: 0,
            max_frames: MAX_BYTE_LIMIT,
            width: SampleWidth::I16,
            sample_rate: None,
            normalize: false,
            endian: None,
            format: None,
            meta: Vec::new(),
        }
    }
}

fn parse_count(tokens: &[String], pos: usize, flag: &str, usage: &str) -> Result<u64> {
    tokens
        .get(pos)
        .and_then(|t| t.parse::<u64>().ok())
        .ok_or_else(|| Error::Usage(format!("{flag} expects a count; {usage}")))
}

fn format_flag(token: &str) -> Result<&'static dyn SoundFormat> {
    let name = &token[1..];
    FormatRegistry::global()
        .by_name(name)
        .ok_or_else(|| Error::UnknownFormat(name.to_string()))
}

/// Parse the flag list of a `read` command.
pub fn parse_read_args(tokens: &[String]) -> Result<ReadRequest> {
    let mut req = ReadRequest::new("");
    let mut pos = 0;

    while let Some(token) = tokens.get(pos) {
        if !token.starts_with('-') {
            break;
        }
        match token.as_str() {
            "-skip" => {
                req.onset_frames = parse_count(tokens, pos + 1, "-skip", READ_USAGE)?;
                pos += 2;
            }
            "-ascii" => {
                req.ascii = true;
                pos += 1;
            }
            "-raw" => {
                let header_size = parse_count(tokens, pos + 1, "-raw", READ_USAGE)?;
                let channels = parse_count(tokens, pos + 2, "-raw", READ_USAGE)? as usize;
                let bytes = parse_count(tokens, pos + 3, "-raw", READ_USAGE)? as usize;
                let endian = tokens
                    .get(pos + 4)
                    .and_then(|t| Endian::parse(t))
                    .ok_or_else(|| {
                        Error::Usage(format!("-raw endianness must be b, l or n; {READ_USAGE}"))
                    })?;
                req.raw = Some(RawSpec {
                    header_size,
                    channels: ondas_core::check_channels(channels)?,
                    width: SampleWidth::from_bytes(bytes)?,
                    endian,
                });
                pos += 5;
            }
            "-resize" => {
                req.resize = true;
                pos += 1;
            }
            "-maxsize" => {
                req.max_frames = parse_count(tokens, pos + 1, "-maxsize", READ_USAGE)?;
                req.resize = true;
                pos += 2;
            }
            "-meta" => {
                req.want_metadata = true;
                pos += 1;
            }
            "--" => {
                pos += 1;
                break;
            }
            _ => {
                req.format = Some(format_flag(token)?);
                pos += 1;
            }
        }
    }

    let Some(filename) = tokens.get(pos) else {
        return Err(Error::Usage(READ_USAGE.to_string()));
    };
    req.filename = filename.clone();
    req.arrays = tokens[pos + 1..].to_vec();
    Ok(req)
}

/// Parse the flag list of a `write` command.
pub fn parse_write_args(tokens: &[String]) -> Result<WriteRequest> {
    let mut req = WriteRequest::new("");
    let mut pos = 0;

    while let Some(token) = tokens.get(pos) {
        if !token.starts_with('-') {
            break;
        }
        match token.as_str() {
            "-skip" => {
                req.onset_frames = parse_count(tokens, pos + 1, "-skip", WRITE_USAGE)?;
                pos += 2;
            }
            "-nframes" => {
                req.max_frames = parse_count(tokens, pos + 1, "-nframes", WRITE_USAGE)?;
                pos += 2;
            }
            "-bytes" => {
                let bytes = parse_count(tokens, pos + 1, "-bytes", WRITE_USAGE)? as usize;
                req.width = SampleWidth::from_bytes(bytes)?;
                pos += 2;
            }
            "-normalize" => {
                req.normalize = true;
                pos += 1;
            }
            "-big" => {
                req.endian = Some(Endian::Big);
                pos += 1;
            }
            "-little" => {
                req.endian = Some(Endian::Little);
                pos += 1;
            }
            "-rate" | "-r" => {
                req.sample_rate = Some(parse_count(tokens, pos + 1, "-rate", WRITE_USAGE)? as usize);
                pos += 2;
            }
            "-meta" => {
                pos += 1;
                let mut group = Vec::new();
                while let Some(arg) = tokens.get(pos) {
                    if arg.starts_with('-') {
                        break;
                    }
                    group.push(arg.clone());
                    pos += 1;
                }
                if group.is_empty() {
                    return Err(Error::Usage(format!(
                        "-meta expects arguments; {WRITE_USAGE}"
                    )));
                }
                if req.meta.len() >= MAX_META_GROUPS {
                    return Err(Error::Usage(format!(
                        "at most {MAX_META_GROUPS} -meta groups; {WRITE_USAGE}"
                    )));
                }
                req.meta.push(group);
            }
            "--" => {
                pos += 1;
                break;
            }
            _ => {
                req.format = Some(format_flag(token)?);
                pos += 1;
            }
        }
    }

    let Some(filename) = tokens.get(pos) else {
        return Err(Error::Usage(WRITE_USAGE.to_string()));
    };
    req.filename = filename.clone();
    req.arrays = tokens[pos + 1..].to_vec();
    Ok(req)
}
