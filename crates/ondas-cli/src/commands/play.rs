//! Stream a soundfile to an audio device.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use indicatif::{ProgressBar, ProgressStyle};
use ondas_core::SampleWidth;
use ondas_io::{read_soundfile, ReadRequest, TableSet};
use ondas_stream::{default_buffer_size, Endian, HeaderStyle, OpenSpec, PlaybackStream, RawSpec};

use super::devices::find_device;
use crate::config::Config;

const TICK: usize = 64;

/// Stream a soundfile to an audio device.
#[derive(Args)]
pub struct PlayArgs {
    /// Soundfile to play
    pub file: String,

    /// Frames to skip before playback starts
    #[arg(long, default_value_t = 0)]
    pub onset: u64,

    /// Treat the file as raw: header bytes, channels, bytes per sample,
    /// endianness (b|l|n)
    #[arg(long, num_args = 4, value_names = ["HEADER", "CHANNELS", "BYTES", "ENDIAN"])]
    pub raw: Option<Vec<String>>,

    /// Assert this format instead of sniffing
    #[arg(long)]
    pub format: Option<String>,

    /// Streaming FIFO size in bytes
    #[arg(long)]
    pub bufsize: Option<usize>,

    /// Output device (exact or partial name)
    #[arg(short, long)]
    pub device: Option<String>,

    /// Print stream diagnostics
    #[arg(short, long)]
    pub verbose: bool,
}

fn raw_spec(values: &[String]) -> anyhow::Result<RawSpec> {
    let header_size: u64 = values[0].parse().context("raw header bytes")?;
    let channels: usize = values[1].parse().context("raw channel count")?;
    let bytes: usize = values[2].parse().context("raw bytes per sample")?;
    let endian = Endian::parse(&values[3])
        .ok_or_else(|| anyhow::anyhow!("raw endianness must be b, l or n"))?;
    Ok(RawSpec {
        header_size,
        channels,
        width: SampleWidth::from_bytes(bytes)?,
        endian,
    })
}

/// Run the play command.
pub fn run(args: PlayArgs, config: &Config) -> anyhow::Result<()> {
    let resolver = config.resolver()?;

    let mut spec = OpenSpec {
        onset_frames: args.onset,
        ..OpenSpec::default()
    };
    let mut probe_req = ReadRequest::new(&args.file);
    probe_req.onset_frames = args.onset;
    if let Some(values) = &args.raw {
        let raw = raw_spec(values)?;
        spec.header = HeaderStyle::Raw(raw);
        probe_req.raw = Some(raw);
    }
    if let Some(name) = &args.format {
        let format = ondas_formats::FormatRegistry::global()
            .by_name(name)
            .ok_or_else(|| anyhow::anyhow!("unknown format '{name}'"))?;
        spec.format = Some(format);
        probe_req.format = Some(format);
    }

    // Probe for geometry before committing to a device layout.
    let probe = read_soundfile(&resolver, &probe_req, &mut TableSet::new())?;
    let channels = probe.info.channels;
    let total_frames = probe.frames;
    let path = resolver.resolve_read(&args.file)?;

    let bufsize = args
        .bufsize
        .or(config.stream_bufsize)
        .unwrap_or_else(|| default_buffer_size(channels));
    let stream = Arc::new(PlaybackStream::new(channels, bufsize)?);
    stream.set_block_size(TICK);
    stream.open(path, spec);
    stream.start()?;

    let device = match &args.device {
        Some(name) => find_device(name, false)?,
        None => cpal::default_host()
            .default_output_device()
            .context("no output device available")?,
    };
    let device_config = device.default_output_config()?;
    let device_channels = device_config.channels() as usize;
    let device_rate = device_config.sample_rate() as usize;
    if probe.info.sample_rate > 0 && device_rate != probe.info.sample_rate {
        tracing::warn!(
            file = probe.info.sample_rate,
            device = device_rate,
            "sample rates differ; playing without conversion"
        );
    }

    if args.verbose {
        println!("{}", stream.status());
    }

    let played = Arc::new(AtomicU64::new(0));
    let cb_stream = Arc::clone(&stream);
    let cb_played = Arc::clone(&played);
    let mut ticks: Vec<Vec<f32>> = vec![vec![0.0; TICK]; channels];
    let mut carry: Vec<f32> = Vec::new();
    let mut carry_pos = 0usize;
    let out_stream = device.build_output_stream(
        &device_config.into(),
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let mut filled = 0;
            while filled < data.len() {
                if carry_pos < carry.len() {
                    let n = (data.len() - filled).min(carry.len() - carry_pos);
                    data[filled..filled + n].copy_from_slice(&carry[carry_pos..carry_pos + n]);
                    carry_pos += n;
                    filled += n;
                    continue;
                }
                {
                    let mut outs: Vec<&mut [f32]> =
                        ticks.iter_mut().map(|t| t.as_mut_slice()).collect();
                    cb_stream.perform(&mut outs);
                }
                cb_played.fetch_add(TICK as u64, Ordering::Relaxed);
                carry.clear();
                carry_pos = 0;
                for frame in 0..TICK {
                    for ch in 0..device_channels.max(1) {
                        let sample = if ch < channels {
                            ticks[ch][frame]
                        } else if channels == 1 {
                            ticks[0][frame]
                        } else {
                            0.0
                        };
                        carry.push(sample);
                    }
                }
            }
        },
        |err| tracing::error!(%err, "output stream error"),
        None,
    )?;
    out_stream.play()?;

    let bar = ProgressBar::new(total_frames);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} frames ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    loop {
        if stream.take_done() {
            break;
        }
        bar.set_position(played.load(Ordering::Relaxed).min(total_frames));
        std::thread::sleep(Duration::from_millis(50));
    }
    bar.finish_with_message("done");

    drop(out_stream);
    if args.verbose {
        println!("{}", stream.status());
    }
    stream.stop();
    Ok(())
}
