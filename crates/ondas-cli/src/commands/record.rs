//! Record an audio device to a soundfile.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ondas_formats::FormatRegistry;
use ondas_io::parse_write_args;
use ondas_stream::{default_buffer_size, CaptureOptions, CaptureStream, Request};

use super::common::{complete_tokens, Deinterleaver};
use super::devices::find_device;
use crate::config::Config;

const TICK: usize = 64;

/// Record an audio device to a soundfile.
#[derive(Args)]
pub struct RecordArgs {
    /// Destination soundfile
    pub file: String,

    /// Channels to record
    #[arg(long, default_value_t = 2)]
    pub channels: usize,

    /// Streaming FIFO size in bytes
    #[arg(long)]
    pub bufsize: Option<usize>,

    /// Input device (exact or partial name)
    #[arg(short, long)]
    pub device: Option<String>,

    /// Print stream diagnostics
    #[arg(short, long)]
    pub verbose: bool,

    /// Write flags, e.g. `-bytes 3 -big -aiff -rate 48000 -meta title Take`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub write_flags: Vec<String>,
}

/// Run the record command.
pub fn run(args: RecordArgs, config: &Config) -> anyhow::Result<()> {
    let resolver = config.resolver()?;

    let tokens = complete_tokens(&args.write_flags, &args.file, &[]);
    let req = parse_write_args(&tokens)?;

    let registry = FormatRegistry::global();
    let format = req
        .format
        .or_else(|| registry.by_extension(&req.filename))
        .or_else(|| {
            config
                .default_format
                .as_deref()
                .and_then(|name| registry.by_name(name))
        })
        .unwrap_or_else(|| registry.default_format());
    let path = resolver.resolve_write(&format.add_extension(&req.filename));

    let device = match &args.device {
        Some(name) => find_device(name, true)?,
        None => cpal::default_host()
            .default_input_device()
            .context("no input device available")?,
    };
    let device_config = device.default_input_config()?;
    let device_channels = device_config.channels() as usize;
    let device_rate = device_config.sample_rate() as usize;
    let sample_rate = req.sample_rate.unwrap_or(device_rate);

    let channels = args.channels.max(1);
    let bufsize = args
        .bufsize
        .or(config.stream_bufsize)
        .unwrap_or_else(|| default_buffer_size(channels));
    let stream = Arc::new(CaptureStream::new(channels, bufsize)?);
    stream.set_block_size(TICK);
    stream.open(
        path.clone(),
        CaptureOptions {
            format,
            width: req.width,
            endian: req.endian,
            sample_rate,
            meta: req.meta.clone(),
        },
    );
    stream.start()?;

    let cb_stream = Arc::clone(&stream);
    let mut deinterleaver = Deinterleaver::new(channels, TICK);
    let in_stream = device.build_input_stream(
        &device_config.into(),
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            deinterleaver.push(data, device_channels, |ticks| cb_stream.perform(ticks));
        },
        |err| tracing::error!(%err, "input stream error"),
        None,
    )?;
    in_stream.play()?;

    let running = Arc::new(AtomicBool::new(true));
    let handler_running = Arc::clone(&running);
    ctrlc::set_handler(move || handler_running.store(false, Ordering::SeqCst))?;

    println!("Recording to {}... press Ctrl+C to stop.", path.display());
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
        if args.verbose {
            tracing::debug!(frames = stream.frames_written(), "recording");
        }
        if stream.take_done() {
            anyhow::bail!(
                "recording stopped: {}",
                stream
                    .status()
                    .error
                    .unwrap_or_else(|| "file error".to_string())
            );
        }
    }

    drop(in_stream);
    stream.stop();
    while stream.status().request != Request::Nothing {
        std::thread::sleep(Duration::from_millis(10));
    }
    if args.verbose {
        println!("{}", stream.status());
    }
    println!("Wrote {} frames to {}", stream.frames_written(), path.display());
    Ok(())
}
