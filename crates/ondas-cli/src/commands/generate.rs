//! Generate a test tone soundfile.

use clap::Args;
use ondas_io::{parse_write_args, write_soundfile, Table, TableSet};

use super::common::{complete_tokens, describe};
use crate::config::Config;

/// Generate a sine test tone.
#[derive(Args)]
pub struct GenerateArgs {
    /// Destination soundfile
    pub output: String,

    /// Tone frequency in Hz
    #[arg(long, default_value_t = 440.0)]
    pub freq: f32,

    /// Length in frames
    #[arg(long, default_value_t = 44100)]
    pub frames: usize,

    /// Channel count (each an octave apart)
    #[arg(long, default_value_t = 1)]
    pub channels: usize,

    /// Peak amplitude
    #[arg(long, default_value_t = 0.9)]
    pub amplitude: f32,

    /// Sample rate in Hz
    #[arg(long, default_value_t = 44100)]
    pub rate: usize,

    /// Write flags, e.g. `-bytes 4 -caf -meta title Tone`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub write_flags: Vec<String>,
}

/// Run the generate command.
pub fn run(args: GenerateArgs, config: &Config) -> anyhow::Result<()> {
    let resolver = config.resolver()?;

    let mut tables = TableSet::new();
    let names: Vec<String> = (1..=args.channels.max(1)).map(|i| format!("gen{i}")).collect();
    for (ch, name) in names.iter().enumerate() {
        let freq = args.freq * 2f32.powi(ch.min(24) as i32);
        let step = std::f32::consts::TAU * freq / args.rate.max(1) as f32;
        let samples: Vec<f32> = (0..args.frames)
            .map(|i| (step * i as f32).sin() * args.amplitude)
            .collect();
        tables.insert(Table::from_samples(name.clone(), samples));
    }

    let tokens = complete_tokens(&args.write_flags, &args.output, &names);
    let mut req = parse_write_args(&tokens)?;
    if req.sample_rate.is_none() {
        req.sample_rate = Some(args.rate);
    }
    if req.format.is_none() {
        if let Some(name) = &config.default_format {
            req.format = ondas_formats::FormatRegistry::global().by_name(name);
        }
    }

    let wrote = write_soundfile(&resolver, &req, &tables, args.rate)?;
    println!(
        "Wrote {} frames to {} ({})",
        wrote.frames,
        args.output,
        describe(&wrote.info)
    );
    Ok(())
}
