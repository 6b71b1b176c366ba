//! Display a soundfile's geometry and metadata.

use clap::Args;
use ondas_io::{read_soundfile, ReadRequest, TableSet};

use super::common::describe;
use crate::config::Config;

/// Display soundfile information.
#[derive(Args)]
pub struct InfoArgs {
    /// Soundfile to inspect
    pub file: String,

    /// Also list format metadata
    #[arg(long)]
    pub meta: bool,

    /// Assert this format instead of sniffing
    #[arg(long)]
    pub format: Option<String>,
}

/// Run the info command.
pub fn run(args: InfoArgs, config: &Config) -> anyhow::Result<()> {
    let resolver = config.resolver()?;
    let mut req = ReadRequest::new(&args.file);
    req.want_metadata = args.meta;
    if let Some(name) = &args.format {
        req.format = Some(
            ondas_formats::FormatRegistry::global()
                .by_name(name)
                .ok_or_else(|| anyhow::anyhow!("unknown format '{name}'"))?,
        );
    }

    let mut tables = TableSet::new();
    let outcome = read_soundfile(&resolver, &req, &mut tables)?;

    println!("File:     {}", args.file);
    println!("Layout:   {}", describe(&outcome.info));
    println!("Frames:   {}", outcome.frames);
    if outcome.info.sample_rate > 0 {
        println!(
            "Duration: {:.3}s",
            outcome.frames as f64 / outcome.info.sample_rate as f64
        );
    }
    if args.meta {
        if outcome.metadata.is_empty() {
            println!("Metadata: none");
        } else {
            println!("Metadata:");
            for (key, value) in &outcome.metadata {
                println!("  {key}: {value}");
            }
        }
    }
    Ok(())
}
