//! Convert a soundfile to another format.

use clap::Args;
use ondas_io::{
    parse_write_args, read_soundfile, write_soundfile, ReadRequest, Table, TableSet,
};

use super::common::{complete_tokens, describe};
use crate::config::Config;

/// Convert a soundfile, with the full write-flag surface after `--`.
#[derive(Args)]
pub struct ConvertArgs {
    /// Source soundfile
    pub input: String,

    /// Destination soundfile
    pub output: String,

    /// Write flags, e.g. `-bytes 3 -big -normalize -meta title Foo`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub write_flags: Vec<String>,
}

/// Run the convert command.
pub fn run(args: ConvertArgs, config: &Config) -> anyhow::Result<()> {
    let resolver = config.resolver()?;

    // Probe the source for its channel count, then pull every channel
    // into its own table.
    let probe = read_soundfile(&resolver, &ReadRequest::new(&args.input), &mut TableSet::new())?;
    let channels = probe.info.channels;

    let mut tables = TableSet::new();
    let names: Vec<String> = (1..=channels).map(|i| format!("ch{i}")).collect();
    for name in &names {
        tables.insert(Table::new(name.clone(), 0));
    }
    let req = ReadRequest {
        arrays: names.clone(),
        resize: true,
        ..ReadRequest::new(&args.input)
    };
    let read = read_soundfile(&resolver, &req, &mut tables)?;
    println!(
        "Read {} frames from {} ({})",
        read.frames,
        args.input,
        describe(&read.info)
    );

    let tokens = complete_tokens(&args.write_flags, &args.output, &names);
    let mut write_req = parse_write_args(&tokens)?;
    if write_req.format.is_none() {
        if let Some(name) = &config.default_format {
            write_req.format = ondas_formats::FormatRegistry::global().by_name(name);
        }
    }

    let host_rate = if read.info.sample_rate > 0 {
        read.info.sample_rate
    } else {
        44100
    };
    let wrote = write_soundfile(&resolver, &write_req, &tables, host_rate)?;
    println!(
        "Wrote {} frames to {} ({})",
        wrote.frames,
        args.output,
        describe(&wrote.info)
    );
    if wrote.normalized {
        println!("Normalized from peak {:.3}", wrote.peak);
    }
    Ok(())
}
