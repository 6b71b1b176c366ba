//! Ondas CLI - command-line surface for the ondas soundfile toolkit.

mod commands;
mod config;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ondas")]
#[command(author, version, about = "Soundfile reading, writing and streaming", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display a soundfile's geometry and metadata
    Info(commands::info::InfoArgs),

    /// Convert a soundfile to another format
    Convert(commands::convert::ConvertArgs),

    /// Generate a test tone soundfile
    Generate(commands::generate::GenerateArgs),

    /// List the registered soundfile formats
    Formats(commands::formats::FormatsArgs),

    /// Stream a soundfile to an audio device
    Play(commands::play::PlayArgs),

    /// Record an audio device to a soundfile
    Record(commands::record::RecordArgs),

    /// List the available audio devices
    Devices(commands::devices::DevicesArgs),
}

fn main() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    let config = config::Config::load();

    match cli.command {
        Commands::Info(args) => commands::info::run(args, &config),
        Commands::Convert(args) => commands::convert::run(args, &config),
        Commands::Generate(args) => commands::generate::run(args, &config),
        Commands::Formats(args) => commands::formats::run(args),
        Commands::Play(args) => commands::play::run(args, &config),
        Commands::Record(args) => commands::record::run(args, &config),
        Commands::Devices(args) => commands::devices::run(args),
    }
}
