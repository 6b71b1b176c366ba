//! List the registered soundfile formats.

use clap::Args;
use ondas_formats::FormatRegistry;

/// List registered formats.
#[derive(Args)]
pub struct FormatsArgs {}

/// Run the formats command.
pub fn run(_args: FormatsArgs) -> anyhow::Result<()> {
    for format in FormatRegistry::global().iter() {
        let extensions = format.extensions().join(" ");
        println!("{:8} {extensions}", format.name());
    }
    Ok(())
}
