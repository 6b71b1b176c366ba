//! List the available audio devices.

use clap::Args;
use cpal::traits::{DeviceTrait, HostTrait};

/// List audio devices.
#[derive(Args)]
pub struct DevicesArgs {}

/// Run the devices command.
pub fn run(_args: DevicesArgs) -> anyhow::Result<()> {
    let host = cpal::default_host();

    println!("Input devices:");
    match host.input_devices() {
        Ok(devices) => {
            for (index, device) in devices.enumerate() {
                let name = device.name().unwrap_or_else(|_| "<unknown>".into());
                let rate = device
                    .default_input_config()
                    .map(|c| c.sample_rate())
                    .unwrap_or(0);
                println!("  [{index}] {name} ({rate} Hz)");
            }
        }
        Err(e) => println!("  unavailable: {e}"),
    }

    println!("Output devices:");
    match host.output_devices() {
        Ok(devices) => {
            for (index, device) in devices.enumerate() {
                let name = device.name().unwrap_or_else(|_| "<unknown>".into());
                let rate = device
                    .default_output_config()
                    .map(|c| c.sample_rate())
                    .unwrap_or(0);
                println!("  [{index}] {name} ({rate} Hz)");
            }
        }
        Err(e) => println!("  unavailable: {e}"),
    }
    Ok(())
}

/// Find an output or input device by exact name, falling back to a
/// case-insensitive substring match.
pub fn find_device(name: &str, input: bool) -> anyhow::Result<cpal::Device> {
    let host = cpal::default_host();
    let devices: Vec<cpal::Device> = if input {
        host.input_devices()?.collect()
    } else {
        host.output_devices()?.collect()
    };
    let lower = name.to_lowercase();
    devices
        .into_iter()
        .find(|d| {
            d.name()
                .map(|n| n == name || n.to_lowercase().contains(&lower))
                .unwrap_or(false)
        })
        .ok_or_else(|| anyhow::anyhow!("device not found: {name}"))
}
