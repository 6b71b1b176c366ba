//! Helpers shared by the CLI commands.

use ondas_io::SoundFileInfo;

/// Render the five-field info tuple the way the result outlet reports
/// it.
pub fn describe(info: &SoundFileInfo) -> String {
    format!(
        "{} Hz, {} channel{}, {} bytes/sample, {}-endian, {} header bytes",
        info.sample_rate,
        info.channels,
        if info.channels == 1 { "" } else { "s" },
        info.bytes_per_sample,
        match info.endian.code() {
            'b' => "big",
            _ => "little",
        },
        info.header_size
    )
}

/// Append `--` (unless one is already present) and the filename and
/// array names to a raw flag list, so variadic flags cannot swallow the
/// filename.
pub fn complete_tokens(flags: &[String], filename: &str, arrays: &[String]) -> Vec<String> {
    let mut tokens = flags.to_vec();
    if !tokens.iter().any(|t| t == "--") {
        tokens.push("--".to_string());
    }
    tokens.push(filename.to_string());
    tokens.extend(arrays.iter().cloned());
    tokens
}

/// Split an interleaved device buffer into fixed-size per-channel ticks,
/// carrying the remainder between callbacks.
pub struct Deinterleaver {
    channels: usize,
    tick: usize,
    pending: Vec<Vec<f32>>,
}

impl Deinterleaver {
    pub fn new(channels: usize, tick: usize) -> Self {
        Deinterleaver {
            channels,
            tick,
            pending: vec![Vec::new(); channels],
        }
    }

    /// Feed interleaved frames; `emit` receives whole ticks, one slice
    /// per channel.
    pub fn push(&mut self, interleaved: &[f32], device_channels: usize, mut emit: impl FnMut(&[&[f32]])) {
        for frame in interleaved.chunks(device_channels.max(1)) {
            for ch in 0..self.channels {
                let sample = frame.get(ch).copied().unwrap_or(0.0);
                self.pending[ch].push(sample);
            }
        }
        while self.pending[0].len() >= self.tick {
            {
                let slices: Vec<&[f32]> =
                    self.pending.iter().map(|p| &p[..self.tick]).collect();
                emit(&slices);
            }
            for p in &mut self.pending {
                p.drain(..self.tick);
            }
        }
    }
}
