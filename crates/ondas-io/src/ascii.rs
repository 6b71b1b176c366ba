//! ASCII fallback: whitespace-separated floats, one value per array per
//! row.

use ondas_core::{Endian, Error, Result};

use crate::args::ReadRequest;
use crate::read::{ReadOutcome, SoundFileInfo};
use crate::resolve::PathResolver;
use crate::table::TableSet;

pub(crate) fn read_ascii(
    resolver: &PathResolver,
    req: &ReadRequest,
    tables: &mut TableSet,
) -> Result<ReadOutcome> {
    let path = resolver.resolve_read(&req.filename)?;
    let text = std::fs::read_to_string(&path)?;

    let mut values: Vec<f32> = Vec::new();
    for token in text.split_whitespace() {
        let value = token
            .parse::<f32>()
            .map_err(|_| Error::Usage(format!("bad number '{token}' in ASCII file")))?;
        values.push(value);
    }

    let indices = tables.resolve(&req.arrays)?;
    if indices.is_empty() {
        return Err(Error::Usage("ASCII read needs at least one array".into()));
    }
    let narrays = indices.len();
    let rows = values.len() / narrays;
    let avail = (rows as u64).saturating_sub(req.onset_frames);

    let target = if req.resize {
        let target = avail.min(req.max_frames);
        for &i in &indices {
            tables.at_mut(i).resize(target as usize)?;
        }
        target
    } else {
        let min_len = indices.iter().map(|&i| tables.at(i).len()).min().unwrap_or(0);
        if indices.iter().any(|&i| tables.at(i).len() != min_len) {
            tracing::warn!("arrays have different lengths; resizing to the smallest");
            for &i in &indices {
                tables.at_mut(i).resize(min_len)?;
            }
        }
        avail.min(req.max_frames).min(min_len as u64)
    };

    for (slot, &i) in indices.iter().enumerate() {
        let table = tables.at_mut(i);
        for row in 0..target as usize {
            let value = values[(req.onset_frames as usize + row) * narrays + slot];
            table.data_mut()[row] = value;
        }
        table.data_mut()[target as usize..].fill(0.0);
        table.mark_dirty();
    }

    Ok(ReadOutcome {
        frames: target,
        info: SoundFileInfo {
            sample_rate: 0,
            header_size: 0,
            channels: narrays,
            bytes_per_sample: 4,
            endian: Endian::native(),
        },
        metadata: Vec::new(),
    })
}
