//! Histograms and the preview thumbnail

use crate::error::{ImsError, Result};
use crate::io::H5Store;
use crate::layout::DATASET_GROUP;
use crate::types::{Histogram, Thumbnail};
use crate::utils::{channel_group_path, indexed_group, parse_number};
use log::debug;

/// Top-level group holding the preview image of a dataset
pub const THUMBNAIL_GROUP: &str = "Thumbnail";

/// Suffix of the finer histogram written next to the default one
const FINE_HISTOGRAM_SUFFIX: &str = "1024";

fn read_bound(store: &dyn H5Store, path: &str, name: &str, default: f32) -> f32 {
    store
        .read_attribute_string(path, name)
        .ok()
        .and_then(|text| parse_number(&text))
        .unwrap_or_else(|| {
            debug!("{} at {} unavailable, using {}", name, path, default);
            default
        })
}

/// Histogram of one (timepoint, channel, resolution level)
///
/// Prefers `Histogram1024` over `Histogram` when both exist.
pub fn read_histogram(
    store: &dyn H5Store,
    dataset_index: u32,
    time_point: u32,
    channel: u32,
    resolution: usize,
) -> Result<Histogram> {
    let root = indexed_group(DATASET_GROUP, dataset_index);
    let channel_group = channel_group_path(&root, resolution, time_point, channel);

    let fine = format!("{}/Histogram{}", channel_group, FINE_HISTOGRAM_SUFFIX);
    let suffix = if store.exists(&fine) {
        FINE_HISTOGRAM_SUFFIX
    } else {
        ""
    };

    let min = read_bound(store, &channel_group, &format!("HistogramMin{}", suffix), 0.0);
    let max = read_bound(store, &channel_group, &format!("HistogramMax{}", suffix), 255.0);
    let bins = store.read_u64_dataset(&format!("{}/Histogram{}", channel_group, suffix))?;

    Ok(Histogram { min, max, bins })
}

/// Preview image of a dataset
///
/// Stored as a 2-D byte array of `rows x (4 * columns)`.
pub fn read_thumbnail(store: &dyn H5Store, dataset_index: u32) -> Result<Thumbnail> {
    let data = format!("{}/Data", indexed_group(THUMBNAIL_GROUP, dataset_index));
    let info = store.dataset_info(&data)?;
    let (rows, columns) = match info.shape.as_slice() {
        [rows, columns] => (*rows, *columns),
        shape => {
            return Err(ImsError::InvalidDimensions(format!(
                "{} has shape {:?}, expected 2 dimensions",
                data, shape
            )))
        }
    };
    let interleaved_rgba = store.read_u8_dataset(&data)?;

    Ok(Thumbnail {
        size_x: (columns / 4) as u32,
        size_y: rows as u32,
        interleaved_rgba,
    })
}
