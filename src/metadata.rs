//! Image metadata: sizes, extent, acquisition times, channel colors, compression

use crate::compression::CompressionAlgorithm;
use crate::error::Result;
use crate::io::H5Store;
use crate::layout::{PyramidLayout, DATASET_GROUP};
use crate::types::{Color, ColorInfo, ImageExtent, Size5D, TimeInfo};
use crate::utils::{data_path, indexed_group, parse_floats, parse_number};
use log::debug;
use serde::{Deserialize, Serialize};

/// Top-level group holding the descriptive metadata of a dataset
pub const DATASET_INFO_GROUP: &str = "DataSetInfo";

const BASE_COLOR_MODE: &str = "BaseColor";

/// Complete metadata of one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Image size per resolution level, finest first
    pub size_per_resolution: Vec<Size5D>,
    /// Chunk size per resolution level
    pub block_size_per_resolution: Vec<Size5D>,
    pub extent: ImageExtent,
    pub time_info_per_timepoint: Vec<TimeInfo>,
    pub color_info_per_channel: Vec<ColorInfo>,
    pub compression: CompressionAlgorithm,
}

impl Metadata {
    /// Number of resolution levels
    pub fn number_of_resolutions(&self) -> usize {
        self.size_per_resolution.len()
    }

    /// Full resolution image size
    pub fn image_size(&self) -> Size5D {
        self.size_per_resolution.first().copied().unwrap_or_default()
    }

    /// Physical size of one full resolution voxel
    pub fn voxel_size(&self) -> [f32; 3] {
        self.extent.voxel_size(&self.image_size())
    }
}

/// Attribute parsed as a float, `default` when absent or malformed
fn read_float(store: &dyn H5Store, path: &str, name: &str, default: f32) -> f32 {
    match store.read_attribute_string(path, name) {
        Ok(text) => parse_number(&text).unwrap_or_else(|| {
            debug!("{} at {} is not a number: {:?}", name, path, text);
            default
        }),
        Err(err) => {
            debug!("{}", err);
            default
        }
    }
}

fn read_extent(store: &dyn H5Store, info_root: &str) -> ImageExtent {
    let image = format!("{}/Image", info_root);
    if !store.exists(&image) {
        debug!("{} is missing, extent defaults to zero", image);
        return ImageExtent::default();
    }
    ImageExtent {
        min_x: read_float(store, &image, "ExtMin0", 0.0),
        min_y: read_float(store, &image, "ExtMin1", 0.0),
        min_z: read_float(store, &image, "ExtMin2", 0.0),
        max_x: read_float(store, &image, "ExtMax0", 0.0),
        max_y: read_float(store, &image, "ExtMax1", 0.0),
        max_z: read_float(store, &image, "ExtMax2", 0.0),
    }
}

fn read_time_infos(store: &dyn H5Store, info_root: &str, size_t: u32) -> Vec<TimeInfo> {
    let time_info = format!("{}/TimeInfo", info_root);
    (0..size_t)
        .map(|t| {
            let name = format!("TimePoint{}", t + 1);
            store
                .read_attribute_string(&time_info, &name)
                .and_then(|text| text.parse::<TimeInfo>())
                .unwrap_or_else(|err| {
                    debug!("time of timepoint {}: {}", t, err);
                    TimeInfo::default()
                })
        })
        .collect()
}

/// Color triples from a blank-separated list; a trailing partial triple is dropped
fn parse_color_table(text: &str) -> Vec<Color> {
    parse_floats(text)
        .chunks_exact(3)
        .map(|rgb| Color::rgb(rgb[0], rgb[1], rgb[2]))
        .collect()
}

fn read_color_info(store: &dyn H5Store, channel: &str) -> ColorInfo {
    let mut info = ColorInfo::default();

    match store.read_attribute_string(channel, "ColorMode") {
        Ok(mode) if mode == BASE_COLOR_MODE => {
            let rgb = store
                .read_attribute_string(channel, "Color")
                .map(|text| parse_floats(&text))
                .unwrap_or_default();
            match rgb.as_slice() {
                [red, green, blue, ..] => info.base_color = Color::rgb(*red, *green, *blue),
                _ => debug!("{} has no usable base color", channel),
            }
        }
        Ok(_) => {
            info.is_base_color_mode = false;
            let table = format!("{}/ColorTable", channel);
            match store.read_string_dataset(&table) {
                Ok(text) => info.color_table = parse_color_table(&text),
                Err(err) => debug!("{}: {}", table, err),
            }
        }
        Err(err) => debug!("{}", err),
    }

    info.opacity = read_float(store, channel, "ColorOpacity", info.opacity);
    if let Ok(range) = store.read_attribute_string(channel, "ColorRange") {
        match parse_floats(&range).as_slice() {
            [min, max, ..] => {
                info.range_min = *min;
                info.range_max = *max;
            }
            _ => debug!("ColorRange at {} is malformed: {:?}", channel, range),
        }
    }
    info.gamma_correction = read_float(store, channel, "GammaCorrection", info.gamma_correction);
    info
}

/// Collect the metadata of the dataset described by `layout`
pub fn read_metadata(store: &dyn H5Store, layout: &PyramidLayout) -> Result<Metadata> {
    let info_root = indexed_group(DATASET_INFO_GROUP, layout.dataset_index);
    if !store.exists(&info_root) {
        debug!("{} is missing, using default metadata", info_root);
    }

    let color_info_per_channel = (0..layout.size_c())
        .map(|c| read_color_info(store, &format!("{}/Channel {}", info_root, c)))
        .collect();

    let data = data_path(&indexed_group(DATASET_GROUP, layout.dataset_index), 0, 0, 0);
    let compression = CompressionAlgorithm::from_filters(&store.dataset_info(&data)?.filters);

    Ok(Metadata {
        size_per_resolution: layout.sizes(),
        block_size_per_resolution: layout.block_sizes(),
        extent: read_extent(store, &info_root),
        time_info_per_timepoint: read_time_infos(store, &info_root, layout.size_t()),
        color_info_per_channel,
        compression,
    })
}
