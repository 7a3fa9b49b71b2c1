//! Resolution pyramid layout - the levels of one dataset and how they are chunked

use crate::error::{ImsError, Result};
use crate::io::{H5Store, ObjectKind};
use crate::types::{DataType, Size5D};
use crate::utils::{
    channel_path, format_bytes, indexed_group, parse_size, resolution_level_path, time_point_path,
};
use log::debug;
use serde::{Deserialize, Serialize};

/// Top-level group holding the voxel data of a dataset
pub const DATASET_GROUP: &str = "DataSet";

/// One level of the pyramid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionLevel {
    /// Image size; C and T are shared by all levels
    pub size: Size5D,
    /// Chunk size of the stored data, C = T = 1
    pub block_size: Size5D,
}

/// Layout of one dataset's resolution pyramid
///
/// Level 0 is full resolution; sizes never grow with the level index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PyramidLayout {
    pub dataset_index: u32,
    pub data_type: DataType,
    pub levels: Vec<ResolutionLevel>,
}

fn schema_error(path: &str, err: ImsError) -> ImsError {
    ImsError::Schema(format!("cannot open {}: {}", path, err))
}

fn require_group(store: &dyn H5Store, path: &str) -> Result<()> {
    match store.kind(path) {
        Some(ObjectKind::Group) => Ok(()),
        Some(ObjectKind::Dataset) => Err(ImsError::Schema(format!("{} is not a group", path))),
        None => Err(ImsError::Schema(format!("missing group {}", path))),
    }
}

fn count_groups(store: &dyn H5Store, path: &str) -> Result<u32> {
    let children = store.children(path).map_err(|e| schema_error(path, e))?;
    Ok(children
        .iter()
        .filter(|child| child.kind == ObjectKind::Group)
        .count() as u32)
}

fn read_image_size(store: &dyn H5Store, path: &str, name: &str) -> u32 {
    match store.read_attribute_string(path, name) {
        Ok(text) => parse_size(&text).unwrap_or_else(|| {
            debug!("{} at {} is not a size: {:?}", name, path, text);
            0
        }),
        Err(err) => {
            debug!("{}", err);
            0
        }
    }
}

impl PyramidLayout {
    /// Walk `DataSet{N}` and collect every resolution level
    pub fn discover(store: &dyn H5Store, dataset_index: u32) -> Result<Self> {
        let root = indexed_group(DATASET_GROUP, dataset_index);
        require_group(store, &root)?;
        let level_count = count_groups(store, &root)? as usize;
        if level_count == 0 {
            return Err(ImsError::Schema(format!("{} holds no resolution levels", root)));
        }

        let mut levels = Vec::with_capacity(level_count);
        let mut data_type = DataType::UInt8;
        let (mut size_t, mut size_c) = (0, 0);

        for level in 0..level_count {
            let level_path = resolution_level_path(&root, level);
            require_group(store, &level_path)?;
            if level == 0 {
                size_t = count_groups(store, &level_path)?;
            }

            let time_point = time_point_path(&level_path, 0);
            require_group(store, &time_point)?;
            if level == 0 {
                size_c = count_groups(store, &time_point)?;
            }

            let channel = channel_path(&time_point, 0);
            require_group(store, &channel)?;
            let size = Size5D::new(
                read_image_size(store, &channel, "ImageSizeX"),
                read_image_size(store, &channel, "ImageSizeY"),
                read_image_size(store, &channel, "ImageSizeZ"),
                size_c,
                size_t,
            );

            let data = format!("{}/Data", channel);
            let info = store.dataset_info(&data).map_err(|e| schema_error(&data, e))?;
            if info.ndim() != 3 {
                return Err(ImsError::Schema(format!(
                    "{} has {} dimensions, expected 3",
                    data,
                    info.ndim()
                )));
            }
            if level == 0 {
                data_type = DataType::from_element(
                    info.element_type.size_in_bytes(),
                    info.element_type.is_float(),
                )?;
            }
            let chunk = info.chunk.as_deref().unwrap_or(&info.shape);
            let block_size = match chunk {
                [z, y, x] => Size5D::new(*x as u32, *y as u32, *z as u32, 1, 1),
                _ => Size5D::new(info.shape[2] as u32, info.shape[1] as u32, info.shape[0] as u32, 1, 1),
            };

            debug!("{}: size {} block {}", level_path, size, block_size);
            levels.push(ResolutionLevel { size, block_size });
        }

        Ok(Self {
            dataset_index,
            data_type,
            levels,
        })
    }

    pub fn number_of_resolutions(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, resolution: usize) -> Option<&ResolutionLevel> {
        self.levels.get(resolution)
    }

    /// Number of timepoints
    pub fn size_t(&self) -> u32 {
        self.levels.first().map_or(0, |level| level.size.t)
    }

    /// Number of channels
    pub fn size_c(&self) -> u32 {
        self.levels.first().map_or(0, |level| level.size.c)
    }

    /// Image size of every level, finest first
    pub fn sizes(&self) -> Vec<Size5D> {
        self.levels.iter().map(|level| level.size).collect()
    }

    /// Block size of every level, finest first
    pub fn block_sizes(&self) -> Vec<Size5D> {
        self.levels.iter().map(|level| level.block_size).collect()
    }

    /// Uncompressed size in bytes of one level
    pub fn total_size_bytes(&self, resolution: usize) -> usize {
        self.level(resolution)
            .map_or(0, |level| level.size.volume() * self.data_type.size_in_bytes())
    }

    /// Get a summary string of the layout
    pub fn summary(&self) -> String {
        let full = self.levels.first().map(|level| level.size).unwrap_or_default();
        format!(
            "Dataset {}: {} x {} x {}, {} channels, {} timepoints ({}), {} resolution levels, {} uncompressed",
            self.dataset_index,
            full.x,
            full.y,
            full.z,
            full.c,
            full.t,
            self.data_type,
            self.number_of_resolutions(),
            format_bytes(self.total_size_bytes(0))
        )
    }
}
