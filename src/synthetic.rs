//! Synthetic Imaris images assembled in a [`MemoryStore`]
//!
//! Produces the complete group layout an Imaris writer emits, with voxel
//! values given by [`SyntheticImage::voxel`], so tests, benchmarks and demos
//! can exercise the reader without a file on disk.

use crate::auxiliary::THUMBNAIL_GROUP;
use crate::compression::Filter;
use crate::error::Result;
use crate::layout::DATASET_GROUP;
use crate::memory::{MemoryDataset, MemoryStore};
use crate::metadata::DATASET_INFO_GROUP;
use crate::probe::{IMARIS_DATASET_MARKER, SUPPORTED_IMARIS_VERSION};
use crate::types::{DataType, ImageExtent, Size5D};
use crate::utils::{channel_group_path, indexed_group};

/// Side length of the generated thumbnail
const THUMBNAIL_SIZE: usize = 8;
/// Acquisition time of timepoint 0, in seconds after midnight
const FIRST_TIME_POINT_SECONDS: u32 = 15 * 3600 + 42 * 60 + 37;

/// Builder for a synthetic multi-resolution image
#[derive(Debug, Clone)]
pub struct SyntheticImage {
    size: Size5D,
    resolution_levels: usize,
    block_size: [usize; 3],
    data_type: DataType,
    filters: Vec<Filter>,
    number_of_datasets: u32,
    extent: ImageExtent,
    fine_histogram: bool,
}

impl SyntheticImage {
    /// Image of `size` at full resolution, one level, 16-bit voxels
    pub fn new(size: Size5D) -> Self {
        Self {
            size,
            resolution_levels: 1,
            block_size: [32, 32, 8],
            data_type: DataType::UInt16,
            filters: Vec::new(),
            number_of_datasets: 1,
            extent: ImageExtent {
                max_x: size.x as f32,
                max_y: size.y as f32,
                max_z: size.z as f32,
                ..ImageExtent::default()
            },
            fine_histogram: false,
        }
    }

    pub fn with_resolution_levels(mut self, levels: usize) -> Self {
        self.resolution_levels = levels.max(1);
        self
    }

    /// Chunk size along X, Y, Z
    pub fn with_block_size(mut self, x: usize, y: usize, z: usize) -> Self {
        self.block_size = [x.max(1), y.max(1), z.max(1)];
        self
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn with_filters(mut self, filters: impl Into<Vec<Filter>>) -> Self {
        self.filters = filters.into();
        self
    }

    pub fn with_number_of_datasets(mut self, count: u32) -> Self {
        self.number_of_datasets = count.max(1);
        self
    }

    pub fn with_extent(mut self, extent: ImageExtent) -> Self {
        self.extent = extent;
        self
    }

    /// Also write `Histogram1024` next to the 256-bin histogram
    pub fn with_fine_histogram(mut self, enabled: bool) -> Self {
        self.fine_histogram = enabled;
        self
    }

    /// Image size of a level; each level halves X, Y, Z rounding up
    pub fn level_size(&self, level: usize) -> Size5D {
        let halve = |n: u32| {
            let divisor = 1u64 << level.min(31);
            (n as u64).div_ceil(divisor) as u32
        };
        Size5D::new(
            halve(self.size.x),
            halve(self.size.y),
            halve(self.size.z),
            self.size.c,
            self.size.t,
        )
    }

    /// Stored value of a voxel; always below 251
    pub fn voxel(x: u32, y: u32, z: u32, c: u32, t: u32, level: usize) -> u32 {
        let sum = x as u64
            + 3 * y as u64
            + 5 * z as u64
            + 7 * c as u64
            + 11 * t as u64
            + 13 * level as u64;
        (sum % 251) as u32
    }

    /// Assemble the image
    pub fn build(&self) -> Result<MemoryStore> {
        let mut store = MemoryStore::new();
        store.set_attribute("/", "ImarisVersion", SUPPORTED_IMARIS_VERSION)?;
        store.set_attribute("/", "ImarisDataSet", IMARIS_DATASET_MARKER)?;
        store.set_attribute("/", "NumberOfDataSets", self.number_of_datasets)?;
        store.set_attribute("/", "DataSetDirectoryName", DATASET_GROUP)?;
        store.set_attribute("/", "DataSetInfoDirectoryName", DATASET_INFO_GROUP)?;
        store.set_attribute("/", "ThumbnailDirectoryName", THUMBNAIL_GROUP)?;

        for index in 0..self.number_of_datasets {
            self.write_pyramid(&mut store, index)?;
            self.write_info(&mut store, index)?;
            self.write_thumbnail(&mut store, index)?;
        }
        Ok(store)
    }

    fn data_for(&self, shape: [usize; 3], values: &[u32]) -> Result<MemoryDataset> {
        let dataset = match self.data_type {
            DataType::UInt8 => {
                MemoryDataset::new(shape, &values.iter().map(|&v| v as u8).collect::<Vec<_>>())?
            }
            DataType::UInt16 => {
                MemoryDataset::new(shape, &values.iter().map(|&v| v as u16).collect::<Vec<_>>())?
            }
            DataType::UInt32 => MemoryDataset::new(shape, values)?,
            DataType::Float32 => {
                MemoryDataset::new(shape, &values.iter().map(|&v| v as f32).collect::<Vec<_>>())?
            }
        };
        let [bx, by, bz] = self.block_size;
        let chunk = [bz.min(shape[0]), by.min(shape[1]), bx.min(shape[2])];
        Ok(dataset.with_chunk(chunk).with_filters(self.filters.clone()))
    }

    fn write_pyramid(&self, store: &mut MemoryStore, index: u32) -> Result<()> {
        let root = indexed_group(DATASET_GROUP, index);
        for level in 0..self.resolution_levels {
            let size = self.level_size(level);
            for t in 0..size.t {
                for c in 0..size.c {
                    let group = channel_group_path(&root, level, t, c);
                    let mut values = Vec::with_capacity(size.spatial_volume());
                    for z in 0..size.z {
                        for y in 0..size.y {
                            for x in 0..size.x {
                                values.push(Self::voxel(x, y, z, c, t, level));
                            }
                        }
                    }

                    let shape = [size.z as usize, size.y as usize, size.x as usize];
                    store.create_dataset(&format!("{}/Data", group), self.data_for(shape, &values)?)?;
                    store.set_attribute(&group, "ImageSizeX", size.x.to_string())?;
                    store.set_attribute(&group, "ImageSizeY", size.y.to_string())?;
                    store.set_attribute(&group, "ImageSizeZ", size.z.to_string())?;

                    let mut bins = vec![0u64; 256];
                    for &value in &values {
                        bins[value as usize] += 1;
                    }
                    store.create_dataset(&format!("{}/Histogram", group), MemoryDataset::new([256], &bins)?)?;
                    store.set_attribute(&group, "HistogramMin", "0.000")?;
                    store.set_attribute(&group, "HistogramMax", "255.000")?;

                    if self.fine_histogram {
                        let mut fine = vec![0u64; 1024];
                        for &value in &values {
                            fine[value as usize * 4] += 1;
                        }
                        store.create_dataset(
                            &format!("{}/Histogram1024", group),
                            MemoryDataset::new([1024], &fine)?,
                        )?;
                        store.set_attribute(&group, "HistogramMin1024", "0.000")?;
                        store.set_attribute(&group, "HistogramMax1024", "255.750")?;
                    }
                }
            }
        }
        Ok(())
    }

    fn write_info(&self, store: &mut MemoryStore, index: u32) -> Result<()> {
        let info = indexed_group(DATASET_INFO_GROUP, index);

        let imaris = format!("{}/Imaris", info);
        store.create_group(&imaris)?;
        store.set_attribute(&imaris, "Version", "7.0")?;
        store.set_attribute(&imaris, "ThumbnailMode", "thumbnailMIP")?;

        let image = format!("{}/Image", info);
        store.create_group(&image)?;
        store.set_attribute(&image, "X", self.size.x.to_string())?;
        store.set_attribute(&image, "Y", self.size.y.to_string())?;
        store.set_attribute(&image, "Z", self.size.z.to_string())?;
        store.set_attribute(&image, "Unit", "um")?;
        let extent = &self.extent;
        for (name, value) in [
            ("ExtMin0", extent.min_x),
            ("ExtMin1", extent.min_y),
            ("ExtMin2", extent.min_z),
            ("ExtMax0", extent.max_x),
            ("ExtMax1", extent.max_y),
            ("ExtMax2", extent.max_z),
        ] {
            store.set_attribute(&image, name, format!("{:.3}", value))?;
        }
        store.create_dataset(
            &format!("{}/Description%s1%p;", image),
            MemoryDataset::text("synthetic image"),
        )?;

        let time_info = format!("{}/TimeInfo", info);
        store.create_group(&time_info)?;
        store.set_attribute(&time_info, "DatasetTimePoints", self.size.t.to_string())?;
        store.set_attribute(&time_info, "FileTimePoints", self.size.t.to_string())?;
        for t in 0..self.size.t {
            let seconds = FIRST_TIME_POINT_SECONDS + t;
            let stamp = format!(
                "2011-11-27 {:02}:{:02}:{:02}.285",
                (seconds / 3600) % 24,
                (seconds / 60) % 60,
                seconds % 60
            );
            store.set_attribute(&time_info, &format!("TimePoint{}", t + 1), stamp)?;
        }

        for c in 0..self.size.c {
            let channel = format!("{}/Channel {}", info, c);
            store.create_group(&channel)?;
            store.set_attribute(&channel, "Name", format!("Channel {}", c))?;
            if c % 2 == 0 {
                let mut rgb = ["0.000"; 3];
                rgb[(c as usize / 2) % 3] = "1.000";
                store.set_attribute(&channel, "ColorMode", "BaseColor")?;
                store.set_attribute(&channel, "Color", rgb.join(" "))?;
            } else {
                store.set_attribute(&channel, "ColorMode", "TableColor")?;
                store.create_dataset(
                    &format!("{}/ColorTable", channel),
                    MemoryDataset::text("0.000 0.000 0.000 0.500 0.500 0.500 1.000 1.000 1.000"),
                )?;
            }
            store.set_attribute(&channel, "ColorOpacity", "1.000")?;
            store.set_attribute(&channel, "ColorRange", "0.000 250.000")?;
            store.set_attribute(&channel, "GammaCorrection", "1.000")?;
        }
        Ok(())
    }

    fn write_thumbnail(&self, store: &mut MemoryStore, index: u32) -> Result<()> {
        let columns = THUMBNAIL_SIZE * 4;
        let pixels: Vec<u8> = (0..THUMBNAIL_SIZE * columns).map(|i| (i % 256) as u8).collect();
        store.create_dataset(
            &format!("{}/Data", indexed_group(THUMBNAIL_GROUP, index)),
            MemoryDataset::new([THUMBNAIL_SIZE, columns], &pixels)?,
        )
    }
}
