//! Image access - main API for reading Imaris images

use crate::auxiliary;
use crate::compression::{Filter, HDF5_PLUGIN_PATH};
use crate::error::{ImsError, Result};
use crate::io::{H5Store, Hyperslab};
use crate::layout::{PyramidLayout, DATASET_GROUP};
use crate::metadata::{self, Metadata};
use crate::parameters::{self, Parameters};
use crate::probe::{probe, probe_file, FormatInfo};
use crate::types::{DataType, Histogram, Index5D, Thumbnail, Voxel};
use crate::utils::{data_path, indexed_group, scatter_lines};
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options applied when opening an image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Single-writer/multiple-reader mode: refresh each dataset before reading
    pub swmr: bool,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set SWMR mode
    pub fn with_swmr(mut self, swmr: bool) -> Self {
        self.swmr = swmr;
        self
    }
}

/// Main interface for reading one dataset of an Imaris image
///
/// All operations on one reader are serialized by an internal lock, so a
/// reader can be shared between threads.
pub struct ImageReader {
    /// Open storage; held for the whole of every operation
    store: Mutex<Box<dyn H5Store>>,

    /// Pyramid discovered at open time
    layout: PyramidLayout,

    format: FormatInfo,
    options: ReadOptions,
}

impl ImageReader {
    /// Open dataset `dataset_index` of the file at `path`
    pub fn open(path: impl AsRef<Path>, dataset_index: u32, options: ReadOptions) -> Result<Self> {
        let (store, format) = probe_file(path.as_ref(), options.swmr)?;
        Self::with_format(store, format, dataset_index, options)
    }

    /// Wrap an already open store
    pub fn from_store(
        store: Box<dyn H5Store>,
        dataset_index: u32,
        options: ReadOptions,
    ) -> Result<Self> {
        let format = probe(store.as_ref())?;
        Self::with_format(store, format, dataset_index, options)
    }

    fn with_format(
        store: Box<dyn H5Store>,
        format: FormatInfo,
        dataset_index: u32,
        options: ReadOptions,
    ) -> Result<Self> {
        if dataset_index >= format.number_of_datasets {
            return Err(ImsError::OutOfBounds(format!(
                "dataset {} requested, file holds {}",
                dataset_index, format.number_of_datasets
            )));
        }
        let layout = PyramidLayout::discover(store.as_ref(), dataset_index)?;
        debug!("{}", layout.summary());
        Ok(Self {
            store: Mutex::new(store),
            layout,
            format,
            options,
        })
    }

    /// Get the pyramid layout
    pub fn layout(&self) -> &PyramidLayout {
        &self.layout
    }

    pub fn format(&self) -> &FormatInfo {
        &self.format
    }

    pub fn options(&self) -> ReadOptions {
        self.options
    }

    /// Voxel type stored in the file
    pub fn data_type(&self) -> DataType {
        self.layout.data_type
    }

    pub fn dataset_index(&self) -> u32 {
        self.layout.dataset_index
    }

    pub fn number_of_resolutions(&self) -> usize {
        self.layout.number_of_resolutions()
    }

    /// Read the metadata of the dataset
    pub fn read_metadata(&self) -> Result<Metadata> {
        let store = self.store.lock();
        metadata::read_metadata(store.as_ref(), &self.layout)
    }

    /// Read every parameter section of the dataset
    pub fn read_parameters(&self) -> Result<Parameters> {
        let store = self.store.lock();
        parameters::read_parameters(store.as_ref(), self.layout.dataset_index)
    }

    /// Read the histogram of one timepoint, channel and resolution level
    pub fn read_histogram(&self, time_point: u32, channel: u32, resolution: usize) -> Result<Histogram> {
        let store = self.store.lock();
        auxiliary::read_histogram(
            store.as_ref(),
            self.layout.dataset_index,
            time_point,
            channel,
            resolution,
        )
    }

    /// Read the preview image
    pub fn read_thumbnail(&self) -> Result<Thumbnail> {
        let store = self.store.lock();
        auxiliary::read_thumbnail(store.as_ref(), self.layout.dataset_index)
    }

    /// Read the window `[begin, end)` of a resolution level into `out`
    ///
    /// `end.t` and `end.c` are clamped to the image. `out` is filled X
    /// fastest, then Y, Z, C, T. Voxels of the window that lie outside the
    /// level keep their previous value in `out`. A slice that cannot be read
    /// is zero-filled and the read continues with the next slice.
    ///
    /// An unknown resolution level or an empty T/C range reads nothing.
    pub fn read_data<T: Voxel>(
        &self,
        begin: &Index5D,
        end: &Index5D,
        resolution: usize,
        out: &mut [T],
    ) -> Result<()> {
        let store = self.store.lock();

        if self.layout.level(resolution).is_none() {
            warn!(
                "resolution {} requested, image has {}",
                resolution,
                self.layout.number_of_resolutions()
            );
            return Ok(());
        }
        if end.x < begin.x || end.y < begin.y || end.z < begin.z {
            return Err(ImsError::InvalidDimensions(format!(
                "window end {} lies before begin {}",
                end, begin
            )));
        }

        let end_t = end.t.min(self.layout.size_t());
        let end_c = end.c.min(self.layout.size_c());
        if end_t <= begin.t || end_c <= begin.c {
            debug!("empty time/channel window {} .. {}", begin, end);
            return Ok(());
        }

        let required = self.window_len(begin, end)?;
        let window = [
            (end.x - begin.x) as usize,
            (end.y - begin.y) as usize,
            (end.z - begin.z) as usize,
        ];
        // bounded by `required`, which T and C only multiply
        let slice_len = window[0] * window[1] * window[2];
        if out.len() < required {
            return Err(ImsError::InvalidDimensions(format!(
                "buffer holds {} voxels, window needs {}",
                out.len(),
                required
            )));
        }
        if slice_len == 0 {
            return Ok(());
        }

        let root = indexed_group(DATASET_GROUP, self.layout.dataset_index);
        let start = [begin.z as usize, begin.y as usize, begin.x as usize];
        let mut scratch = Vec::new();
        let mut slices = out[..required].chunks_exact_mut(slice_len);
        for t in begin.t..end_t {
            for c in begin.c..end_c {
                if let Some(dst) = slices.next() {
                    let data = data_path(&root, resolution, t, c);
                    self.read_slice(store.as_ref(), &data, start, window, dst, &mut scratch);
                }
            }
        }
        Ok(())
    }

    /// Number of voxels [`read_data`](Self::read_data) writes for `[begin, end)`
    ///
    /// T and C are clamped to the image; a reversed window holds no voxels.
    /// Fails with `InvalidDimensions` when the count does not fit a `usize`.
    pub fn window_len(&self, begin: &Index5D, end: &Index5D) -> Result<usize> {
        let end_t = end.t.min(self.layout.size_t());
        let end_c = end.c.min(self.layout.size_c());
        [
            end.x.saturating_sub(begin.x),
            end.y.saturating_sub(begin.y),
            end.z.saturating_sub(begin.z),
            end_c.saturating_sub(begin.c),
            end_t.saturating_sub(begin.t),
        ]
        .iter()
        .try_fold(1usize, |len, &n| len.checked_mul(n as usize))
        .ok_or_else(|| {
            ImsError::InvalidDimensions(format!("window {} .. {} holds too many voxels", begin, end))
        })
    }

    /// Read one (timepoint, channel) slice of a window into `dst`
    fn read_slice<T: Voxel>(
        &self,
        store: &dyn H5Store,
        data: &str,
        start: [usize; 3],
        window: [usize; 3],
        dst: &mut [T],
        scratch: &mut Vec<T>,
    ) {
        if self.options.swmr {
            if let Err(err) = store.refresh(data) {
                warn!("refresh of {} failed: {}", data, err);
            }
        }

        let info = match store.dataset_info(data) {
            Ok(info) if info.ndim() == 3 => info,
            Ok(info) => {
                warn!("{} has {} dimensions, zero-filling", data, info.ndim());
                dst.fill(T::zero());
                return;
            }
            Err(err) => {
                warn!("{}: {}, zero-filling", data, err);
                dst.fill(T::zero());
                return;
            }
        };

        // storage order is (Z, Y, X), window order is (X, Y, Z)
        let count = [window[2], window[1], window[0]];
        let shape = &info.shape;
        let clipped: [usize; 3] =
            std::array::from_fn(|axis| count[axis].min(shape[axis].saturating_sub(start[axis])));
        let selection = Hyperslab::new(start, clipped);

        if clipped == count {
            if let Err(err) = store.read_hyperslab(data, &selection, T::as_voxel_slice(dst)) {
                warn_read_failure(data, &info.filters, &err);
                dst.fill(T::zero());
            }
            return;
        }

        if selection.is_empty() {
            debug!("window starting at {:?} lies outside {}", start, data);
            return;
        }
        scratch.clear();
        scratch.resize(selection.num_elements(), T::zero());
        if let Err(err) = store.read_hyperslab(data, &selection, T::as_voxel_slice(scratch)) {
            warn_read_failure(data, &info.filters, &err);
            scratch.fill(T::zero());
        }
        scatter_lines(
            scratch,
            [clipped[2], clipped[1], clipped[0]],
            dst,
            window,
        );
    }
}

fn warn_read_failure(data: &str, filters: &[Filter], err: &ImsError) {
    match filters.iter().find(|filter| filter.needs_plugin()) {
        Some(filter) => warn!(
            "reading {} failed: {}; its {:?} filter needs a plugin found through {}, zero-filling",
            data, err, filter, HDF5_PLUGIN_PATH
        ),
        None => warn!("reading {} failed: {}, zero-filling", data, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::synthetic::SyntheticImage;
    use crate::types::Size5D;

    fn create_reader(size: Size5D) -> ImageReader {
        let store = SyntheticImage::new(size).build().unwrap();
        ImageReader::from_store(Box::new(store), 0, ReadOptions::default()).unwrap()
    }

    #[test]
    fn test_open_synthetic_image() {
        let reader = create_reader(Size5D::new(8, 6, 4, 2, 3));
        assert_eq!(reader.data_type(), DataType::UInt16);
        assert_eq!(reader.number_of_resolutions(), 1);
        assert_eq!(reader.format().number_of_datasets, 1);
        assert_eq!(reader.layout().level(0).map(|level| level.size), Some(Size5D::new(8, 6, 4, 2, 3)));
        assert!(reader.layout().summary().contains("1 resolution levels"));
    }

    #[test]
    fn test_rejects_foreign_store() {
        let result = ImageReader::from_store(Box::new(MemoryStore::new()), 0, ReadOptions::new());
        assert!(matches!(result, Err(ImsError::Format(_))));
    }

    #[test]
    fn test_rejects_unknown_dataset_index() {
        let store = SyntheticImage::new(Size5D::new(2, 2, 2, 1, 1)).build().unwrap();
        let result = ImageReader::from_store(Box::new(store), 1, ReadOptions::new());
        assert!(matches!(result, Err(ImsError::OutOfBounds(_))));
    }

    #[test]
    fn test_read_full_window() {
        let reader = create_reader(Size5D::new(5, 4, 3, 1, 1));
        let mut out = vec![0u16; 5 * 4 * 3];
        reader
            .read_data(&Index5D::default(), &Index5D::new(5, 4, 3, 1, 1), 0, &mut out)
            .unwrap();
        let mut expected = Vec::new();
        for z in 0..3 {
            for y in 0..4 {
                for x in 0..5 {
                    expected.push(SyntheticImage::voxel(x, y, z, 0, 0, 0) as u16);
                }
            }
        }
        assert_eq!(out, expected);
    }

    #[test]
    fn test_reversed_window_rejected() {
        let reader = create_reader(Size5D::new(4, 4, 4, 1, 1));
        let mut out = vec![0u8; 64];
        let result = reader.read_data(&Index5D::new(2, 0, 0, 0, 0), &Index5D::new(1, 4, 4, 1, 1), 0, &mut out);
        assert!(matches!(result, Err(ImsError::InvalidDimensions(_))));
    }

    #[test]
    fn test_window_len_clamps_time_and_channel() {
        let reader = create_reader(Size5D::new(4, 4, 4, 2, 3));
        assert_eq!(reader.window_len(&Index5D::default(), &Index5D::new(2, 3, 4, 9, 9)).unwrap(), 2 * 3 * 4 * 2 * 3);
        assert_eq!(reader.window_len(&Index5D::new(0, 0, 0, 2, 0), &Index5D::new(2, 2, 2, 5, 3)).unwrap(), 0);
        assert_eq!(reader.window_len(&Index5D::new(3, 0, 0, 0, 0), &Index5D::new(1, 2, 2, 1, 1)).unwrap(), 0);
    }

    #[test]
    fn test_oversized_window_rejected() {
        let reader = create_reader(Size5D::new(4, 4, 4, 1, 1));
        let end = Index5D::new(u32::MAX, u32::MAX, u32::MAX, 1, 1);
        assert!(matches!(
            reader.window_len(&Index5D::default(), &end),
            Err(ImsError::InvalidDimensions(_))
        ));

        let mut out = vec![7u16; 64];
        let result = reader.read_data(&Index5D::default(), &end, 0, &mut out);
        assert!(matches!(result, Err(ImsError::InvalidDimensions(_))));
        assert!(out.iter().all(|&v| v == 7));
    }

    #[test]
    fn test_slices_without_decoder_are_zero_filled() {
        let store = SyntheticImage::new(Size5D::new(4, 4, 2, 1, 1))
            .with_filters([Filter::Lz4])
            .build()
            .unwrap();
        let reader = ImageReader::from_store(Box::new(store), 0, ReadOptions::default()).unwrap();
        assert_eq!(
            reader.read_metadata().unwrap().compression,
            crate::compression::CompressionAlgorithm::Lz4
        );

        let mut out = vec![7u16; 32];
        reader
            .read_data(&Index5D::default(), &Index5D::new(4, 4, 2, 1, 1), 0, &mut out)
            .unwrap();
        assert!(out.iter().all(|&v| v == 0));

        // clipped path zero-fills the valid part, padding keeps its value
        let mut out = vec![7u16; 5 * 4 * 2];
        reader
            .read_data(&Index5D::default(), &Index5D::new(5, 4, 2, 1, 1), 0, &mut out)
            .unwrap();
        assert_eq!(out[0], 0);
        assert_eq!(out[4], 7);
    }

    #[test]
    fn test_small_buffer_rejected() {
        let reader = create_reader(Size5D::new(4, 4, 4, 1, 1));
        let mut out = vec![0f32; 63];
        let result = reader.read_data(&Index5D::default(), &Index5D::new(4, 4, 4, 1, 1), 0, &mut out);
        assert!(matches!(result, Err(ImsError::InvalidDimensions(_))));
    }

    #[test]
    fn test_unknown_resolution_is_noop() {
        let reader = create_reader(Size5D::new(4, 4, 4, 1, 1));
        let mut out = vec![7u32; 8];
        reader
            .read_data(&Index5D::default(), &Index5D::new(2, 2, 2, 1, 1), 3, &mut out)
            .unwrap();
        assert_eq!(out, vec![7; 8]);
    }

    #[test]
    fn test_swmr_refreshes_every_slice() {
        let store = SyntheticImage::new(Size5D::new(2, 2, 2, 2, 2)).build().unwrap();
        let reader = ImageReader::from_store(Box::new(store), 0, ReadOptions::new().with_swmr(true)).unwrap();
        assert!(reader.options().swmr);
        let mut out = vec![0u8; 2 * 2 * 2 * 4];
        reader
            .read_data(&Index5D::default(), &Index5D::new(2, 2, 2, 2, 2), 0, &mut out)
            .unwrap();
        assert_eq!(out[0], SyntheticImage::voxel(0, 0, 0, 0, 0, 0) as u8);
        assert_eq!(out[8], SyntheticImage::voxel(0, 0, 0, 1, 0, 0) as u8);
        assert_eq!(out[16], SyntheticImage::voxel(0, 0, 0, 0, 1, 0) as u8);
    }
}
