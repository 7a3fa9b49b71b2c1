//! C ABI
//!
//! One family of entry points per voxel type (`uint8`, `uint16`, `uint32`,
//! `float`), all generated from one generic implementation. Every value
//! returned through a pointer is owned by the caller and must be released
//! exactly once with its paired free function:
//!
//! | allocated by                      | released by                  |
//! |-----------------------------------|------------------------------|
//! | `ims_create_*`                    | `ims_destroy_*`              |
//! | `ims_read_metadata_*`             | `ims_free_metadata`          |
//! | `ims_read_parameters_*`           | `ims_free_parameters`        |
//! | `ims_read_histogram_*`            | `ims_free_histogram`         |
//! | `ims_read_thumbnail_*`            | `ims_free_thumbnail`         |
//! | `ims_get_file_images_information` | `ims_free_data_types`        |
//!
//! Failures never unwind into the caller: they are logged and the outputs
//! are left empty (null pointers, zero sizes, untouched buffers).

use crate::access::{ImageReader, ReadOptions};
use crate::compression::CompressionAlgorithm;
use crate::error::{ImsError, Result};
use crate::probe::file_images_information;
use crate::types::{Color, ColorInfo, DataType, ImageExtent, Index5D, TimeInfo, Voxel};
use log::error;
use std::ffi::{c_char, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::{mem, ptr, slice};

/// Heap array handed across the boundary
#[repr(C)]
#[derive(Debug)]
pub struct ImsArray<T> {
    pub values: *mut T,
    pub size: u32,
}

impl<T> ImsArray<T> {
    pub const fn empty() -> Self {
        Self {
            values: ptr::null_mut(),
            size: 0,
        }
    }

    fn from_vec(values: Vec<T>) -> Result<Self> {
        if values.is_empty() {
            return Ok(Self::empty());
        }
        let size = u32::try_from(values.len())
            .map_err(|_| ImsError::Conversion(format!("{} elements exceed a C array", values.len())))?;
        let values = Box::into_raw(values.into_boxed_slice()).cast::<T>();
        Ok(Self { values, size })
    }

    /// Borrow the elements
    ///
    /// # Safety
    /// The array must have been filled by this library and not yet freed.
    pub unsafe fn as_slice(&self) -> &[T] {
        if self.values.is_null() {
            return &[];
        }
        slice::from_raw_parts(self.values, self.size as usize)
    }

    /// Take back ownership, leaving the array empty
    unsafe fn take(&mut self) -> Vec<T> {
        let array = mem::replace(self, Self::empty());
        if array.values.is_null() {
            return Vec::new();
        }
        Box::from_raw(ptr::slice_from_raw_parts_mut(array.values, array.size as usize)).into_vec()
    }
}

impl<T> Default for ImsArray<T> {
    fn default() -> Self {
        Self::empty()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImsIndex5D {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub c: u32,
    pub t: u32,
}

pub type ImsSize5D = ImsIndex5D;

impl From<ImsIndex5D> for Index5D {
    fn from(index: ImsIndex5D) -> Self {
        Index5D::new(index.x, index.y, index.z, index.c, index.t)
    }
}

impl From<&Index5D> for ImsIndex5D {
    fn from(index: &Index5D) -> Self {
        Self {
            x: index.x,
            y: index.y,
            z: index.z,
            c: index.c,
            t: index.t,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ImsOptions {
    pub swmr: bool,
}

/// Timepoint, channel and resolution level of a histogram
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ImsIndexTCR {
    pub t: u32,
    pub c: u32,
    pub r: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImsImageExtent {
    pub min_x: f32,
    pub min_y: f32,
    pub min_z: f32,
    pub max_x: f32,
    pub max_y: f32,
    pub max_z: f32,
}

impl From<&ImageExtent> for ImsImageExtent {
    fn from(extent: &ImageExtent) -> Self {
        Self {
            min_x: extent.min_x,
            min_y: extent.min_y,
            min_z: extent.min_z,
            max_x: extent.max_x,
            max_y: extent.max_y,
            max_z: extent.max_z,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImsTimeInfo {
    pub julian_day: u32,
    pub nanoseconds_of_day: u64,
}

impl From<&TimeInfo> for ImsTimeInfo {
    fn from(info: &TimeInfo) -> Self {
        Self {
            julian_day: u32::try_from(info.julian_day).unwrap_or(0),
            nanoseconds_of_day: info.nanoseconds_of_day,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImsColor {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub alpha: f32,
}

impl From<&Color> for ImsColor {
    fn from(color: &Color) -> Self {
        Self {
            red: color.red,
            green: color.green,
            blue: color.blue,
            alpha: color.alpha,
        }
    }
}

/// Channel color as exposed to C
///
/// The color table pointer and its length are flat members so the fields
/// after them keep their C offsets.
#[repr(C)]
#[derive(Debug)]
pub struct ImsColorInfo {
    pub is_base_color_mode: bool,
    pub base_color: ImsColor,
    pub color_table: *mut ImsColor,
    pub color_table_size: u32,
    pub opacity: f32,
    pub range_min: f32,
    pub range_max: f32,
    pub gamma_correction: f32,
}

impl ImsColorInfo {
    fn new(info: &ColorInfo) -> Result<Self> {
        let table = ImsArray::from_vec(info.color_table.iter().map(ImsColor::from).collect())?;
        Ok(Self {
            is_base_color_mode: info.is_base_color_mode,
            base_color: ImsColor::from(&info.base_color),
            color_table: table.values,
            color_table_size: table.size,
            opacity: info.opacity,
            range_min: info.range_min,
            range_max: info.range_max,
            gamma_correction: info.gamma_correction,
        })
    }

    /// Borrow the color table
    ///
    /// # Safety
    /// The info must have been filled by this library and not yet freed.
    pub unsafe fn color_table(&self) -> &[ImsColor] {
        if self.color_table.is_null() {
            return &[];
        }
        slice::from_raw_parts(self.color_table, self.color_table_size as usize)
    }

    unsafe fn take_color_table(&mut self) -> Vec<ImsColor> {
        let mut table = ImsArray {
            values: mem::replace(&mut self.color_table, ptr::null_mut()),
            size: mem::take(&mut self.color_table_size),
        };
        table.take()
    }
}

#[repr(C)]
#[derive(Debug)]
pub struct ImsParameter {
    pub name: *mut c_char,
    pub value: *mut c_char,
}

#[repr(C)]
#[derive(Debug)]
pub struct ImsParameterSection {
    pub name: *mut c_char,
    pub values: ImsArray<ImsParameter>,
}

/// Histogram as exposed to C
///
/// `min` and `max` are truncated to integers.
#[repr(C)]
#[derive(Debug)]
pub struct ImsHistogram {
    pub min: u32,
    pub max: u32,
    pub bins: ImsArray<u64>,
}

#[repr(C)]
#[derive(Debug)]
pub struct ImsThumbnail {
    pub size_x: u32,
    pub size_y: u32,
    pub interleaved_rgba: ImsArray<u8>,
}

pub type ImsSize5DVector = ImsArray<ImsSize5D>;
pub type ImsTimeInfoVector = ImsArray<ImsTimeInfo>;
pub type ImsColorInfoVector = ImsArray<ImsColorInfo>;
pub type ImsParameters = ImsArray<ImsParameterSection>;
/// `DataType` tags: 0 = uint8, 1 = uint16, 2 = uint32, 3 = float
pub type ImsDataTypeVector = ImsArray<u32>;

/// Open image behind an opaque C pointer
pub struct ImsImageHandle {
    reader: ImageReader,
    voxel: DataType,
}

/// Hand an open reader to C as a handle of voxel type `T`
///
/// Release it with the `ims_destroy_*` function of the same type.
pub fn into_handle<T: Voxel>(reader: ImageReader) -> *mut ImsImageHandle {
    Box::into_raw(Box::new(ImsImageHandle {
        reader,
        voxel: T::DATA_TYPE,
    }))
}

/// Run an entry point body, logging errors and containing panics
fn guard<R>(entry: &str, fallback: R, body: impl FnOnce() -> Result<R>) -> R {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => {
            error!("{}: {}", entry, err);
            fallback
        }
        Err(_) => {
            error!("{}: panicked", entry);
            fallback
        }
    }
}

unsafe fn path_from_c(path: *const c_char) -> Result<PathBuf> {
    if path.is_null() {
        return Err(ImsError::Configuration("null path".to_string()));
    }
    let path = CStr::from_ptr(path)
        .to_str()
        .map_err(|err| ImsError::Conversion(format!("path is not UTF-8: {}", err)))?;
    Ok(PathBuf::from(path))
}

unsafe fn index_from_c(index: *const ImsIndex5D, name: &str) -> Result<Index5D> {
    index
        .as_ref()
        .map(|&index| Index5D::from(index))
        .ok_or_else(|| ImsError::Configuration(format!("{} index is required", name)))
}

unsafe fn reader_for<'a, T: Voxel>(handle: *const ImsImageHandle) -> Result<&'a ImageReader> {
    let handle = handle
        .as_ref()
        .ok_or_else(|| ImsError::Configuration("null image handle".to_string()))?;
    if handle.voxel != T::DATA_TYPE {
        return Err(ImsError::Conversion(format!(
            "{} handle used as {}",
            handle.voxel,
            T::DATA_TYPE
        )));
    }
    Ok(&handle.reader)
}

fn into_c_string(text: &str) -> *mut c_char {
    CString::new(text.replace('\0', ""))
        .unwrap_or_default()
        .into_raw()
}

unsafe fn free_c_string(text: *mut c_char) {
    if !text.is_null() {
        drop(CString::from_raw(text));
    }
}

unsafe fn create<T: Voxel>(
    path: *const c_char,
    dataset_index: u32,
    options: *const ImsOptions,
) -> *mut ImsImageHandle {
    guard("ims_create", ptr::null_mut(), || {
        let path = path_from_c(path)?;
        let options = options
            .as_ref()
            .map(|options| ReadOptions::new().with_swmr(options.swmr))
            .unwrap_or_default();
        let reader = ImageReader::open(path, dataset_index, options)?;
        Ok(into_handle::<T>(reader))
    })
}

unsafe fn destroy<T: Voxel>(handle: *mut ImsImageHandle) {
    if handle.is_null() {
        return;
    }
    let handle = Box::from_raw(handle);
    if handle.voxel != T::DATA_TYPE {
        error!(
            "ims_destroy: {} handle released as {}",
            handle.voxel,
            T::DATA_TYPE
        );
    }
}

unsafe fn read_data<T: Voxel>(
    handle: *const ImsImageHandle,
    begin: *const ImsIndex5D,
    end: *const ImsIndex5D,
    resolution: u32,
    out: *mut T,
) {
    guard("ims_read_data", (), || {
        let reader = reader_for::<T>(handle)?;
        let begin = index_from_c(begin, "begin")?;
        let end = index_from_c(end, "end")?;
        let len = reader.window_len(&begin, &end)?;
        if len == 0 {
            return Ok(());
        }
        if out.is_null() {
            return Err(ImsError::Configuration("null output buffer".to_string()));
        }
        let out = slice::from_raw_parts_mut(out, len);
        reader.read_data(&begin, &end, resolution as usize, out)
    })
}

#[allow(clippy::too_many_arguments)]
unsafe fn read_metadata<T: Voxel>(
    handle: *const ImsImageHandle,
    sizes: *mut ImsSize5DVector,
    block_sizes: *mut ImsSize5DVector,
    extent: *mut ImsImageExtent,
    time_infos: *mut ImsTimeInfoVector,
    color_infos: *mut ImsColorInfoVector,
    compression: *mut u32,
) {
    for vector in [sizes, block_sizes] {
        if let Some(vector) = vector.as_mut() {
            *vector = ImsArray::empty();
        }
    }
    if let Some(time_infos) = time_infos.as_mut() {
        *time_infos = ImsArray::empty();
    }
    if let Some(color_infos) = color_infos.as_mut() {
        *color_infos = ImsArray::empty();
    }
    if let Some(compression) = compression.as_mut() {
        *compression = CompressionAlgorithm::Unknown as u32;
    }

    guard("ims_read_metadata", (), || {
        let metadata = reader_for::<T>(handle)?.read_metadata()?;

        if let Some(sizes) = sizes.as_mut() {
            *sizes = ImsArray::from_vec(metadata.size_per_resolution.iter().map(ImsSize5D::from).collect())?;
        }
        if let Some(block_sizes) = block_sizes.as_mut() {
            *block_sizes =
                ImsArray::from_vec(metadata.block_size_per_resolution.iter().map(ImsSize5D::from).collect())?;
        }
        if let Some(extent) = extent.as_mut() {
            *extent = ImsImageExtent::from(&metadata.extent);
        }
        if let Some(time_infos) = time_infos.as_mut() {
            *time_infos =
                ImsArray::from_vec(metadata.time_info_per_timepoint.iter().map(ImsTimeInfo::from).collect())?;
        }
        if let Some(color_infos) = color_infos.as_mut() {
            let infos = metadata
                .color_info_per_channel
                .iter()
                .map(ImsColorInfo::new)
                .collect::<Result<Vec<_>>>()?;
            *color_infos = ImsArray::from_vec(infos)?;
        }
        if let Some(compression) = compression.as_mut() {
            *compression = metadata.compression as u32;
        }
        Ok(())
    })
}

unsafe fn read_parameters<T: Voxel>(handle: *const ImsImageHandle, params: *mut ImsParameters) {
    let Some(params) = params.as_mut() else {
        error!("ims_read_parameters: null output");
        return;
    };
    *params = ImsArray::empty();

    guard("ims_read_parameters", (), || {
        let parameters = reader_for::<T>(handle)?.read_parameters()?;
        let mut sections = Vec::with_capacity(parameters.len());
        for (name, section) in &parameters.sections {
            let values = section
                .iter()
                .map(|(name, value)| ImsParameter {
                    name: into_c_string(name),
                    value: into_c_string(value),
                })
                .collect();
            sections.push(ImsParameterSection {
                name: into_c_string(name),
                values: ImsArray::from_vec(values)?,
            });
        }
        *params = ImsArray::from_vec(sections)?;
        Ok(())
    })
}

unsafe fn read_histogram<T: Voxel>(
    handle: *const ImsImageHandle,
    index: *const ImsIndexTCR,
) -> *mut ImsHistogram {
    guard("ims_read_histogram", ptr::null_mut(), || {
        let reader = reader_for::<T>(handle)?;
        let index = index
            .as_ref()
            .ok_or_else(|| ImsError::Configuration("histogram index is required".to_string()))?;
        let histogram = reader.read_histogram(index.t, index.c, index.r as usize)?;
        Ok(Box::into_raw(Box::new(ImsHistogram {
            min: histogram.min as u32,
            max: histogram.max as u32,
            bins: ImsArray::from_vec(histogram.bins)?,
        })))
    })
}

unsafe fn read_thumbnail<T: Voxel>(handle: *const ImsImageHandle) -> *mut ImsThumbnail {
    guard("ims_read_thumbnail", ptr::null_mut(), || {
        let thumbnail = reader_for::<T>(handle)?.read_thumbnail()?;
        Ok(Box::into_raw(Box::new(ImsThumbnail {
            size_x: thumbnail.size_x,
            size_y: thumbnail.size_y,
            interleaved_rgba: ImsArray::from_vec(thumbnail.interleaved_rgba)?,
        })))
    })
}

macro_rules! voxel_entry_points {
    (
        $t:ty,
        $create:ident,
        $destroy:ident,
        $read_data:ident,
        $read_metadata:ident,
        $read_parameters:ident,
        $read_histogram:ident,
        $read_thumbnail:ident
    ) => {
        /// Open dataset `dataset_index` of the image at `path`; null on failure
        ///
        /// # Safety
        /// `path` must be a NUL-terminated string, `options` null or valid.
        #[no_mangle]
        pub unsafe extern "C" fn $create(
            path: *const c_char,
            dataset_index: u32,
            options: *const ImsOptions,
        ) -> *mut ImsImageHandle {
            create::<$t>(path, dataset_index, options)
        }

        /// # Safety
        /// `handle` must come from the matching create call and not be used afterwards.
        #[no_mangle]
        pub unsafe extern "C" fn $destroy(handle: *mut ImsImageHandle) {
            destroy::<$t>(handle)
        }

        /// Read the window `[begin, end)` into `out`, X fastest, then Y, Z, C, T
        ///
        /// # Safety
        /// `out` must hold the whole window with T and C clamped to the image.
        #[no_mangle]
        pub unsafe extern "C" fn $read_data(
            handle: *const ImsImageHandle,
            begin: *const ImsIndex5D,
            end: *const ImsIndex5D,
            resolution: u32,
            out: *mut $t,
        ) {
            read_data::<$t>(handle, begin, end, resolution, out)
        }

        /// # Safety
        /// Every output pointer must be null or valid; release with `ims_free_metadata`.
        #[no_mangle]
        pub unsafe extern "C" fn $read_metadata(
            handle: *const ImsImageHandle,
            sizes: *mut ImsSize5DVector,
            block_sizes: *mut ImsSize5DVector,
            extent: *mut ImsImageExtent,
            time_infos: *mut ImsTimeInfoVector,
            color_infos: *mut ImsColorInfoVector,
            compression: *mut u32,
        ) {
            read_metadata::<$t>(handle, sizes, block_sizes, extent, time_infos, color_infos, compression)
        }

        /// # Safety
        /// `params` must be valid; release with `ims_free_parameters`.
        #[no_mangle]
        pub unsafe extern "C" fn $read_parameters(handle: *const ImsImageHandle, params: *mut ImsParameters) {
            read_parameters::<$t>(handle, params)
        }

        /// # Safety
        /// `index` must be valid; release the result with `ims_free_histogram`.
        #[no_mangle]
        pub unsafe extern "C" fn $read_histogram(
            handle: *const ImsImageHandle,
            index: *const ImsIndexTCR,
        ) -> *mut ImsHistogram {
            read_histogram::<$t>(handle, index)
        }

        /// # Safety
        /// Release the result with `ims_free_thumbnail`.
        #[no_mangle]
        pub unsafe extern "C" fn $read_thumbnail(handle: *const ImsImageHandle) -> *mut ImsThumbnail {
            read_thumbnail::<$t>(handle)
        }
    };
}

voxel_entry_points!(
    u8,
    ims_create_uint8,
    ims_destroy_uint8,
    ims_read_data_uint8,
    ims_read_metadata_uint8,
    ims_read_parameters_uint8,
    ims_read_histogram_uint8,
    ims_read_thumbnail_uint8
);
voxel_entry_points!(
    u16,
    ims_create_uint16,
    ims_destroy_uint16,
    ims_read_data_uint16,
    ims_read_metadata_uint16,
    ims_read_parameters_uint16,
    ims_read_histogram_uint16,
    ims_read_thumbnail_uint16
);
voxel_entry_points!(
    u32,
    ims_create_uint32,
    ims_destroy_uint32,
    ims_read_data_uint32,
    ims_read_metadata_uint32,
    ims_read_parameters_uint32,
    ims_read_histogram_uint32,
    ims_read_thumbnail_uint32
);
voxel_entry_points!(
    f32,
    ims_create_float,
    ims_destroy_float,
    ims_read_data_float,
    ims_read_metadata_float,
    ims_read_parameters_float,
    ims_read_histogram_float,
    ims_read_thumbnail_float
);

/// Release the arrays filled by `ims_read_metadata_*`, color tables included
///
/// # Safety
/// Each pointer must be null or an array filled by `ims_read_metadata_*`.
#[no_mangle]
pub unsafe extern "C" fn ims_free_metadata(
    sizes: *mut ImsSize5DVector,
    block_sizes: *mut ImsSize5DVector,
    time_infos: *mut ImsTimeInfoVector,
    color_infos: *mut ImsColorInfoVector,
) {
    for vector in [sizes, block_sizes] {
        if let Some(vector) = vector.as_mut() {
            drop(vector.take());
        }
    }
    if let Some(time_infos) = time_infos.as_mut() {
        drop(time_infos.take());
    }
    if let Some(color_infos) = color_infos.as_mut() {
        for mut info in color_infos.take() {
            drop(info.take_color_table());
        }
    }
}

/// Release every section, name and value filled by `ims_read_parameters_*`
///
/// # Safety
/// `params` must be null or filled by `ims_read_parameters_*`.
#[no_mangle]
pub unsafe extern "C" fn ims_free_parameters(params: *mut ImsParameters) {
    let Some(params) = params.as_mut() else {
        return;
    };
    for mut section in params.take() {
        free_c_string(section.name);
        for parameter in section.values.take() {
            free_c_string(parameter.name);
            free_c_string(parameter.value);
        }
    }
}

/// # Safety
/// `histogram` must be null or returned by `ims_read_histogram_*`.
#[no_mangle]
pub unsafe extern "C" fn ims_free_histogram(histogram: *mut ImsHistogram) {
    if !histogram.is_null() {
        let mut histogram = Box::from_raw(histogram);
        drop(histogram.bins.take());
    }
}

/// # Safety
/// `thumbnail` must be null or returned by `ims_read_thumbnail_*`.
#[no_mangle]
pub unsafe extern "C" fn ims_free_thumbnail(thumbnail: *mut ImsThumbnail) {
    if !thumbnail.is_null() {
        let mut thumbnail = Box::from_raw(thumbnail);
        drop(thumbnail.interleaved_rgba.take());
    }
}

/// Voxel type of every dataset in the file at `path`
///
/// Never null; an unreadable file yields an empty vector. Release with
/// `ims_free_data_types`.
///
/// # Safety
/// `path` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn ims_get_file_images_information(
    path: *const c_char,
    swmr: bool,
) -> *mut ImsDataTypeVector {
    let tags = guard("ims_get_file_images_information", ImsArray::empty(), || {
        let path = path_from_c(path)?;
        let tags = file_images_information(path, swmr)
            .into_iter()
            .map(|data_type| data_type as u32)
            .collect();
        ImsArray::from_vec(tags)
    });
    Box::into_raw(Box::new(tags))
}

/// # Safety
/// `data_types` must be null or returned by `ims_get_file_images_information`.
#[no_mangle]
pub unsafe extern "C" fn ims_free_data_types(data_types: *mut ImsDataTypeVector) {
    if !data_types.is_null() {
        let mut data_types = Box::from_raw(data_types);
        drop(data_types.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticImage;
    use crate::types::Size5D;

    fn create_handle<T: Voxel>(size: Size5D) -> *mut ImsImageHandle {
        let store = SyntheticImage::new(size).with_fine_histogram(true).build().unwrap();
        into_handle::<T>(ImageReader::from_store(Box::new(store), 0, ReadOptions::default()).unwrap())
    }

    #[test]
    fn test_create_missing_file_returns_null() {
        let path = CString::new("/nonexistent/image.ims").unwrap();
        let handle = unsafe { ims_create_uint16(path.as_ptr(), 0, ptr::null()) };
        assert!(handle.is_null());
        unsafe { ims_destroy_uint16(handle) };
    }

    #[test]
    fn test_read_data_through_handle() {
        let handle = create_handle::<u16>(Size5D::new(4, 3, 2, 1, 1));
        let begin = ImsIndex5D::default();
        let end = ImsIndex5D { x: 4, y: 3, z: 2, c: 5, t: 5 };
        let mut out = vec![0u16; 24];
        unsafe {
            ims_read_data_uint16(handle, &begin, &end, 0, out.as_mut_ptr());
            ims_destroy_uint16(handle);
        }
        assert_eq!(out[0], SyntheticImage::voxel(0, 0, 0, 0, 0, 0) as u16);
        assert_eq!(out[23], SyntheticImage::voxel(3, 2, 1, 0, 0, 0) as u16);
    }

    #[test]
    fn test_oversized_window_leaves_buffer_untouched() {
        let handle = create_handle::<u16>(Size5D::new(4, 3, 2, 1, 1));
        let end = ImsIndex5D { x: u32::MAX, y: u32::MAX, z: u32::MAX, c: 1, t: 1 };
        let mut out = [9u16; 4];
        unsafe {
            ims_read_data_uint16(handle, &ImsIndex5D::default(), &end, 0, out.as_mut_ptr());
            ims_destroy_uint16(handle);
        }
        assert_eq!(out, [9; 4]);
    }

    #[test]
    fn test_mismatched_voxel_type_is_noop() {
        let handle = create_handle::<u8>(Size5D::new(2, 2, 1, 1, 1));
        let end = ImsIndex5D { x: 2, y: 2, z: 1, c: 1, t: 1 };
        let mut out = [7u32; 4];
        unsafe {
            ims_read_data_uint32(handle, &ImsIndex5D::default(), &end, 0, out.as_mut_ptr());
            assert!(ims_read_thumbnail_float(handle).is_null());
            ims_destroy_uint8(handle);
        }
        assert_eq!(out, [7; 4]);
    }

    #[test]
    fn test_null_handle_yields_empty_outputs() {
        let mut sizes = ImsSize5DVector::empty();
        let mut params = ImsParameters::empty();
        let mut compression = 0u32;
        unsafe {
            ims_read_metadata_uint8(
                ptr::null(),
                &mut sizes,
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
                &mut compression,
            );
            ims_read_parameters_uint8(ptr::null(), &mut params);
            assert!(ims_read_histogram_uint8(ptr::null(), &ImsIndexTCR::default()).is_null());
        }
        assert!(sizes.values.is_null());
        assert_eq!(params.size, 0);
        assert_eq!(compression, CompressionAlgorithm::Unknown as u32);
    }

    #[test]
    fn test_metadata_marshalling() {
        let handle = create_handle::<f32>(Size5D::new(4, 4, 2, 2, 3));
        let mut sizes = ImsSize5DVector::empty();
        let mut block_sizes = ImsSize5DVector::empty();
        let mut extent = ImsImageExtent::default();
        let mut time_infos = ImsTimeInfoVector::empty();
        let mut color_infos = ImsColorInfoVector::empty();
        let mut compression = 0u32;
        unsafe {
            ims_read_metadata_float(
                handle,
                &mut sizes,
                &mut block_sizes,
                &mut extent,
                &mut time_infos,
                &mut color_infos,
                &mut compression,
            );
            assert_eq!(sizes.as_slice(), &[ImsSize5D { x: 4, y: 4, z: 2, c: 2, t: 3 }]);
            assert_eq!(time_infos.size, 3);
            assert_eq!(time_infos.as_slice()[0].julian_day, 2_455_893);
            let colors = color_infos.as_slice();
            assert!(colors[0].is_base_color_mode);
            assert_eq!(colors[1].color_table_size, 3);
            assert_eq!(colors[1].color_table()[2].red, 1.0);
            ims_free_metadata(&mut sizes, &mut block_sizes, &mut time_infos, &mut color_infos);
            ims_destroy_float(handle);
        }
        assert_eq!(extent.max_x, 4.0);
        assert_eq!(compression, CompressionAlgorithm::None as u32);
        assert!(sizes.values.is_null() && color_infos.values.is_null());
    }

    #[test]
    fn test_parameters_and_histogram() {
        let handle = create_handle::<u32>(Size5D::new(2, 2, 2, 1, 1));
        let mut params = ImsParameters::empty();
        unsafe {
            ims_read_parameters_uint32(handle, &mut params);
            let names: Vec<_> = params
                .as_slice()
                .iter()
                .map(|section| CStr::from_ptr(section.name).to_str().unwrap().to_string())
                .collect();
            assert!(names.contains(&"Image".to_string()));
            ims_free_parameters(&mut params);

            let histogram = ims_read_histogram_uint32(handle, &ImsIndexTCR::default());
            assert!(!histogram.is_null());
            assert_eq!((*histogram).bins.size, 1024);
            assert_eq!(((*histogram).min, (*histogram).max), (0, 255));
            ims_free_histogram(histogram);

            let thumbnail = ims_read_thumbnail_uint32(handle);
            assert_eq!(((*thumbnail).size_x, (*thumbnail).size_y), (8, 8));
            ims_free_thumbnail(thumbnail);
            ims_destroy_uint32(handle);
        }
        assert_eq!(params.size, 0);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_struct_layouts_match_c_header() {
        use std::mem::{align_of, offset_of, size_of};

        assert_eq!(size_of::<ImsIndex5D>(), 20);
        assert_eq!(offset_of!(ImsIndex5D, t), 16);
        assert_eq!(size_of::<ImsOptions>(), 1);
        assert_eq!(size_of::<ImsIndexTCR>(), 12);
        assert_eq!(size_of::<ImsImageExtent>(), 24);
        assert_eq!(offset_of!(ImsImageExtent, max_z), 20);
        assert_eq!(size_of::<ImsColor>(), 16);

        assert_eq!(offset_of!(ImsTimeInfo, nanoseconds_of_day), 8);
        assert_eq!(size_of::<ImsTimeInfo>(), 16);

        assert_eq!(offset_of!(ImsColorInfo, base_color), 4);
        assert_eq!(offset_of!(ImsColorInfo, color_table), 24);
        assert_eq!(offset_of!(ImsColorInfo, color_table_size), 32);
        assert_eq!(offset_of!(ImsColorInfo, opacity), 36);
        assert_eq!(offset_of!(ImsColorInfo, range_min), 40);
        assert_eq!(offset_of!(ImsColorInfo, range_max), 44);
        assert_eq!(offset_of!(ImsColorInfo, gamma_correction), 48);
        assert_eq!(size_of::<ImsColorInfo>(), 56);

        assert_eq!(size_of::<ImsParameter>(), 16);
        assert_eq!(offset_of!(ImsParameter, value), 8);
        assert_eq!(offset_of!(ImsParameterSection, values), 8);
        assert_eq!(size_of::<ImsParameterSection>(), 24);

        assert_eq!(offset_of!(ImsHistogram, max), 4);
        assert_eq!(offset_of!(ImsHistogram, bins), 8);
        assert_eq!(size_of::<ImsHistogram>(), 24);
        assert_eq!(offset_of!(ImsThumbnail, interleaved_rgba), 8);
        assert_eq!(size_of::<ImsThumbnail>(), 24);

        assert_eq!(offset_of!(ImsArray<u8>, size), 8);
        assert_eq!(size_of::<ImsDataTypeVector>(), 16);
        assert_eq!(size_of::<ImsColorInfoVector>(), 16);
        assert_eq!(align_of::<ImsColorInfo>(), 8);
    }

    #[test]
    fn test_file_images_information_for_missing_file() {
        let path = CString::new("/nonexistent/image.ims").unwrap();
        unsafe {
            let types = ims_get_file_images_information(path.as_ptr(), false);
            assert!(!types.is_null());
            assert_eq!((*types).size, 0);
            ims_free_data_types(types);
        }
    }
}
