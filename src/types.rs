//! Core data types for Imaris images

use crate::error::{ImsError, Result};
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use num_traits::{NumCast, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

/// Voxel types an Imaris image can store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum DataType {
    /// Unsigned 8-bit integer
    UInt8 = 0,
    /// Unsigned 16-bit integer
    UInt16 = 1,
    /// Unsigned 32-bit integer
    UInt32 = 2,
    /// 32-bit floating point
    Float32 = 3,
}

impl DataType {
    /// Convert from the raw tag used at the C boundary
    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            0 => Ok(DataType::UInt8),
            1 => Ok(DataType::UInt16),
            2 => Ok(DataType::UInt32),
            3 => Ok(DataType::Float32),
            other => Err(ImsError::Conversion(format!("unknown data type tag {}", other))),
        }
    }

    /// Pick the voxel type from the stored element width and class
    pub fn from_element(size_in_bytes: usize, is_float: bool) -> Result<Self> {
        match (size_in_bytes, is_float) {
            (1, _) => Ok(DataType::UInt8),
            (2, _) => Ok(DataType::UInt16),
            (4, true) => Ok(DataType::Float32),
            (4, false) => Ok(DataType::UInt32),
            (size, _) => Err(ImsError::Format(format!(
                "unsupported voxel byte width {}",
                size
            ))),
        }
    }

    /// Size in bytes of this data type
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataType::UInt8 => 1,
            DataType::UInt16 => 2,
            DataType::UInt32 | DataType::Float32 => 4,
        }
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Axis of the 5D index space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
    C = 3,
    T = 4,
}

impl Axis {
    pub const ALL: [Axis; 5] = [Axis::X, Axis::Y, Axis::Z, Axis::C, Axis::T];

    /// Convert from usize index
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// A position (or size) in the X, Y, Z, C, T index space
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Index5D {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub c: u32,
    pub t: u32,
}

/// Extent of an image or a block, same layout as [`Index5D`]
pub type Size5D = Index5D;

impl Index5D {
    pub fn new(x: u32, y: u32, z: u32, c: u32, t: u32) -> Self {
        Self { x, y, z, c, t }
    }

    /// Number of elements spanned when used as a size
    pub fn volume(&self) -> usize {
        Axis::ALL.iter().map(|&axis| self[axis] as usize).product()
    }

    /// Number of spatial elements (X * Y * Z)
    pub fn spatial_volume(&self) -> usize {
        self.x as usize * self.y as usize * self.z as usize
    }
}

impl Index<Axis> for Index5D {
    type Output = u32;

    fn index(&self, axis: Axis) -> &u32 {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
            Axis::C => &self.c,
            Axis::T => &self.t,
        }
    }
}

impl IndexMut<Axis> for Index5D {
    fn index_mut(&mut self, axis: Axis) -> &mut u32 {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Z => &mut self.z,
            Axis::C => &mut self.c,
            Axis::T => &mut self.t,
        }
    }
}

impl fmt::Display for Index5D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(x={}, y={}, z={}, c={}, t={})",
            self.x, self.y, self.z, self.c, self.t
        )
    }
}

/// Typed destination buffer handed to a store read
///
/// The variant selects the in-memory element type; the store converts from
/// the stored element type.
#[derive(Debug)]
pub enum VoxelSliceMut<'a> {
    UInt8(&'a mut [u8]),
    UInt16(&'a mut [u16]),
    UInt32(&'a mut [u32]),
    Float32(&'a mut [f32]),
}

impl VoxelSliceMut<'_> {
    pub fn len(&self) -> usize {
        match self {
            VoxelSliceMut::UInt8(s) => s.len(),
            VoxelSliceMut::UInt16(s) => s.len(),
            VoxelSliceMut::UInt32(s) => s.len(),
            VoxelSliceMut::Float32(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        match self {
            VoxelSliceMut::UInt8(_) => DataType::UInt8,
            VoxelSliceMut::UInt16(_) => DataType::UInt16,
            VoxelSliceMut::UInt32(_) => DataType::UInt32,
            VoxelSliceMut::Float32(_) => DataType::Float32,
        }
    }
}

/// Element types the reader can deliver voxels as
pub trait Voxel: Copy + Default + Send + Sync + Zero + NumCast + fmt::Debug + 'static {
    const DATA_TYPE: DataType;

    fn as_voxel_slice(data: &mut [Self]) -> VoxelSliceMut<'_>;
}

macro_rules! impl_voxel {
    ($t:ty, $variant:ident) => {
        impl Voxel for $t {
            const DATA_TYPE: DataType = DataType::$variant;

            fn as_voxel_slice(data: &mut [Self]) -> VoxelSliceMut<'_> {
                VoxelSliceMut::$variant(data)
            }
        }
    };
}

impl_voxel!(u8, UInt8);
impl_voxel!(u16, UInt16);
impl_voxel!(u32, UInt32);
impl_voxel!(f32, Float32);

/// Physical bounding box of the image
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageExtent {
    pub min_x: f32,
    pub min_y: f32,
    pub min_z: f32,
    pub max_x: f32,
    pub max_y: f32,
    pub max_z: f32,
}

impl ImageExtent {
    /// Physical voxel size at a given image size
    pub fn voxel_size(&self, size: &Size5D) -> [f32; 3] {
        let step = |min: f32, max: f32, n: u32| if n == 0 { 0.0 } else { (max - min) / n as f32 };
        [
            step(self.min_x, self.max_x, size.x),
            step(self.min_y, self.max_y, size.y),
            step(self.min_z, self.max_z, size.z),
        ]
    }
}

/// Offset between the chrono day count and the Julian day number
const JULIAN_DAY_OF_CE_DAY_ZERO: i32 = 1_721_425;
const NANOS_PER_SECOND: u64 = 1_000_000_000;
const NANOS_PER_DAY: u64 = 86_400 * NANOS_PER_SECOND;

/// Acquisition time of one timepoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeInfo {
    pub julian_day: i32,
    pub nanoseconds_of_day: u64,
}

impl TimeInfo {
    pub fn new(julian_day: i32, nanoseconds_of_day: u64) -> Self {
        Self {
            julian_day,
            nanoseconds_of_day,
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self::new(date.num_days_from_ce() + JULIAN_DAY_OF_CE_DAY_ZERO, 0)
    }

    /// Calendar date, if the Julian day is representable
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_num_days_from_ce_opt(self.julian_day - JULIAN_DAY_OF_CE_DAY_ZERO)
    }

    /// Nanoseconds elapsed since Julian day 0
    pub fn total_nanoseconds(&self) -> i128 {
        self.julian_day as i128 * NANOS_PER_DAY as i128 + self.nanoseconds_of_day as i128
    }
}

fn parse_time_of_day(text: &str) -> Result<u64> {
    let time = NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .map_err(|e| ImsError::Format(format!("invalid time '{}': {}", text, e)))?;
    Ok(time.num_seconds_from_midnight() as u64 * NANOS_PER_SECOND + time.nanosecond() as u64)
}

fn parse_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|e| ImsError::Format(format!("invalid date '{}': {}", text, e)))
}

impl FromStr for TimeInfo {
    type Err = ImsError;

    /// Accepts `"YYYY-MM-DD HH:MM:SS.fff"`, a date alone (midnight) or a
    /// time alone (Julian day 0).
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(date), Some(time), None) => {
                let mut info = TimeInfo::from_date(parse_date(date)?);
                info.nanoseconds_of_day = parse_time_of_day(time)?;
                Ok(info)
            }
            (Some(single), None, None) if single.contains(':') => {
                Ok(TimeInfo::new(0, parse_time_of_day(single)?))
            }
            (Some(single), None, None) => Ok(TimeInfo::from_date(parse_date(single)?)),
            _ => Err(ImsError::Format(format!("invalid time stamp '{}'", s))),
        }
    }
}

impl fmt::Display for TimeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.nanoseconds_of_day / NANOS_PER_SECOND;
        let millis = (self.nanoseconds_of_day % NANOS_PER_SECOND) / 1_000_000;
        if let Some(date) = self.date() {
            write!(f, "{} ", date.format("%Y-%m-%d"))?;
        }
        write!(
            f,
            "{:02}:{:02}:{:02}.{:03}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            millis
        )
    }
}

/// RGBA color with components in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub alpha: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);

    pub const fn rgb(red: f32, green: f32, blue: f32) -> Self {
        Self {
            red,
            green,
            blue,
            alpha: 1.0,
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

/// Display settings of one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorInfo {
    /// True when `base_color` applies, false when `color_table` does
    pub is_base_color_mode: bool,
    pub base_color: Color,
    pub color_table: Vec<Color>,
    pub opacity: f32,
    pub range_min: f32,
    pub range_max: f32,
    pub gamma_correction: f32,
}

impl Default for ColorInfo {
    fn default() -> Self {
        Self {
            is_base_color_mode: true,
            base_color: Color::WHITE,
            color_table: Vec::new(),
            opacity: 1.0,
            range_min: 0.0,
            range_max: 255.0,
            gamma_correction: 1.0,
        }
    }
}

/// Voxel histogram of one (timepoint, channel, resolution)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub min: f32,
    pub max: f32,
    pub bins: Vec<u64>,
}

impl Histogram {
    /// Sum of all bin counts
    pub fn total_count(&self) -> u64 {
        self.bins.iter().sum()
    }

    /// Width of one bin in value units
    pub fn bin_width(&self) -> f32 {
        if self.bins.is_empty() {
            0.0
        } else {
            (self.max - self.min) / self.bins.len() as f32
        }
    }
}

/// Preview image, interleaved RGBA bytes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub size_x: u32,
    pub size_y: u32,
    pub interleaved_rgba: Vec<u8>,
}
