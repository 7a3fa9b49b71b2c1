//! Utility functions

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::str::FromStr;

/// Signature at the start of an HDF5 superblock
const HDF5_SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1a, b'\n'];

/// Name of the `index`-th instance of a top-level group
///
/// The first instance carries no suffix: `DataSet`, `DataSet1`, `DataSet2`...
pub fn indexed_group(name: &str, index: u32) -> String {
    if index == 0 {
        format!("/{}", name)
    } else {
        format!("/{}{}", name, index)
    }
}

pub fn resolution_level_path(dataset_root: &str, level: usize) -> String {
    format!("{}/ResolutionLevel {}", dataset_root, level)
}

pub fn time_point_path(level_path: &str, time_point: u32) -> String {
    format!("{}/TimePoint {}", level_path, time_point)
}

pub fn channel_path(time_point_path: &str, channel: u32) -> String {
    format!("{}/Channel {}", time_point_path, channel)
}

/// Group holding the voxels of one (level, timepoint, channel)
pub fn channel_group_path(dataset_root: &str, level: usize, time_point: u32, channel: u32) -> String {
    channel_path(
        &time_point_path(&resolution_level_path(dataset_root, level), time_point),
        channel,
    )
}

/// Voxel dataset of one (level, timepoint, channel)
pub fn data_path(dataset_root: &str, level: usize, time_point: u32, channel: u32) -> String {
    format!(
        "{}/Data",
        channel_group_path(dataset_root, level, time_point, channel)
    )
}

/// Parse a number stored as text, tolerating surrounding blanks
pub fn parse_number<T: FromStr>(text: &str) -> Option<T> {
    text.trim().trim_end_matches('\0').parse().ok()
}

/// Parse an extent stored as text; fractional values are truncated
pub fn parse_size(text: &str) -> Option<u32> {
    parse_number::<u32>(text).or_else(|| {
        parse_number::<f64>(text)
            .filter(|value| value.is_finite() && *value >= 0.0)
            .map(|value| value as u32)
    })
}

/// Blank-separated floats; empty fields from repeated blanks are skipped
pub fn parse_floats(text: &str) -> Vec<f32> {
    text.split_whitespace()
        .filter_map(|field| field.parse().ok())
        .collect()
}

/// Copy `src`, a dense block of `src_dims` (X fastest), into the matching
/// corner of `dst`, a block of `dst_dims`
///
/// Elements of `dst` outside the copied lines are left untouched.
pub fn scatter_lines<T: Copy>(src: &[T], src_dims: [usize; 3], dst: &mut [T], dst_dims: [usize; 3]) {
    let [sx, sy, sz] = src_dims;
    let [dx, dy, _] = dst_dims;
    if sx == 0 {
        return;
    }
    for z in 0..sz {
        for y in 0..sy {
            let from = (z * sy + y) * sx;
            let to = (z * dy + y) * dx;
            dst[to..to + sx].copy_from_slice(&src[from..from + sx]);
        }
    }
}

/// Check for an HDF5 superblock at offset 0, 512, 1024, 2048...
pub fn is_hdf5_file(path: impl AsRef<Path>) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let mut offset = 0u64;
    let mut signature = [0u8; 8];
    while offset + signature.len() as u64 <= len {
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut signature)?;
        if signature == HDF5_SIGNATURE {
            return Ok(true);
        }
        offset = if offset == 0 { 512 } else { offset * 2 };
    }
    Ok(false)
}

/// Format byte size in human-readable form
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
