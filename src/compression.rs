//! Filter pipelines and the compression algorithm they map to

use crate::error::{ImsError, Result};
use flate2::read::{ZlibDecoder, ZlibEncoder};
use flate2::Compression as FlateCompression;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// HDF5 filter identifiers
pub const H5Z_FILTER_DEFLATE: i32 = 1;
pub const H5Z_FILTER_SHUFFLE: i32 = 2;
pub const H5Z_FILTER_FLETCHER32: i32 = 3;
pub const H5Z_FILTER_SZIP: i32 = 4;
pub const H5Z_FILTER_NBIT: i32 = 5;
pub const H5Z_FILTER_SCALEOFFSET: i32 = 6;
/// Registered id of the LZ4 plugin filter
pub const H5Z_FILTER_LZ4: i32 = 32004;
/// Environment variable libhdf5 searches for filter plugins
pub const HDF5_PLUGIN_PATH: &str = "HDF5_PLUGIN_PATH";

/// One stage of a dataset's filter pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    /// zlib deflate with its compression level
    Deflate(u8),
    /// Byte shuffle
    Shuffle,
    Fletcher32,
    Szip,
    NBit,
    ScaleOffset,
    Lz4,
    /// Any other registered filter id
    Other(i32),
}

impl Filter {
    /// Build from an HDF5 filter id and its client values
    pub fn from_id(id: i32, client_values: &[u32]) -> Self {
        match id {
            H5Z_FILTER_DEFLATE => {
                let level = client_values.first().copied().unwrap_or(0);
                Filter::Deflate(level.min(u8::MAX as u32) as u8)
            }
            H5Z_FILTER_SHUFFLE => Filter::Shuffle,
            H5Z_FILTER_FLETCHER32 => Filter::Fletcher32,
            H5Z_FILTER_SZIP => Filter::Szip,
            H5Z_FILTER_NBIT => Filter::NBit,
            H5Z_FILTER_SCALEOFFSET => Filter::ScaleOffset,
            H5Z_FILTER_LZ4 => Filter::Lz4,
            other => Filter::Other(other),
        }
    }

    /// HDF5 filter id
    pub fn id(&self) -> i32 {
        match self {
            Filter::Deflate(_) => H5Z_FILTER_DEFLATE,
            Filter::Shuffle => H5Z_FILTER_SHUFFLE,
            Filter::Fletcher32 => H5Z_FILTER_FLETCHER32,
            Filter::Szip => H5Z_FILTER_SZIP,
            Filter::NBit => H5Z_FILTER_NBIT,
            Filter::ScaleOffset => H5Z_FILTER_SCALEOFFSET,
            Filter::Lz4 => H5Z_FILTER_LZ4,
            Filter::Other(id) => *id,
        }
    }

    /// libhdf5 applies this filter only through a dynamically loaded plugin
    pub fn needs_plugin(&self) -> bool {
        matches!(self, Filter::Lz4 | Filter::Other(_))
    }
}

/// Compression of the voxel data, as reported in the metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum CompressionAlgorithm {
    None = 0,
    GzipLevel1 = 1,
    GzipLevel2 = 2,
    GzipLevel3 = 3,
    GzipLevel4 = 4,
    GzipLevel5 = 5,
    GzipLevel6 = 6,
    GzipLevel7 = 7,
    GzipLevel8 = 8,
    GzipLevel9 = 9,
    ShuffleGzipLevel1 = 11,
    ShuffleGzipLevel2 = 12,
    ShuffleGzipLevel3 = 13,
    ShuffleGzipLevel4 = 14,
    ShuffleGzipLevel5 = 15,
    ShuffleGzipLevel6 = 16,
    ShuffleGzipLevel7 = 17,
    ShuffleGzipLevel8 = 18,
    ShuffleGzipLevel9 = 19,
    Lz4 = 21,
    ShuffleLz4 = 31,
    /// A pipeline none of the other values describe
    Unknown = 255,
}

impl CompressionAlgorithm {
    const GZIP: [CompressionAlgorithm; 9] = [
        CompressionAlgorithm::GzipLevel1,
        CompressionAlgorithm::GzipLevel2,
        CompressionAlgorithm::GzipLevel3,
        CompressionAlgorithm::GzipLevel4,
        CompressionAlgorithm::GzipLevel5,
        CompressionAlgorithm::GzipLevel6,
        CompressionAlgorithm::GzipLevel7,
        CompressionAlgorithm::GzipLevel8,
        CompressionAlgorithm::GzipLevel9,
    ];

    const SHUFFLE_GZIP: [CompressionAlgorithm; 9] = [
        CompressionAlgorithm::ShuffleGzipLevel1,
        CompressionAlgorithm::ShuffleGzipLevel2,
        CompressionAlgorithm::ShuffleGzipLevel3,
        CompressionAlgorithm::ShuffleGzipLevel4,
        CompressionAlgorithm::ShuffleGzipLevel5,
        CompressionAlgorithm::ShuffleGzipLevel6,
        CompressionAlgorithm::ShuffleGzipLevel7,
        CompressionAlgorithm::ShuffleGzipLevel8,
        CompressionAlgorithm::ShuffleGzipLevel9,
    ];

    /// Get the algorithm from its numeric value
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(CompressionAlgorithm::None),
            1..=9 => Self::gzip(value as u8, false),
            11..=19 => Self::gzip((value - 10) as u8, true),
            21 => Some(CompressionAlgorithm::Lz4),
            31 => Some(CompressionAlgorithm::ShuffleLz4),
            255 => Some(CompressionAlgorithm::Unknown),
            _ => None,
        }
    }

    /// Gzip at `level` (1..=9), optionally preceded by shuffle
    pub fn gzip(level: u8, shuffle: bool) -> Option<Self> {
        let index = (level as usize).checked_sub(1)?;
        if shuffle {
            Self::SHUFFLE_GZIP.get(index).copied()
        } else {
            Self::GZIP.get(index).copied()
        }
    }

    /// Infer the algorithm from a dataset's filter pipeline
    ///
    /// A leading shuffle sets the shuffle flag and the final filter decides
    /// the codec. Stages in between, such as a checksum, are ignored.
    pub fn from_filters(filters: &[Filter]) -> Self {
        let (Some(first), Some(last)) = (filters.first(), filters.last()) else {
            return CompressionAlgorithm::None;
        };
        let shuffle = *first == Filter::Shuffle;
        match last {
            Filter::Deflate(level) => Self::gzip(*level, shuffle).unwrap_or(CompressionAlgorithm::Unknown),
            Filter::Lz4 if shuffle => CompressionAlgorithm::ShuffleLz4,
            Filter::Lz4 => CompressionAlgorithm::Lz4,
            _ => CompressionAlgorithm::Unknown,
        }
    }

    pub fn is_shuffled(&self) -> bool {
        matches!(*self as u32, 11..=19 | 31)
    }

    /// Deflate level, if this is a gzip variant
    pub fn gzip_level(&self) -> Option<u8> {
        match *self as u32 {
            value @ 1..=9 => Some(value as u8),
            value @ 11..=19 => Some((value - 10) as u8),
            _ => None,
        }
    }
}

/// Run `data` through the encoding direction of `filters`
///
/// Only shuffle and deflate transform the payload; other stages are
/// recorded but leave it as is.
pub fn encode_pipeline(filters: &[Filter], data: &[u8], element_size: usize) -> Result<Vec<u8>> {
    let mut payload = data.to_vec();
    for filter in filters {
        payload = match filter {
            Filter::Shuffle => shuffle(&payload, element_size),
            Filter::Deflate(level) => deflate(&payload, *level)?,
            _ => payload,
        };
    }
    Ok(payload)
}

/// Undo `filters` in reverse order
///
/// Fails when a stage has no decoder available.
pub fn decode_pipeline(filters: &[Filter], data: &[u8], element_size: usize) -> Result<Vec<u8>> {
    let mut payload = data.to_vec();
    for filter in filters.iter().rev() {
        payload = match filter {
            Filter::Shuffle => unshuffle(&payload, element_size),
            Filter::Deflate(_) => inflate(&payload)?,
            Filter::Fletcher32 => payload,
            other => {
                return Err(ImsError::Decompression(format!(
                    "filter {} is not available",
                    other.id()
                )))
            }
        };
    }
    Ok(payload)
}

fn deflate(data: &[u8], level: u8) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(data, FlateCompression::new(level.min(9) as u32));
    let mut compressed = Vec::new();
    encoder
        .read_to_end(&mut compressed)
        .map_err(|e| ImsError::Decompression(e.to_string()))?;
    Ok(compressed)
}

fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| ImsError::Decompression(e.to_string()))?;
    Ok(decompressed)
}

/// Group byte `k` of every element together
fn shuffle(data: &[u8], element_size: usize) -> Vec<u8> {
    if element_size <= 1 || data.len() % element_size != 0 {
        return data.to_vec();
    }
    let count = data.len() / element_size;
    let mut out = vec![0u8; data.len()];
    for (i, element) in data.chunks_exact(element_size).enumerate() {
        for (k, byte) in element.iter().enumerate() {
            out[k * count + i] = *byte;
        }
    }
    out
}

fn unshuffle(data: &[u8], element_size: usize) -> Vec<u8> {
    if element_size <= 1 || data.len() % element_size != 0 {
        return data.to_vec();
    }
    let count = data.len() / element_size;
    let mut out = vec![0u8; data.len()];
    for (i, element) in out.chunks_exact_mut(element_size).enumerate() {
        for (k, byte) in element.iter_mut().enumerate() {
            *byte = data[k * count + i];
        }
    }
    out
}
