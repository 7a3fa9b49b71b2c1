//! ims-reader - Imaris 5.5 image reader
//!
//! Read-only access to Imaris `.ims` files: multi-resolution 5D images
//! (X, Y, Z, channel, time) stored in HDF5.
//!
//! # Features
//!
//! - Pyramid discovery and windowed voxel reads at any resolution level
//! - Metadata: extents, acquisition times, channel colors, compression
//! - Free-form parameter sections, histograms and the preview thumbnail
//! - SWMR reading of files that are still being written
//! - A C ABI with one family of entry points per voxel type ([`ffi`])
//!
//! # Storage
//!
//! Every read goes through the [`H5Store`] trait. The libhdf5 backend is
//! behind the `hdf5` feature; [`MemoryStore`] holds an object tree in memory
//! and backs the tests and demos.
//!
//! # Example
//!
//! ```rust,ignore
//! use ims_reader::{ImageReader, Index5D, ReadOptions};
//!
//! # fn example() -> ims_reader::Result<()> {
//! let reader = ImageReader::open("cells.ims", 0, ReadOptions::default())?;
//! let end = Index5D::new(256, 256, 16, 1, 1);
//! let mut voxels = vec![0u16; reader.window_len(&Index5D::default(), &end)?];
//! reader.read_data(&Index5D::default(), &end, 0, &mut voxels)?;
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod auxiliary;
pub mod compression;
pub mod error;
pub mod ffi;
#[cfg(feature = "hdf5")]
pub mod hdf5_store;
pub mod io;
pub mod layout;
pub mod memory;
pub mod metadata;
pub mod parameters;
pub mod probe;
pub mod synthetic;
pub mod types;
pub mod utils;

// Re-exports
pub use access::{ImageReader, ReadOptions};
pub use compression::{CompressionAlgorithm, Filter};
pub use error::{ImsError, Result};
pub use io::{open_store, H5Store, Hyperslab};
pub use layout::{PyramidLayout, ResolutionLevel};
pub use memory::{MemoryDataset, MemoryStore};
pub use metadata::Metadata;
pub use parameters::{decode_name, Parameters};
pub use probe::{file_images_information, is_format, FormatInfo, IMARIS_DATASET_MARKER, SUPPORTED_IMARIS_VERSION};
pub use synthetic::SyntheticImage;
pub use types::{
    Axis, Color, ColorInfo, DataType, Histogram, ImageExtent, Index5D, Size5D, Thumbnail, TimeInfo, Voxel,
};

/// Version of the ims-reader implementation
pub const IMS_READER_VERSION: &str = env!("CARGO_PKG_VERSION");
