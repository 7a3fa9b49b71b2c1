//! Storage access for the hierarchical container behind an `.ims` file

use crate::compression::Filter;
use crate::error::{ImsError, Result};
use crate::types::VoxelSliceMut;
use std::path::Path;

/// What a path names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Group,
    Dataset,
}

/// One member of a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    pub name: String,
    pub kind: ObjectKind,
}

/// Stored element type of a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Integer { size: usize, signed: bool },
    Float { size: usize },
    /// Fixed-size character data
    Text,
    /// Anything else (compound, enum, ...)
    Opaque { size: usize },
}

impl ElementType {
    pub fn size_in_bytes(&self) -> usize {
        match self {
            ElementType::Integer { size, .. }
            | ElementType::Float { size }
            | ElementType::Opaque { size } => *size,
            ElementType::Text => 1,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ElementType::Float { .. })
    }
}

/// Shape, chunking and filters of a dataset
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetInfo {
    /// Storage order, slowest axis first
    pub shape: Vec<usize>,
    pub chunk: Option<Vec<usize>>,
    pub element_type: ElementType,
    pub filters: Vec<Filter>,
}

impl DatasetInfo {
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Rectangular selection of a 3-D dataset in (Z, Y, X) order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hyperslab {
    pub start: [usize; 3],
    pub count: [usize; 3],
}

impl Hyperslab {
    pub fn new(start: [usize; 3], count: [usize; 3]) -> Self {
        Self { start, count }
    }

    pub fn num_elements(&self) -> usize {
        self.count.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.num_elements() == 0
    }

    /// Check the selection against a dataset shape
    pub fn check_within(&self, shape: &[usize]) -> Result<()> {
        if shape.len() != 3 {
            return Err(ImsError::InvalidDimensions(format!(
                "expected a 3-D dataset, found {} dimensions",
                shape.len()
            )));
        }
        for axis in 0..3 {
            if self.start[axis] + self.count[axis] > shape[axis] {
                return Err(ImsError::OutOfBounds(format!(
                    "selection {:?}+{:?} exceeds shape {:?}",
                    self.start, self.count, shape
                )));
            }
        }
        Ok(())
    }
}

/// Read access to an HDF5-like object tree
///
/// Paths are absolute and `/`-separated. Implementations release every
/// object they open before returning.
pub trait H5Store: Send {
    /// Kind of the object at `path`, or `None` if it does not exist
    fn kind(&self, path: &str) -> Option<ObjectKind>;

    /// Members of a group, in name order
    fn children(&self, group: &str) -> Result<Vec<ChildEntry>>;

    /// Attribute names of a group or dataset
    fn attribute_names(&self, path: &str) -> Result<Vec<String>>;

    /// Attribute read as text
    fn read_attribute_string(&self, path: &str, name: &str) -> Result<String>;

    /// Attribute read as an unsigned integer
    fn read_attribute_u32(&self, path: &str, name: &str) -> Result<u32>;

    fn dataset_info(&self, path: &str) -> Result<DatasetInfo>;

    /// Whole 1-D character dataset as text
    fn read_string_dataset(&self, path: &str) -> Result<String>;

    /// Whole dataset converted to u64
    fn read_u64_dataset(&self, path: &str) -> Result<Vec<u64>>;

    /// Whole dataset converted to u8
    fn read_u8_dataset(&self, path: &str) -> Result<Vec<u8>>;

    /// Read a selection into `out`, converted to `out`'s element type
    ///
    /// `out` receives `selection.num_elements()` values, X fastest.
    fn read_hyperslab(&self, path: &str, selection: &Hyperslab, out: VoxelSliceMut<'_>)
        -> Result<()>;

    /// Pick up data appended by a concurrent writer
    fn refresh(&self, path: &str) -> Result<()>;

    fn exists(&self, path: &str) -> bool {
        self.kind(path).is_some()
    }
}

/// Open the file at `path` with the libhdf5 backend
#[cfg(feature = "hdf5")]
pub fn open_store(path: impl AsRef<Path>, swmr: bool) -> Result<Box<dyn H5Store>> {
    let store = crate::hdf5_store::Hdf5Store::open(path.as_ref(), swmr)?;
    Ok(Box::new(store))
}

/// Open the file at `path` with the libhdf5 backend
///
/// This build has no file backend; enable the `hdf5` feature, or hand a
/// [`MemoryStore`](crate::memory::MemoryStore) to
/// [`ImageReader::from_store`](crate::access::ImageReader::from_store).
#[cfg(not(feature = "hdf5"))]
pub fn open_store(path: impl AsRef<Path>, _swmr: bool) -> Result<Box<dyn H5Store>> {
    Err(ImsError::Configuration(format!(
        "cannot open {}: built without the `hdf5` feature",
        path.as_ref().display()
    )))
}
