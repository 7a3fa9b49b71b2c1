//! libhdf5 storage backend
//!
//! Objects are opened per call and closed when their handles drop, so no
//! group or dataset outlives the operation that needed it. Only the file
//! handle lives as long as the store.

use crate::compression::Filter;
use crate::error::{ImsError, Result};
use crate::io::{ChildEntry, DatasetInfo, ElementType, H5Store, Hyperslab, ObjectKind};
use crate::types::VoxelSliceMut;
use hdf5::filters::Filter as H5Filter;
use hdf5::types::{TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::{Attribute, Dataset, Datatype, File, Group, H5Type, Location};
use hdf5_sys::h5::{herr_t, hid_t, hsize_t};
use hdf5_sys::h5a::H5Aread;
use hdf5_sys::h5d::{H5Dread, H5Drefresh};
use hdf5_sys::h5f::{H5Fopen, H5F_ACC_RDONLY, H5F_ACC_SWMR_READ};
use hdf5_sys::h5p::H5P_DEFAULT;
use hdf5_sys::h5s::{H5S_seloper_t, H5Sclose, H5Screate_simple, H5Sselect_hyperslab, H5S_ALL};
use log::debug;
use parking_lot::Mutex;
use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::ptr;

/// Serializes the calls this module makes below the `hdf5` crate
static RAW_CALLS: Mutex<()> = Mutex::new(());

fn check(status: herr_t, what: &str) -> Result<()> {
    if status < 0 {
        return Err(ImsError::Storage(format!("{} failed", what)));
    }
    Ok(())
}

/// Memory dataspace closed on drop
struct MemorySpace(hid_t);

impl Drop for MemorySpace {
    fn drop(&mut self) {
        if self.0 >= 0 {
            unsafe {
                H5Sclose(self.0);
            }
        }
    }
}

enum Object {
    Group(Group),
    Dataset(Dataset),
}

impl Object {
    fn location(&self) -> &Location {
        match self {
            Object::Group(group) => group,
            Object::Dataset(dataset) => dataset,
        }
    }
}

/// Text of a string attribute or dataset element type
fn is_text(descriptor: &TypeDescriptor) -> bool {
    matches!(
        descriptor,
        TypeDescriptor::FixedAscii(_)
            | TypeDescriptor::FixedUnicode(_)
            | TypeDescriptor::VarLenAscii
            | TypeDescriptor::VarLenUnicode
    )
}

/// Concatenate fixed-length string elements, dropping NUL padding
fn text_from_bytes(mut bytes: Vec<u8>) -> String {
    bytes.retain(|&b| b != 0);
    String::from_utf8_lossy(&bytes).into_owned()
}

fn convert_filter(filter: &H5Filter) -> Filter {
    match filter {
        H5Filter::Deflate(level) => Filter::Deflate(*level),
        H5Filter::Shuffle => Filter::Shuffle,
        H5Filter::Fletcher32 => Filter::Fletcher32,
        H5Filter::User(id, values) => Filter::from_id(*id, values),
        other => Filter::from_id(other.id(), &[]),
    }
}

fn convert_element_type(dtype: &Datatype) -> ElementType {
    let size = dtype.size();
    match dtype.to_descriptor() {
        Ok(TypeDescriptor::Integer(_)) => ElementType::Integer { size, signed: true },
        Ok(TypeDescriptor::Unsigned(_)) => ElementType::Integer { size, signed: false },
        Ok(TypeDescriptor::Float(_)) => ElementType::Float { size },
        Ok(descriptor) if is_text(&descriptor) => ElementType::Text,
        _ => ElementType::Opaque { size },
    }
}

/// HDF5 file opened read-only
///
/// LZ4-compressed images (filter 32004) need the LZ4 filter plugin on
/// `HDF5_PLUGIN_PATH`; libhdf5 does not ship it. Without the plugin every
/// read of such a dataset fails and the reader zero-fills the slice, logging
/// a warning that names the missing filter.
pub struct Hdf5Store {
    file: File,
    path: PathBuf,
    swmr: bool,
}

impl Hdf5Store {
    /// Open `path` read-only, for SWMR reading when `swmr` is set
    pub fn open(path: &Path, swmr: bool) -> Result<Self> {
        let file = if swmr {
            Self::open_swmr(path)?
        } else {
            File::open(path)?
        };
        debug!("opened {} (swmr: {})", path.display(), swmr);
        Ok(Self {
            file,
            path: path.to_path_buf(),
            swmr,
        })
    }

    fn open_swmr(path: &Path) -> Result<File> {
        let name = path
            .to_str()
            .ok_or_else(|| ImsError::Conversion(format!("{} is not UTF-8", path.display())))?;
        let name = CString::new(name).map_err(|err| ImsError::Conversion(err.to_string()))?;
        let id = {
            let _lock = RAW_CALLS.lock();
            unsafe { H5Fopen(name.as_ptr(), H5F_ACC_RDONLY | H5F_ACC_SWMR_READ, H5P_DEFAULT) }
        };
        if id < 0 {
            return Err(ImsError::Storage(format!(
                "cannot open {} for SWMR reading",
                path.display()
            )));
        }
        Ok(hdf5::from_id::<File>(id)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_swmr(&self) -> bool {
        self.swmr
    }

    fn object(&self, path: &str) -> Result<Object> {
        if let Ok(group) = self.file.group(path) {
            return Ok(Object::Group(group));
        }
        self.file
            .dataset(path)
            .map(Object::Dataset)
            .map_err(|_| ImsError::NotFound(path.to_string()))
    }

    fn dataset(&self, path: &str) -> Result<Dataset> {
        self.file
            .dataset(path)
            .map_err(|_| ImsError::NotFound(path.to_string()))
    }

    fn attribute(&self, path: &str, name: &str) -> Result<Attribute> {
        self.object(path)?
            .location()
            .attr(name)
            .map_err(|_| ImsError::attribute_missing(path, name))
    }

    fn read_attribute_text(attr: &Attribute) -> Result<String> {
        let dtype = attr.dtype()?;
        match dtype.to_descriptor()? {
            TypeDescriptor::VarLenAscii => Ok(attr
                .read_raw::<VarLenAscii>()?
                .iter()
                .map(|text| text.as_str())
                .collect()),
            TypeDescriptor::VarLenUnicode => Ok(attr
                .read_raw::<VarLenUnicode>()?
                .iter()
                .map(|text| text.as_str())
                .collect()),
            TypeDescriptor::FixedAscii(_) | TypeDescriptor::FixedUnicode(_) => {
                let mut bytes = vec![0u8; attr.size() * dtype.size()];
                let _lock = RAW_CALLS.lock();
                check(
                    unsafe { H5Aread(attr.id(), dtype.id(), bytes.as_mut_ptr().cast()) },
                    "H5Aread",
                )?;
                Ok(text_from_bytes(bytes))
            }
            other => Err(ImsError::Conversion(format!("{:?} attribute is not text", other))),
        }
    }

    fn read_selection<T: H5Type>(dataset: &Dataset, selection: &Hyperslab, out: &mut [T]) -> Result<()> {
        selection.check_within(&dataset.shape())?;
        if out.len() < selection.num_elements() {
            return Err(ImsError::InvalidDimensions(format!(
                "buffer holds {} elements, selection has {}",
                out.len(),
                selection.num_elements()
            )));
        }
        if selection.is_empty() {
            return Ok(());
        }

        let memory_type = Datatype::from_type::<T>()?;
        let file_space = dataset.space()?;
        let start = selection.start.map(|v| v as hsize_t);
        let count = selection.count.map(|v| v as hsize_t);

        let _lock = RAW_CALLS.lock();
        unsafe {
            check(
                H5Sselect_hyperslab(
                    file_space.id(),
                    H5S_seloper_t::H5S_SELECT_SET,
                    start.as_ptr(),
                    ptr::null(),
                    count.as_ptr(),
                    ptr::null(),
                ),
                "H5Sselect_hyperslab",
            )?;
            let memory_space = MemorySpace(H5Screate_simple(3, count.as_ptr(), ptr::null()));
            if memory_space.0 < 0 {
                return Err(ImsError::Storage("H5Screate_simple failed".to_string()));
            }
            check(
                H5Dread(
                    dataset.id(),
                    memory_type.id(),
                    memory_space.0,
                    file_space.id(),
                    H5P_DEFAULT,
                    out.as_mut_ptr().cast(),
                ),
                "H5Dread",
            )
        }
    }
}

impl H5Store for Hdf5Store {
    fn kind(&self, path: &str) -> Option<ObjectKind> {
        match self.object(path) {
            Ok(Object::Group(_)) => Some(ObjectKind::Group),
            Ok(Object::Dataset(_)) => Some(ObjectKind::Dataset),
            Err(_) => None,
        }
    }

    fn children(&self, group: &str) -> Result<Vec<ChildEntry>> {
        let parent = self
            .file
            .group(group)
            .map_err(|_| ImsError::NotFound(group.to_string()))?;
        let mut children = Vec::new();
        for name in parent.member_names()? {
            let kind = if parent.group(&name).is_ok() {
                ObjectKind::Group
            } else if parent.dataset(&name).is_ok() {
                ObjectKind::Dataset
            } else {
                debug!("skipping {}/{}: neither group nor dataset", group, name);
                continue;
            };
            children.push(ChildEntry { name, kind });
        }
        Ok(children)
    }

    fn attribute_names(&self, path: &str) -> Result<Vec<String>> {
        Ok(self.object(path)?.location().attr_names()?)
    }

    fn read_attribute_string(&self, path: &str, name: &str) -> Result<String> {
        Self::read_attribute_text(&self.attribute(path, name)?)
    }

    fn read_attribute_u32(&self, path: &str, name: &str) -> Result<u32> {
        let attr = self.attribute(path, name)?;
        match attr.dtype()?.to_descriptor()? {
            TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => attr
                .read_raw::<u32>()?
                .first()
                .copied()
                .ok_or_else(|| ImsError::Conversion(format!("{} at {} is empty", name, path))),
            _ => {
                let text = Self::read_attribute_text(&attr)?;
                text.trim()
                    .parse()
                    .map_err(|_| ImsError::Conversion(format!("{} at {} is not a number: {:?}", name, path, text)))
            }
        }
    }

    fn dataset_info(&self, path: &str) -> Result<DatasetInfo> {
        let dataset = self.dataset(path)?;
        Ok(DatasetInfo {
            shape: dataset.shape(),
            chunk: dataset.chunk(),
            element_type: convert_element_type(&dataset.dtype()?),
            filters: dataset.filters().iter().map(convert_filter).collect(),
        })
    }

    fn read_string_dataset(&self, path: &str) -> Result<String> {
        let dataset = self.dataset(path)?;
        let dtype = dataset.dtype()?;
        match dtype.to_descriptor()? {
            TypeDescriptor::VarLenAscii => Ok(dataset
                .read_raw::<VarLenAscii>()?
                .iter()
                .map(|text| text.as_str())
                .collect()),
            TypeDescriptor::VarLenUnicode => Ok(dataset
                .read_raw::<VarLenUnicode>()?
                .iter()
                .map(|text| text.as_str())
                .collect()),
            TypeDescriptor::FixedAscii(_) | TypeDescriptor::FixedUnicode(_) => {
                let mut bytes = vec![0u8; dataset.size() * dtype.size()];
                let _lock = RAW_CALLS.lock();
                check(
                    unsafe {
                        H5Dread(
                            dataset.id(),
                            dtype.id(),
                            H5S_ALL,
                            H5S_ALL,
                            H5P_DEFAULT,
                            bytes.as_mut_ptr().cast(),
                        )
                    },
                    "H5Dread",
                )?;
                Ok(text_from_bytes(bytes))
            }
            other => Err(ImsError::Conversion(format!("{} holds {:?}, not text", path, other))),
        }
    }

    fn read_u64_dataset(&self, path: &str) -> Result<Vec<u64>> {
        Ok(self.dataset(path)?.read_raw::<u64>()?)
    }

    fn read_u8_dataset(&self, path: &str) -> Result<Vec<u8>> {
        Ok(self.dataset(path)?.read_raw::<u8>()?)
    }

    fn read_hyperslab(&self, path: &str, selection: &Hyperslab, out: VoxelSliceMut<'_>) -> Result<()> {
        let dataset = self.dataset(path)?;
        match out {
            VoxelSliceMut::UInt8(out) => Self::read_selection(&dataset, selection, out),
            VoxelSliceMut::UInt16(out) => Self::read_selection(&dataset, selection, out),
            VoxelSliceMut::UInt32(out) => Self::read_selection(&dataset, selection, out),
            VoxelSliceMut::Float32(out) => Self::read_selection(&dataset, selection, out),
        }
    }

    fn refresh(&self, path: &str) -> Result<()> {
        let dataset = self.dataset(path)?;
        let _lock = RAW_CALLS.lock();
        check(unsafe { H5Drefresh(dataset.id()) }, "H5Drefresh")
    }
}
