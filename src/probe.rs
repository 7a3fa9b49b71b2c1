//! Format detection: is a file an Imaris image, and how many datasets does it hold

use crate::error::{ImsError, Result};
use crate::io::{open_store, H5Store};
use crate::layout::DATASET_GROUP;
use crate::types::DataType;
use crate::utils::{data_path, indexed_group, is_hdf5_file};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Value of the root `ImarisVersion` attribute this reader understands
pub const SUPPORTED_IMARIS_VERSION: &str = "5.5.0";
/// Value of the root `ImarisDataSet` attribute
pub const IMARIS_DATASET_MARKER: &str = "ImarisDataSet";

const ATTR_VERSION: &str = "ImarisVersion";
const ATTR_MARKER: &str = "ImarisDataSet";
const ATTR_NUMBER_OF_DATASETS: &str = "NumberOfDataSets";

/// Root facts of a recognised file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatInfo {
    pub version: String,
    pub number_of_datasets: u32,
}

/// Validate the root attributes of an open store
pub fn probe(store: &dyn H5Store) -> Result<FormatInfo> {
    let names = store.attribute_names("/")?;
    if names.is_empty() {
        return Err(ImsError::Format("root group has no attributes".to_string()));
    }

    let version = store
        .read_attribute_string("/", ATTR_VERSION)
        .map_err(|e| ImsError::Format(e.to_string()))?;
    if version != SUPPORTED_IMARIS_VERSION {
        return Err(ImsError::UnsupportedVersion(version));
    }

    let marker = store
        .read_attribute_string("/", ATTR_MARKER)
        .map_err(|e| ImsError::Format(e.to_string()))?;
    if marker != IMARIS_DATASET_MARKER {
        return Err(ImsError::Format(format!(
            "{} is {:?}, expected {:?}",
            ATTR_MARKER, marker, IMARIS_DATASET_MARKER
        )));
    }

    let number_of_datasets = match store.read_attribute_u32("/", ATTR_NUMBER_OF_DATASETS) {
        Ok(count) => count,
        Err(err) => {
            debug!("{}, assuming a single dataset", err);
            1
        }
    };

    Ok(FormatInfo {
        version,
        number_of_datasets,
    })
}

/// Open `path` and check it is an Imaris file
///
/// The store is dropped again on every failure.
pub fn probe_file(path: impl AsRef<Path>, swmr: bool) -> Result<(Box<dyn H5Store>, FormatInfo)> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ImsError::Format(format!("{} does not exist", path.display())));
    }
    if !is_hdf5_file(path)? {
        return Err(ImsError::Format(format!("{} is not an HDF5 file", path.display())));
    }
    let store = open_store(path, swmr)?;
    let info = probe(store.as_ref())?;
    Ok((store, info))
}

/// True if `path` names a readable Imaris file
pub fn is_format(path: impl AsRef<Path>, swmr: bool) -> bool {
    match probe_file(path.as_ref(), swmr) {
        Ok(_) => true,
        Err(err) => {
            debug!("{} rejected: {}", path.as_ref().display(), err);
            false
        }
    }
}

/// Voxel type of every dataset in an open store
///
/// Stops at the first dataset whose level 0 data cannot be inspected, so the
/// result may be shorter than `number_of_datasets`.
pub fn images_information(store: &dyn H5Store, info: &FormatInfo) -> Vec<DataType> {
    let mut data_types = Vec::with_capacity(info.number_of_datasets as usize);
    for index in 0..info.number_of_datasets {
        let data = data_path(&indexed_group(DATASET_GROUP, index), 0, 0, 0);
        let data_type = store.dataset_info(&data).and_then(|dataset| {
            DataType::from_element(
                dataset.element_type.size_in_bytes(),
                dataset.element_type.is_float(),
            )
        });
        match data_type {
            Ok(data_type) => data_types.push(data_type),
            Err(err) => {
                warn!("dataset {}: {}", index, err);
                break;
            }
        }
    }
    data_types
}

/// Voxel type of every dataset in the file at `path`; empty if it is not an
/// Imaris file
pub fn file_images_information(path: impl AsRef<Path>, swmr: bool) -> Vec<DataType> {
    match probe_file(path.as_ref(), swmr) {
        Ok((store, info)) => images_information(store.as_ref(), &info),
        Err(err) => {
            warn!("{}: {}", path.as_ref().display(), err);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDataset, MemoryStore};

    fn create_root(version: &str, marker: &str) -> MemoryStore {
        let mut store = MemoryStore::new();
        store.set_attribute("/", ATTR_VERSION, version).unwrap();
        store.set_attribute("/", ATTR_MARKER, marker).unwrap();
        store
    }

    #[test]
    fn test_probe_accepts_imaris_root() {
        let info = probe(&create_root("5.5.0", "ImarisDataSet")).unwrap();
        assert_eq!(info.version, "5.5.0");
        assert_eq!(info.number_of_datasets, 1);
    }

    #[test]
    fn test_probe_reads_dataset_count() {
        let mut store = create_root("5.5.0", "ImarisDataSet");
        store.set_attribute("/", ATTR_NUMBER_OF_DATASETS, 3u32).unwrap();
        assert_eq!(probe(&store).unwrap().number_of_datasets, 3);
    }

    #[test]
    fn test_probe_rejects() {
        assert!(matches!(
            probe(&MemoryStore::new()),
            Err(ImsError::Format(_))
        ));
        assert!(matches!(
            probe(&create_root("4.0.0", "ImarisDataSet")),
            Err(ImsError::UnsupportedVersion(_))
        ));
        assert!(matches!(
            probe(&create_root("5.5.0", "SomethingElse")),
            Err(ImsError::Format(_))
        ));

        let mut store = create_root("5.5.0", "ImarisDataSet");
        store.remove_attribute("/", ATTR_MARKER).unwrap();
        assert!(matches!(probe(&store), Err(ImsError::Format(_))));
    }

    #[test]
    fn test_probe_file_rejects_missing_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.ims");
        assert!(matches!(
            probe_file(&missing, false),
            Err(ImsError::Format(_))
        ));
        assert!(!is_format(&missing, false));

        let text = dir.path().join("notes.ims");
        std::fs::write(&text, "plain text").unwrap();
        assert!(matches!(probe_file(&text, false), Err(ImsError::Format(_))));
        assert!(file_images_information(&text, false).is_empty());
    }

    #[test]
    fn test_images_information_stops_at_first_gap() {
        let mut store = create_root("5.5.0", "ImarisDataSet");
        store.set_attribute("/", ATTR_NUMBER_OF_DATASETS, 3u32).unwrap();
        store
            .create_dataset(
                "/DataSet/ResolutionLevel 0/TimePoint 0/Channel 0/Data",
                MemoryDataset::new([1, 1, 1], &[0u16]).unwrap(),
            )
            .unwrap();
        store
            .create_dataset(
                "/DataSet1/ResolutionLevel 0/TimePoint 0/Channel 0/Data",
                MemoryDataset::new([1, 1, 1], &[0f32]).unwrap(),
            )
            .unwrap();
        let info = probe(&store).unwrap();
        assert_eq!(
            images_information(&store, &info),
            vec![DataType::UInt16, DataType::Float32]
        );
    }
}
