//! Free-form parameter sections stored under `DataSetInfo`

use crate::error::Result;
use crate::io::{ElementType, H5Store, ObjectKind};
use crate::metadata::DATASET_INFO_GROUP;
use crate::utils::indexed_group;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameters of one section, by name
pub type ParameterSection = BTreeMap<String, String>;

/// All parameter sections, by section name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    pub sections: BTreeMap<String, ParameterSection>,
}

impl Parameters {
    pub fn section(&self, name: &str) -> Option<&ParameterSection> {
        self.sections.get(name)
    }

    pub fn get(&self, section: &str, name: &str) -> Option<&str> {
        self.sections.get(section)?.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Decode the name of a long parameter dataset
///
/// Names escape `/` as `%s` and `%` as `%p;`; the `%p;` pass runs last so an
/// escaped percent sign is never read as the start of another escape.
pub fn decode_name(name: &str) -> String {
    name.replace("%s", "/").replace("%p;", "%")
}

/// Short parameters: every attribute of the section that reads as text
fn read_short_parameters(store: &dyn H5Store, path: &str, section: &mut ParameterSection) {
    let names = match store.attribute_names(path) {
        Ok(names) => names,
        Err(err) => {
            debug!("{}: {}", path, err);
            return;
        }
    };
    for name in names {
        match store.read_attribute_string(path, &name) {
            Ok(value) => {
                section.insert(name, value);
            }
            Err(err) => debug!("skipping attribute {} of {}: {}", name, path, err),
        }
    }
}

/// Long parameters: non-empty 1-D character datasets of the section
fn read_long_parameters(store: &dyn H5Store, path: &str, section: &mut ParameterSection) -> Result<()> {
    for child in store.children(path)? {
        if child.kind != ObjectKind::Dataset {
            continue;
        }
        let dataset = format!("{}/{}", path, child.name);
        let is_text = store.dataset_info(&dataset).is_ok_and(|info| {
            info.ndim() == 1 && info.num_elements() > 0 && info.element_type == ElementType::Text
        });
        if !is_text {
            debug!("skipping non-text dataset {}", dataset);
            continue;
        }
        match store.read_string_dataset(&dataset) {
            Ok(value) => {
                section.insert(decode_name(&child.name), value);
            }
            Err(err) => debug!("skipping {}: {}", dataset, err),
        }
    }
    Ok(())
}

/// Read every parameter section of dataset `dataset_index`
///
/// A missing `DataSetInfo` group yields no sections.
pub fn read_parameters(store: &dyn H5Store, dataset_index: u32) -> Result<Parameters> {
    let info_root = indexed_group(DATASET_INFO_GROUP, dataset_index);
    let mut parameters = Parameters::default();
    if !store.exists(&info_root) {
        debug!("{} is missing, no parameters", info_root);
        return Ok(parameters);
    }

    for child in store.children(&info_root)? {
        if child.kind != ObjectKind::Group {
            continue;
        }
        let path = format!("{}/{}", info_root, child.name);
        let mut section = ParameterSection::new();
        read_short_parameters(store, &path, &mut section);
        read_long_parameters(store, &path, &mut section)?;
        parameters.sections.insert(child.name, section);
    }
    Ok(parameters)
}
