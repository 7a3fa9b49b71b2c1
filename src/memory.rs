//! In-process object tree implementing [`H5Store`]
//!
//! Mirrors the part of the HDF5 data model the reader relies on: nested
//! groups, text and integer attributes, and n-dimensional datasets whose
//! payload is kept encoded by its filter pipeline and decoded on every read.

use crate::compression::{decode_pipeline, encode_pipeline, Filter};
use crate::error::{ImsError, Result};
use crate::io::{
    ChildEntry, DatasetInfo, ElementType, H5Store, Hyperslab, ObjectKind,
};
use crate::types::VoxelSliceMut;
use bytes::Bytes;
use ndarray::{s, ArrayView3};
use num_traits::{NumCast, Zero};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Value of an attribute
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    UInt(u32),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        AttributeValue::UInt(value)
    }
}

/// Element types a [`MemoryDataset`] can be built from
pub trait StoreElement: Copy + NumCast + Send + Sync + 'static {
    const ELEMENT_TYPE: ElementType;

    fn write_ne(&self, out: &mut Vec<u8>);

    /// Decode one element from exactly `ELEMENT_TYPE.size_in_bytes()` bytes
    fn read_ne(bytes: &[u8]) -> Self;
}

macro_rules! impl_store_element {
    ($t:ty, $element:expr) => {
        impl StoreElement for $t {
            const ELEMENT_TYPE: ElementType = $element;

            fn write_ne(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_ne_bytes());
            }

            fn read_ne(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(bytes);
                <$t>::from_ne_bytes(buf)
            }
        }
    };
}

impl_store_element!(u8, ElementType::Integer { size: 1, signed: false });
impl_store_element!(u16, ElementType::Integer { size: 2, signed: false });
impl_store_element!(u32, ElementType::Integer { size: 4, signed: false });
impl_store_element!(u64, ElementType::Integer { size: 8, signed: false });
impl_store_element!(i8, ElementType::Integer { size: 1, signed: true });
impl_store_element!(i16, ElementType::Integer { size: 2, signed: true });
impl_store_element!(i32, ElementType::Integer { size: 4, signed: true });
impl_store_element!(i64, ElementType::Integer { size: 8, signed: true });
impl_store_element!(f32, ElementType::Float { size: 4 });
impl_store_element!(f64, ElementType::Float { size: 8 });

/// A dataset waiting to be placed into a [`MemoryStore`]
#[derive(Debug, Clone)]
pub struct MemoryDataset {
    shape: Vec<usize>,
    chunk: Option<Vec<usize>>,
    element_type: ElementType,
    filters: Vec<Filter>,
    raw: Vec<u8>,
}

impl MemoryDataset {
    /// Dataset of `shape` holding `data` in row-major order
    pub fn new<T: StoreElement>(shape: impl Into<Vec<usize>>, data: &[T]) -> Result<Self> {
        let shape = shape.into();
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ImsError::InvalidDimensions(format!(
                "shape {:?} needs {} elements, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        let mut raw = Vec::with_capacity(data.len() * T::ELEMENT_TYPE.size_in_bytes());
        for value in data {
            value.write_ne(&mut raw);
        }
        Ok(Self {
            shape,
            chunk: None,
            element_type: T::ELEMENT_TYPE,
            filters: Vec::new(),
            raw,
        })
    }

    /// 1-D character dataset
    pub fn text(value: &str) -> Self {
        Self {
            shape: vec![value.len()],
            chunk: None,
            element_type: ElementType::Text,
            filters: Vec::new(),
            raw: value.as_bytes().to_vec(),
        }
    }

    /// Chunk shape, storage order
    pub fn with_chunk(mut self, chunk: impl Into<Vec<usize>>) -> Self {
        self.chunk = Some(chunk.into());
        self
    }

    pub fn with_filters(mut self, filters: impl Into<Vec<Filter>>) -> Self {
        self.filters = filters.into();
        self
    }
}

#[derive(Debug, Clone)]
struct DatasetNode {
    info: DatasetInfo,
    payload: Bytes,
    attributes: BTreeMap<String, AttributeValue>,
}

#[derive(Debug, Clone, Default)]
struct GroupNode {
    attributes: BTreeMap<String, AttributeValue>,
    members: BTreeMap<String, Node>,
}

#[derive(Debug, Clone)]
enum Node {
    Group(GroupNode),
    Dataset(DatasetNode),
}

impl Node {
    fn kind(&self) -> ObjectKind {
        match self {
            Node::Group(_) => ObjectKind::Group,
            Node::Dataset(_) => ObjectKind::Dataset,
        }
    }

    fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        match self {
            Node::Group(group) => &group.attributes,
            Node::Dataset(dataset) => &dataset.attributes,
        }
    }

    fn attributes_mut(&mut self) -> &mut BTreeMap<String, AttributeValue> {
        match self {
            Node::Group(group) => &mut group.attributes,
            Node::Dataset(dataset) => &mut dataset.attributes,
        }
    }
}

fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|part| !part.is_empty())
}

fn split_parent(path: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = components(path).collect();
    match parts.split_last() {
        Some((name, parents)) => Ok((format!("/{}", parents.join("/")), name.to_string())),
        None => Err(ImsError::InvalidDimensions(
            "the root group has no parent".to_string(),
        )),
    }
}

/// Object tree held in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    root: Node,
    refreshes: AtomicUsize,
}

impl Default for Node {
    fn default() -> Self {
        Node::Group(GroupNode::default())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&self, path: &str) -> Option<&Node> {
        let mut node = &self.root;
        for part in components(path) {
            match node {
                Node::Group(group) => node = group.members.get(part)?,
                Node::Dataset(_) => return None,
            }
        }
        Some(node)
    }

    fn node_mut(&mut self, path: &str) -> Option<&mut Node> {
        let mut node = &mut self.root;
        for part in components(path) {
            node = match node {
                Node::Group(group) => group.members.get_mut(part)?,
                Node::Dataset(_) => return None,
            };
        }
        Some(node)
    }

    fn require(&self, path: &str) -> Result<&Node> {
        self.node(path)
            .ok_or_else(|| ImsError::NotFound(path.to_string()))
    }

    fn dataset(&self, path: &str) -> Result<&DatasetNode> {
        match self.require(path)? {
            Node::Dataset(dataset) => Ok(dataset),
            Node::Group(_) => Err(ImsError::Schema(format!("{} is a group", path))),
        }
    }

    /// Create `path` and any missing parent groups
    pub fn create_group(&mut self, path: &str) -> Result<()> {
        let mut node = &mut self.root;
        for part in components(path) {
            node = match node {
                Node::Group(group) => group.members.entry(part.to_string()).or_default(),
                Node::Dataset(_) => {
                    return Err(ImsError::Schema(format!(
                        "cannot create {}: a dataset is in the way",
                        path
                    )))
                }
            };
        }
        match node {
            Node::Group(_) => Ok(()),
            Node::Dataset(_) => Err(ImsError::Schema(format!("{} is a dataset", path))),
        }
    }

    /// Place a dataset at `path`, creating parent groups
    pub fn create_dataset(&mut self, path: &str, dataset: MemoryDataset) -> Result<()> {
        let (parent, name) = split_parent(path)?;
        self.create_group(&parent)?;
        let element_size = dataset.element_type.size_in_bytes();
        let payload = encode_pipeline(&dataset.filters, &dataset.raw, element_size)?;
        let node = Node::Dataset(DatasetNode {
            info: DatasetInfo {
                shape: dataset.shape,
                chunk: dataset.chunk,
                element_type: dataset.element_type,
                filters: dataset.filters,
            },
            payload: Bytes::from(payload),
            attributes: BTreeMap::new(),
        });
        match self.node_mut(&parent) {
            Some(Node::Group(group)) => {
                group.members.insert(name, node);
                Ok(())
            }
            _ => Err(ImsError::NotFound(parent)),
        }
    }

    /// Set an attribute on an existing group or dataset
    pub fn set_attribute(
        &mut self,
        path: &str,
        name: &str,
        value: impl Into<AttributeValue>,
    ) -> Result<()> {
        let node = self
            .node_mut(path)
            .ok_or_else(|| ImsError::NotFound(path.to_string()))?;
        node.attributes_mut().insert(name.to_string(), value.into());
        Ok(())
    }

    pub fn remove_attribute(&mut self, path: &str, name: &str) -> Result<()> {
        let node = self
            .node_mut(path)
            .ok_or_else(|| ImsError::NotFound(path.to_string()))?;
        node.attributes_mut()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ImsError::attribute_missing(path, name))
    }

    /// Unlink a group or dataset
    pub fn remove(&mut self, path: &str) -> Result<()> {
        let (parent, name) = split_parent(path)?;
        match self.node_mut(&parent) {
            Some(Node::Group(group)) => group
                .members
                .remove(&name)
                .map(|_| ())
                .ok_or_else(|| ImsError::NotFound(path.to_string())),
            _ => Err(ImsError::NotFound(parent)),
        }
    }

    /// Drop the second half of a dataset's stored payload so reads fail
    pub fn truncate_payload(&mut self, path: &str) -> Result<()> {
        match self.node_mut(path) {
            Some(Node::Dataset(dataset)) => {
                let half = dataset.payload.len() / 2;
                dataset.payload.truncate(half);
                Ok(())
            }
            _ => Err(ImsError::NotFound(path.to_string())),
        }
    }

    /// Number of [`H5Store::refresh`] calls served so far
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::Relaxed)
    }
}

enum Decoded {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! with_decoded {
    ($decoded:expr, $values:ident => $body:expr) => {
        match $decoded {
            Decoded::U8($values) => $body,
            Decoded::U16($values) => $body,
            Decoded::U32($values) => $body,
            Decoded::U64($values) => $body,
            Decoded::I8($values) => $body,
            Decoded::I16($values) => $body,
            Decoded::I32($values) => $body,
            Decoded::I64($values) => $body,
            Decoded::F32($values) => $body,
            Decoded::F64($values) => $body,
        }
    };
}

fn from_ne<T: StoreElement>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(T::ELEMENT_TYPE.size_in_bytes())
        .map(T::read_ne)
        .collect()
}

fn decode(dataset: &DatasetNode) -> Result<Decoded> {
    let element_type = dataset.info.element_type;
    let size = element_type.size_in_bytes();
    let bytes = decode_pipeline(&dataset.info.filters, &dataset.payload, size)?;
    let expected = dataset.info.num_elements() * size;
    if bytes.len() != expected {
        return Err(ImsError::Decompression(format!(
            "payload holds {} bytes, expected {}",
            bytes.len(),
            expected
        )));
    }
    let decoded = match element_type {
        ElementType::Text | ElementType::Integer { size: 1, signed: false } => Decoded::U8(bytes),
        ElementType::Integer { size: 2, signed: false } => Decoded::U16(from_ne(&bytes)),
        ElementType::Integer { size: 4, signed: false } => Decoded::U32(from_ne(&bytes)),
        ElementType::Integer { size: 8, signed: false } => Decoded::U64(from_ne(&bytes)),
        ElementType::Integer { size: 1, signed: true } => Decoded::I8(from_ne(&bytes)),
        ElementType::Integer { size: 2, signed: true } => Decoded::I16(from_ne(&bytes)),
        ElementType::Integer { size: 4, signed: true } => Decoded::I32(from_ne(&bytes)),
        ElementType::Integer { size: 8, signed: true } => Decoded::I64(from_ne(&bytes)),
        ElementType::Float { size: 4 } => Decoded::F32(from_ne(&bytes)),
        ElementType::Float { size: 8 } => Decoded::F64(from_ne(&bytes)),
        other => {
            return Err(ImsError::InvalidDataType(format!(
                "no conversion from {:?}",
                other
            )))
        }
    };
    Ok(decoded)
}

fn cast_all<S: Copy + NumCast, D: NumCast>(values: &[S]) -> Result<Vec<D>> {
    values
        .iter()
        .map(|value| {
            <D as NumCast>::from(*value)
                .ok_or_else(|| ImsError::Conversion("value out of range".to_string()))
        })
        .collect()
}

fn copy_selection<S, D>(src: &[S], shape: &[usize], selection: &Hyperslab, out: &mut [D]) -> Result<()>
where
    S: Copy + NumCast,
    D: Copy + NumCast + Zero,
{
    selection.check_within(shape)?;
    if out.len() < selection.num_elements() {
        return Err(ImsError::InvalidDimensions(format!(
            "buffer of {} elements cannot hold {}",
            out.len(),
            selection.num_elements()
        )));
    }
    let view = ArrayView3::from_shape((shape[0], shape[1], shape[2]), src)
        .map_err(|e| ImsError::InvalidDimensions(e.to_string()))?;
    let [z, y, x] = selection.start;
    let [dz, dy, dx] = selection.count;
    let window = view.slice(s![z..z + dz, y..y + dy, x..x + dx]);
    for (dst, value) in out.iter_mut().zip(window.iter()) {
        *dst = <D as NumCast>::from(*value).unwrap_or_else(D::zero);
    }
    Ok(())
}

fn copy_into<S: Copy + NumCast>(
    src: &[S],
    shape: &[usize],
    selection: &Hyperslab,
    out: VoxelSliceMut<'_>,
) -> Result<()> {
    match out {
        VoxelSliceMut::UInt8(dst) => copy_selection(src, shape, selection, dst),
        VoxelSliceMut::UInt16(dst) => copy_selection(src, shape, selection, dst),
        VoxelSliceMut::UInt32(dst) => copy_selection(src, shape, selection, dst),
        VoxelSliceMut::Float32(dst) => copy_selection(src, shape, selection, dst),
    }
}

impl H5Store for MemoryStore {
    fn kind(&self, path: &str) -> Option<ObjectKind> {
        self.node(path).map(Node::kind)
    }

    fn children(&self, group: &str) -> Result<Vec<ChildEntry>> {
        match self.require(group)? {
            Node::Group(node) => Ok(node
                .members
                .iter()
                .map(|(name, member)| ChildEntry {
                    name: name.clone(),
                    kind: member.kind(),
                })
                .collect()),
            Node::Dataset(_) => Err(ImsError::Schema(format!("{} is not a group", group))),
        }
    }

    fn attribute_names(&self, path: &str) -> Result<Vec<String>> {
        Ok(self.require(path)?.attributes().keys().cloned().collect())
    }

    fn read_attribute_string(&self, path: &str, name: &str) -> Result<String> {
        match self.require(path)?.attributes().get(name) {
            Some(AttributeValue::Text(text)) => Ok(text.clone()),
            Some(AttributeValue::UInt(_)) => Err(ImsError::InvalidDataType(format!(
                "attribute {} at {} is not text",
                name, path
            ))),
            None => Err(ImsError::attribute_missing(path, name)),
        }
    }

    fn read_attribute_u32(&self, path: &str, name: &str) -> Result<u32> {
        match self.require(path)?.attributes().get(name) {
            Some(AttributeValue::UInt(value)) => Ok(*value),
            Some(AttributeValue::Text(_)) => Err(ImsError::InvalidDataType(format!(
                "attribute {} at {} is not an integer",
                name, path
            ))),
            None => Err(ImsError::attribute_missing(path, name)),
        }
    }

    fn dataset_info(&self, path: &str) -> Result<DatasetInfo> {
        Ok(self.dataset(path)?.info.clone())
    }

    fn read_string_dataset(&self, path: &str) -> Result<String> {
        let dataset = self.dataset(path)?;
        if dataset.info.element_type != ElementType::Text || dataset.info.ndim() != 1 {
            return Err(ImsError::InvalidDataType(format!(
                "{} is not a 1-D character dataset",
                path
            )));
        }
        match decode(dataset)? {
            Decoded::U8(bytes) => Ok(String::from_utf8_lossy(&bytes)
                .trim_end_matches('\0')
                .to_string()),
            _ => Err(ImsError::InvalidDataType(path.to_string())),
        }
    }

    fn read_u64_dataset(&self, path: &str) -> Result<Vec<u64>> {
        let decoded = decode(self.dataset(path)?)?;
        with_decoded!(decoded, values => cast_all(&values))
    }

    fn read_u8_dataset(&self, path: &str) -> Result<Vec<u8>> {
        let decoded = decode(self.dataset(path)?)?;
        with_decoded!(decoded, values => cast_all(&values))
    }

    fn read_hyperslab(
        &self,
        path: &str,
        selection: &Hyperslab,
        out: VoxelSliceMut<'_>,
    ) -> Result<()> {
        let dataset = self.dataset(path)?;
        let decoded = decode(dataset)?;
        let shape = &dataset.info.shape;
        with_decoded!(decoded, values => copy_into(&values, shape, selection, out))
    }

    fn refresh(&self, path: &str) -> Result<()> {
        self.dataset(path)?;
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

}
