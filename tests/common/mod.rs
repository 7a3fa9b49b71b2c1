//! Shared fixtures for the integration tests

#![allow(dead_code)]

use ims_reader::io::{ChildEntry, DatasetInfo, ObjectKind};
use ims_reader::types::VoxelSliceMut;
use ims_reader::{
    H5Store, Hyperslab, ImageReader, MemoryStore, ReadOptions, Result, Size5D, SyntheticImage,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

pub fn init_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}

/// Reader over a synthetic image built from `image`
pub fn open_synthetic(image: &SyntheticImage, options: ReadOptions) -> ImageReader {
    init_logging();
    let store = image.build().expect("build synthetic image");
    ImageReader::from_store(Box::new(store), 0, options).expect("open synthetic image")
}

/// Reader over a one-level 16-bit image of `size`
pub fn open_image(size: Size5D) -> ImageReader {
    open_synthetic(&SyntheticImage::new(size), ReadOptions::default())
}

/// Counters shared between an [`InstrumentedStore`] and the test
#[derive(Debug, Default)]
pub struct StoreCounters {
    pub calls: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub overlaps: AtomicUsize,
    busy: AtomicBool,
}

struct Call<'a>(&'a StoreCounters);

impl Drop for Call<'_> {
    fn drop(&mut self) {
        self.0.busy.store(false, Ordering::SeqCst);
    }
}

/// Store wrapper recording calls and detecting calls that overlap in time
pub struct InstrumentedStore {
    inner: MemoryStore,
    counters: Arc<StoreCounters>,
}

impl InstrumentedStore {
    pub fn new(inner: MemoryStore) -> (Self, Arc<StoreCounters>) {
        let counters = Arc::new(StoreCounters::default());
        (
            Self {
                inner,
                counters: Arc::clone(&counters),
            },
            counters,
        )
    }

    fn enter(&self) -> Call<'_> {
        if self.counters.busy.swap(true, Ordering::SeqCst) {
            self.counters.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        // widen the window in which an unsynchronized caller would collide
        thread::yield_now();
        Call(&self.counters)
    }
}

impl H5Store for InstrumentedStore {
    fn kind(&self, path: &str) -> Option<ObjectKind> {
        let _call = self.enter();
        self.inner.kind(path)
    }

    fn children(&self, group: &str) -> Result<Vec<ChildEntry>> {
        let _call = self.enter();
        self.inner.children(group)
    }

    fn attribute_names(&self, path: &str) -> Result<Vec<String>> {
        let _call = self.enter();
        self.inner.attribute_names(path)
    }

    fn read_attribute_string(&self, path: &str, name: &str) -> Result<String> {
        let _call = self.enter();
        self.inner.read_attribute_string(path, name)
    }

    fn read_attribute_u32(&self, path: &str, name: &str) -> Result<u32> {
        let _call = self.enter();
        self.inner.read_attribute_u32(path, name)
    }

    fn dataset_info(&self, path: &str) -> Result<DatasetInfo> {
        let _call = self.enter();
        self.inner.dataset_info(path)
    }

    fn read_string_dataset(&self, path: &str) -> Result<String> {
        let _call = self.enter();
        self.inner.read_string_dataset(path)
    }

    fn read_u64_dataset(&self, path: &str) -> Result<Vec<u64>> {
        let _call = self.enter();
        self.inner.read_u64_dataset(path)
    }

    fn read_u8_dataset(&self, path: &str) -> Result<Vec<u8>> {
        let _call = self.enter();
        self.inner.read_u8_dataset(path)
    }

    fn read_hyperslab(&self, path: &str, selection: &Hyperslab, out: VoxelSliceMut<'_>) -> Result<()> {
        let _call = self.enter();
        self.inner.read_hyperslab(path, selection, out)
    }

    fn refresh(&self, path: &str) -> Result<()> {
        let _call = self.enter();
        self.counters.refreshes.fetch_add(1, Ordering::SeqCst);
        self.inner.refresh(path)
    }
}

/// Reader over an instrumented synthetic image
pub fn open_instrumented(image: &SyntheticImage, options: ReadOptions) -> (ImageReader, Arc<StoreCounters>) {
    init_logging();
    let (store, counters) = InstrumentedStore::new(image.build().expect("build synthetic image"));
    let reader = ImageReader::from_store(Box::new(store), 0, options).expect("open synthetic image");
    (reader, counters)
}

/// Expected window contents, X fastest, then Y, Z, C, T
pub fn expected_window(begin: [u32; 5], end: [u32; 5], level: usize) -> Vec<u32> {
    let mut values = Vec::new();
    for t in begin[4]..end[4] {
        for c in begin[3]..end[3] {
            for z in begin[2]..end[2] {
                for y in begin[1]..end[1] {
                    for x in begin[0]..end[0] {
                        values.push(SyntheticImage::voxel(x, y, z, c, t, level));
                    }
                }
            }
        }
    }
    values
}
