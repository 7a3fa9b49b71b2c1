//! Every allocation handed across the C ABI is released by its free function

use ims_reader::ffi::*;
use ims_reader::{ImageReader, ReadOptions, Size5D, SyntheticImage};
use std::alloc::{GlobalAlloc, Layout, System};
use std::ffi::CString;
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};

/// Counts live bytes while `TRACKING` is set
struct CountingAllocator;

static TRACKING: AtomicBool = AtomicBool::new(false);
static LIVE_BYTES: AtomicIsize = AtomicIsize::new(0);

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if TRACKING.load(Ordering::SeqCst) {
            LIVE_BYTES.fetch_add(layout.size() as isize, Ordering::SeqCst);
        }
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if TRACKING.load(Ordering::SeqCst) {
            LIVE_BYTES.fetch_sub(layout.size() as isize, Ordering::SeqCst);
        }
        System.dealloc(ptr, layout)
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if TRACKING.load(Ordering::SeqCst) {
            LIVE_BYTES.fetch_add(new_size as isize - layout.size() as isize, Ordering::SeqCst);
        }
        System.realloc(ptr, layout, new_size)
    }
}

#[global_allocator]
static ALLOCATOR: CountingAllocator = CountingAllocator;

/// Bytes still allocated after running `body` with tracking on
fn leaked_by(body: impl FnOnce()) -> isize {
    LIVE_BYTES.store(0, Ordering::SeqCst);
    TRACKING.store(true, Ordering::SeqCst);
    body();
    TRACKING.store(false, Ordering::SeqCst);
    LIVE_BYTES.load(Ordering::SeqCst)
}

// A single test keeps the counter free of allocations from parallel tests.
#[test]
fn test_every_allocation_is_freed_once() {
    let image = SyntheticImage::new(Size5D::new(6, 4, 2, 3, 2)).with_fine_histogram(true);
    let reader = ImageReader::from_store(Box::new(image.build().unwrap()), 0, ReadOptions::default()).unwrap();
    let handle = into_handle::<u16>(reader);
    let missing = CString::new("/nonexistent/image.ims").unwrap();

    let leaked = leaked_by(|| unsafe {
        let mut sizes = ImsSize5DVector::empty();
        let mut block_sizes = ImsSize5DVector::empty();
        let mut extent = ImsImageExtent::default();
        let mut time_infos = ImsTimeInfoVector::empty();
        let mut color_infos = ImsColorInfoVector::empty();
        let mut compression = 0u32;
        ims_read_metadata_uint16(
            handle,
            &mut sizes,
            &mut block_sizes,
            &mut extent,
            &mut time_infos,
            &mut color_infos,
            &mut compression,
        );
        assert_eq!(color_infos.size, 3);
        assert!(color_infos.as_slice().iter().any(|info| info.color_table_size > 0));
        ims_free_metadata(&mut sizes, &mut block_sizes, &mut time_infos, &mut color_infos);

        let mut params = ImsParameters::empty();
        ims_read_parameters_uint16(handle, &mut params);
        assert!(params.size > 0);
        ims_free_parameters(&mut params);

        let histogram = ims_read_histogram_uint16(handle, &ImsIndexTCR { t: 1, c: 2, r: 0 });
        assert!(!histogram.is_null());
        ims_free_histogram(histogram);

        let thumbnail = ims_read_thumbnail_uint16(handle);
        assert!(!thumbnail.is_null());
        ims_free_thumbnail(thumbnail);

        let types = ims_get_file_images_information(missing.as_ptr(), false);
        ims_free_data_types(types);
    });
    assert_eq!(leaked, 0);

    let leaked = leaked_by(|| unsafe {
        let reader = ImageReader::from_store(Box::new(image.build().unwrap()), 0, ReadOptions::default()).unwrap();
        ims_destroy_uint8(into_handle::<u8>(reader));
    });
    assert_eq!(leaked, 0);

    unsafe { ims_destroy_uint16(handle) };
}
