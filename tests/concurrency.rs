//! Calls on one reader from many threads never overlap inside the store

mod common;

use common::{expected_window, open_instrumented};
use ims_reader::{Index5D, ReadOptions, Size5D, SyntheticImage};
use std::sync::atomic::Ordering;
use std::thread;

#[test]
fn test_concurrent_calls_are_serialized() {
    let image = SyntheticImage::new(Size5D::new(12, 10, 4, 2, 2))
        .with_block_size(4, 4, 2)
        .with_fine_histogram(true);
    let (reader, counters) = open_instrumented(&image, ReadOptions::new().with_swmr(true));
    let expected: Vec<u16> = expected_window([0; 5], [12, 10, 4, 2, 2], 0)
        .into_iter()
        .map(|v| v as u16)
        .collect();

    thread::scope(|scope| {
        for worker in 0..8 {
            let reader = &reader;
            let expected = &expected;
            scope.spawn(move || {
                for round in 0..10 {
                    match (worker + round) % 4 {
                        0 => {
                            let mut out = vec![0u16; expected.len()];
                            reader
                                .read_data(&Index5D::default(), &Index5D::new(12, 10, 4, 2, 2), 0, &mut out)
                                .unwrap();
                            assert_eq!(&out, expected);
                        }
                        1 => assert_eq!(reader.read_metadata().unwrap().image_size().x, 12),
                        2 => assert!(!reader.read_parameters().unwrap().is_empty()),
                        _ => assert_eq!(reader.read_histogram(1, 1, 0).unwrap().bins.len(), 1024),
                    }
                }
            });
        }
    });

    assert!(counters.calls.load(Ordering::SeqCst) > 0);
    assert_eq!(counters.overlaps.load(Ordering::SeqCst), 0);
}
