//! Windowed reads through `ImageReader::read_data`

mod common;

use common::{expected_window, open_image, open_instrumented, open_synthetic};
use ims_reader::{
    DataType, Filter, H5Store, Hyperslab, ImageReader, Index5D, ReadOptions, Size5D, SyntheticImage,
};
use ims_reader::types::VoxelSliceMut;
use std::sync::atomic::Ordering;

#[test]
fn test_time_and_channel_are_clamped() {
    let reader = open_image(Size5D::new(6, 5, 4, 2, 3));
    let begin = Index5D::new(1, 1, 1, 0, 1);

    let mut clamped = vec![0u16; 4 * 3 * 2 * 2 * 2];
    reader
        .read_data(&begin, &Index5D::new(5, 4, 3, 2, 3), 0, &mut clamped)
        .unwrap();

    let mut oversized = vec![0u16; clamped.len()];
    reader
        .read_data(&begin, &Index5D::new(5, 4, 3, 40, 90), 0, &mut oversized)
        .unwrap();

    assert_eq!(clamped, oversized);
    let expected: Vec<u16> = expected_window([1, 1, 1, 0, 1], [5, 4, 3, 2, 3], 0)
        .into_iter()
        .map(|v| v as u16)
        .collect();
    assert_eq!(clamped, expected);
}

#[test]
fn test_channel_window_outside_image_is_noop() {
    let reader = open_image(Size5D::new(4, 4, 4, 2, 1));
    let mut out = vec![9u16; 16];
    reader
        .read_data(&Index5D::new(0, 0, 0, 2, 0), &Index5D::new(4, 4, 1, 4, 1), 0, &mut out)
        .unwrap();
    assert!(out.iter().all(|&v| v == 9));
}

#[test]
fn test_unclipped_window_matches_hyperslab() {
    let image = SyntheticImage::new(Size5D::new(16, 12, 6, 1, 1)).with_block_size(8, 8, 4);
    let reader = open_synthetic(&image, ReadOptions::default());

    let mut window = vec![0u16; 7 * 5 * 3];
    reader
        .read_data(&Index5D::new(3, 2, 1, 0, 0), &Index5D::new(10, 7, 4, 1, 1), 0, &mut window)
        .unwrap();

    let store = image.build().unwrap();
    let mut direct = vec![0u16; window.len()];
    store
        .read_hyperslab(
            "/DataSet/ResolutionLevel 0/TimePoint 0/Channel 0/Data",
            &Hyperslab::new([1, 2, 3], [3, 5, 7]),
            VoxelSliceMut::UInt16(&mut direct),
        )
        .unwrap();
    assert_eq!(window, direct);
}

#[test]
fn test_boundary_window_leaves_outside_untouched() {
    let image = SyntheticImage::new(Size5D::new(9, 4, 1, 1, 1)).with_resolution_levels(2);
    let reader = open_synthetic(&image, ReadOptions::default());
    assert_eq!(reader.layout().level(1).unwrap().size, Size5D::new(5, 2, 1, 1, 1));

    const SENTINEL: u16 = 0xBEEF;
    let mut out = vec![SENTINEL; 5 * 3];
    reader
        .read_data(&Index5D::new(3, 0, 0, 0, 0), &Index5D::new(8, 3, 1, 1, 1), 1, &mut out)
        .unwrap();

    for y in 0..3u32 {
        for x in 0..5u32 {
            let value = out[(y * 5 + x) as usize];
            if x + 3 < 5 && y < 2 {
                assert_eq!(value, SyntheticImage::voxel(x + 3, y, 0, 0, 0, 1) as u16);
            } else {
                assert_eq!(value, SENTINEL, "voxel ({}, {}) outside the level was written", x, y);
            }
        }
    }
}

#[test]
fn test_unreadable_slice_is_zero_filled() {
    let image = SyntheticImage::new(Size5D::new(4, 4, 2, 3, 2));
    let mut store = image.build().unwrap();
    store
        .truncate_payload("/DataSet/ResolutionLevel 0/TimePoint 0/Channel 1/Data")
        .unwrap();
    let reader = ImageReader::from_store(Box::new(store), 0, ReadOptions::default()).unwrap();

    let slice = 4 * 4 * 2;
    let mut out = vec![255u8; slice * 3 * 2];
    reader
        .read_data(&Index5D::default(), &Index5D::new(4, 4, 2, 3, 2), 0, &mut out)
        .unwrap();

    let expected: Vec<u8> = expected_window([0; 5], [4, 4, 2, 3, 2], 0)
        .into_iter()
        .map(|v| v as u8)
        .collect();
    for (index, chunk) in out.chunks(slice).enumerate() {
        if index == 1 {
            assert!(chunk.iter().all(|&v| v == 0));
        } else {
            assert_eq!(chunk, &expected[index * slice..(index + 1) * slice]);
        }
    }
}

#[test]
fn test_swmr_refreshes_before_every_slice() {
    let image = SyntheticImage::new(Size5D::new(4, 4, 2, 3, 2));

    let (reader, counters) = open_instrumented(&image, ReadOptions::new().with_swmr(true));
    let mut out = vec![0u16; 4 * 4 * 2 * 3 * 2];
    reader
        .read_data(&Index5D::default(), &Index5D::new(4, 4, 2, 3, 2), 0, &mut out)
        .unwrap();
    assert_eq!(counters.refreshes.load(Ordering::SeqCst), 6);

    let (reader, counters) = open_instrumented(&image, ReadOptions::default());
    reader
        .read_data(&Index5D::default(), &Index5D::new(4, 4, 2, 3, 2), 0, &mut out)
        .unwrap();
    assert_eq!(counters.refreshes.load(Ordering::SeqCst), 0);
}

#[test]
fn test_values_convert_to_requested_type() {
    let image = SyntheticImage::new(Size5D::new(5, 3, 2, 1, 1)).with_data_type(DataType::UInt8);
    let reader = open_synthetic(&image, ReadOptions::default());
    assert_eq!(reader.data_type(), DataType::UInt8);

    let mut out = vec![0f32; 5 * 3 * 2];
    reader
        .read_data(&Index5D::default(), &Index5D::new(5, 3, 2, 1, 1), 0, &mut out)
        .unwrap();
    let expected: Vec<f32> = expected_window([0; 5], [5, 3, 2, 1, 1], 0)
        .into_iter()
        .map(|v| v as f32)
        .collect();
    assert_eq!(out, expected);
}

#[test]
fn test_compressed_image_reads_like_plain() {
    let size = Size5D::new(20, 10, 4, 2, 1);
    let plain = open_synthetic(&SyntheticImage::new(size), ReadOptions::default());
    let packed = open_synthetic(
        &SyntheticImage::new(size)
            .with_block_size(8, 8, 2)
            .with_filters(vec![Filter::Shuffle, Filter::Deflate(6)]),
        ReadOptions::default(),
    );

    let begin = Index5D::new(2, 3, 1, 0, 0);
    let end = Index5D::new(19, 9, 4, 2, 1);
    let mut expected = vec![0u32; plain.window_len(&begin, &end).unwrap()];
    let mut actual = vec![0u32; expected.len()];
    plain.read_data(&begin, &end, 0, &mut expected).unwrap();
    packed.read_data(&begin, &end, 0, &mut actual).unwrap();
    assert_eq!(actual, expected);
}
