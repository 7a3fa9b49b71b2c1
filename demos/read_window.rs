//! Example: Read windows of a synthetic multi-resolution image
//!
//! Run with: cargo run --example read_window

use ims_reader::{Filter, ImageReader, Index5D, ReadOptions, Size5D, SyntheticImage};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("ims-reader Example: Windowed Reads");
    println!("==================================\n");

    // 3 resolution levels, 2 channels, 3 timepoints, shuffle + gzip chunks
    let image = SyntheticImage::new(Size5D::new(100, 80, 24, 2, 3))
        .with_resolution_levels(3)
        .with_block_size(32, 32, 8)
        .with_filters(vec![Filter::Shuffle, Filter::Deflate(4)]);
    let reader = ImageReader::from_store(Box::new(image.build()?), 0, ReadOptions::default())?;

    println!("{}", reader.layout().summary());
    for (level, size) in reader.layout().sizes().iter().enumerate() {
        println!("  level {}: {}", level, size);
    }
    println!();

    // A window crossing chunk borders, all channels of timepoint 1
    let begin = Index5D::new(20, 10, 4, 0, 1);
    let end = Index5D::new(60, 40, 12, 2, 2);
    let mut voxels = vec![0u16; reader.window_len(&begin, &end)?];
    reader.read_data(&begin, &end, 0, &mut voxels)?;
    let max = voxels.iter().copied().max().unwrap_or(0);
    println!("Window {} .. {}: {} voxels, max value {}", begin, end, voxels.len(), max);

    // The same window at level 2 runs past the image edge; padding stays zero
    let coarse = reader.layout().level(2).map(|level| level.size).unwrap_or_default();
    let end = Index5D::new(coarse.x + 8, coarse.y + 8, coarse.z, 1, 1);
    let mut voxels = vec![0f32; reader.window_len(&Index5D::default(), &end)?];
    reader.read_data(&Index5D::default(), &end, 2, &mut voxels)?;
    let padding = voxels.iter().filter(|&&v| v == 0.0).count();
    println!("Level 2 window {}: {} voxels, {} zero", end, voxels.len(), padding);

    let histogram = reader.read_histogram(1, 0, 0)?;
    println!(
        "Histogram t=1 c=0: {} bins over [{}, {}], {} voxels",
        histogram.bins.len(),
        histogram.min,
        histogram.max,
        histogram.total_count()
    );
    Ok(())
}
