//! Example: Print the metadata and parameters of an Imaris file as JSON
//!
//! Run with: cargo run --example print_metadata --features hdf5 -- <file.ims> [dataset]

use anyhow::{bail, Context};
use ims_reader::{file_images_information, ImageReader, ReadOptions};
use serde_json::json;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: print_metadata <file.ims> [dataset]");
    };
    let dataset = match args.next() {
        Some(index) => index.parse().context("dataset index must be a number")?,
        None => 0,
    };

    let data_types = file_images_information(&path, false);
    if data_types.is_empty() {
        bail!("{} is not an Imaris 5.5 file", path);
    }
    println!("Datasets: {:?}", data_types);

    let reader = ImageReader::open(&path, dataset, ReadOptions::default())
        .with_context(|| format!("opening dataset {} of {}", dataset, path))?;
    println!("{}", reader.layout().summary());

    let report = json!({
        "format": reader.format(),
        "metadata": reader.read_metadata()?,
        "parameters": reader.read_parameters()?,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
