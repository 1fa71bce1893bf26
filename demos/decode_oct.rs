//! Example: Decode an OCT container and reconstruct one frame
//!
//! Run with: cargo run --example decode_oct -- path/to/scan.oct
//!
//! Without an argument a small synthetic container is written to a temporary
//! directory and decoded instead.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use thorlabs_oct::reconstruct::reconstruct_frame;
use thorlabs_oct::{chirp_is_monotonic, DecodeOptions, OctFile};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("Thorlabs OCT Decoder Example");
    println!("============================\n");

    let temp_dir = tempfile::tempdir()?;
    let path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let path = temp_dir.path().join("synthetic.oct");
            write_synthetic(&path)?;
            println!("No input given, wrote {}\n", path.display());
            path
        }
    };

    let mut oct = OctFile::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;

    println!("Members:");
    for name in oct.list_members() {
        println!("  {}", name);
    }
    println!();

    let header = oct.header();
    println!("Header <{}>:", header.root_name);
    println!("  Raw data signed: {}", header.raw_data_is_signed());
    println!("  Frames: {}", header.frame_count());
    for entry in header.entries() {
        println!(
            "  {:<22} {} x {} ({}, {} B/px)",
            entry.logical_name, entry.size_x, entry.size_z, entry.element_kind, entry.bytes_per_element
        );
    }
    println!();

    let recording = oct.decode_recording(&DecodeOptions::default())?;
    println!("Recording: {}\n", recording.summary());

    let (Some(volume), Some(chirp)) = (recording.spectral.as_ref(), recording.array("Chirp")) else {
        println!("No spectral data with a chirp; nothing to reconstruct");
        return Ok(());
    };

    let chirp_values = chirp.to_f64();
    if !chirp_is_monotonic(chirp_values.row(0)) {
        println!("Chirp is not strictly increasing; skipping reconstruction");
        return Ok(());
    }

    let Some(frame) = volume
        .channels
        .iter()
        .find(|c| c.plan.scan_rows().is_some())
        .map(|c| c.channel)
    else {
        println!("No channel carries scan rows; nothing to reconstruct");
        return Ok(());
    };

    match reconstruct_frame(volume, frame, chirp) {
        Ok(reconstruction) => {
            let (rows, cols) = reconstruction.image.dim();
            let peak = reconstruction
                .image
                .iter()
                .cloned()
                .filter(|v| v.is_finite())
                .fold(f64::NEG_INFINITY, f64::max);
            println!(
                "Reconstructed frame {}: {} x {}, peak log10 magnitude {:.3}",
                frame, rows, cols, peak
            );
        }
        Err(e) => println!("Reconstruction failed: {}", e),
    }

    println!("\nExample complete!");
    Ok(())
}

fn write_synthetic(path: &Path) -> Result<()> {
    const SIZE_Z: usize = 16;
    let header = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<Ocity>
  <Instrument><RawDataIsSigned>False</RawDataIsSigned></Instrument>
  <Image><SizePixel><SizeX>4</SizeX><SizeY>0</SizeY><SizeZ>{SIZE_Z}</SizeZ></SizePixel></Image>
  <DataFiles>
    <DataFile Type="Raw" BytesPerPixel="2" SizeX="6" SizeZ="{SIZE_Z}" ApoRegionStart0="0" ApoRegionEnd0="2" ScanRegionStart0="2" ScanRegionEnd0="6">data\Spectral0.data</DataFile>
    <DataFile Type="Real" BytesPerPixel="4" SizeZ="{SIZE_Z}">data\Chirp.data</DataFile>
  </DataFiles>
</Ocity>"#
    );

    let spectral: Vec<u8> = (0..6 * SIZE_Z)
        .map(|i| {
            let (row, z) = (i / SIZE_Z, i % SIZE_Z);
            let fringe = if row < 2 { 0.0 } else { 200.0 * (z as f64 * 0.8).cos() };
            (1000.0 + fringe) as u16
        })
        .flat_map(|v| v.to_le_bytes())
        .collect();
    let chirp: Vec<u8> = (0..SIZE_Z)
        .map(|z| z as f32)
        .flat_map(|v| v.to_le_bytes())
        .collect();

    let mut zip = ZipWriter::new(std::fs::File::create(path)?);
    let options = SimpleFileOptions::default();
    zip.start_file("Header.xml", options)?;
    zip.write_all(header.as_bytes())?;
    zip.start_file("data\\Spectral0.data", options)?;
    zip.write_all(&spectral)?;
    zip.start_file("data\\Chirp.data", options)?;
    zip.write_all(&chirp)?;
    zip.finish()?;
    Ok(())
}
