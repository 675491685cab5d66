use anyhow::Result;
use std::path::PathBuf;

use urbanzones::commons::config::ZoningConfig;
use urbanzones::geo_core::{Crs, GeoCore, GeoTransform};
use urbanzones::geometric::layers::LayerName;
use urbanzones::geometric::raster::{write_geotiff, Grid, OutputBand};
use urbanzones::geometric::zoning::ZoneClassifier;

/// Example: zoning a synthetic master raster without any remote service
/// Band 7 gets a gradient of flood scores over central Nairobi
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    println!("=== Example: Flood zones from a synthetic master raster ===\n");

    let output_dir = PathBuf::from("./output");
    let raster_path = output_dir.join("nairobi_master_data.tif");

    // ~200 m pixels over central Nairobi (EPSG:4326)
    let (width, height) = (60, 40);
    let geo_core = GeoCore::new(
        Crs::from_epsg(4326),
        GeoTransform::north_up(36.75, -1.25, 0.0018),
    );

    let mut flood = Grid::filled(width, height, f32::NAN);
    for row in 0..height {
        for col in 0..width {
            // Risk rises towards the low-lying south-east
            let score = 0.2 + 0.9 * (col + row) as f32 / (width + height) as f32;
            flood.set(col, row, score);
        }
    }
    let filler = Grid::filled(width, height, 0.0f32);
    let mut bands: Vec<OutputBand> = LayerName::BAND_ORDER[..6]
        .iter()
        .map(|l| OutputBand::new(l.as_str(), &filler))
        .collect();
    bands.push(OutputBand::new(LayerName::FloodRisk.as_str(), &flood));
    write_geotiff(&raster_path, &bands, &geo_core)?;

    let config = ZoningConfig {
        raster_path,
        output: output_dir.join("flood_zones.geojson"),
        ..ZoningConfig::default()
    };
    let outcome = ZoneClassifier::new(&config).run()?;
    println!("\nOutcome: {:?}", outcome);

    Ok(())
}
