use std::path::{Path, PathBuf};

/// Raster downloaded from the export destination
pub const MASTER_RASTER: &str = "nairobi_master_data.tif";

/// Default zoning output
pub const FLOOD_ZONES_GEOJSON: &str = "flood_zones.geojson";

/// Suffix of the manifest written next to an export
pub const MANIFEST_SUFFIX: &str = ".manifest.json";

pub fn manifest_path_for(file_name_prefix: &str) -> PathBuf {
    PathBuf::from(format!("{}{}", file_name_prefix, MANIFEST_SUFFIX))
}

/// Manifest expected next to a downloaded raster, `<stem>.manifest.json`
pub fn manifest_path_for_raster(raster: &Path) -> PathBuf {
    let stem = raster
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    raster.with_file_name(format!("{}{}", stem, MANIFEST_SUFFIX))
}
