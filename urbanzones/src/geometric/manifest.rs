use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::commons::config::ExportConfig;
use crate::commons::error::PipelineError;
use crate::geometric::composite::CompositeImage;
use crate::geometric::layers::LayerName;

/// Band-layout contract between the export and the local zoning run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportManifest {
    /// Expected raster file name once downloaded
    pub file_name: String,
    /// Band names, band 1 first
    pub bands: Vec<LayerName>,
    pub scale: f64,
    pub description: String,
    pub folder: String,
    /// Remote task handle, for manual follow-up
    pub task: Option<String>,
    pub created: DateTime<Utc>,
}

impl ExportManifest {
    pub fn new(composite: &CompositeImage, config: &ExportConfig, task: Option<String>) -> Self {
        ExportManifest {
            file_name: format!(
                "{}.{}",
                config.file_name_prefix,
                config.file_format.extension()
            ),
            bands: composite.bands.clone(),
            scale: config.scale,
            description: config.description.clone(),
            folder: config.folder.clone(),
            task,
            created: Utc::now(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize manifest")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write manifest: {:?}", path))?;
        log::info!("Export manifest saved to: {:?}", path);
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read export manifest: {:?}", path))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse export manifest: {:?}", path))
    }

    /// Check that `band` (one-based) of a raster with `band_count` bands holds `layer`
    pub fn verify(&self, layer: LayerName, band: usize, band_count: usize) -> Result<()> {
        if band_count < self.bands.len() {
            return Err(PipelineError::ManifestMismatch(format!(
                "raster has {} band(s), manifest lists {}",
                band_count,
                self.bands.len()
            ))
            .into());
        }

        match band.checked_sub(1).and_then(|i| self.bands.get(i)) {
            Some(expected) if *expected == layer => Ok(()),
            Some(expected) => Err(PipelineError::ManifestMismatch(format!(
                "band {} is '{}' in the manifest, not '{}'",
                band, expected, layer
            ))
            .into()),
            None => Err(PipelineError::ManifestMismatch(format!(
                "band {} is not listed in the manifest",
                band
            ))
            .into()),
        }
    }

    /// Compare a band description read from the raster, when it carries one
    pub fn verify_description(&self, band: usize, description: &str) -> Result<()> {
        let description = description.trim();
        if description.is_empty() {
            return Ok(());
        }
        match band.checked_sub(1).and_then(|i| self.bands.get(i)) {
            Some(expected) if expected.as_str() == description => Ok(()),
            Some(expected) => Err(PipelineError::ManifestMismatch(format!(
                "band {} is described as '{}' in the raster, manifest says '{}'",
                band, description, expected
            ))
            .into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::earthengine::expr::Image;

    fn manifest() -> ExportManifest {
        let composite = CompositeImage {
            bands: LayerName::BAND_ORDER.to_vec(),
            image: Image::constant(0.0),
        };
        ExportManifest::new(&composite, &ExportConfig::default(), Some("op".to_string()))
    }

    fn mismatch(result: Result<()>) -> bool {
        matches!(
            result.unwrap_err().downcast_ref::<PipelineError>(),
            Some(PipelineError::ManifestMismatch(_))
        )
    }

    #[test]
    fn test_file_name() {
        assert_eq!(manifest().file_name, "nairobi_master_data.tif");
    }

    #[test]
    fn test_verify() {
        let m = manifest();
        assert!(m.verify(LayerName::FloodRisk, 7, 7).is_ok());
        assert!(mismatch(m.verify(LayerName::FloodRisk, 6, 7)));
        assert!(mismatch(m.verify(LayerName::FloodRisk, 7, 6)));
        assert!(mismatch(m.verify(LayerName::FloodRisk, 8, 9)));
    }

    #[test]
    fn test_verify_description() {
        let m = manifest();
        assert!(m.verify_description(1, "").is_ok());
        assert!(m.verify_description(1, "heat").is_ok());
        assert!(mismatch(m.verify_description(1, "ndvi")));
    }

    #[test]
    fn test_write_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nairobi_master_data.manifest.json");
        let m = manifest();
        m.write(&path).unwrap();
        assert_eq!(ExportManifest::read(&path).unwrap(), m);
    }
}
