use anyhow::Result;
use std::path::PathBuf;

use crate::collect::global_variables::manifest_path_for_raster;
use crate::commons::config::ZoningConfig;
use crate::geometric::manifest::ExportManifest;
use crate::geometric::raster::{read_band, BandRaster};
use crate::geometric::vectorize::{polygonize, ZoneCollection};

/// Result of a zoning run that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum ZoningOutcome {
    /// Features were written to `path`
    Written { path: PathBuf, features: usize },
    /// Every pixel fell in class 0; nothing was written
    NoData,
}

/// Classify one band of the master raster and write its zones as GeoJSON
pub struct ZoneClassifier<'a> {
    config: &'a ZoningConfig,
}

impl<'a> ZoneClassifier<'a> {
    pub fn new(config: &'a ZoningConfig) -> Self {
        ZoneClassifier { config }
    }

    /// Check the band layout against the export manifest, when there is one
    ///
    /// An explicitly configured manifest must exist; the default one next to
    /// the raster is optional.
    fn verify_layout(&self, raster: &BandRaster) -> Result<()> {
        if !self.config.verify_manifest {
            return Ok(());
        }
        let band = self.config.band();
        let path = match &self.config.manifest_path {
            Some(path) => path.clone(),
            None => {
                let path = manifest_path_for_raster(&self.config.raster_path);
                if !path.exists() {
                    log::warn!(
                        "No export manifest at {:?}; band layout not verified",
                        path
                    );
                    return Ok(());
                }
                path
            }
        };

        let manifest = ExportManifest::read(&path)?;
        manifest.verify(self.config.layer, band, raster.band_count)?;
        manifest.verify_description(band, &raster.description)?;
        log::info!("Band {} verified as '{}' against {:?}", band, self.config.layer, path);
        Ok(())
    }

    /// Load, classify and vectorize; no file is written on failure
    pub fn zones(&self) -> Result<ZoneCollection> {
        let band = self.config.band();
        let raster = read_band(&self.config.raster_path, band)?;
        self.verify_layout(&raster)?;

        let mut scheme = self.config.scheme.clone();
        if scheme.nodata.is_none() && self.config.respect_nodata {
            scheme.nodata = raster.nodata;
            if let Some(nodata) = raster.nodata {
                log::info!("Excluding band no-data value {}", nodata);
            }
        }

        println!("Classifying data into zones...");
        let classes = scheme.classify_grid(&raster.values);

        println!("Converting raster zones to vector polygons...");
        let zones = polygonize(&classes, &scheme, &raster.geo_core, self.config.connectivity);
        log::info!("{} zone feature(s) traced", zones.len());
        Ok(zones)
    }

    pub fn run(&self) -> Result<ZoningOutcome> {
        println!(
            "--- Processing Band {} into {} ---",
            self.config.band(),
            self.config.output.display()
        );

        let zones = self.zones()?;
        if zones.is_empty() {
            println!("No data was processed.");
            return Ok(ZoningOutcome::NoData);
        }

        zones.write(&self.config.output)?;
        println!("Success! Saved to '{}'.", self.config.output.display());
        Ok(ZoningOutcome::Written {
            path: self.config.output.clone(),
            features: zones.len(),
        })
    }
}
