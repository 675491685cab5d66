use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::collect::earthengine::client::{FileFormat, EARTHENGINE_API_URL};
use crate::collect::global_variables::{FLOOD_ZONES_GEOJSON, MASTER_RASTER};
use crate::commons::error::PipelineError;
use crate::geometric::classify::ClassificationScheme;
use crate::geometric::flood_risk::FloodWeights;
use crate::geometric::layers::{LayerName, LayerSpec};
use crate::geometric::vectorize::Connectivity;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn invalid(message: impl Into<String>) -> anyhow::Error {
    PipelineError::InvalidConfig(message.into()).into()
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn require_range(field: &str, [lo, hi]: [f64; 2]) -> Result<()> {
    if !(lo.is_finite() && hi.is_finite() && lo < hi) {
        return Err(invalid(format!(
            "{} must be a finite range with lo < hi, got [{}, {}]",
            field, lo, hi
        )));
    }
    Ok(())
}

/// Read a JSON config file; missing fields take their defaults
fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    serde_json::from_str(&text)
        .map_err(|e| invalid(format!("{:?}: {}", path, e)))
}

/// Administrative boundary lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Global administrative-boundary table
    pub collection: String,
    pub country_field: String,
    pub country: String,
    pub region_field: String,
    pub region: String,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        BoundaryConfig {
            collection: "FAO/GAUL/2015/level2".to_string(),
            country_field: "ADM0_NAME".to_string(),
            country: "Kenya".to_string(),
            region_field: "ADM2_NAME".to_string(),
            region: "Nairobi".to_string(),
        }
    }
}

impl BoundaryConfig {
    pub fn validate(&self) -> Result<()> {
        require_non_empty("boundary.collection", &self.collection)?;
        require_non_empty("boundary.country_field", &self.country_field)?;
        require_non_empty("boundary.country", &self.country)?;
        require_non_empty("boundary.region_field", &self.region_field)?;
        require_non_empty("boundary.region", &self.region)
    }
}

/// Study window, `start` inclusive and `end` exclusive, as `YYYY-MM-DD`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

impl Default for DateRange {
    fn default() -> Self {
        DateRange {
            start: "2023-01-01".to_string(),
            end: "2025-01-01".to_string(),
        }
    }
}

impl DateRange {
    pub fn parse(&self) -> Result<(NaiveDate, NaiveDate)> {
        let start = NaiveDate::parse_from_str(&self.start, DATE_FORMAT)
            .map_err(|e| invalid(format!("date_range.start '{}': {}", self.start, e)))?;
        let end = NaiveDate::parse_from_str(&self.end, DATE_FORMAT)
            .map_err(|e| invalid(format!("date_range.end '{}': {}", self.end, e)))?;
        Ok((start, end))
    }

    pub fn validate(&self) -> Result<()> {
        let (start, end) = self.parse()?;
        if start >= end {
            return Err(invalid(format!(
                "date_range.start {} must be before end {}",
                start, end
            )));
        }
        Ok(())
    }
}

/// Inputs and constants of the flood-risk layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloodRiskConfig {
    pub dem_image: String,
    pub elevation_band: String,
    /// Unit range applied to negated elevation (m)
    pub elevation_range: [f64; 2],
    /// Unit range applied to negated slope (degrees)
    pub slope_range: [f64; 2],
    pub precipitation_collection: String,
    pub precipitation_band: String,
    /// Unit range applied to cumulative precipitation (mm)
    pub rainfall_range: [f64; 2],
    /// Land-use class treated as impervious surface (built area)
    pub impervious_class: f64,
    pub weights: FloodWeights,
}

impl Default for FloodRiskConfig {
    fn default() -> Self {
        FloodRiskConfig {
            dem_image: "USGS/SRTMGL1_003".to_string(),
            elevation_band: "elevation".to_string(),
            elevation_range: [-2000.0, -1000.0],
            slope_range: [-20.0, 0.0],
            precipitation_collection: "NASA/GPM_L3/IMERG_V07".to_string(),
            precipitation_band: "precipitation".to_string(),
            rainfall_range: [0.0, 2000.0],
            impervious_class: 6.0,
            weights: FloodWeights::default(),
        }
    }
}

impl FloodRiskConfig {
    pub fn validate(&self) -> Result<()> {
        require_non_empty("flood_risk.dem_image", &self.dem_image)?;
        require_non_empty("flood_risk.elevation_band", &self.elevation_band)?;
        require_non_empty(
            "flood_risk.precipitation_collection",
            &self.precipitation_collection,
        )?;
        require_non_empty("flood_risk.precipitation_band", &self.precipitation_band)?;
        require_range("flood_risk.elevation_range", self.elevation_range)?;
        require_range("flood_risk.slope_range", self.slope_range)?;
        require_range("flood_risk.rainfall_range", self.rainfall_range)?;
        if !self.impervious_class.is_finite() {
            return Err(invalid("flood_risk.impervious_class must be finite"));
        }
        if !self.weights.is_finite() {
            return Err(invalid("flood_risk.weights must be finite"));
        }
        Ok(())
    }
}

/// Destination of the composite export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub description: String,
    pub folder: String,
    pub file_name_prefix: String,
    /// Output pixel size in metres
    pub scale: f64,
    pub file_format: FileFormat,
    /// Write `<prefix>.manifest.json` once the export is accepted
    pub write_manifest: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            description: "Nairobi_Master_Dataset_GeoTIFF".to_string(),
            folder: "NASA_Space_Apps_Data".to_string(),
            file_name_prefix: "nairobi_master_data".to_string(),
            scale: 200.0,
            file_format: FileFormat::GeoTiff,
            write_manifest: true,
        }
    }
}

impl ExportConfig {
    pub fn validate(&self) -> Result<()> {
        require_non_empty("export.description", &self.description)?;
        require_non_empty("export.folder", &self.folder)?;
        require_non_empty("export.file_name_prefix", &self.file_name_prefix)?;
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(invalid(format!(
                "export.scale must be positive, got {}",
                self.scale
            )));
        }
        Ok(())
    }
}

/// Remote service endpoint and credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// OAuth2 bearer token; usually supplied on the command line or environment
    pub access_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: EARTHENGINE_API_URL.to_string(),
            access_token: None,
        }
    }
}

/// Phase-1 settings: boundary, layers, flood model and export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cloud project billed for remote computation
    pub project: String,
    pub api: ApiConfig,
    pub boundary: BoundaryConfig,
    pub date_range: DateRange,
    /// The six directly-sourced layers; the flood layer is derived
    pub layers: Vec<LayerSpec>,
    pub flood_risk: FloodRiskConfig,
    pub export: ExportConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            project: "nasa-space-apps-474109".to_string(),
            api: ApiConfig::default(),
            boundary: BoundaryConfig::default(),
            date_range: DateRange::default(),
            layers: LayerSpec::defaults(),
            flood_risk: FloodRiskConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file and validate
    pub fn load(path: &Path) -> Result<Self> {
        let config: PipelineConfig = load_json(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty("project", &self.project)?;
        require_non_empty("api.base_url", &self.api.base_url)?;
        self.boundary.validate()?;
        self.date_range.validate()?;
        self.flood_risk.validate()?;
        self.export.validate()?;

        let mut seen = BTreeSet::new();
        for spec in &self.layers {
            if spec.name == LayerName::FloodRisk {
                return Err(invalid(
                    "layers must not list flood_risk; it is derived from the flood_risk section",
                ));
            }
            if !seen.insert(spec.name) {
                return Err(invalid(format!("layer '{}' is listed twice", spec.name)));
            }
            require_non_empty(&format!("layers.{}.collection", spec.name), &spec.collection)?;
            require_non_empty(&format!("layers.{}.band", spec.name), &spec.band)?;
            spec.rescale
                .validate()
                .map_err(|e| invalid(format!("layers.{}.rescale: {}", spec.name, e)))?;
        }
        for name in &LayerName::BAND_ORDER[..6] {
            if !seen.contains(name) {
                return Err(invalid(format!("layer '{}' is missing", name)));
            }
        }
        Ok(())
    }
}

/// Phase-2 settings: which band to zone and how
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoningConfig {
    pub raster_path: PathBuf,
    /// Layer to zone; its band index is fixed by the composite band order
    pub layer: LayerName,
    pub output: PathBuf,
    pub scheme: ClassificationScheme,
    pub connectivity: Connectivity,
    /// Export manifest to verify against; derived from the raster name when unset
    pub manifest_path: Option<PathBuf>,
    pub verify_manifest: bool,
    /// Use the band's declared no-data value when the scheme has none
    pub respect_nodata: bool,
}

impl Default for ZoningConfig {
    fn default() -> Self {
        ZoningConfig::preset(LayerName::FloodRisk)
    }
}

impl ZoningConfig {
    /// Output file and class breaks used for each layer's zone map
    pub fn preset(layer: LayerName) -> Self {
        let inf = f64::INFINITY;
        let (output, scheme) = match layer {
            LayerName::Heat => (
                "heat_zones.geojson",
                ClassificationScheme::new(vec![(28.0, "Cool"), (33.0, "Warm"), (inf, "Hot")]),
            ),
            LayerName::Ndvi => (
                "ndvi_zones.geojson",
                ClassificationScheme::new(vec![(0.2, "Low"), (0.5, "Medium"), (inf, "High")]),
            ),
            LayerName::No2 => (
                "no2_zones.geojson",
                ClassificationScheme::new(vec![
                    (0.00005, "Low"),
                    (0.0001, "Medium"),
                    (inf, "High"),
                ]),
            ),
            LayerName::Population => (
                "pop_zones.geojson",
                ClassificationScheme::new(vec![
                    (2000.0, "Low"),
                    (8000.0, "Medium"),
                    (inf, "High"),
                ]),
            ),
            LayerName::LandUse => (
                "landuse_zones.geojson",
                ClassificationScheme::new(vec![
                    (1.5, "Trees"),
                    (5.5, "Crops"),
                    (inf, "Built-up"),
                ]),
            ),
            LayerName::Activity => (
                "activity_zones.geojson",
                ClassificationScheme::new(vec![(5.0, "Low"), (20.0, "Medium"), (inf, "High")]),
            ),
            LayerName::FloodRisk => (FLOOD_ZONES_GEOJSON, ClassificationScheme::flood_risk()),
        };

        ZoningConfig {
            raster_path: PathBuf::from(MASTER_RASTER),
            layer,
            output: PathBuf::from(output),
            scheme,
            connectivity: Connectivity::Four,
            manifest_path: None,
            verify_manifest: true,
            respect_nodata: false,
        }
    }

    pub fn band(&self) -> usize {
        self.layer.band_index()
    }

    /// Load from a JSON file and validate
    pub fn load(path: &Path) -> Result<Self> {
        let config: ZoningConfig = load_json(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.raster_path.as_os_str().is_empty() {
            return Err(invalid("raster_path must not be empty"));
        }
        if self.output.as_os_str().is_empty() {
            return Err(invalid("output must not be empty"));
        }
        self.scheme
            .validate()
            .map_err(|e| invalid(format!("scheme: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn invalid_config(result: Result<()>) -> bool {
        matches!(
            result.unwrap_err().downcast_ref::<PipelineError>(),
            Some(PipelineError::InvalidConfig(_))
        )
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
        assert!(ZoningConfig::default().validate().is_ok());
        for layer in LayerName::BAND_ORDER {
            assert!(ZoningConfig::preset(layer).validate().is_ok());
        }
    }

    #[test]
    fn test_default_zoning_is_flood() {
        let config = ZoningConfig::default();
        assert_eq!(config.band(), 7);
        assert_eq!(config.raster_path, PathBuf::from("nairobi_master_data.tif"));
        assert_eq!(config.output, PathBuf::from("flood_zones.geojson"));
        assert_eq!(config.scheme, ClassificationScheme::flood_risk());
        assert_eq!(config.connectivity, Connectivity::Four);
    }

    #[test]
    fn test_date_range() {
        let (start, end) = DateRange::default().parse().unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());

        let reversed = DateRange {
            start: "2025-01-01".to_string(),
            end: "2023-01-01".to_string(),
        };
        assert!(invalid_config(reversed.validate()));
        let garbled = DateRange {
            start: "2023-13-01".to_string(),
            ..DateRange::default()
        };
        assert!(invalid_config(garbled.validate()));
    }

    #[test]
    fn test_layer_set_checked() {
        let mut config = PipelineConfig::default();
        config.layers.pop();
        assert!(invalid_config(config.validate()));

        let mut config = PipelineConfig::default();
        let heat = config.layers[0].clone();
        config.layers.push(heat);
        assert!(invalid_config(config.validate()));
    }

    #[test]
    fn test_bad_values() {
        let mut config = PipelineConfig::default();
        config.export.scale = 0.0;
        assert!(invalid_config(config.validate()));

        let mut config = PipelineConfig::default();
        config.flood_risk.rainfall_range = [2000.0, 0.0];
        assert!(invalid_config(config.validate()));

        let mut config = PipelineConfig::default();
        config.flood_risk.weights.rainfall = f64::NAN;
        assert!(invalid_config(config.validate()));

        let mut config = ZoningConfig::default();
        config.scheme = ClassificationScheme::new(vec![(0.7, "a"), (0.5, "b")]);
        assert!(invalid_config(config.validate()));
    }

    #[test]
    fn test_load_partial_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"layer": "heat", "output": "out/heat.geojson", "connectivity": "eight",
                "scheme": {{"breaks": [[30, "Mild"], ["inf", "Hot"]]}}}}"#
        )
        .unwrap();

        let config = ZoningConfig::load(file.path()).unwrap();
        assert_eq!(config.layer, LayerName::Heat);
        assert_eq!(config.band(), 1);
        assert_eq!(config.connectivity, Connectivity::Eight);
        assert_eq!(config.scheme.class_count(), 2);
        // Unset fields keep their defaults
        assert_eq!(config.raster_path, PathBuf::from("nairobi_master_data.tif"));
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"date_range": {{"start": "2025-01-01", "end": "2024-01-01"}}}}"#)
            .unwrap();
        let err = PipelineConfig::load(file.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::InvalidConfig(_))
        ));
    }
}
