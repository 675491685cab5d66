use anyhow::Result;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::HashMap;

use urbanzones::collect::earthengine::client::{EarthEngine, ExportRequest, ExportTask};
use urbanzones::collect::earthengine::expr::Expr;
use urbanzones::commons::config::PipelineConfig;
use urbanzones::geometric::layers::LayerName;
use urbanzones::geometric::manifest::ExportManifest;
use urbanzones::geometric::pipeline::LayerPipeline;
use urbanzones::PipelineError;

/// Answers size queries per asset and records submitted exports
struct StubEngine {
    counts: HashMap<String, u64>,
    exports: RefCell<Vec<Value>>,
}

impl StubEngine {
    fn stocked() -> Self {
        let config = PipelineConfig::default();
        let mut counts: HashMap<String, u64> = config
            .layers
            .iter()
            .map(|l| (l.collection.clone(), 24))
            .collect();
        counts.insert(config.boundary.collection.clone(), 1);
        counts.insert(config.flood_risk.precipitation_collection.clone(), 730);
        StubEngine {
            counts,
            exports: RefCell::new(Vec::new()),
        }
    }
}

impl EarthEngine for StubEngine {
    fn compute_value(&self, expr: &Expr) -> Result<Value> {
        let id = expr.asset_ids().into_iter().next().unwrap_or_default();
        Ok(json!(self.counts.get(&id).copied().unwrap_or(0)))
    }

    fn start_export(&self, request: &ExportRequest) -> Result<ExportTask> {
        self.exports.borrow_mut().push(request.to_body());
        Ok(ExportTask {
            name: "projects/nasa-space-apps-474109/operations/EXPORT1".to_string(),
        })
    }
}

#[test]
fn test_run_submits_once_and_writes_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let engine = StubEngine::stocked();
    let config = PipelineConfig::default();

    let outcome = LayerPipeline::new(&engine, &config).run(dir.path()).unwrap();
    assert_eq!(
        outcome.task.name,
        "projects/nasa-space-apps-474109/operations/EXPORT1"
    );

    let exports = engine.exports.borrow();
    assert_eq!(exports.len(), 1);
    let body = &exports[0];
    assert_eq!(body["description"], "Nairobi_Master_Dataset_GeoTIFF");
    assert_eq!(body["fileExportOptions"]["fileFormat"], "GEO_TIFF");
    assert_eq!(
        body["fileExportOptions"]["driveDestination"]["folder"],
        "NASA_Space_Apps_Data"
    );
    assert_eq!(
        body["fileExportOptions"]["driveDestination"]["filenamePrefix"],
        "nairobi_master_data"
    );

    let manifest_path = outcome.manifest.unwrap();
    assert_eq!(
        manifest_path,
        dir.path().join("nairobi_master_data.manifest.json")
    );
    let manifest = ExportManifest::read(&manifest_path).unwrap();
    assert_eq!(manifest.bands, LayerName::BAND_ORDER.to_vec());
    assert_eq!(manifest.file_name, "nairobi_master_data.tif");
    assert_eq!(manifest.task.as_deref(), Some(outcome.task.name.as_str()));
}

#[test]
fn test_composite_is_deterministic() {
    let engine = StubEngine::stocked();
    let config = PipelineConfig::default();
    let pipeline = LayerPipeline::new(&engine, &config);

    let (_, first) = pipeline.composite().unwrap();
    let (_, second) = pipeline.composite().unwrap();
    assert_eq!(
        serde_json::to_vec(&first.image.0.to_expression()).unwrap(),
        serde_json::to_vec(&second.image.0.to_expression()).unwrap()
    );
}

#[test]
fn test_missing_boundary_aborts_before_export() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = StubEngine::stocked();
    engine.counts.insert("FAO/GAUL/2015/level2".to_string(), 0);
    let config = PipelineConfig::default();

    let err = LayerPipeline::new(&engine, &config).run(dir.path()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::BoundaryNotFound { .. })
    ));
    assert!(engine.exports.borrow().is_empty());
    assert!(!dir.path().join("nairobi_master_data.manifest.json").exists());
}

#[test]
fn test_empty_layer_aborts_before_export() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = StubEngine::stocked();
    engine
        .counts
        .insert("NOAA/VIIRS/DNB/MONTHLY_V1/VCMSLCFG".to_string(), 0);
    let config = PipelineConfig::default();

    let err = LayerPipeline::new(&engine, &config).run(dir.path()).unwrap_err();
    assert_eq!(
        err.downcast_ref::<PipelineError>(),
        Some(&PipelineError::EmptyCollection {
            layer: "activity".to_string(),
            collection: "NOAA/VIIRS/DNB/MONTHLY_V1/VCMSLCFG".to_string(),
        })
    );
    assert!(engine.exports.borrow().is_empty());
}

#[test]
fn test_manifest_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let engine = StubEngine::stocked();
    let mut config = PipelineConfig::default();
    config.export.write_manifest = false;

    let outcome = LayerPipeline::new(&engine, &config).run(dir.path()).unwrap();
    assert!(outcome.manifest.is_none());
    assert_eq!(engine.exports.borrow().len(), 1);
}
