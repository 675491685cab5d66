use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::collect::earthengine::client::{EarthEngine, ExportTask};
use crate::collect::global_variables::manifest_path_for;
use crate::commons::config::PipelineConfig;
use crate::commons::error::PipelineError;
use crate::geometric::boundary::{Boundary, BoundaryResolver};
use crate::geometric::composite::{stack_layers, CompositeImage, ExportSubmitter};
use crate::geometric::flood_risk::FloodRiskComposer;
use crate::geometric::layers::{LayerBuilder, LayerName};
use crate::geometric::manifest::ExportManifest;

/// What a phase-1 run left behind
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutcome {
    pub task: ExportTask,
    pub manifest: Option<PathBuf>,
}

/// Phase 1: boundary, layers, flood layer, composite and export submission
pub struct LayerPipeline<'a, E: EarthEngine + ?Sized> {
    engine: &'a E,
    config: &'a PipelineConfig,
}

impl<'a, E: EarthEngine + ?Sized> LayerPipeline<'a, E> {
    pub fn new(engine: &'a E, config: &'a PipelineConfig) -> Self {
        LayerPipeline { engine, config }
    }

    /// Resolve the boundary and assemble the seven-band composite
    pub fn composite(&self) -> Result<(Boundary, CompositeImage)> {
        let boundary = BoundaryResolver::new(self.engine, &self.config.boundary).resolve()?;

        let builder = LayerBuilder::new(self.engine, &boundary, &self.config.date_range);
        let mut layers = builder.build_all(&self.config.layers)?;

        let flood = {
            let land_use = layers
                .iter()
                .find(|l| l.name == LayerName::LandUse)
                .ok_or_else(|| PipelineError::MissingLayer(LayerName::LandUse.to_string()))?;
            FloodRiskComposer::new(&builder, &self.config.flood_risk).compose(land_use)?
        };
        layers.push(flood);

        let composite = stack_layers(layers, &boundary)?;
        log::info!("Composite bands: {}", composite.band_names().join(", "));
        Ok((boundary, composite))
    }

    /// Build, submit the export and write the manifest into `manifest_dir`
    pub fn run(&self, manifest_dir: &Path) -> Result<ExportOutcome> {
        let (boundary, composite) = self.composite()?;
        let task =
            ExportSubmitter::new(self.engine, &self.config.export).submit(&composite, &boundary)?;

        let manifest = if self.config.export.write_manifest {
            let path = manifest_dir.join(manifest_path_for(&self.config.export.file_name_prefix));
            ExportManifest::new(&composite, &self.config.export, Some(task.name.clone()))
                .write(&path)?;
            Some(path)
        } else {
            None
        };

        Ok(ExportOutcome { task, manifest })
    }
}
