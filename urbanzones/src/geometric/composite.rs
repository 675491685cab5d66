use anyhow::{Context, Result};
use std::collections::BTreeMap;

use crate::collect::earthengine::client::{EarthEngine, ExportRequest, ExportTask};
use crate::collect::earthengine::expr::Image;
use crate::commons::config::ExportConfig;
use crate::commons::error::PipelineError;
use crate::geometric::boundary::Boundary;
use crate::geometric::layers::{Layer, LayerName};

/// Multi-band stack of every thematic layer, clipped to the boundary
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeImage {
    /// Band names, band 1 first
    pub bands: Vec<LayerName>,
    pub image: Image,
}

impl CompositeImage {
    pub fn band_names(&self) -> Vec<String> {
        self.bands.iter().map(|b| b.as_str().to_string()).collect()
    }
}

/// Stacks layers in the fixed band order, whatever order they were built in
pub fn stack_layers<I>(layers: I, boundary: &Boundary) -> Result<CompositeImage>
where
    I: IntoIterator<Item = Layer>,
{
    let mut by_name: BTreeMap<LayerName, Image> = BTreeMap::new();
    for layer in layers {
        if by_name.insert(layer.name, layer.image).is_some() {
            return Err(PipelineError::DuplicateLayer(layer.name.to_string()).into());
        }
    }

    let mut stacked: Option<Image> = None;
    for name in LayerName::BAND_ORDER {
        let image = by_name
            .remove(&name)
            .ok_or_else(|| PipelineError::MissingLayer(name.to_string()))?;
        stacked = Some(match stacked {
            None => image,
            Some(acc) => acc.add_bands(&image),
        });
    }

    let image = stacked
        .context("No layers to stack")?
        .clip(&boundary.geometry);

    Ok(CompositeImage {
        bands: LayerName::BAND_ORDER.to_vec(),
        image,
    })
}

/// Submits the composite for export and returns without waiting
pub struct ExportSubmitter<'a, E: EarthEngine + ?Sized> {
    engine: &'a E,
    config: &'a ExportConfig,
}

impl<'a, E: EarthEngine + ?Sized> ExportSubmitter<'a, E> {
    pub fn new(engine: &'a E, config: &'a ExportConfig) -> Self {
        ExportSubmitter { engine, config }
    }

    pub fn request(&self, composite: &CompositeImage, boundary: &Boundary) -> ExportRequest {
        ExportRequest {
            image: composite.image.clone(),
            description: self.config.description.clone(),
            folder: self.config.folder.clone(),
            file_name_prefix: self.config.file_name_prefix.clone(),
            region: boundary.geometry.clone(),
            scale: self.config.scale,
            file_format: self.config.file_format,
        }
    }

    /// Fire-and-forget: completion and remote failures are not observed here
    pub fn submit(&self, composite: &CompositeImage, boundary: &Boundary) -> Result<ExportTask> {
        let request = self.request(composite, boundary);
        let task = self
            .engine
            .start_export(&request)
            .with_context(|| format!("Failed to submit export '{}'", request.description))?;
        log::info!(
            "Export '{}' accepted as {} (destination folder '{}')",
            request.description,
            task.name,
            request.folder
        );
        Ok(task)
    }
}
