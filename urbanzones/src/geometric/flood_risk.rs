use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::collect::earthengine::client::EarthEngine;
use crate::collect::earthengine::expr::Image;
use crate::commons::basic_functions::{unit_scale, Rescale};
use crate::commons::config::FloodRiskConfig;
use crate::geometric::layers::{
    apply_rescale, reduce, Layer, LayerBuilder, LayerName, Reducer, TemporalFilter,
};

/// Weights of the composite flood score
///
/// The weighted sum is not renormalised: with clamped unit-interval terms the
/// topographic term alone ranges over [0, 2], so scores above 1.0 are possible.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloodWeights {
    pub topographic: f64,
    pub rainfall: f64,
    pub impervious: f64,
}

impl Default for FloodWeights {
    fn default() -> Self {
        FloodWeights {
            topographic: 0.5,
            rainfall: 0.3,
            impervious: 0.2,
        }
    }
}

impl FloodWeights {
    /// `topographic*topo + rainfall*rain + impervious*imp`, evaluated in that order
    pub fn score(&self, topo_risk: f64, rainfall_risk: f64, impervious: f64) -> f64 {
        self.topographic * topo_risk + self.rainfall * rainfall_risk + self.impervious * impervious
    }

    pub fn is_finite(&self) -> bool {
        self.topographic.is_finite() && self.rainfall.is_finite() && self.impervious.is_finite()
    }
}

/// Pixel-level topographic risk: low ground and flat terrain score high
pub fn topographic_risk(elevation: f64, slope: f64, config: &FloodRiskConfig) -> f64 {
    let [elev_lo, elev_hi] = config.elevation_range;
    let [slope_lo, slope_hi] = config.slope_range;
    unit_scale(-elevation, elev_lo, elev_hi) + unit_scale(-slope, slope_lo, slope_hi)
}

/// Pixel-level rainfall risk from cumulative precipitation (mm)
pub fn rainfall_risk(cumulative_precipitation: f64, config: &FloodRiskConfig) -> f64 {
    let [lo, hi] = config.rainfall_range;
    unit_scale(cumulative_precipitation, lo, hi)
}

/// 1.0 when the land-use class is the impervious category
pub fn impervious_indicator(land_use_class: f64, config: &FloodRiskConfig) -> f64 {
    if land_use_class == config.impervious_class {
        1.0
    } else {
        0.0
    }
}

/// Combines terrain, rainfall and impervious surface into the flood layer
pub struct FloodRiskComposer<'a, 'b, E: EarthEngine + ?Sized> {
    builder: &'a LayerBuilder<'b, E>,
    config: &'a FloodRiskConfig,
}

impl<'a, 'b, E: EarthEngine + ?Sized> FloodRiskComposer<'a, 'b, E> {
    pub fn new(builder: &'a LayerBuilder<'b, E>, config: &'a FloodRiskConfig) -> Self {
        FloodRiskComposer { builder, config }
    }

    /// Negated elevation and negated slope, each over its unit range, summed
    pub fn topographic_risk(&self) -> Image {
        let [elev_lo, elev_hi] = self.config.elevation_range;
        let [slope_lo, slope_hi] = self.config.slope_range;
        let dem = Image::load(&self.config.dem_image);
        let elevation = dem.select(&self.config.elevation_band);
        let slope = dem.slope();

        let elevation_risk = apply_rescale(
            &elevation.multiply_by(-1.0),
            &Rescale::unit_interval(elev_lo, elev_hi),
        );
        let slope_risk = apply_rescale(
            &slope.multiply_by(-1.0),
            &Rescale::unit_interval(slope_lo, slope_hi),
        );
        elevation_risk.add(&slope_risk)
    }

    /// Cumulative precipitation over the study window, unit-scaled
    pub fn rainfall_risk(&self) -> Result<Image> {
        let id = &self.config.precipitation_collection;
        let collection = self
            .builder
            .filtered_collection(id, TemporalFilter::StudyWindow, true);
        self.builder
            .ensure_not_empty(LayerName::FloodRisk.as_str(), id, &collection)?;

        let [lo, hi] = self.config.rainfall_range;
        let total = reduce(&collection, Reducer::Sum).select(&self.config.precipitation_band);
        Ok(apply_rescale(&total, &Rescale::unit_interval(lo, hi)))
    }

    /// Binary mask of the impervious land-use class
    pub fn impervious_indicator(&self, land_use: &Layer) -> Image {
        land_use.image.eq_constant(self.config.impervious_class)
    }

    pub fn compose(&self, land_use: &Layer) -> Result<Layer> {
        let weights = &self.config.weights;
        let topo = self.topographic_risk();
        let rain = self.rainfall_risk()?;
        let impervious = self.impervious_indicator(land_use);

        let image = topo
            .multiply_by(weights.topographic)
            .add(&rain.multiply_by(weights.rainfall))
            .add(&impervious.multiply_by(weights.impervious))
            .rename(LayerName::FloodRisk.as_str())
            .to_float();

        Ok(Layer {
            name: LayerName::FloodRisk,
            image,
        })
    }
}
