use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::collect::earthengine::client::EarthEngine;
use crate::collect::earthengine::expr::{Filter, Image, ImageCollection};
use crate::commons::basic_functions::Rescale;
use crate::commons::config::DateRange;
use crate::commons::error::PipelineError;
use crate::geometric::boundary::Boundary;

/// Thematic layer identity
///
/// The declaration order is the band order of the exported composite, which
/// the zoning phase relies on to find a layer by band index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerName {
    Heat,
    Ndvi,
    No2,
    Population,
    LandUse,
    Activity,
    FloodRisk,
}

impl LayerName {
    /// Composite band order, band 1 first
    pub const BAND_ORDER: [LayerName; 7] = [
        LayerName::Heat,
        LayerName::Ndvi,
        LayerName::No2,
        LayerName::Population,
        LayerName::LandUse,
        LayerName::Activity,
        LayerName::FloodRisk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LayerName::Heat => "heat",
            LayerName::Ndvi => "ndvi",
            LayerName::No2 => "no2",
            LayerName::Population => "population",
            LayerName::LandUse => "land_use",
            LayerName::Activity => "activity",
            LayerName::FloodRisk => "flood_risk",
        }
    }

    /// One-based band index in the composite
    pub fn band_index(&self) -> usize {
        Self::BAND_ORDER
            .iter()
            .position(|l| l == self)
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    pub fn from_band_index(band: usize) -> Option<Self> {
        band.checked_sub(1)
            .and_then(|i| Self::BAND_ORDER.get(i))
            .copied()
    }
}

impl fmt::Display for LayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayerName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::BAND_ORDER
            .iter()
            .find(|l| l.as_str() == s)
            .copied()
            .ok_or_else(|| {
                let names: Vec<&str> = Self::BAND_ORDER.iter().map(|l| l.as_str()).collect();
                format!("unknown layer '{}', expected one of {}", s, names.join(", "))
            })
    }
}

/// Time-series reduction to one representative image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    /// Continuous fields
    Median,
    /// Categorical fields
    Mode,
    /// Cumulative quantities
    Sum,
    /// Single-snapshot sources
    First,
}

/// Temporal filter applied before reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemporalFilter {
    /// The pipeline's study date range
    StudyWindow,
    /// Images from one calendar year
    CalendarYear { year: i32 },
    /// No temporal filter
    Unfiltered,
}

/// Recipe for one thematic layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub name: LayerName,
    /// Source image collection identifier
    pub collection: String,
    /// Band selected from the source
    pub band: String,
    pub temporal: TemporalFilter,
    /// Restrict the collection to images intersecting the boundary
    #[serde(default = "default_true")]
    pub filter_bounds: bool,
    pub reducer: Reducer,
    #[serde(default)]
    pub rescale: Rescale,
}

fn default_true() -> bool {
    true
}

impl LayerSpec {
    fn new(
        name: LayerName,
        collection: &str,
        band: &str,
        temporal: TemporalFilter,
        reducer: Reducer,
        rescale: Rescale,
    ) -> Self {
        LayerSpec {
            name,
            collection: collection.to_string(),
            band: band.to_string(),
            temporal,
            filter_bounds: true,
            reducer,
            rescale,
        }
    }

    /// The six directly-sourced layers of the Nairobi composite
    pub fn defaults() -> Vec<LayerSpec> {
        vec![
            // Land surface temperature: DN * 0.02 K, then to Celsius
            LayerSpec::new(
                LayerName::Heat,
                "MODIS/061/MOD11A1",
                "LST_Day_1km",
                TemporalFilter::StudyWindow,
                Reducer::Median,
                Rescale::linear(0.02, -273.15),
            ),
            LayerSpec::new(
                LayerName::Ndvi,
                "MODIS/061/MOD13A2",
                "NDVI",
                TemporalFilter::StudyWindow,
                Reducer::Median,
                Rescale::linear(0.0001, 0.0),
            ),
            LayerSpec::new(
                LayerName::No2,
                "COPERNICUS/S5P/OFFL/L3_NO2",
                "NO2_column_number_density",
                TemporalFilter::StudyWindow,
                Reducer::Median,
                Rescale::Identity,
            ),
            LayerSpec {
                filter_bounds: false,
                ..LayerSpec::new(
                    LayerName::Population,
                    "CIESIN/GPWv411/GPW_Population_Density",
                    "population_density",
                    TemporalFilter::CalendarYear { year: 2020 },
                    Reducer::First,
                    Rescale::Identity,
                )
            },
            LayerSpec::new(
                LayerName::LandUse,
                "GOOGLE/DYNAMICWORLD/V1",
                "label",
                TemporalFilter::StudyWindow,
                Reducer::Mode,
                Rescale::Identity,
            ),
            // Night-time lights as a proxy for traffic and activity
            LayerSpec::new(
                LayerName::Activity,
                "NOAA/VIIRS/DNB/MONTHLY_V1/VCMSLCFG",
                "avg_rad",
                TemporalFilter::StudyWindow,
                Reducer::Median,
                Rescale::Identity,
            ),
        ]
    }
}

/// A named single-band image
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: LayerName,
    pub image: Image,
}

/// Append the remote form of a unit transform to an image
pub fn apply_rescale(image: &Image, rescale: &Rescale) -> Image {
    match *rescale {
        Rescale::Identity => image.clone(),
        Rescale::Linear { scale, offset } => {
            let mut out = image.clone();
            if scale != 1.0 {
                out = out.multiply_by(scale);
            }
            if offset != 0.0 {
                out = out.add_constant(offset);
            }
            out
        }
        Rescale::UnitInterval { lo, hi } => image.unit_scale(lo, hi).clamp(0.0, 1.0),
    }
}

/// Reduce a filtered collection with the given operator
pub fn reduce(collection: &ImageCollection, reducer: Reducer) -> Image {
    match reducer {
        Reducer::Median => collection.median(),
        Reducer::Mode => collection.mode(),
        Reducer::Sum => collection.sum(),
        Reducer::First => collection.first(),
    }
}

/// Builds thematic layers against a remote service
pub struct LayerBuilder<'a, E: EarthEngine + ?Sized> {
    engine: &'a E,
    boundary: &'a Boundary,
    window: &'a DateRange,
}

impl<'a, E: EarthEngine + ?Sized> LayerBuilder<'a, E> {
    pub fn new(engine: &'a E, boundary: &'a Boundary, window: &'a DateRange) -> Self {
        LayerBuilder {
            engine,
            boundary,
            window,
        }
    }

    /// Source collection after temporal and spatial filtering
    pub fn filtered_collection(
        &self,
        collection: &str,
        temporal: TemporalFilter,
        filter_bounds: bool,
    ) -> ImageCollection {
        let mut images = ImageCollection::load(collection);
        images = match temporal {
            TemporalFilter::StudyWindow => images.filter_date(&self.window.start, &self.window.end),
            TemporalFilter::CalendarYear { year } => {
                images.filter(Filter::calendar_range(year as i64, year as i64, "year"))
            }
            TemporalFilter::Unfiltered => images,
        };
        if filter_bounds {
            images = images.filter_bounds(&self.boundary.geometry);
        }
        images
    }

    /// Fail with `EmptyCollection` when nothing survives the filters
    pub fn ensure_not_empty(
        &self,
        layer: &str,
        collection_id: &str,
        collection: &ImageCollection,
    ) -> Result<u64> {
        let count = self
            .engine
            .compute_count(&collection.size())
            .with_context(|| format!("Failed to count images in {}", collection_id))?;
        log::info!("Layer '{}': {} image(s) in {}", layer, count, collection_id);
        if count == 0 {
            return Err(PipelineError::EmptyCollection {
                layer: layer.to_string(),
                collection: collection_id.to_string(),
            }
            .into());
        }
        Ok(count)
    }

    /// Reduce, select, transform, rename and cast one layer
    pub fn build(&self, spec: &LayerSpec) -> Result<Layer> {
        let collection =
            self.filtered_collection(&spec.collection, spec.temporal, spec.filter_bounds);
        self.ensure_not_empty(spec.name.as_str(), &spec.collection, &collection)?;

        // Per-band reducers commute with band selection
        let image = reduce(&collection, spec.reducer).select(&spec.band);
        let image = apply_rescale(&image, &spec.rescale)
            .rename(spec.name.as_str())
            .to_float();

        Ok(Layer {
            name: spec.name,
            image,
        })
    }

    pub fn build_all(&self, specs: &[LayerSpec]) -> Result<Vec<Layer>> {
        specs.iter().map(|spec| self.build(spec)).collect()
    }
}
