use anyhow::{Context, Result};

use crate::collect::earthengine::client::EarthEngine;
use crate::collect::earthengine::expr::{FeatureCollection, Filter, Geometry};
use crate::commons::config::BoundaryConfig;
use crate::commons::error::PipelineError;

/// Administrative polygon used to filter and clip every layer
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    pub country: String,
    pub region: String,
    pub geometry: Geometry,
}

/// Selects exactly one administrative unit from a global boundary table
pub struct BoundaryResolver<'a, E: EarthEngine + ?Sized> {
    engine: &'a E,
    config: &'a BoundaryConfig,
}

impl<'a, E: EarthEngine + ?Sized> BoundaryResolver<'a, E> {
    pub fn new(engine: &'a E, config: &'a BoundaryConfig) -> Self {
        BoundaryResolver { engine, config }
    }

    /// Matching features for the configured country and region names
    pub fn matches(&self) -> FeatureCollection {
        FeatureCollection::load(&self.config.collection)
            .filter(Filter::eq(&self.config.country_field, &self.config.country))
            .filter(Filter::eq(&self.config.region_field, &self.config.region))
    }

    /// Resolve the boundary; zero or several matches are errors
    pub fn resolve(&self) -> Result<Boundary> {
        let matches = self.matches();
        let count = self.engine.compute_count(&matches.size()).with_context(|| {
            format!(
                "Failed to count boundaries in {}",
                self.config.collection
            )
        })?;

        log::info!(
            "Boundary lookup {}='{}', {}='{}': {} match(es)",
            self.config.country_field,
            self.config.country,
            self.config.region_field,
            self.config.region,
            count
        );

        match count {
            0 => Err(PipelineError::BoundaryNotFound {
                country_field: self.config.country_field.clone(),
                country: self.config.country.clone(),
                region_field: self.config.region_field.clone(),
                region: self.config.region.clone(),
            }
            .into()),
            1 => Ok(Boundary {
                country: self.config.country.clone(),
                region: self.config.region.clone(),
                geometry: matches.geometry(),
            }),
            n => Err(PipelineError::AmbiguousBoundary {
                country: self.config.country.clone(),
                region: self.config.region.clone(),
                matches: n,
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::earthengine::client::{ExportRequest, ExportTask};
    use crate::collect::earthengine::expr::Expr;
    use serde_json::{json, Value};

    struct CountingEngine(u64);

    impl EarthEngine for CountingEngine {
        fn compute_value(&self, expr: &Expr) -> Result<Value> {
            assert_eq!(expr.function_name(), Some("Collection.size"));
            Ok(json!(self.0))
        }

        fn start_export(&self, _request: &ExportRequest) -> Result<ExportTask> {
            anyhow::bail!("not used")
        }
    }

    #[test]
    fn test_single_match_resolves() {
        let config = BoundaryConfig::default();
        let engine = CountingEngine(1);
        let boundary = BoundaryResolver::new(&engine, &config).resolve().unwrap();
        assert_eq!(boundary.region, "Nairobi");
        assert_eq!(boundary.geometry.0.function_name(), Some("Collection.geometry"));
        assert_eq!(boundary.geometry.0.asset_ids(), vec!["FAO/GAUL/2015/level2"]);
    }

    #[test]
    fn test_no_match_fails() {
        let config = BoundaryConfig::default();
        let engine = CountingEngine(0);
        let err = BoundaryResolver::new(&engine, &config).resolve().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::BoundaryNotFound { .. })
        ));
    }

    #[test]
    fn test_several_matches_fail() {
        let config = BoundaryConfig::default();
        let engine = CountingEngine(2);
        let err = BoundaryResolver::new(&engine, &config).resolve().unwrap_err();
        assert_eq!(
            err.downcast_ref::<PipelineError>(),
            Some(&PipelineError::AmbiguousBoundary {
                country: "Kenya".to_string(),
                region: "Nairobi".to_string(),
                matches: 2,
            })
        );
    }
}
