use thiserror::Error;

/// Failures the pipeline raises explicitly.
///
/// Library functions return `anyhow::Result`; these variants travel inside the
/// `anyhow::Error` and can be recovered with `downcast_ref::<PipelineError>()`.
#[derive(Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error("Earth Engine authentication failed: {0}")]
    Authentication(String),

    #[error("no boundary matches {country_field}='{country}' and {region_field}='{region}'")]
    BoundaryNotFound {
        country_field: String,
        country: String,
        region_field: String,
        region: String,
    },

    #[error("{matches} boundaries match '{country}' / '{region}', expected exactly one")]
    AmbiguousBoundary {
        country: String,
        region: String,
        matches: u64,
    },

    #[error("collection '{collection}' is empty after filtering (layer '{layer}')")]
    EmptyCollection { layer: String, collection: String },

    #[error("remote service returned {status}: {message}")]
    RemoteService { status: u16, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("band {band} requested but raster has {count} band(s)")]
    BandOutOfRange { band: usize, count: usize },

    #[error("export manifest mismatch: {0}")]
    ManifestMismatch(String),

    #[error("layer '{0}' missing from composite")]
    MissingLayer(String),

    #[error("layer '{0}' supplied more than once")]
    DuplicateLayer(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = PipelineError::EmptyCollection {
            layer: "heat".to_string(),
            collection: "MODIS/061/MOD11A1".to_string(),
        }
        .into();
        let err = err.context("building layer");
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::EmptyCollection { .. })
        ));
    }

    #[test]
    fn test_messages() {
        let err = PipelineError::BandOutOfRange { band: 9, count: 7 };
        assert_eq!(err.to_string(), "band 9 requested but raster has 7 band(s)");
    }
}
