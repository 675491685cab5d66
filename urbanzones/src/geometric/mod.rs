pub mod boundary;
pub mod classify;
pub mod composite;
pub mod flood_risk;
pub mod layers;
pub mod manifest;
pub mod pipeline;
pub mod raster;
pub mod vectorize;
pub mod zoning;
