use anyhow::{Context, Result};
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager, Metadata};
use std::path::Path;

use crate::commons::error::PipelineError;
use crate::geo_core::{Crs, GeoCore, GeoTransform};

/// Row-major 2D grid of pixel values
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Copy> Grid<T> {
    pub fn new(width: usize, height: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != width * height {
            anyhow::bail!(
                "Grid data has {} values, expected {}x{}={}",
                data.len(),
                width,
                height,
                width * height
            );
        }
        Ok(Grid {
            width,
            height,
            data,
        })
    }

    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Grid {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn get(&self, col: usize, row: usize) -> Option<T> {
        if col < self.width && row < self.height {
            Some(self.data[row * self.width + col])
        } else {
            None
        }
    }

    pub fn set(&mut self, col: usize, row: usize, value: T) {
        if col < self.width && row < self.height {
            self.data[row * self.width + col] = value;
        }
    }

    /// Fill the half-open block `cols` x `rows`
    pub fn fill_block(&mut self, cols: (usize, usize), rows: (usize, usize), value: T) {
        for row in rows.0..rows.1.min(self.height) {
            for col in cols.0..cols.1.min(self.width) {
                self.data[row * self.width + col] = value;
            }
        }
    }

    pub fn map<U: Copy, F: Fn(T) -> U>(&self, f: F) -> Grid<U> {
        Grid {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|v| f(*v)).collect(),
        }
    }
}

/// One band read from a local raster file, with its georeferencing
#[derive(Debug, Clone)]
pub struct BandRaster {
    pub values: Grid<f64>,
    pub geo_core: GeoCore,
    /// Declared no-data value of the band
    pub nodata: Option<f64>,
    /// Band description (band name written by the exporter, if any)
    pub description: String,
    /// Total number of bands in the file
    pub band_count: usize,
}

/// Read one-based `band` of the raster at `path`
pub fn read_band(path: &Path, band: usize) -> Result<BandRaster> {
    if !path.exists() {
        anyhow::bail!("Raster file not found: {:?}", path);
    }

    let dataset =
        Dataset::open(path).with_context(|| format!("Failed to open raster: {:?}", path))?;
    let band_count = dataset.raster_count() as usize;
    if band == 0 || band > band_count {
        return Err(PipelineError::BandOutOfRange {
            band,
            count: band_count,
        }
        .into());
    }

    let transform: GeoTransform = dataset
        .geo_transform()
        .with_context(|| format!("Raster has no geotransform: {:?}", path))?
        .into();
    if transform.is_degenerate() {
        anyhow::bail!("Raster geotransform is degenerate: {:?}", transform);
    }

    let srs = dataset
        .spatial_ref()
        .with_context(|| format!("Raster has no coordinate reference system: {:?}", path))?;
    let crs = crs_from_spatial_ref(&srs);

    let raster_band = dataset
        .rasterband(band)
        .with_context(|| format!("Failed to access band {}", band))?;
    let (width, height) = raster_band.size();
    let buffer = raster_band
        .read_as::<f64>((0, 0), (width, height), (width, height), None)
        .with_context(|| format!("Failed to read band {}", band))?;
    let (_, data) = buffer.into_shape_and_vec();

    log::debug!(
        "Read band {} of {:?}: {}x{} pixels, EPSG {:?}",
        band,
        path,
        width,
        height,
        crs.epsg
    );

    Ok(BandRaster {
        values: Grid::new(width, height, data)?,
        geo_core: GeoCore::new(crs, transform),
        nodata: raster_band.no_data_value(),
        description: raster_band.description().unwrap_or_default(),
        band_count,
    })
}

fn crs_from_spatial_ref(srs: &SpatialRef) -> Crs {
    Crs {
        epsg: srs.auth_code().ok(),
        wkt: srs.to_wkt().ok(),
    }
}

/// A named float band to write, with its declared no-data value
#[derive(Debug, Clone, Copy)]
pub struct OutputBand<'a> {
    pub name: &'a str,
    pub grid: &'a Grid<f32>,
    pub nodata: Option<f64>,
}

impl<'a> OutputBand<'a> {
    pub fn new(name: &'a str, grid: &'a Grid<f32>) -> Self {
        OutputBand {
            name,
            grid,
            nodata: None,
        }
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }
}

/// Write named float bands to a GeoTIFF sharing one georeferencing
pub fn write_geotiff(path: &Path, bands: &[OutputBand<'_>], geo_core: &GeoCore) -> Result<()> {
    let (width, height) = match bands.first() {
        Some(band) => (band.grid.width(), band.grid.height()),
        None => anyhow::bail!("No bands to write"),
    };
    if bands
        .iter()
        .any(|b| b.grid.width() != width || b.grid.height() != height)
    {
        anyhow::bail!("All bands must share the same dimensions");
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
        }
    }

    let driver =
        DriverManager::get_driver_by_name("GTiff").context("Failed to get GTiff driver")?;
    let mut dataset = driver
        .create_with_band_type::<f32, _>(path, width, height, bands.len())
        .context("Failed to create GeoTIFF dataset")?;

    dataset
        .set_geo_transform(&geo_core.transform.0)
        .context("Failed to set geotransform")?;
    if let Some(epsg) = geo_core.crs.epsg {
        let srs = SpatialRef::from_epsg(epsg as u32)
            .context("Failed to create spatial reference")?;
        dataset
            .set_spatial_ref(&srs)
            .context("Failed to set spatial reference")?;
    }

    for (i, output) in bands.iter().enumerate() {
        let mut band = dataset
            .rasterband(i + 1)
            .with_context(|| format!("Failed to get band {}", i + 1))?;
        let mut buffer = Buffer::new((width, height), output.grid.data().to_vec());
        band.write((0, 0), (width, height), &mut buffer)
            .context("Failed to write raster band")?;
        band.set_description(output.name)
            .context("Failed to set band description")?;
        if output.nodata.is_some() {
            band.set_no_data_value(output.nodata)
                .context("Failed to set band no-data value")?;
        }
    }

    log::info!("Raster saved to: {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_shape_checked() {
        assert!(Grid::new(2, 2, vec![0u8; 3]).is_err());
        let grid = Grid::new(3, 2, vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(grid.get(2, 1), Some(6));
        assert_eq!(grid.get(3, 0), None);
    }

    #[test]
    fn test_fill_block_and_map() {
        let mut grid = Grid::filled(4, 3, 0.0f64);
        grid.fill_block((1, 3), (0, 2), 0.9);
        grid.set(0, 2, 0.6);
        let doubled = grid.map(|v| (v * 10.0) as u8);
        assert_eq!(doubled.data(), &[0, 9, 9, 0, 0, 9, 9, 0, 6, 0, 0, 0]);
    }

    #[test]
    fn test_missing_file() {
        let err = read_band(Path::new("does/not/exist.tif"), 1).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
