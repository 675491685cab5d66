use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Georeferencing shared by a raster band and the vectors derived from it
/// Handles CRS (Coordinate Reference System) and the pixel-to-map affine transform
#[derive(Debug, Clone, PartialEq)]
pub struct GeoCore {
    /// Coordinate reference system of the raster
    pub crs: Crs,
    /// Affine geotransform of the raster
    pub transform: GeoTransform,
}

impl GeoCore {
    pub fn new(crs: Crs, transform: GeoTransform) -> Self {
        GeoCore { crs, transform }
    }

    /// Get EPSG code, if the CRS carries one
    pub fn get_epsg(&self) -> Option<i32> {
        self.crs.epsg
    }

    /// Map-space extent of a block of pixels, `cols`/`rows` being half-open ranges
    pub fn pixel_block_bbox(&self, cols: (usize, usize), rows: (usize, usize)) -> BoundingBox {
        let a = self.transform.apply(cols.0 as f64, rows.0 as f64);
        let b = self.transform.apply(cols.1 as f64, rows.1 as f64);
        BoundingBox::from_corners(a, b)
    }
}

/// Affine transform in GDAL order:
/// `[origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    /// North-up transform with square pixels
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_size: f64) -> Self {
        GeoTransform([origin_x, pixel_size, 0.0, origin_y, 0.0, -pixel_size])
    }

    /// Map coordinates of a pixel-corner position (column, row)
    pub fn apply(&self, col: f64, row: f64) -> Coord<f64> {
        let gt = &self.0;
        Coord {
            x: gt[0] + col * gt[1] + row * gt[2],
            y: gt[3] + col * gt[4] + row * gt[5],
        }
    }

    /// True when the determinant flips orientation (north-up rasters do)
    pub fn flips_orientation(&self) -> bool {
        let gt = &self.0;
        gt[1] * gt[5] - gt[2] * gt[4] < 0.0
    }

    pub fn is_degenerate(&self) -> bool {
        let gt = &self.0;
        let det = gt[1] * gt[5] - gt[2] * gt[4];
        !det.is_finite() || det == 0.0
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        GeoTransform([0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
    }
}

impl From<[f64; 6]> for GeoTransform {
    fn from(gt: [f64; 6]) -> Self {
        GeoTransform(gt)
    }
}

/// Coordinate reference system as read from a raster
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Crs {
    /// EPSG code (None when the CRS has no EPSG authority)
    pub epsg: Option<i32>,
    /// WKT representation, kept for diagnostics
    pub wkt: Option<String>,
}

impl Crs {
    pub fn from_epsg(epsg: i32) -> Self {
        Crs {
            epsg: Some(epsg),
            wkt: None,
        }
    }

    /// OGC URN used in the GeoJSON `crs` member
    ///
    /// Coordinates are written x then y, so geographic WGS 84 is named CRS84
    /// (longitude first) rather than EPSG:4326 (latitude first).
    pub fn urn(&self) -> Option<String> {
        self.epsg.map(|code| match code {
            4326 => "urn:ogc:def:crs:OGC:1.3:CRS84".to_string(),
            code => format!("urn:ogc:def:crs:EPSG::{}", code),
        })
    }

    /// Named-CRS object written as a foreign member of a FeatureCollection
    pub fn to_geojson_member(&self) -> Option<serde_json::Value> {
        self.urn().map(|name| {
            json!({
                "type": "name",
                "properties": { "name": name }
            })
        })
    }
}

/// Bounding box structure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64, // min longitude
    pub min_y: f64, // min latitude
    pub max_x: f64, // max longitude
    pub max_y: f64, // max latitude
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Box spanning two arbitrary corners
    pub fn from_corners(a: Coord<f64>, b: Coord<f64>) -> Self {
        BoundingBox::new(a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y))
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Component-wise comparison with an absolute tolerance
    pub fn approx_eq(&self, other: &BoundingBox, epsilon: f64) -> bool {
        (self.min_x - other.min_x).abs() <= epsilon
            && (self.min_y - other.min_y).abs() <= epsilon
            && (self.max_x - other.max_x).abs() <= epsilon
            && (self.max_y - other.max_y).abs() <= epsilon
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box() {
        let bbox: BoundingBox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(bbox.min_x, 0.0);
        assert_eq!(bbox.max_x, 1.0);
        assert_eq!(bbox.width(), 1.0);
    }

    #[test]
    fn test_north_up_transform() {
        let gt = GeoTransform::north_up(36.6, -1.15, 0.01);
        let origin = gt.apply(0.0, 0.0);
        assert_eq!(origin.x, 36.6);
        assert_eq!(origin.y, -1.15);

        let corner = gt.apply(10.0, 5.0);
        assert!((corner.x - 36.7).abs() < 1e-12);
        assert!((corner.y + 1.2).abs() < 1e-12);
        assert!(gt.flips_orientation());
    }

    #[test]
    fn test_pixel_block_bbox() {
        let core = GeoCore::new(Crs::from_epsg(4326), GeoTransform::north_up(100.0, 50.0, 2.0));
        let bbox = core.pixel_block_bbox((1, 3), (2, 4));
        assert!(bbox.approx_eq(&BoundingBox::new(102.0, 42.0, 106.0, 46.0), 1e-12));
    }

    #[test]
    fn test_crs_member() {
        let crs = Crs::from_epsg(4326);
        let member = crs.to_geojson_member().unwrap();
        assert_eq!(member["properties"]["name"], "urn:ogc:def:crs:OGC:1.3:CRS84");
        let utm = Crs::from_epsg(32737).to_geojson_member().unwrap();
        assert_eq!(utm["properties"]["name"], "urn:ogc:def:crs:EPSG::32737");
        assert!(Crs::default().to_geojson_member().is_none());
    }

    #[test]
    fn test_degenerate_transform() {
        assert!(GeoTransform([0.0, 0.0, 0.0, 0.0, 0.0, 0.0]).is_degenerate());
        assert!(!GeoTransform::default().is_degenerate());
    }
}
