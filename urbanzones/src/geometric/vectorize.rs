use anyhow::{Context, Result};
use geo::algorithm::orient::{Direction, Orient};
use geo::{Coord, LineString, Polygon};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::Path;

use crate::geo_core::{Crs, GeoCore, GeoTransform};
use crate::geometric::classify::{ClassificationScheme, NO_CLASS};
use crate::geometric::raster::Grid;

/// Pixel adjacency used to group same-class pixels into regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// Edge-sharing neighbours only
    #[default]
    Four,
    /// Edge- or corner-sharing neighbours
    Eight,
}

impl Connectivity {
    fn offsets(&self) -> &'static [(isize, isize)] {
        match self {
            Connectivity::Four => &[(0, -1), (1, 0), (0, 1), (-1, 0)],
            Connectivity::Eight => &[
                (0, -1),
                (1, -1),
                (1, 0),
                (1, 1),
                (0, 1),
                (-1, 1),
                (-1, 0),
                (-1, -1),
            ],
        }
    }
}

/// One connected region of a single class, in pixel-corner coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub class_id: u8,
    /// Exterior ring, closed, interior on the right when walked with y down
    pub exterior: Vec<(i64, i64)>,
    pub holes: Vec<Vec<(i64, i64)>>,
}

/// A polygonized region carrying its class attributes
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneFeature {
    pub class_id: u8,
    pub class_name: String,
    pub polygon: Polygon<f64>,
}

/// Zone features plus the CRS of their coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneCollection {
    pub features: Vec<ZoneFeature>,
    pub crs: Crs,
}

/// Label connected regions of non-zero classes, in raster-scan order of first pixel
///
/// Returns the label grid (0 for class 0) and, per label, its class.
pub fn label_regions(classes: &Grid<u8>, connectivity: Connectivity) -> (Grid<u32>, Vec<u8>) {
    let (width, height) = (classes.width(), classes.height());
    let mut labels = Grid::filled(width, height, 0u32);
    let mut region_classes = Vec::new();
    let mut queue = VecDeque::new();

    for row in 0..height {
        for col in 0..width {
            let class = classes.get(col, row).unwrap_or(NO_CLASS);
            if class == NO_CLASS || labels.get(col, row) != Some(0) {
                continue;
            }

            region_classes.push(class);
            let label = region_classes.len() as u32;
            labels.set(col, row, label);
            queue.push_back((col, row));

            while let Some((c, r)) = queue.pop_front() {
                for (dc, dr) in connectivity.offsets() {
                    let next = (c.checked_add_signed(*dc), r.checked_add_signed(*dr));
                    let (Some(nc), Some(nr)) = next else {
                        continue;
                    };
                    if classes.get(nc, nr) == Some(class) && labels.get(nc, nr) == Some(0) {
                        labels.set(nc, nr, label);
                        queue.push_back((nc, nr));
                    }
                }
            }
        }
    }

    (labels, region_classes)
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    from: (i64, i64),
    to: (i64, i64),
}

impl Edge {
    fn direction(&self) -> (i64, i64) {
        (self.to.0 - self.from.0, self.to.1 - self.from.1)
    }
}

/// Boundary edges of every region, oriented with the region on the right (y down)
fn boundary_edges(labels: &Grid<u32>, region_count: usize) -> Vec<Vec<Edge>> {
    let mut edges = vec![Vec::new(); region_count];
    let label_at = |c: i64, r: i64| -> u32 {
        if c < 0 || r < 0 {
            return 0;
        }
        labels.get(c as usize, r as usize).unwrap_or(0)
    };

    for row in 0..labels.height() as i64 {
        for col in 0..labels.width() as i64 {
            let label = label_at(col, row);
            if label == 0 {
                continue;
            }
            let out = &mut edges[label as usize - 1];
            if label_at(col, row - 1) != label {
                out.push(Edge {
                    from: (col, row),
                    to: (col + 1, row),
                });
            }
            if label_at(col + 1, row) != label {
                out.push(Edge {
                    from: (col + 1, row),
                    to: (col + 1, row + 1),
                });
            }
            if label_at(col, row + 1) != label {
                out.push(Edge {
                    from: (col + 1, row + 1),
                    to: (col, row + 1),
                });
            }
            if label_at(col - 1, row) != label {
                out.push(Edge {
                    from: (col, row + 1),
                    to: (col, row),
                });
            }
        }
    }
    edges
}

/// Link edges into closed rings
///
/// Where a region touches itself at a single corner the walk turns left,
/// joining the diagonal pixels. Every region then has exactly one outer ring,
/// and each enclosed patch of other pixels is its own hole.
fn trace_rings(edges: &[Edge]) -> Vec<Vec<(i64, i64)>> {
    let mut outgoing: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (i, edge) in edges.iter().enumerate() {
        outgoing.entry(edge.from).or_default().push(i);
    }

    let successor = |i: usize| -> Option<usize> {
        let edge = &edges[i];
        let candidates = outgoing.get(&edge.to)?;
        if candidates.len() == 1 {
            return Some(candidates[0]);
        }
        let (dx, dy) = edge.direction();
        let left = (dy, -dx);
        candidates
            .iter()
            .copied()
            .find(|j| edges[*j].direction() == left)
            .or_else(|| candidates.first().copied())
    };

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();
    for start in 0..edges.len() {
        if used[start] {
            continue;
        }
        let mut ring_edges = Vec::new();
        let mut current = start;
        while !used[current] {
            used[current] = true;
            ring_edges.push(current);
            match successor(current) {
                Some(next) => current = next,
                None => break,
            }
        }
        rings.push(simplify_ring(edges, &ring_edges));
    }
    rings
}

/// Keep only the corners of a ring and close it
fn simplify_ring(edges: &[Edge], ring_edges: &[usize]) -> Vec<(i64, i64)> {
    let n = ring_edges.len();
    let mut ring: Vec<(i64, i64)> = (0..n)
        .filter(|&k| {
            let prev = edges[ring_edges[(k + n - 1) % n]].direction();
            prev != edges[ring_edges[k]].direction()
        })
        .map(|k| edges[ring_edges[k]].from)
        .collect();
    if let Some(first) = ring.first().copied() {
        ring.push(first);
    }
    ring
}

/// Twice the signed shoelace area; positive for rings with the interior on the right (y down)
fn doubled_area(ring: &[(i64, i64)]) -> i64 {
    ring.windows(2)
        .map(|w| w[0].0 * w[1].1 - w[1].0 * w[0].1)
        .sum()
}

/// Trace the outline and holes of every region
pub fn trace_regions(classes: &Grid<u8>, connectivity: Connectivity) -> Vec<Region> {
    let (labels, region_classes) = label_regions(classes, connectivity);
    let edges = boundary_edges(&labels, region_classes.len());

    region_classes
        .iter()
        .zip(edges.iter())
        .filter_map(|(class_id, region_edges)| {
            let mut rings = trace_rings(region_edges);
            let outer = rings
                .iter()
                .enumerate()
                .max_by_key(|(_, ring)| doubled_area(ring))
                .map(|(i, _)| i)?;
            let exterior = rings.swap_remove(outer);
            Some(Region {
                class_id: *class_id,
                exterior,
                holes: rings,
            })
        })
        .collect()
}

fn to_map_ring(ring: &[(i64, i64)], transform: &GeoTransform) -> LineString<f64> {
    LineString::new(
        ring.iter()
            .map(|(x, y)| transform.apply(*x as f64, *y as f64))
            .collect::<Vec<Coord<f64>>>(),
    )
}

/// Polygonize a classified grid into map-space zone features
///
/// Class 0 produces no features. Exterior rings are counter-clockwise and
/// holes clockwise in map coordinates.
pub fn polygonize(
    classes: &Grid<u8>,
    scheme: &ClassificationScheme,
    geo_core: &GeoCore,
    connectivity: Connectivity,
) -> ZoneCollection {
    let features = trace_regions(classes, connectivity)
        .into_iter()
        .map(|region| {
            let exterior = to_map_ring(&region.exterior, &geo_core.transform);
            let holes = region
                .holes
                .iter()
                .map(|h| to_map_ring(h, &geo_core.transform))
                .collect();
            ZoneFeature {
                class_id: region.class_id,
                class_name: scheme.label(region.class_id).unwrap_or_default().to_string(),
                polygon: Polygon::new(exterior, holes).orient(Direction::Default),
            }
        })
        .collect();

    ZoneCollection {
        features,
        crs: geo_core.crs.clone(),
    }
}

impl ZoneFeature {
    pub fn to_feature(&self) -> Feature {
        let geometry = geojson::Geometry::new(geojson::Value::from(&self.polygon));
        let mut feature = Feature::from(geometry);
        feature.set_property("class_id", self.class_id as i64);
        feature.set_property("class_name", self.class_name.clone());
        feature
    }
}

impl ZoneCollection {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn to_geojson(&self) -> GeoJson {
        let foreign_members = self.crs.to_geojson_member().map(|crs| {
            let mut members = JsonObject::new();
            members.insert("crs".to_string(), crs);
            members
        });
        GeoJson::FeatureCollection(FeatureCollection {
            bbox: None,
            features: self.features.iter().map(ZoneFeature::to_feature).collect(),
            foreign_members,
        })
    }

    /// Serialize fully, then replace the file in one write
    pub fn write(&self, path: &Path) -> Result<()> {
        let text = self.to_geojson().to_string();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
            }
        }
        std::fs::write(path, text).with_context(|| format!("Failed to write GeoJSON: {:?}", path))
    }
}
