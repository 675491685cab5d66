use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Node of an Earth Engine computation graph
///
/// Arguments are kept in a `BTreeMap` so the same graph always serializes to
/// the same bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(Value),
    Array(Vec<Expr>),
    Call {
        function: String,
        arguments: BTreeMap<String, Expr>,
    },
}

impl Expr {
    pub fn call<I, K>(function: &str, arguments: I) -> Self
    where
        I: IntoIterator<Item = (K, Expr)>,
        K: Into<String>,
    {
        Expr::Call {
            function: function.to_string(),
            arguments: arguments.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn string(value: &str) -> Self {
        Expr::Constant(Value::String(value.to_string()))
    }

    pub fn number(value: f64) -> Self {
        Expr::Constant(json!(value))
    }

    pub fn integer(value: i64) -> Self {
        Expr::Constant(json!(value))
    }

    pub fn strings(values: &[&str]) -> Self {
        Expr::Array(values.iter().map(|v| Expr::string(v)).collect())
    }

    /// Name of the invoked function, if this node is a call
    pub fn function_name(&self) -> Option<&str> {
        match self {
            Expr::Call { function, .. } => Some(function.as_str()),
            _ => None,
        }
    }

    pub fn argument(&self, name: &str) -> Option<&Expr> {
        match self {
            Expr::Call { arguments, .. } => arguments.get(name),
            _ => None,
        }
    }

    /// Asset identifiers loaded anywhere in the graph, depth first
    pub fn asset_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        self.collect_asset_ids(&mut ids);
        ids
    }

    fn collect_asset_ids(&self, ids: &mut Vec<String>) {
        match self {
            Expr::Constant(_) => {}
            Expr::Array(items) => items.iter().for_each(|e| e.collect_asset_ids(ids)),
            Expr::Call {
                function,
                arguments,
            } => {
                let id_arg = match function.as_str() {
                    "ImageCollection.load" | "Image.load" => arguments.get("id"),
                    "Collection.loadTable" => arguments.get("tableId"),
                    _ => None,
                };
                if let Some(Expr::Constant(Value::String(id))) = id_arg {
                    ids.push(id.clone());
                }
                arguments.values().for_each(|e| e.collect_asset_ids(ids));
            }
        }
    }

    /// Wire form of a single value node
    pub fn to_value_node(&self) -> Value {
        match self {
            Expr::Constant(value) => json!({ "constantValue": value }),
            Expr::Array(items) => json!({
                "arrayValue": {
                    "values": items.iter().map(Expr::to_value_node).collect::<Vec<_>>()
                }
            }),
            Expr::Call {
                function,
                arguments,
            } => {
                let mut args = Map::new();
                for (name, arg) in arguments {
                    args.insert(name.clone(), arg.to_value_node());
                }
                json!({
                    "functionInvocationValue": {
                        "functionName": function,
                        "arguments": args
                    }
                })
            }
        }
    }

    /// Full `Expression` message accepted by the REST API
    pub fn to_expression(&self) -> Value {
        json!({
            "result": "0",
            "values": { "0": self.to_value_node() }
        })
    }
}

/// Geometry produced remotely
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry(pub Expr);

/// Filter predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Filter(pub Expr);

impl Filter {
    /// `ee.Filter.eq(field, value)`
    pub fn eq(field: &str, value: &str) -> Self {
        Filter(Expr::call(
            "Filter.equals",
            [
                ("leftField", Expr::string(field)),
                ("rightValue", Expr::string(value)),
            ],
        ))
    }

    /// Images whose start time falls in `[start, end)`
    pub fn date_range(start: &str, end: &str) -> Self {
        let range = Expr::call(
            "DateRange",
            [("start", Expr::string(start)), ("end", Expr::string(end))],
        );
        Filter(Expr::call(
            "Filter.dateRangeContains",
            [
                ("leftValue", range),
                ("rightField", Expr::string("system:time_start")),
            ],
        ))
    }

    /// `ee.Filter.calendarRange(start, end, field)`
    pub fn calendar_range(start: i64, end: i64, field: &str) -> Self {
        Filter(Expr::call(
            "Filter.calendarRange",
            [
                ("start", Expr::integer(start)),
                ("end", Expr::integer(end)),
                ("field", Expr::string(field)),
            ],
        ))
    }

    /// Features or images intersecting `geometry`
    pub fn bounds(geometry: &Geometry) -> Self {
        Filter(Expr::call(
            "Filter.intersects",
            [
                ("leftField", Expr::string(".all")),
                ("rightValue", geometry.0.clone()),
            ],
        ))
    }
}

fn filtered(collection: &Expr, filter: Filter) -> Expr {
    Expr::call(
        "Collection.filter",
        [("collection", collection.clone()), ("filter", filter.0)],
    )
}

/// Table of features
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCollection(pub Expr);

impl FeatureCollection {
    pub fn load(table_id: &str) -> Self {
        FeatureCollection(Expr::call(
            "Collection.loadTable",
            [("tableId", Expr::string(table_id))],
        ))
    }

    pub fn filter(&self, filter: Filter) -> Self {
        FeatureCollection(filtered(&self.0, filter))
    }

    /// Number of features, evaluated remotely
    pub fn size(&self) -> Expr {
        Expr::call("Collection.size", [("collection", self.0.clone())])
    }

    /// Union of all feature geometries
    pub fn geometry(&self) -> Geometry {
        Geometry(Expr::call(
            "Collection.geometry",
            [("collection", self.0.clone())],
        ))
    }
}

/// Time series of images
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCollection(pub Expr);

impl ImageCollection {
    pub fn load(id: &str) -> Self {
        ImageCollection(Expr::call("ImageCollection.load", [("id", Expr::string(id))]))
    }

    pub fn filter(&self, filter: Filter) -> Self {
        ImageCollection(filtered(&self.0, filter))
    }

    pub fn filter_date(&self, start: &str, end: &str) -> Self {
        self.filter(Filter::date_range(start, end))
    }

    pub fn filter_bounds(&self, geometry: &Geometry) -> Self {
        self.filter(Filter::bounds(geometry))
    }

    pub fn size(&self) -> Expr {
        Expr::call("Collection.size", [("collection", self.0.clone())])
    }

    fn reduce(&self, function: &str) -> Image {
        Image(Expr::call(function, [("collection", self.0.clone())]))
    }

    pub fn median(&self) -> Image {
        self.reduce("reduce.median")
    }

    pub fn mode(&self) -> Image {
        self.reduce("reduce.mode")
    }

    pub fn sum(&self) -> Image {
        self.reduce("reduce.sum")
    }

    pub fn first(&self) -> Image {
        Image(Expr::call("Collection.first", [("collection", self.0.clone())]))
    }
}

/// Raster image
#[derive(Debug, Clone, PartialEq)]
pub struct Image(pub Expr);

impl Image {
    pub fn load(id: &str) -> Self {
        Image(Expr::call("Image.load", [("id", Expr::string(id))]))
    }

    pub fn constant(value: f64) -> Self {
        Image(Expr::call("Image.constant", [("value", Expr::number(value))]))
    }

    fn unary(&self, function: &str) -> Self {
        Image(Expr::call(function, [("input", self.0.clone())]))
    }

    fn binary(&self, function: &str, other: &Image) -> Self {
        Image(Expr::call(
            function,
            [("image1", self.0.clone()), ("image2", other.0.clone())],
        ))
    }

    pub fn select(&self, band: &str) -> Self {
        Image(Expr::call(
            "Image.select",
            [
                ("input", self.0.clone()),
                ("bandSelectors", Expr::strings(&[band])),
            ],
        ))
    }

    pub fn rename(&self, name: &str) -> Self {
        Image(Expr::call(
            "Image.rename",
            [("input", self.0.clone()), ("names", Expr::strings(&[name]))],
        ))
    }

    /// Cast to 32-bit float
    pub fn to_float(&self) -> Self {
        Image(Expr::call("Image.toFloat", [("value", self.0.clone())]))
    }

    pub fn add(&self, other: &Image) -> Self {
        self.binary("Image.add", other)
    }

    pub fn multiply(&self, other: &Image) -> Self {
        self.binary("Image.multiply", other)
    }

    pub fn multiply_by(&self, factor: f64) -> Self {
        self.multiply(&Image::constant(factor))
    }

    pub fn add_constant(&self, value: f64) -> Self {
        self.add(&Image::constant(value))
    }

    /// Per-pixel equality against a constant, yielding 0/1
    pub fn eq_constant(&self, value: f64) -> Self {
        self.binary("Image.eq", &Image::constant(value))
    }

    pub fn unit_scale(&self, low: f64, high: f64) -> Self {
        Image(Expr::call(
            "Image.unitScale",
            [
                ("input", self.0.clone()),
                ("low", Expr::number(low)),
                ("high", Expr::number(high)),
            ],
        ))
    }

    pub fn clamp(&self, low: f64, high: f64) -> Self {
        Image(Expr::call(
            "Image.clamp",
            [
                ("input", self.0.clone()),
                ("low", Expr::number(low)),
                ("high", Expr::number(high)),
            ],
        ))
    }

    /// Terrain slope in degrees from an elevation image
    pub fn slope(&self) -> Self {
        self.unary("Terrain.slope")
    }

    /// Append the bands of `other` after the bands of `self`
    pub fn add_bands(&self, other: &Image) -> Self {
        Image(Expr::call(
            "Image.addBands",
            [("dstImg", self.0.clone()), ("srcImg", other.0.clone())],
        ))
    }

    pub fn clip(&self, geometry: &Geometry) -> Self {
        Image(Expr::call(
            "Image.clip",
            [("input", self.0.clone()), ("geometry", geometry.0.clone())],
        ))
    }

    pub fn clip_to_bounds_and_scale(&self, geometry: &Geometry, scale: f64) -> Self {
        Image(Expr::call(
            "Image.clipToBoundsAndScale",
            [
                ("input", self.0.clone()),
                ("geometry", geometry.0.clone()),
                ("scale", Expr::number(scale)),
            ],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_wire_form() {
        let image = Image::load("USGS/SRTMGL1_003").select("elevation");
        let wire = image.0.to_expression();
        assert_eq!(wire["result"], "0");
        let node = &wire["values"]["0"]["functionInvocationValue"];
        assert_eq!(node["functionName"], "Image.select");
        assert_eq!(
            node["arguments"]["bandSelectors"]["arrayValue"]["values"][0]["constantValue"],
            "elevation"
        );
        assert_eq!(
            node["arguments"]["input"]["functionInvocationValue"]["functionName"],
            "Image.load"
        );
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let build = || {
            ImageCollection::load("MODIS/061/MOD11A1")
                .filter_date("2023-01-01", "2025-01-01")
                .median()
                .multiply_by(0.02)
                .add_constant(-273.15)
        };
        let a = serde_json::to_string(&build().0.to_expression()).unwrap();
        let b = serde_json::to_string(&build().0.to_expression()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_asset_ids() {
        let boundary = FeatureCollection::load("FAO/GAUL/2015/level2")
            .filter(Filter::eq("ADM0_NAME", "Kenya"))
            .geometry();
        let image = ImageCollection::load("GOOGLE/DYNAMICWORLD/V1")
            .filter_bounds(&boundary)
            .mode();
        assert_eq!(
            image.0.asset_ids(),
            vec!["GOOGLE/DYNAMICWORLD/V1", "FAO/GAUL/2015/level2"]
        );
    }

    #[test]
    fn test_add_bands_argument_order() {
        let a = Image::constant(1.0).rename("a");
        let b = Image::constant(2.0).rename("b");
        let stacked = a.add_bands(&b);
        assert_eq!(stacked.0.argument("dstImg"), Some(&a.0));
        assert_eq!(stacked.0.argument("srcImg"), Some(&b.0));
    }
}
