use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::geometric::raster::Grid;

/// Class value for pixels that belong to no class
pub const NO_CLASS: u8 = 0;

/// Upper bound of a class; serialized as a number, or `"inf"` for +infinity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold(pub f64);

impl Serialize for Threshold {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0 == f64::INFINITY {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_f64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Threshold {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ThresholdVisitor;

        impl<'de> Visitor<'de> for ThresholdVisitor {
            type Value = Threshold;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a number, null, or \"inf\"")
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Threshold, E> {
                Ok(Threshold(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Threshold, E> {
                Ok(Threshold(v as f64))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Threshold, E> {
                Ok(Threshold(v as f64))
            }

            fn visit_unit<E: de::Error>(self) -> Result<Threshold, E> {
                Ok(Threshold(f64::INFINITY))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Threshold, E> {
                match v.to_ascii_lowercase().as_str() {
                    "inf" | "+inf" | "infinity" => Ok(Threshold(f64::INFINITY)),
                    _ => v
                        .parse::<f64>()
                        .map(Threshold)
                        .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self)),
                }
            }
        }

        deserializer.deserialize_any(ThresholdVisitor)
    }
}

/// One `(upper bound, label)` pair, written as `[0.5, "Low Risk"]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(Threshold, String)", into = "(Threshold, String)")]
pub struct ClassBreak {
    pub upper: f64,
    pub label: String,
}

impl From<(Threshold, String)> for ClassBreak {
    fn from((upper, label): (Threshold, String)) -> Self {
        ClassBreak {
            upper: upper.0,
            label,
        }
    }
}

impl From<ClassBreak> for (Threshold, String) {
    fn from(b: ClassBreak) -> Self {
        (Threshold(b.upper), b.label)
    }
}

/// Ordered thresholds partitioning pixel values into classes 1..N
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationScheme {
    pub breaks: Vec<ClassBreak>,
    /// Sentinel mapped to class 0 before bucketing, matched at f32 precision
    #[serde(default)]
    pub nodata: Option<f64>,
}

impl ClassificationScheme {
    pub fn new<S: Into<String>>(breaks: Vec<(f64, S)>) -> Self {
        ClassificationScheme {
            breaks: breaks
                .into_iter()
                .map(|(upper, label)| ClassBreak {
                    upper,
                    label: label.into(),
                })
                .collect(),
            nodata: None,
        }
    }

    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    /// Low / Medium / High Risk at 0.5 and 0.7
    pub fn flood_risk() -> Self {
        ClassificationScheme::new(vec![
            (0.5, "Low Risk"),
            (0.7, "Medium Risk"),
            (f64::INFINITY, "High Risk"),
        ])
    }

    pub fn class_count(&self) -> usize {
        self.breaks.len()
    }

    /// Label of a one-based class id
    pub fn label(&self, class_id: u8) -> Option<&str> {
        (class_id as usize)
            .checked_sub(1)
            .and_then(|i| self.breaks.get(i))
            .map(|b| b.label.as_str())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.breaks.is_empty() {
            return Err("classification scheme has no breaks".to_string());
        }
        if self.breaks.len() > u8::MAX as usize {
            return Err(format!(
                "classification scheme has {} classes, at most {} supported",
                self.breaks.len(),
                u8::MAX
            ));
        }
        for pair in self.breaks.windows(2) {
            if pair[0].upper.partial_cmp(&pair[1].upper) != Some(Ordering::Less) {
                return Err(format!(
                    "thresholds must increase strictly: {} then {}",
                    pair[0].upper, pair[1].upper
                ));
            }
        }
        if self.breaks.iter().any(|b| b.upper.is_nan()) {
            return Err("threshold is NaN".to_string());
        }
        if let Some(nodata) = self.nodata {
            if nodata.is_nan() {
                return Err("nodata sentinel must be a number; NaN is always excluded".to_string());
            }
        }
        Ok(())
    }

    /// Class of one pixel; ties at a threshold go to the lower class
    pub fn classify(&self, value: f64) -> u8 {
        if value.is_nan() || self.is_nodata(value) {
            return NO_CLASS;
        }
        for (i, b) in self.breaks.iter().enumerate() {
            if value <= b.upper {
                return (i + 1) as u8;
            }
        }
        // Above the last finite threshold
        self.breaks.len() as u8
    }

    /// Bands are stored as Float32, so a sentinel like 0.1 only survives at f32 precision
    fn is_nodata(&self, value: f64) -> bool {
        self.nodata.is_some_and(|nodata| nodata as f32 == value as f32)
    }

    pub fn classify_grid(&self, grid: &Grid<f64>) -> Grid<u8> {
        grid.map(|v| self.classify(v))
    }
}
