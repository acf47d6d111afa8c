//! Prometheus result values produced by the reshaper
//!
//! [`RunResult`] serializes to the `data` object of the Prometheus HTTP API:
//! `{"resultType": ..., "result": ...}`.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Reserved label carrying the metric name
pub const METRIC_NAME_LABEL: &str = "__name__";

/// Static PromQL type of an expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Scalar,
    String,
    Vector,
    Matrix,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => write!(f, "scalar"),
            Self::String => write!(f, "string"),
            Self::Vector => write!(f, "instant vector"),
            Self::Matrix => write!(f, "range vector"),
        }
    }
}

/// Metric labels (the label set identifying a time series)
///
/// Labels are kept sorted so label sets hash, compare and order the way
/// Prometheus compares them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Metric {
    pub labels: BTreeMap<String, String>,
}

impl Metric {
    /// Create a new metric with the given name
    pub fn new(name: &str) -> Self {
        Self::default().with_label(METRIC_NAME_LABEL, name)
    }

    /// Add a label to this metric
    pub fn with_label(mut self, name: &str, value: &str) -> Self {
        self.labels.insert(name.to_string(), value.to_string());
        self
    }

    /// Get the metric name (__name__ label)
    pub fn name(&self) -> Option<&str> {
        self.get(METRIC_NAME_LABEL)
    }

    /// Get a label value by name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(|s| s.as_str())
    }
}

/// A value at a timestamp (milliseconds since epoch)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub t: i64,
    pub v: f64,
}

impl Serialize for Point {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(2))?;
        seq.serialize_element(&timestamp_json(self.t))?;
        seq.serialize_element(&format_value(self.v))?;
        seq.end()
    }
}

/// A single sample (metric + value at a point in time)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub metric: Metric,
    #[serde(rename = "value")]
    pub point: Point,
}

/// A time series (metric + points in ascending time order)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub metric: Metric,
    #[serde(rename = "values")]
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromValue {
    Scalar(Point),
    String { t: i64, v: String },
    Vector(Vec<Sample>),
    Matrix(Vec<Series>),
    LabelValues(Vec<String>),
}

impl PromValue {
    pub fn result_type(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::String { .. } => "string",
            Self::Vector(_) => "vector",
            Self::Matrix(_) => "matrix",
            Self::LabelValues(_) => "",
        }
    }
}

impl Serialize for PromValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Scalar(point) => point.serialize(serializer),
            Self::String { t, v } => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(&timestamp_json(*t))?;
                seq.serialize_element(v)?;
                seq.end()
            }
            Self::Vector(samples) => samples.serialize(serializer),
            Self::Matrix(series) => series.serialize(serializer),
            Self::LabelValues(values) => values.serialize(serializer),
        }
    }
}

/// Outcome of one command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunResult {
    pub value: Option<PromValue>,
}

impl RunResult {
    pub fn new(value: PromValue) -> Self {
        Self { value: Some(value) }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn result_type(&self) -> &'static str {
        self.value.as_ref().map_or("", PromValue::result_type)
    }
}

impl Serialize for RunResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("resultType", self.result_type())?;
        map.serialize_entry("result", &self.value)?;
        map.end()
    }
}

/// Unix seconds, fractional only when the millisecond part is non-zero
fn timestamp_json(ms: i64) -> serde_json::Value {
    if ms % 1000 == 0 {
        serde_json::Value::from(ms / 1000)
    } else {
        serde_json::Value::from(ms as f64 / 1000.0)
    }
}

/// Sample value text as the Prometheus API renders it
pub fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        v.to_string()
    }
}
