//! Cloud Monitoring v3 request shapes, serialized in their REST JSON form.

use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::metric::data::Labels;
use crate::resource::MappedResource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MetricKind {
    #[serde(rename = "GAUGE")]
    Gauge,
    #[serde(rename = "CUMULATIVE")]
    Cumulative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValueType {
    #[serde(rename = "INT64")]
    Int64,
    #[serde(rename = "DOUBLE")]
    Double,
    #[serde(rename = "DISTRIBUTION")]
    Distribution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LabelValueType {
    #[serde(rename = "STRING")]
    String,
    #[serde(rename = "BOOL")]
    Bool,
    #[serde(rename = "INT64")]
    Int64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelDescriptor {
    pub key: String,
    pub value_type: LabelValueType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDescriptor {
    #[serde(rename = "type")]
    pub metric_type: String,
    pub display_name: String,
    pub description: String,
    pub unit: String,
    pub metric_kind: MetricKind,
    pub value_type: ValueType,
    pub labels: Vec<LabelDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metric {
    #[serde(rename = "type")]
    pub metric_type: String,
    pub labels: Labels,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeInterval {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl TimeInterval {
    pub fn new(start: SystemTime, end: SystemTime) -> Self {
        Self {
            start_time: start.into(),
            end_time: end.into(),
        }
    }

    /// Zero-length interval, as gauges require.
    pub fn instant(time: SystemTime) -> Self {
        Self::new(time, time)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplicitBuckets {
    pub bounds: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketOptions {
    pub explicit_buckets: ExplicitBuckets,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub count: u64,
    pub mean: f64,
    pub bucket_options: BucketOptions,
    pub bucket_counts: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TypedValue {
    #[serde(rename = "int64Value")]
    Int64(i64),
    #[serde(rename = "doubleValue")]
    Double(f64),
    #[serde(rename = "distributionValue")]
    Distribution(Distribution),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub interval: TimeInterval,
    pub value: TypedValue,
}

/// One series in a batch write. Cloud Monitoring accepts a single point here.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeries {
    pub metric: Metric,
    pub resource: MappedResource,
    pub metric_kind: MetricKind,
    pub value_type: ValueType,
    pub points: Vec<Point>,
}
