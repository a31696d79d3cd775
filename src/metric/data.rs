use std::collections::BTreeMap;
use std::time::SystemTime;

use opentelemetry_sdk::Resource;

/// Point attributes, ordered so equal sets compare and hash equally.
pub type Labels = BTreeMap<String, String>;

/// A gauge or sum sample.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberPoint<T> {
    pub value: T,
    pub labels: Labels,
    pub start_time: SystemTime,
    pub time: SystemTime,
}

impl<T> NumberPoint<T> {
    pub fn new(value: T, time: SystemTime) -> Self {
        Self {
            value,
            labels: Labels::new(),
            start_time: time,
            time,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_start_time(mut self, start_time: SystemTime) -> Self {
        self.start_time = start_time;
        self
    }
}

/// An explicit-bucket histogram sample.
///
/// `bucket_counts` has one more entry than `bounds` (the overflow bucket).
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramPoint {
    pub labels: Labels,
    pub start_time: SystemTime,
    pub time: SystemTime,
    pub count: u64,
    pub sum: f64,
    pub bounds: Vec<f64>,
    pub bucket_counts: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryPoint {
    pub labels: Labels,
    pub start_time: SystemTime,
    pub time: SystemTime,
    pub count: u64,
    pub sum: f64,
}

/// Metric payload by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricData {
    LongGauge(Vec<NumberPoint<i64>>),
    DoubleGauge(Vec<NumberPoint<f64>>),
    LongSum(Vec<NumberPoint<i64>>),
    DoubleSum(Vec<NumberPoint<f64>>),
    Histogram(Vec<HistogramPoint>),
    Summary(Vec<SummaryPoint>),
}

impl MetricData {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::LongGauge(_) => "LongGauge",
            Self::DoubleGauge(_) => "DoubleGauge",
            Self::LongSum(_) => "LongSum",
            Self::DoubleSum(_) => "DoubleSum",
            Self::Histogram(_) => "Histogram",
            Self::Summary(_) => "Summary",
        }
    }
}

/// One metric ready for export, either converted from an SDK collection or
/// built by hand.
#[derive(Debug, Clone)]
pub struct MetricRecord {
    pub name: String,
    pub description: String,
    pub unit: String,
    pub resource: Resource,
    pub data: MetricData,
}

impl MetricRecord {
    pub fn new(name: impl Into<String>, data: MetricData) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            unit: String::new(),
            resource: Resource::builder_empty().build(),
            data,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = resource;
        self
    }
}
