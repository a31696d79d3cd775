use crate::error::ExporterError;
use crate::metric::data::{Labels, MetricData, MetricRecord};
use crate::metric::wire::{LabelDescriptor, LabelValueType, MetricDescriptor, MetricKind, ValueType};

/// Default namespace for metric types.
pub const DEFAULT_PREFIX: &str = "workload.googleapis.com";

/// Metric names containing one of these are already fully qualified.
pub const KNOWN_DOMAINS: [&str; 4] = ["googleapis.com", "kubernetes.io", "istio.io", "knative.dev"];

/// Namespaces `name` under `prefix` unless it belongs to a known domain.
pub fn metric_type(prefix: &str, name: &str) -> String {
    if KNOWN_DOMAINS.iter().any(|domain| name.contains(domain)) {
        return name.to_string();
    }
    format!("{}/{}", prefix.trim_end_matches('/'), name)
}

/// Guesses a label's type from its value. Display only; the value is always
/// sent as a string.
pub fn label_value_type(value: &str) -> LabelValueType {
    if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false") {
        LabelValueType::Bool
    } else if value.parse::<i64>().is_ok() {
        LabelValueType::Int64
    } else {
        LabelValueType::String
    }
}

pub fn label_descriptors(labels: &Labels) -> Vec<LabelDescriptor> {
    labels
        .iter()
        .map(|(key, value)| LabelDescriptor {
            key: key.clone(),
            value_type: label_value_type(value),
        })
        .collect()
}

/// Wire kind and value type for a metric shape.
///
/// Histograms become cumulative distributions. Summaries are rejected.
pub fn kind_and_value_type(metric: &MetricRecord) -> Result<(MetricKind, ValueType), ExporterError> {
    match &metric.data {
        MetricData::LongGauge(_) => Ok((MetricKind::Gauge, ValueType::Int64)),
        MetricData::DoubleGauge(_) => Ok((MetricKind::Gauge, ValueType::Double)),
        MetricData::LongSum(_) => Ok((MetricKind::Cumulative, ValueType::Int64)),
        MetricData::DoubleSum(_) => Ok((MetricKind::Cumulative, ValueType::Double)),
        MetricData::Histogram(_) => Ok((MetricKind::Cumulative, ValueType::Distribution)),
        other => Err(ExporterError::UnsupportedKind {
            metric: metric.name.clone(),
            kind: other.kind_name(),
        }),
    }
}

/// Builds the descriptor for `metric` as seen with one point's labels.
pub fn build_descriptor(
    prefix: &str,
    metric: &MetricRecord,
    labels: &Labels,
) -> Result<MetricDescriptor, ExporterError> {
    let (metric_kind, value_type) = kind_and_value_type(metric)?;

    Ok(MetricDescriptor {
        metric_type: metric_type(prefix, &metric.name),
        display_name: metric.name.clone(),
        description: metric.description.clone(),
        unit: metric.unit.clone(),
        metric_kind,
        value_type,
        labels: label_descriptors(labels),
    })
}
