//! OpenTelemetry SDK integration.
//!
//! [`MetricExporter`] implements [`PushMetricExporter`], so a
//! `PeriodicReader` can drive it:
//!
//! ```rust,ignore
//! let reader = PeriodicReader::builder(exporter).build();
//! let provider = SdkMeterProvider::builder()
//!     .with_reader(reader)
//!     .with_resource(gcp_monitoring_exporter::detect_resource().await)
//!     .build();
//! ```

use std::time::{Duration, SystemTime};

use opentelemetry::KeyValue;
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use opentelemetry_sdk::metrics::data::{self, AggregatedMetrics, ResourceMetrics};
use opentelemetry_sdk::metrics::exporter::PushMetricExporter;
use opentelemetry_sdk::metrics::Temporality;
use opentelemetry_sdk::Resource;
use tracing::{debug, error};

use crate::metric::data::{HistogramPoint, Labels, MetricData, MetricRecord, NumberPoint};
use crate::metric::exporter::{ExportResult, MetricExporter};

/// SDK value types and the record shapes they map onto.
trait SdkNumber: Copy {
    fn number_data(points: Vec<(Labels, Self)>, start: SystemTime, time: SystemTime, cumulative: bool) -> MetricData;

    fn as_f64(self) -> f64;
}

impl SdkNumber for i64 {
    fn number_data(points: Vec<(Labels, Self)>, start: SystemTime, time: SystemTime, cumulative: bool) -> MetricData {
        let points = number_points(points, start, time);
        if cumulative {
            MetricData::LongSum(points)
        } else {
            MetricData::LongGauge(points)
        }
    }

    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl SdkNumber for u64 {
    /// Cloud Monitoring has no unsigned type; values past `i64::MAX` saturate.
    fn number_data(points: Vec<(Labels, Self)>, start: SystemTime, time: SystemTime, cumulative: bool) -> MetricData {
        let points = points
            .into_iter()
            .map(|(labels, value)| (labels, i64::try_from(value).unwrap_or(i64::MAX)))
            .collect();
        i64::number_data(points, start, time, cumulative)
    }

    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl SdkNumber for f64 {
    fn number_data(points: Vec<(Labels, Self)>, start: SystemTime, time: SystemTime, cumulative: bool) -> MetricData {
        let points = number_points(points, start, time);
        if cumulative {
            MetricData::DoubleSum(points)
        } else {
            MetricData::DoubleGauge(points)
        }
    }

    fn as_f64(self) -> f64 {
        self
    }
}

fn number_points<T>(points: Vec<(Labels, T)>, start: SystemTime, time: SystemTime) -> Vec<NumberPoint<T>> {
    points
        .into_iter()
        .map(|(labels, value)| NumberPoint {
            value,
            labels,
            start_time: start,
            time,
        })
        .collect()
}

fn labels<'a>(attributes: impl Iterator<Item = &'a KeyValue>) -> Labels {
    attributes
        .map(|kv| (kv.key.as_str().to_string(), kv.value.as_str().into_owned()))
        .collect()
}

/// Record shape for one SDK aggregation, or the name of the unsupported one.
///
/// Non-monotonic sums (up-down counters) are exported as gauges, since a
/// cumulative series must not decrease.
fn metric_data<T: SdkNumber>(data: &data::MetricData<T>) -> Result<MetricData, &'static str> {
    match data {
        data::MetricData::Gauge(gauge) => {
            let time = gauge.time();
            let points = gauge
                .data_points()
                .map(|point| (labels(point.attributes()), point.value()))
                .collect();
            Ok(T::number_data(points, gauge.start_time().unwrap_or(time), time, false))
        }
        data::MetricData::Sum(sum) => {
            let points = sum
                .data_points()
                .map(|point| (labels(point.attributes()), point.value()))
                .collect();
            Ok(T::number_data(points, sum.start_time(), sum.time(), sum.is_monotonic()))
        }
        data::MetricData::Histogram(histogram) => Ok(MetricData::Histogram(
            histogram
                .data_points()
                .map(|point| HistogramPoint {
                    labels: labels(point.attributes()),
                    start_time: histogram.start_time(),
                    time: histogram.time(),
                    count: point.count(),
                    sum: point.sum().as_f64(),
                    bounds: point.bounds().collect(),
                    bucket_counts: point.bucket_counts().collect(),
                })
                .collect(),
        )),
        data::MetricData::ExponentialHistogram(_) => Err("ExponentialHistogram"),
    }
}

fn record_from_sdk(metric: &data::Metric, resource: &Resource) -> Result<MetricRecord, &'static str> {
    let data = match metric.data() {
        AggregatedMetrics::I64(data) => metric_data(data),
        AggregatedMetrics::U64(data) => metric_data(data),
        AggregatedMetrics::F64(data) => metric_data(data),
    }?;

    Ok(MetricRecord::new(metric.name(), data)
        .with_description(metric.description())
        .with_unit(metric.unit())
        .with_resource(resource.clone()))
}

/// Converts one SDK collection into records.
///
/// Metrics with an unsupported aggregation are logged and counted in the
/// second element.
pub fn records_from_sdk(metrics: &ResourceMetrics) -> (Vec<MetricRecord>, usize) {
    let resource = metrics.resource();
    let mut records = Vec::new();
    let mut skipped = 0;

    for scope in metrics.scope_metrics() {
        for metric in scope.metrics() {
            match record_from_sdk(metric, resource) {
                Ok(record) => records.push(record),
                Err(kind) => {
                    error!(metric = %metric.name(), kind, "Skipping metric");
                    skipped += 1;
                }
            }
        }
    }
    (records, skipped)
}

impl PushMetricExporter for MetricExporter {
    async fn export(&self, metrics: &ResourceMetrics) -> OTelSdkResult {
        let (records, skipped) = records_from_sdk(metrics);
        let result = self.export_records(&records).await?;

        if skipped > 0 || result == ExportResult::Failure {
            debug!(skipped, records = records.len(), "Export finished with dropped metrics");
            return Err(OTelSdkError::InternalFailure(
                "some metrics produced no time series".to_string(),
            ));
        }
        Ok(())
    }

    fn force_flush(&self) -> OTelSdkResult {
        Ok(())
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> OTelSdkResult {
        futures::executor::block_on(MetricExporter::shutdown(self))?;
        Ok(())
    }

    /// Cloud Monitoring stores sums as cumulative series.
    fn temporality(&self) -> Temporality {
        Temporality::Cumulative
    }
}
