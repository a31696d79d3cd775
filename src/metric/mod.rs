//! Cloud Monitoring metric export.
//!
//! An export call walks the metrics collected by the OpenTelemetry SDK, folds
//! their points into one time series per `(metric type, labels)` pair,
//! registers metric descriptors according to the configured
//! [`MetricDescriptorStrategy`], then writes the series in batches of
//! [`MAX_BATCH_SIZE`] through a [`CloudMetricClient`].
//!
//! # Supported shapes
//!
//! | Input | Metric kind | Value type |
//! |-------|-------------|------------|
//! | `LongGauge` | `GAUGE` | `INT64` |
//! | `DoubleGauge` | `GAUGE` | `DOUBLE` |
//! | `LongSum` | `CUMULATIVE` | `INT64` |
//! | `DoubleSum` | `CUMULATIVE` | `DOUBLE` |
//! | `Histogram` | `CUMULATIVE` | `DISTRIBUTION` |
//!
//! SDK up-down counters (non-monotonic sums) arrive as gauges. Summaries and
//! exponential histograms are logged and skipped.
//!
//! [`MetricExporter`] implements the SDK's `PushMetricExporter` (see
//! [`sdk`]), so it plugs into a `PeriodicReader`. Records built by hand go
//! through [`MetricExporter::export_records`].
//!
//! # Example
//!
//! ```rust,ignore
//! let exporter = MetricExporter::new(client, "my-project")
//!     .with_descriptor_strategy(AlwaysSend);
//!
//! match exporter.export_records(&records).await? {
//!     ExportResult::Success => {}
//!     ExportResult::Failure => tracing::warn!("some metrics were dropped"),
//! }
//! ```

pub mod aggregator;
pub mod client;
pub mod data;
pub mod descriptor;
pub mod exporter;
pub mod sdk;
pub mod strategy;
pub mod wire;

pub use aggregator::{ExportKey, IntervalTable, TimeSeriesAggregator};
pub use client::CloudMetricClient;
pub use data::{HistogramPoint, Labels, MetricData, MetricRecord, NumberPoint, SummaryPoint};
pub use descriptor::DEFAULT_PREFIX;
pub use exporter::{ExportResult, MetricExporter, MAX_BATCH_SIZE};
pub use sdk::records_from_sdk;
pub use strategy::{AlwaysSend, DescriptorSink, MetricDescriptorStrategy, NeverSend, SendOnce};
pub use wire::{MetricDescriptor, MetricKind, TimeSeries, ValueType};
