use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::config::MetricConfiguration;
use crate::error::ExporterError;
use crate::metric::aggregator::{IntervalTable, TimeSeriesAggregator};
use crate::metric::client::CloudMetricClient;
use crate::metric::data::MetricRecord;
use crate::metric::descriptor::DEFAULT_PREFIX;
use crate::metric::strategy::{DescriptorSink, MetricDescriptorStrategy, SendOnce};
use crate::metric::wire::MetricDescriptor;
use crate::resource::MonitoredResourceDescription;

/// Cloud Monitoring accepts at most this many series per write.
pub const MAX_BATCH_SIZE: usize = 200;

/// Outcome of a completed export call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportResult {
    Success,
    /// Some input metrics produced no time series.
    Failure,
}

/// Forwards descriptor registrations to the client for one project.
struct ProjectDescriptorSink<'a> {
    client: &'a dyn CloudMetricClient,
    project_name: &'a str,
}

#[async_trait]
impl DescriptorSink for ProjectDescriptorSink<'_> {
    async fn create_metric_descriptor(&self, descriptor: &MetricDescriptor) -> Result<(), ExporterError> {
        self.client
            .create_metric_descriptor(self.project_name, descriptor)
            .await
    }
}

/// Translates metric records into Cloud Monitoring writes.
///
/// Safe to share between concurrent exports. The only state kept between
/// calls is the per-series interval table and whatever the descriptor
/// strategy remembers.
pub struct MetricExporter {
    client: Arc<dyn CloudMetricClient>,
    project_id: String,
    project_name: String,
    prefix: String,
    strategy: Arc<dyn MetricDescriptorStrategy>,
    use_service_time_series: bool,
    resource_description: Option<MonitoredResourceDescription>,
    intervals: IntervalTable,
    is_shutdown: AtomicBool,
}

impl MetricExporter {
    pub fn new(client: Arc<dyn CloudMetricClient>, project_id: impl Into<String>) -> Self {
        let project_id = project_id.into();
        Self {
            client,
            project_name: format!("projects/{project_id}"),
            project_id,
            prefix: DEFAULT_PREFIX.to_string(),
            strategy: Arc::new(SendOnce::new()),
            use_service_time_series: false,
            resource_description: None,
            intervals: IntervalTable::new(SystemTime::now()),
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// Builds an exporter from a configuration, with the project already resolved.
    pub fn with_configuration(
        client: Arc<dyn CloudMetricClient>,
        project_id: impl Into<String>,
        config: &MetricConfiguration,
    ) -> Self {
        let mut exporter = Self::new(client, project_id)
            .with_prefix(config.prefix.clone())
            .with_service_time_series(config.use_service_time_series);
        exporter.strategy = config.descriptor_strategy.clone();
        exporter.resource_description = config.monitored_resource_description.clone();
        exporter
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_descriptor_strategy(mut self, strategy: impl MetricDescriptorStrategy + 'static) -> Self {
        self.strategy = Arc::new(strategy);
        self
    }

    pub fn with_service_time_series(mut self, enabled: bool) -> Self {
        self.use_service_time_series = enabled;
        self
    }

    pub fn with_resource_description(mut self, description: MonitoredResourceDescription) -> Self {
        self.resource_description = Some(description);
        self
    }

    /// Overrides the time cumulative series are assumed to start from.
    pub fn with_start_time(mut self, start_time: SystemTime) -> Self {
        self.intervals = IntervalTable::new(start_time);
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn start_time(&self) -> SystemTime {
        self.intervals.start_time()
    }

    /// Exports one batch of metrics.
    ///
    /// Unsupported metric shapes are logged and skipped. Descriptor
    /// registration failures are logged and do not stop the write. A failed
    /// time series write is returned as an error; batches sent before it
    /// stay sent.
    pub async fn export_records(&self, metrics: &[MetricRecord]) -> Result<ExportResult, ExporterError> {
        if self.is_shutdown.load(Ordering::Acquire) {
            return Err(ExporterError::Shutdown);
        }

        let mut aggregator = TimeSeriesAggregator::new(
            &self.prefix,
            &self.intervals,
            self.resource_description.as_ref(),
        );
        for metric in metrics {
            if let Err(err) = aggregator.record(metric) {
                error!(metric = %metric.name, error = %err, "Skipping metric");
            }
        }
        let (descriptors, series) = aggregator.finish();

        if !self.use_service_time_series && !descriptors.is_empty() {
            let sink = ProjectDescriptorSink {
                client: self.client.as_ref(),
                project_name: &self.project_name,
            };
            if let Err(err) = self.strategy.export_descriptors(&descriptors, &sink).await {
                warn!(error = %err, "Failed to create metric descriptors");
            }
        }

        for (batch, chunk) in series.chunks(MAX_BATCH_SIZE).enumerate() {
            debug!(batch, size = chunk.len(), service = self.use_service_time_series, "Writing time series");
            if self.use_service_time_series {
                self.client
                    .create_service_time_series(&self.project_name, chunk)
                    .await?;
            } else {
                self.client.create_time_series(&self.project_name, chunk).await?;
            }
        }

        if series.len() < metrics.len() {
            debug!(series = series.len(), metrics = metrics.len(), "Some metrics produced no series");
            return Ok(ExportResult::Failure);
        }
        Ok(ExportResult::Success)
    }

    /// Nothing is buffered between exports, so there is nothing to flush.
    pub async fn flush(&self) -> Result<(), ExporterError> {
        Ok(())
    }

    /// Releases the client. Calls after the first are no-ops.
    pub async fn shutdown(&self) -> Result<(), ExporterError> {
        if self.is_shutdown.swap(true, Ordering::AcqRel) {
            debug!("Metric exporter already shut down");
            return Ok(());
        }
        self.client.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use opentelemetry::KeyValue;
    use opentelemetry_sdk::Resource;

    use super::*;
    use crate::metric::client::testing::{Call, RecordingClient};
    use crate::metric::data::{MetricData, NumberPoint, SummaryPoint};
    use crate::metric::strategy::{AlwaysSend, NeverSend};
    use crate::metric::wire::{TimeInterval, TypedValue};

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn exporter(client: &Arc<RecordingClient>) -> MetricExporter {
        MetricExporter::new(client.clone(), "my-project").with_start_time(at(1_000))
    }

    fn counter(name: &str, value: i64, time: SystemTime) -> MetricRecord {
        MetricRecord::new(name, MetricData::LongSum(vec![NumberPoint::new(value, time)]))
    }

    fn summary(name: &str) -> MetricRecord {
        MetricRecord::new(
            name,
            MetricData::Summary(vec![SummaryPoint {
                labels: Default::default(),
                start_time: at(0),
                time: at(0),
                count: 1,
                sum: 1.0,
            }]),
        )
    }

    #[tokio::test]
    async fn export_writes_series_under_project_name() {
        let client = Arc::new(RecordingClient::new());
        let exporter = exporter(&client);

        let result = exporter.export_records(&[counter("requests", 5, at(1_060))]).await.unwrap();

        assert_eq!(result, ExportResult::Success);
        let calls = client.calls();
        assert!(matches!(&calls[0], Call::Descriptor(project, d)
            if project == "projects/my-project" && d.metric_type == "workload.googleapis.com/requests"));
        match &calls[1] {
            Call::TimeSeries(project, series) => {
                assert_eq!(project, "projects/my-project");
                assert_eq!(series[0].points[0].value, TypedValue::Int64(5));
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[tokio::test]
    async fn export_splits_series_into_batches_of_200() {
        let client = Arc::new(RecordingClient::new());
        let exporter = exporter(&client).with_descriptor_strategy(NeverSend);
        let points = (0..450)
            .map(|i| NumberPoint::new(i as f64, at(1_060)).with_label("shard", i.to_string()))
            .collect();
        let metric = MetricRecord::new("load", MetricData::DoubleGauge(points));

        exporter.export_records(&[metric]).await.unwrap();

        assert_eq!(client.batch_sizes(), vec![200, 200, 50]);
        let sent = client.sent_series();
        let values: Vec<_> = sent.iter().map(|s| s.points[0].value.clone()).collect();
        let expected: Vec<_> = (0..450).map(|i| TypedValue::Double(i as f64)).collect();
        assert_eq!(values, expected);
    }

    #[tokio::test]
    async fn cumulative_intervals_continue_across_exports() {
        let client = Arc::new(RecordingClient::new());
        let exporter = exporter(&client);

        exporter.export_records(&[counter("requests", 5, at(1_060))]).await.unwrap();
        exporter.export_records(&[counter("requests", 9, at(1_120))]).await.unwrap();

        let sent = client.sent_series();
        assert_eq!(sent[0].points[0].interval, TimeInterval::new(at(1_000), at(1_060)));
        assert_eq!(
            sent[1].points[0].interval,
            TimeInterval::new(at(1_060) + Duration::from_millis(1), at(1_120))
        );
    }

    #[tokio::test]
    async fn send_once_registers_descriptor_once_across_exports() {
        let client = Arc::new(RecordingClient::new());
        let exporter = exporter(&client);

        for i in 0..3 {
            exporter.export_records(&[counter("requests", i, at(1_060 + i as u64))]).await.unwrap();
        }

        assert_eq!(client.descriptor_calls(), 1);
    }

    #[tokio::test]
    async fn always_send_registers_descriptor_every_export() {
        let client = Arc::new(RecordingClient::new());
        let exporter = exporter(&client).with_descriptor_strategy(AlwaysSend);

        for i in 0..3 {
            exporter.export_records(&[counter("requests", i, at(1_060 + i as u64))]).await.unwrap();
        }

        assert_eq!(client.descriptor_calls(), 3);
    }

    #[tokio::test]
    async fn service_time_series_skips_descriptors() {
        let client = Arc::new(RecordingClient::new());
        let exporter = exporter(&client)
            .with_descriptor_strategy(AlwaysSend)
            .with_service_time_series(true);

        exporter.export_records(&[counter("requests", 1, at(1_060))]).await.unwrap();

        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], Call::ServiceTimeSeries(_, series) if series.len() == 1));
    }

    #[tokio::test]
    async fn descriptor_failure_does_not_block_points() {
        let client = Arc::new(RecordingClient::new());
        client.fail_descriptors.store(true, Ordering::SeqCst);
        let exporter = exporter(&client);

        let result = exporter.export_records(&[counter("requests", 1, at(1_060))]).await.unwrap();

        assert_eq!(result, ExportResult::Success);
        assert_eq!(client.batch_sizes(), vec![1]);
    }

    #[tokio::test]
    async fn unsupported_metric_yields_failure_but_sends_the_rest() {
        let client = Arc::new(RecordingClient::new());
        let exporter = exporter(&client);

        let result = exporter
            .export_records(&[counter("requests", 1, at(1_060)), summary("rpc.duration")])
            .await
            .unwrap();

        assert_eq!(result, ExportResult::Failure);
        assert_eq!(client.batch_sizes(), vec![1]);
    }

    #[tokio::test]
    async fn rpc_failure_propagates_and_keeps_interval_bookkeeping() {
        let client = Arc::new(RecordingClient::new());
        let exporter = exporter(&client);
        client.fail_time_series.store(true, Ordering::SeqCst);

        let err = exporter.export_records(&[counter("requests", 1, at(1_060))]).await.unwrap_err();
        client.fail_time_series.store(false, Ordering::SeqCst);
        exporter.export_records(&[counter("requests", 2, at(1_120))]).await.unwrap();

        assert!(matches!(err, ExporterError::Rpc(_)));
        let sent = client.sent_series();
        assert_eq!(
            sent[0].points[0].interval,
            TimeInterval::new(at(1_060) + Duration::from_millis(1), at(1_120))
        );
    }

    #[tokio::test]
    async fn retried_export_repeats_the_failed_interval() {
        let client = Arc::new(RecordingClient::new());
        let exporter = exporter(&client);
        let batch = [counter("requests", 1, at(1_060))];
        client.fail_time_series.store(true, Ordering::SeqCst);
        exporter.export_records(&batch).await.unwrap_err();
        client.fail_time_series.store(false, Ordering::SeqCst);

        exporter.export_records(&batch).await.unwrap();

        let interval = client.sent_series()[0].points[0].interval;
        assert_eq!(interval, TimeInterval::new(at(1_000), at(1_060)));
        assert!(interval.start_time <= interval.end_time);
    }

    #[tokio::test]
    async fn duplicate_records_in_one_export_keep_exporter_start() {
        let client = Arc::new(RecordingClient::new());
        let exporter = exporter(&client);

        exporter
            .export_records(&[counter("requests", 1, at(1_060)), counter("requests", 2, at(1_060))])
            .await
            .unwrap();

        let sent = client.sent_series();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].points[0].interval, TimeInterval::new(at(1_000), at(1_060)));
        assert_eq!(sent[0].points[0].value, TypedValue::Int64(2));
    }

    #[tokio::test]
    async fn flush_is_idempotent_and_side_effect_free() {
        let client = Arc::new(RecordingClient::new());
        let exporter = exporter(&client);
        exporter.export_records(&[counter("requests", 1, at(1_060))]).await.unwrap();
        let calls_before = client.calls().len();

        for _ in 0..3 {
            exporter.flush().await.unwrap();
        }
        exporter.export_records(&[counter("requests", 2, at(1_120))]).await.unwrap();

        assert_eq!(client.calls().len(), calls_before + 1);
        assert_eq!(
            client.sent_series()[1].points[0].interval,
            TimeInterval::new(at(1_060) + Duration::from_millis(1), at(1_120))
        );
    }

    #[tokio::test]
    async fn shutdown_releases_client_once() {
        let client = Arc::new(RecordingClient::new());
        let exporter = exporter(&client);

        exporter.shutdown().await.unwrap();
        exporter.shutdown().await.unwrap();

        let shutdowns = client.calls().iter().filter(|c| matches!(c, Call::Shutdown)).count();
        assert_eq!(shutdowns, 1);
    }

    #[tokio::test]
    async fn export_after_shutdown_is_rejected() {
        let client = Arc::new(RecordingClient::new());
        let exporter = exporter(&client);
        exporter.shutdown().await.unwrap();

        let result = exporter.export_records(&[counter("requests", 1, at(1_060))]).await;

        assert!(matches!(result, Err(ExporterError::Shutdown)));
    }

    #[tokio::test]
    async fn gke_pod_resource_is_attached_to_series() {
        let client = Arc::new(RecordingClient::new());
        let exporter = exporter(&client);
        let resource = Resource::builder_empty()
            .with_attributes([
                KeyValue::new("cloud.platform", "gcp_kubernetes_engine"),
                KeyValue::new("k8s.cluster.name", "c1"),
                KeyValue::new("k8s.pod.name", "p1"),
            ])
            .build();

        exporter
            .export_records(&[counter("requests", 1, at(1_060)).with_resource(resource)])
            .await
            .unwrap();

        let mapped = &client.sent_series()[0].resource;
        assert_eq!(mapped.resource_type(), "k8s_pod");
        assert_eq!(mapped.label("location"), Some("global"));
        assert_eq!(mapped.label("namespace_name"), Some(""));
    }

    #[tokio::test]
    async fn concurrent_exports_share_interval_table() {
        let client = Arc::new(RecordingClient::new());
        let exporter = Arc::new(exporter(&client));

        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let exporter = exporter.clone();
                tokio::spawn(async move {
                    let name = format!("requests.{i}");
                    exporter.export_records(&[counter(&name, 1, at(1_060))]).await.unwrap()
                })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), ExportResult::Success);
        }

        assert_eq!(client.descriptor_calls(), 4);
        assert_eq!(client.sent_series().len(), 4);
    }
}
