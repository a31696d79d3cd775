use async_trait::async_trait;

use crate::error::ExporterError;
use crate::metric::wire::{MetricDescriptor, TimeSeries};

/// The Cloud Monitoring RPC surface the exporter writes to.
///
/// `project_name` is the full resource name, `projects/{project_id}`.
#[async_trait]
pub trait CloudMetricClient: Send + Sync {
    async fn create_metric_descriptor(
        &self,
        project_name: &str,
        descriptor: &MetricDescriptor,
    ) -> Result<(), ExporterError>;

    async fn create_time_series(
        &self,
        project_name: &str,
        series: &[TimeSeries],
    ) -> Result<(), ExporterError>;

    /// Writes series attributed to a Google Cloud service. Descriptors are
    /// derived server side.
    async fn create_service_time_series(
        &self,
        project_name: &str,
        series: &[TimeSeries],
    ) -> Result<(), ExporterError>;

    async fn shutdown(&self) -> Result<(), ExporterError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, Ordering};

    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Descriptor(String, MetricDescriptor),
        TimeSeries(String, Vec<TimeSeries>),
        ServiceTimeSeries(String, Vec<TimeSeries>),
        Shutdown,
    }

    /// In-memory client that records every call.
    #[derive(Debug, Default)]
    pub struct RecordingClient {
        calls: Mutex<Vec<Call>>,
        pub fail_descriptors: AtomicBool,
        pub fail_time_series: AtomicBool,
    }

    impl RecordingClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        pub fn descriptor_calls(&self) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|call| matches!(call, Call::Descriptor(..)))
                .count()
        }

        /// Sizes of the plain and service time series batches, in send order.
        pub fn batch_sizes(&self) -> Vec<usize> {
            self.calls
                .lock()
                .iter()
                .filter_map(|call| match call {
                    Call::TimeSeries(_, series) | Call::ServiceTimeSeries(_, series) => {
                        Some(series.len())
                    }
                    _ => None,
                })
                .collect()
        }

        pub fn sent_series(&self) -> Vec<TimeSeries> {
            self.calls
                .lock()
                .iter()
                .filter_map(|call| match call {
                    Call::TimeSeries(_, series) | Call::ServiceTimeSeries(_, series) => {
                        Some(series.clone())
                    }
                    _ => None,
                })
                .flatten()
                .collect()
        }
    }

    #[async_trait]
    impl CloudMetricClient for RecordingClient {
        async fn create_metric_descriptor(
            &self,
            project_name: &str,
            descriptor: &MetricDescriptor,
        ) -> Result<(), ExporterError> {
            self.calls
                .lock()
                .push(Call::Descriptor(project_name.to_string(), descriptor.clone()));
            if self.fail_descriptors.load(Ordering::SeqCst) {
                return Err(ExporterError::Rpc("descriptor rejected".to_string()));
            }
            Ok(())
        }

        async fn create_time_series(
            &self,
            project_name: &str,
            series: &[TimeSeries],
        ) -> Result<(), ExporterError> {
            if self.fail_time_series.load(Ordering::SeqCst) {
                return Err(ExporterError::Rpc("time series rejected".to_string()));
            }
            self.calls
                .lock()
                .push(Call::TimeSeries(project_name.to_string(), series.to_vec()));
            Ok(())
        }

        async fn create_service_time_series(
            &self,
            project_name: &str,
            series: &[TimeSeries],
        ) -> Result<(), ExporterError> {
            if self.fail_time_series.load(Ordering::SeqCst) {
                return Err(ExporterError::Rpc("time series rejected".to_string()));
            }
            self.calls
                .lock()
                .push(Call::ServiceTimeSeries(project_name.to_string(), series.to_vec()));
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), ExporterError> {
            self.calls.lock().push(Call::Shutdown);
            Ok(())
        }
    }
}
