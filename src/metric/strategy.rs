use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::trace;

use crate::error::ExporterError;
use crate::metric::wire::MetricDescriptor;

/// Destination for descriptor registrations.
#[async_trait]
pub trait DescriptorSink: Send + Sync {
    async fn create_metric_descriptor(&self, descriptor: &MetricDescriptor) -> Result<(), ExporterError>;
}

/// Decides which descriptors get registered before their points are sent.
#[async_trait]
pub trait MetricDescriptorStrategy: Send + Sync + fmt::Debug {
    async fn export_descriptors(
        &self,
        descriptors: &[MetricDescriptor],
        sink: &dyn DescriptorSink,
    ) -> Result<(), ExporterError>;
}

/// Registers every descriptor on every export.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysSend;

#[async_trait]
impl MetricDescriptorStrategy for AlwaysSend {
    async fn export_descriptors(
        &self,
        descriptors: &[MetricDescriptor],
        sink: &dyn DescriptorSink,
    ) -> Result<(), ExporterError> {
        for descriptor in descriptors {
            trace!(metric = %descriptor.metric_type, "Registering metric descriptor");
            sink.create_metric_descriptor(descriptor).await?;
        }
        Ok(())
    }
}

/// Never registers; the backend creates descriptors on first write.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverSend;

#[async_trait]
impl MetricDescriptorStrategy for NeverSend {
    async fn export_descriptors(
        &self,
        _descriptors: &[MetricDescriptor],
        _sink: &dyn DescriptorSink,
    ) -> Result<(), ExporterError> {
        Ok(())
    }
}

/// Registers each descriptor type once per strategy instance.
///
/// A type is remembered only after the sink accepted it, so a failed
/// registration is retried on the next export. The lock is held across the
/// sink calls; concurrent exports queue behind each other here.
#[derive(Debug, Default)]
pub struct SendOnce {
    sent: Mutex<HashSet<String>>,
}

impl SendOnce {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetricDescriptorStrategy for SendOnce {
    async fn export_descriptors(
        &self,
        descriptors: &[MetricDescriptor],
        sink: &dyn DescriptorSink,
    ) -> Result<(), ExporterError> {
        let mut sent = self.sent.lock().await;
        for descriptor in descriptors {
            if sent.contains(&descriptor.metric_type) {
                continue;
            }
            trace!(metric = %descriptor.metric_type, "Registering metric descriptor");
            sink.create_metric_descriptor(descriptor).await?;
            sent.insert(descriptor.metric_type.clone());
        }
        Ok(())
    }
}
