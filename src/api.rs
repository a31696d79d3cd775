use std::sync::Arc;

use opentelemetry_sdk::Resource;
use tracing::info;

use crate::config::MetricConfiguration;
use crate::detection::{
    DetectedPlatform, EnvironmentVariables, GcpMetadataClient, GcpPlatformDetector,
    GcpResourceBuilder, MetadataLookup, SystemEnvironment,
};
use crate::error::ExporterError;
use crate::metric::{CloudMetricClient, MetricExporter};

/// Project from the configuration, else from the metadata server
pub async fn resolve_project_id<M: MetadataLookup>(
    config: &MetricConfiguration,
    metadata: &M,
) -> Result<String, ExporterError> {
    if let Some(project_id) = &config.project_id {
        return Ok(project_id.clone());
    }

    match metadata.project_id().await {
        Some(project_id) if !project_id.is_empty() => Ok(project_id),
        _ => Err(ExporterError::Config(
            "no project id configured and none available from the metadata server".to_string(),
        )),
    }
}

/// Build an exporter around an existing client
pub async fn create_exporter_with_client<M: MetadataLookup>(
    config: &MetricConfiguration,
    client: Arc<dyn CloudMetricClient>,
    metadata: &M,
) -> Result<MetricExporter, ExporterError> {
    config.validate()?;
    let project_id = resolve_project_id(config, metadata).await?;
    Ok(build_exporter(config, client, project_id))
}

/// Build an exporter writing to Cloud Monitoring with Application Default Credentials
#[cfg(feature = "gcp")]
pub async fn create_exporter(config: &MetricConfiguration) -> Result<MetricExporter, ExporterError> {
    config.validate()?;
    let project_id = resolve_project_id(config, &GcpMetadataClient::new()).await?;

    let client = crate::gcp::HttpMetricClient::from_adc(
        &config.metric_service_endpoint,
        &project_id,
        config.deadline,
    )
    .await?;

    Ok(build_exporter(config, Arc::new(client), project_id))
}

fn build_exporter(
    config: &MetricConfiguration,
    client: Arc<dyn CloudMetricClient>,
    project_id: String,
) -> MetricExporter {
    info!(
        project_id = %project_id,
        prefix = %config.prefix,
        strategy = ?config.descriptor_strategy,
        "Metric exporter created"
    );
    MetricExporter::with_configuration(client, project_id, config)
}

/// Run platform detection against the given sources
pub async fn detect_platform_with<M, E>(metadata: M, env: E) -> DetectedPlatform
where
    M: MetadataLookup,
    E: EnvironmentVariables,
{
    GcpPlatformDetector::new(metadata, env).detect().await.clone()
}

/// Detect the platform from the metadata server and process environment
pub async fn detect_platform() -> DetectedPlatform {
    detect_platform_with(GcpMetadataClient::new(), SystemEnvironment).await
}

/// Detect the platform and describe it as a telemetry resource
pub async fn detect_resource() -> Resource {
    let detected = detect_platform().await;
    GcpResourceBuilder::new(&detected).build()
}
