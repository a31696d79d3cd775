use std::sync::Arc;
use std::time::Duration;

use crate::detection::env::{EnvironmentVariables, SystemEnvironment};
use crate::error::ExporterError;
use crate::metric::descriptor::DEFAULT_PREFIX;
use crate::metric::strategy::{MetricDescriptorStrategy, SendOnce};
use crate::resource::MonitoredResourceDescription;

/// Default Cloud Monitoring endpoint
pub const DEFAULT_METRIC_SERVICE_ENDPOINT: &str = "https://monitoring.googleapis.com";

/// Default deadline for a single Cloud Monitoring call
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(10);

const PROJECT_ENV_VARS: [&str; 3] = ["GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT", "GCP_PROJECT"];

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Pretty human-readable format with colors (for local dev)
    #[default]
    Pretty,
    /// JSON structured format for Cloud Logging
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl LogConfig {
    /// Reads `RUST_LOG` and `LOG_FORMAT` (`json` or `pretty`).
    pub fn from_env() -> Self {
        Self::from_env_vars(&SystemEnvironment)
    }

    pub fn from_env_vars(env: &impl EnvironmentVariables) -> Self {
        let log_format = match env.get("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Self {
            log_level: env.get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            log_format,
        }
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }
}

/// Metric exporter configuration
#[derive(Debug, Clone)]
pub struct MetricConfiguration {
    /// Target project. Resolved from the metadata server when `None`.
    pub project_id: Option<String>,
    pub prefix: String,
    pub descriptor_strategy: Arc<dyn MetricDescriptorStrategy>,
    pub use_service_time_series: bool,
    pub metric_service_endpoint: String,
    pub deadline: Duration,
    pub monitored_resource_description: Option<MonitoredResourceDescription>,
}

impl Default for MetricConfiguration {
    fn default() -> Self {
        Self {
            project_id: None,
            prefix: DEFAULT_PREFIX.to_string(),
            descriptor_strategy: Arc::new(SendOnce::new()),
            use_service_time_series: false,
            metric_service_endpoint: DEFAULT_METRIC_SERVICE_ENDPOINT.to_string(),
            deadline: DEFAULT_DEADLINE,
            monitored_resource_description: None,
        }
    }
}

impl MetricConfiguration {
    pub fn builder() -> MetricConfigurationBuilder {
        MetricConfigurationBuilder::default()
    }

    /// Create from environment variables
    /// - GOOGLE_CLOUD_PROJECT / GCLOUD_PROJECT / GCP_PROJECT for project_id
    /// - GOOGLE_CLOUD_MONITORING_ENDPOINT for the endpoint
    pub fn from_env() -> Self {
        Self::from_env_vars(&SystemEnvironment)
    }

    pub fn from_env_vars(env: &impl EnvironmentVariables) -> Self {
        let project_id = PROJECT_ENV_VARS
            .iter()
            .find_map(|key| env.get(key))
            .filter(|id| !id.is_empty());

        Self {
            project_id,
            metric_service_endpoint: env
                .get("GOOGLE_CLOUD_MONITORING_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_METRIC_SERVICE_ENDPOINT.to_string()),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ExporterError> {
        if matches!(self.project_id.as_deref(), Some("")) {
            return Err(ExporterError::Config("project id must not be empty".to_string()));
        }
        if self.deadline.is_zero() {
            return Err(ExporterError::Config("deadline must be positive".to_string()));
        }
        if self.metric_service_endpoint.is_empty() {
            return Err(ExporterError::Config(
                "metric service endpoint must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MetricConfigurationBuilder {
    project_id: Option<String>,
    prefix: Option<String>,
    descriptor_strategy: Option<Arc<dyn MetricDescriptorStrategy>>,
    use_service_time_series: Option<bool>,
    metric_service_endpoint: Option<String>,
    deadline: Option<Duration>,
    monitored_resource_description: Option<MonitoredResourceDescription>,
}

impl MetricConfigurationBuilder {
    pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn descriptor_strategy(mut self, strategy: impl MetricDescriptorStrategy + 'static) -> Self {
        self.descriptor_strategy = Some(Arc::new(strategy));
        self
    }

    pub fn use_service_time_series(mut self, enabled: bool) -> Self {
        self.use_service_time_series = Some(enabled);
        self
    }

    pub fn metric_service_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.metric_service_endpoint = Some(endpoint.into());
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn monitored_resource_description(mut self, description: MonitoredResourceDescription) -> Self {
        self.monitored_resource_description = Some(description);
        self
    }

    pub fn build(self) -> MetricConfiguration {
        let defaults = MetricConfiguration::default();
        MetricConfiguration {
            project_id: self.project_id,
            prefix: self.prefix.unwrap_or(defaults.prefix),
            descriptor_strategy: self.descriptor_strategy.unwrap_or(defaults.descriptor_strategy),
            use_service_time_series: self
                .use_service_time_series
                .unwrap_or(defaults.use_service_time_series),
            metric_service_endpoint: self
                .metric_service_endpoint
                .unwrap_or(defaults.metric_service_endpoint),
            deadline: self.deadline.unwrap_or(defaults.deadline),
            monitored_resource_description: self.monitored_resource_description,
        }
    }
}
