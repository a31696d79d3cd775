//! Google Cloud resource detection and Cloud Monitoring metric export.
//!
//! The crate has two halves:
//! - [`detection`] works out which GCP platform the process runs on and
//!   describes it as an OpenTelemetry [`Resource`](opentelemetry_sdk::Resource)
//! - [`metric`] turns metric records into Cloud Monitoring time series and
//!   writes them through a [`CloudMetricClient`](metric::CloudMetricClient)
//!
//! [`resource`] connects the two by mapping resource attributes onto a
//! monitored resource type and labels.
//!
//! # Features
//!
//! - `gcp` (default): REST client and Application Default Credentials
//!
//! # Quick Start
//!
//! ```rust,ignore
//! gcp_monitoring_exporter::logging::init_logging(&LogConfig::from_env())?;
//!
//! let config = MetricConfiguration::from_env();
//! let exporter = gcp_monitoring_exporter::api::create_exporter(&config).await?;
//! let provider = SdkMeterProvider::builder()
//!     .with_reader(PeriodicReader::builder(exporter).build())
//!     .with_resource(gcp_monitoring_exporter::detect_resource().await)
//!     .build();
//! ```
//!
//! ## Using the Builder
//!
//! ```rust,ignore
//! let config = MetricConfiguration::builder()
//!     .project_id("my-project")
//!     .prefix("custom.googleapis.com")
//!     .descriptor_strategy(AlwaysSend)
//!     .use_service_time_series(true)
//!     .build();
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `GOOGLE_CLOUD_PROJECT` | Project id (also `GCLOUD_PROJECT`, `GCP_PROJECT`) | metadata server |
//! | `GOOGLE_CLOUD_MONITORING_ENDPOINT` | Monitoring API endpoint | `https://monitoring.googleapis.com` |
//! | `RUST_LOG` | Log level filter | `info` |
//! | `LOG_FORMAT` | `pretty` or `json` | `pretty` |

pub mod api;
pub mod config;
pub mod detection;
pub mod error;
pub mod logging;
pub mod metric;
pub mod resource;

#[cfg(feature = "gcp")]
pub mod gcp;

// Re-exports
pub use api::{detect_platform, detect_resource, resolve_project_id};
#[cfg(feature = "gcp")]
pub use api::create_exporter;
pub use config::{LogConfig, LogFormat, MetricConfiguration, MetricConfigurationBuilder};
pub use error::ExporterError;
pub use metric::{ExportResult, MetricExporter};
