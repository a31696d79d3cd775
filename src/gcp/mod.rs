//! Cloud Monitoring REST sink.
//!
//! [`HttpMetricClient`] implements [`CloudMetricClient`](crate::metric::CloudMetricClient)
//! against the public v3 REST API, authenticated with Application Default
//! Credentials.
//!
//! # Example
//!
//! ```rust,ignore
//! use gcp_monitoring_exporter::gcp::HttpMetricClient;
//!
//! let client = HttpMetricClient::from_adc(
//!     "https://monitoring.googleapis.com",
//!     "my-project-id",
//!     Duration::from_secs(10),
//! )
//! .await?;
//! ```
//!
//! # Endpoints
//!
//! | Call | Endpoint |
//! |------|----------|
//! | `create_metric_descriptor` | `POST /v3/projects/{id}/metricDescriptors` |
//! | `create_time_series` | `POST /v3/projects/{id}/timeSeries` |
//! | `create_service_time_series` | `POST /v3/projects/{id}/timeSeries:createService` |

mod auth;
mod client;

pub use auth::GcpAuth;
pub use client::HttpMetricClient;
