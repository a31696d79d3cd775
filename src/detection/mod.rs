//! Google Cloud platform detection.
//!
//! Detection combines two sources:
//! - the process environment ([`EnvironmentVariables`]), which carries the
//!   platform signals (`KUBERNETES_SERVICE_HOST`, `K_CONFIGURATION`,
//!   `FUNCTION_TARGET`, `CLOUD_RUN_JOB`, `GAE_SERVICE`) and per-platform details
//! - the instance metadata server ([`MetadataLookup`]), which carries the
//!   project id, zone, instance identity and GKE cluster attributes
//!
//! # Example
//!
//! ```ignore
//! use gcp_monitoring_exporter::detection::{GcpMetadataClient, GcpPlatformDetector, SystemEnvironment};
//!
//! let detector = GcpPlatformDetector::new(GcpMetadataClient::new(), SystemEnvironment);
//! let detected = detector.detect().await;
//! let resource = GcpResourceBuilder::new(detected).build();
//! ```

pub mod env;
pub mod metadata;
pub mod platform;
pub mod resource;

pub use env::{EnvironmentVariables, SystemEnvironment};
pub use metadata::{region_from_zone, GcpMetadataClient, MetadataLookup, METADATA_BASE_URL};
pub use platform::{classify, DetectedPlatform, GcpPlatform, GcpPlatformDetector};
pub use resource::GcpResourceBuilder;
