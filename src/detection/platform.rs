use std::collections::BTreeMap;

use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::detection::env::EnvironmentVariables;
use crate::detection::metadata::MetadataLookup;

/// Keys of the flat attribute map carried by [`DetectedPlatform`].
pub mod keys {
    pub const AVAILABILITY_ZONE: &str = "availability_zone";
    pub const CLOUD_REGION: &str = "cloud_region";
    pub const INSTANCE_ID: &str = "instance_id";
    pub const INSTANCE_NAME: &str = "instance_name";
    pub const MACHINE_TYPE: &str = "machine_type";
    pub const INSTANCE_HOSTNAME: &str = "instance_hostname";

    pub const GKE_CLUSTER_NAME: &str = "gke_cluster_name";
    pub const GKE_CLUSTER_LOCATION: &str = "gke_cluster_location";
    pub const GKE_CLUSTER_LOCATION_TYPE: &str = "gke_cluster_location_type";
    pub const GKE_POD_NAME: &str = "gke_pod_name";
    pub const GKE_NAMESPACE_NAME: &str = "gke_namespace_name";
    pub const GKE_CONTAINER_NAME: &str = "gke_container_name";

    pub const GAE_MODULE_NAME: &str = "gae_module_name";
    pub const GAE_APP_VERSION: &str = "gae_app_version";

    pub const SERVERLESS_COMPUTE_NAME: &str = "serverless_compute_name";
    pub const SERVERLESS_COMPUTE_REVISION: &str = "serverless_compute_revision";

    pub const GCR_JOB_EXECUTION_KEY: &str = "gcr_job_execution_key";
    pub const GCR_JOB_TASK_INDEX: &str = "gcr_job_task_index";
}

/// Values of [`keys::GKE_CLUSTER_LOCATION_TYPE`].
pub const GKE_LOCATION_TYPE_ZONE: &str = "ZONE";
pub const GKE_LOCATION_TYPE_REGION: &str = "REGION";

/// Google Cloud compute platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GcpPlatform {
    ComputeEngine,
    KubernetesEngine,
    AppEngine,
    CloudRun,
    CloudRunJob,
    CloudFunctions,
    Unknown,
}

impl GcpPlatform {
    /// Returns the `cloud.platform` semantic convention value.
    ///
    /// Cloud Run jobs share the Cloud Run value.
    pub fn cloud_platform(&self) -> Option<&'static str> {
        match self {
            Self::ComputeEngine => Some("gcp_compute_engine"),
            Self::KubernetesEngine => Some("gcp_kubernetes_engine"),
            Self::AppEngine => Some("gcp_app_engine"),
            Self::CloudRun | Self::CloudRunJob => Some("gcp_cloud_run"),
            Self::CloudFunctions => Some("gcp_cloud_functions"),
            Self::Unknown => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ComputeEngine => "GCE",
            Self::KubernetesEngine => "GKE",
            Self::AppEngine => "GAE",
            Self::CloudRun => "CloudRun",
            Self::CloudRunJob => "CloudRunJob",
            Self::CloudFunctions => "CloudFunctions",
            Self::Unknown => "Unknown",
        }
    }
}

/// Outcome of a detection run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedPlatform {
    pub platform: GcpPlatform,
    pub project_id: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

impl DetectedPlatform {
    pub fn unknown() -> Self {
        Self {
            platform: GcpPlatform::Unknown,
            project_id: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Picks the platform from environment signals alone.
///
/// The checks run in a fixed order. GKE wins over everything else, and a
/// function target wins over a Cloud Run configuration because Cloud
/// Functions gen2 sets both.
pub fn classify(env: &impl EnvironmentVariables) -> GcpPlatform {
    if env.contains("KUBERNETES_SERVICE_HOST") {
        GcpPlatform::KubernetesEngine
    } else if env.contains("K_CONFIGURATION") && !env.contains("FUNCTION_TARGET") {
        GcpPlatform::CloudRun
    } else if env.contains("FUNCTION_TARGET") {
        GcpPlatform::CloudFunctions
    } else if env.contains("CLOUD_RUN_JOB") {
        GcpPlatform::CloudRunJob
    } else if env.contains("GAE_SERVICE") {
        GcpPlatform::AppEngine
    } else {
        GcpPlatform::ComputeEngine
    }
}

/// Classifies a GKE cluster location by counting dashes.
///
/// `us-central1-a` is a zone, `us-central1` a region, anything else is
/// undefined and maps to an empty string.
pub fn gke_location_type(location: &str) -> &'static str {
    match location.matches('-').count() {
        2 => GKE_LOCATION_TYPE_ZONE,
        1 => GKE_LOCATION_TYPE_REGION,
        _ => "",
    }
}

fn insert(attributes: &mut BTreeMap<String, String>, key: &str, value: Option<String>) {
    if let Some(value) = value {
        attributes.insert(key.to_string(), value);
    }
}

/// Detects the platform once and keeps the result for its own lifetime.
///
/// [`GcpPlatformDetector::new`] defers detection until the first
/// [`detect`](GcpPlatformDetector::detect) call. [`GcpPlatformDetector::detect_now`]
/// runs it before returning.
pub struct GcpPlatformDetector<M, E> {
    metadata: M,
    env: E,
    detected: OnceCell<DetectedPlatform>,
}

impl<M, E> GcpPlatformDetector<M, E>
where
    M: MetadataLookup,
    E: EnvironmentVariables,
{
    pub fn new(metadata: M, env: E) -> Self {
        Self {
            metadata,
            env,
            detected: OnceCell::new(),
        }
    }

    /// Builds a detector and runs detection before returning it.
    pub async fn detect_now(metadata: M, env: E) -> Self {
        let detector = Self::new(metadata, env);
        detector.detect().await;
        detector
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    /// Returns the detected platform. Detection runs on the first call unless
    /// the detector came from `detect_now`.
    pub async fn detect(&self) -> &DetectedPlatform {
        self.detected.get_or_init(|| self.run_detection()).await
    }

    async fn run_detection(&self) -> DetectedPlatform {
        let project_id = match self.metadata.project_id().await {
            Some(id) if !id.is_empty() => id,
            _ => {
                debug!("No project id from metadata server, platform is unknown");
                return DetectedPlatform::unknown();
            }
        };

        let platform = classify(&self.env);
        let attributes = match platform {
            GcpPlatform::KubernetesEngine => self.gke_attributes().await,
            GcpPlatform::CloudRun | GcpPlatform::CloudFunctions => {
                self.serverless_attributes().await
            }
            GcpPlatform::CloudRunJob => self.cloud_run_job_attributes().await,
            GcpPlatform::AppEngine => self.gae_attributes().await,
            GcpPlatform::ComputeEngine => self.gce_attributes().await,
            GcpPlatform::Unknown => BTreeMap::new(),
        };

        info!(
            platform = platform.name(),
            project_id = %project_id,
            attributes = attributes.len(),
            "Detected GCP platform"
        );

        DetectedPlatform {
            platform,
            project_id: Some(project_id),
            attributes,
        }
    }

    async fn gke_attributes(&self) -> BTreeMap<String, String> {
        let mut attrs = BTreeMap::new();
        let location = self.metadata.cluster_location().await;
        let location_type = gke_location_type(location.as_deref().unwrap_or_default());

        insert(&mut attrs, keys::INSTANCE_ID, self.metadata.instance_id().await);
        insert(&mut attrs, keys::GKE_CLUSTER_NAME, self.metadata.cluster_name().await);
        insert(&mut attrs, keys::GKE_CLUSTER_LOCATION, location);
        insert(
            &mut attrs,
            keys::GKE_CLUSTER_LOCATION_TYPE,
            Some(location_type.to_string()),
        );
        insert(
            &mut attrs,
            keys::GKE_POD_NAME,
            self.env.get("POD_NAME").or_else(|| self.env.get("HOSTNAME")),
        );
        insert(&mut attrs, keys::GKE_NAMESPACE_NAME, self.env.get("NAMESPACE"));
        insert(&mut attrs, keys::GKE_CONTAINER_NAME, self.env.get("CONTAINER_NAME"));
        attrs
    }

    async fn serverless_attributes(&self) -> BTreeMap<String, String> {
        let mut attrs = BTreeMap::new();
        insert(&mut attrs, keys::SERVERLESS_COMPUTE_NAME, self.env.get("K_SERVICE"));
        insert(&mut attrs, keys::SERVERLESS_COMPUTE_REVISION, self.env.get("K_REVISION"));
        insert(&mut attrs, keys::AVAILABILITY_ZONE, self.metadata.zone().await);
        insert(&mut attrs, keys::CLOUD_REGION, self.metadata.region_from_zone().await);
        insert(&mut attrs, keys::INSTANCE_ID, self.metadata.instance_id().await);
        attrs
    }

    async fn cloud_run_job_attributes(&self) -> BTreeMap<String, String> {
        let mut attrs = BTreeMap::new();
        insert(&mut attrs, keys::SERVERLESS_COMPUTE_NAME, self.env.get("CLOUD_RUN_JOB"));
        insert(
            &mut attrs,
            keys::GCR_JOB_EXECUTION_KEY,
            self.env.get("CLOUD_RUN_EXECUTION"),
        );
        insert(
            &mut attrs,
            keys::GCR_JOB_TASK_INDEX,
            self.env.get("CLOUD_RUN_TASK_INDEX"),
        );
        insert(&mut attrs, keys::INSTANCE_ID, self.metadata.instance_id().await);
        insert(&mut attrs, keys::CLOUD_REGION, self.metadata.region_from_zone().await);
        attrs
    }

    async fn gae_attributes(&self) -> BTreeMap<String, String> {
        let mut attrs = BTreeMap::new();
        let region = if self.env.get("GAE_ENV").as_deref() == Some("standard") {
            self.metadata.region().await
        } else {
            self.metadata.region_from_zone().await
        };

        insert(&mut attrs, keys::GAE_MODULE_NAME, self.env.get("GAE_SERVICE"));
        insert(&mut attrs, keys::GAE_APP_VERSION, self.env.get("GAE_VERSION"));
        insert(&mut attrs, keys::INSTANCE_ID, self.env.get("GAE_INSTANCE"));
        insert(&mut attrs, keys::AVAILABILITY_ZONE, self.metadata.zone().await);
        insert(&mut attrs, keys::CLOUD_REGION, region);
        attrs
    }

    async fn gce_attributes(&self) -> BTreeMap<String, String> {
        let mut attrs = BTreeMap::new();
        insert(&mut attrs, keys::AVAILABILITY_ZONE, self.metadata.zone().await);
        insert(&mut attrs, keys::CLOUD_REGION, self.metadata.region_from_zone().await);
        insert(&mut attrs, keys::INSTANCE_ID, self.metadata.instance_id().await);
        insert(&mut attrs, keys::INSTANCE_NAME, self.metadata.instance_name().await);
        insert(
            &mut attrs,
            keys::INSTANCE_HOSTNAME,
            self.metadata.instance_hostname().await,
        );
        insert(&mut attrs, keys::MACHINE_TYPE, self.metadata.machine_type().await);
        attrs
    }
}
