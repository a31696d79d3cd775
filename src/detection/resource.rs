use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::{
    CLOUD_ACCOUNT_ID, CLOUD_AVAILABILITY_ZONE, CLOUD_PLATFORM, CLOUD_PROVIDER, CLOUD_REGION,
    FAAS_INSTANCE, FAAS_NAME, FAAS_VERSION, HOST_ID, HOST_NAME, HOST_TYPE, K8S_CLUSTER_NAME,
    K8S_CONTAINER_NAME, K8S_NAMESPACE_NAME, K8S_POD_NAME,
};
use tracing::warn;

use crate::detection::platform::{
    keys, DetectedPlatform, GcpPlatform, GKE_LOCATION_TYPE_REGION, GKE_LOCATION_TYPE_ZONE,
};

/// GCP cloud provider value (semconv)
pub const CLOUD_PROVIDER_GCP: &str = "gcp";

/// Cloud Run job execution name
pub const GCP_CLOUD_RUN_JOB_EXECUTION: &str = "gcp.cloud_run.job.execution";

/// Cloud Run job task index
pub const GCP_CLOUD_RUN_JOB_TASK_INDEX: &str = "gcp.cloud_run.job.task_index";

/// GCE instance hostname
pub const GCP_GCE_INSTANCE_HOSTNAME: &str = "gcp.gce.instance.hostname";

/// GCE instance name
pub const GCP_GCE_INSTANCE_NAME: &str = "gcp.gce.instance.name";

/// Turns a [`DetectedPlatform`] into a telemetry [`Resource`].
pub struct GcpResourceBuilder<'a> {
    detected: &'a DetectedPlatform,
    attrs: Vec<KeyValue>,
}

impl<'a> GcpResourceBuilder<'a> {
    pub fn new(detected: &'a DetectedPlatform) -> Self {
        Self {
            detected,
            attrs: Vec::new(),
        }
    }

    fn copy(&mut self, semconv_key: &'static str, attribute: &str) {
        if let Some(value) = self.detected.attribute(attribute) {
            self.attrs.push(KeyValue::new(semconv_key, value.to_string()));
        }
    }

    /// Builds the resource. An unknown platform yields an empty resource.
    pub fn build(mut self) -> Resource {
        let Some(cloud_platform) = self.detected.platform.cloud_platform() else {
            return Resource::builder_empty().build();
        };

        self.attrs.push(KeyValue::new(CLOUD_PROVIDER, CLOUD_PROVIDER_GCP));
        self.attrs.push(KeyValue::new(CLOUD_PLATFORM, cloud_platform));
        if let Some(project_id) = &self.detected.project_id {
            self.attrs.push(KeyValue::new(CLOUD_ACCOUNT_ID, project_id.clone()));
        }

        match self.detected.platform {
            GcpPlatform::KubernetesEngine => self.add_gke(),
            GcpPlatform::CloudRun | GcpPlatform::CloudFunctions => self.add_serverless(),
            GcpPlatform::CloudRunJob => self.add_cloud_run_job(),
            GcpPlatform::AppEngine => self.add_gae(),
            GcpPlatform::ComputeEngine => self.add_gce(),
            GcpPlatform::Unknown => {}
        }

        Resource::builder_empty().with_attributes(self.attrs).build()
    }

    fn add_gke(&mut self) {
        self.copy(K8S_CLUSTER_NAME, keys::GKE_CLUSTER_NAME);
        self.copy(K8S_POD_NAME, keys::GKE_POD_NAME);
        self.copy(K8S_NAMESPACE_NAME, keys::GKE_NAMESPACE_NAME);
        self.copy(K8S_CONTAINER_NAME, keys::GKE_CONTAINER_NAME);
        self.copy(HOST_ID, keys::INSTANCE_ID);

        let location = self.detected.attribute(keys::GKE_CLUSTER_LOCATION);
        let location_type = self
            .detected
            .attribute(keys::GKE_CLUSTER_LOCATION_TYPE)
            .unwrap_or_default();
        match (location, location_type) {
            (Some(location), GKE_LOCATION_TYPE_REGION) => {
                self.attrs.push(KeyValue::new(CLOUD_REGION, location.to_string()));
            }
            (Some(location), GKE_LOCATION_TYPE_ZONE) => {
                self.attrs
                    .push(KeyValue::new(CLOUD_AVAILABILITY_ZONE, location.to_string()));
            }
            (location, _) => {
                warn!(location = ?location, "Unrecognized GKE cluster location type, dropping location");
            }
        }
    }

    fn add_serverless(&mut self) {
        self.copy(FAAS_NAME, keys::SERVERLESS_COMPUTE_NAME);
        self.copy(FAAS_VERSION, keys::SERVERLESS_COMPUTE_REVISION);
        self.copy(FAAS_INSTANCE, keys::INSTANCE_ID);
        self.copy(CLOUD_AVAILABILITY_ZONE, keys::AVAILABILITY_ZONE);
        self.copy(CLOUD_REGION, keys::CLOUD_REGION);
    }

    fn add_cloud_run_job(&mut self) {
        self.copy(FAAS_NAME, keys::SERVERLESS_COMPUTE_NAME);
        self.copy(FAAS_INSTANCE, keys::INSTANCE_ID);
        self.copy(GCP_CLOUD_RUN_JOB_EXECUTION, keys::GCR_JOB_EXECUTION_KEY);
        self.copy(GCP_CLOUD_RUN_JOB_TASK_INDEX, keys::GCR_JOB_TASK_INDEX);
        self.copy(CLOUD_REGION, keys::CLOUD_REGION);
    }

    fn add_gae(&mut self) {
        self.copy(FAAS_NAME, keys::GAE_MODULE_NAME);
        self.copy(FAAS_VERSION, keys::GAE_APP_VERSION);
        self.copy(FAAS_INSTANCE, keys::INSTANCE_ID);
        self.copy(CLOUD_AVAILABILITY_ZONE, keys::AVAILABILITY_ZONE);
        self.copy(CLOUD_REGION, keys::CLOUD_REGION);
    }

    fn add_gce(&mut self) {
        self.copy(CLOUD_AVAILABILITY_ZONE, keys::AVAILABILITY_ZONE);
        self.copy(CLOUD_REGION, keys::CLOUD_REGION);
        self.copy(HOST_ID, keys::INSTANCE_ID);
        self.copy(HOST_NAME, keys::INSTANCE_NAME);
        self.copy(HOST_TYPE, keys::MACHINE_TYPE);
        self.copy(GCP_GCE_INSTANCE_NAME, keys::INSTANCE_NAME);
        self.copy(GCP_GCE_INSTANCE_HOSTNAME, keys::INSTANCE_HOSTNAME);
    }
}
