//! Monitored resource mapping.
//!
//! Translates a telemetry resource's semantic attributes into the
//! `(type, labels)` pair Cloud Monitoring uses to identify the entity that
//! produced a time series.

use std::collections::BTreeMap;

use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::{
    CLOUD_ACCOUNT_ID, CLOUD_AVAILABILITY_ZONE, CLOUD_PLATFORM, CLOUD_REGION, FAAS_INSTANCE,
    FAAS_NAME, FAAS_VERSION, HOST_ID, HOST_NAME, K8S_CLUSTER_NAME, K8S_CONTAINER_NAME,
    K8S_NAMESPACE_NAME, K8S_NODE_NAME, K8S_POD_NAME, SERVICE_INSTANCE_ID, SERVICE_NAME,
    SERVICE_NAMESPACE,
};
use serde::Serialize;

/// Prefix of the `service.name` the SDK generates when none is configured.
const UNKNOWN_SERVICE_PREFIX: &str = "unknown_service";

/// One label rule: the first present candidate key wins, then the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeMapping {
    pub label: &'static str,
    pub keys: &'static [&'static str],
    pub fallback: Option<&'static str>,
}

impl AttributeMapping {
    const fn new(label: &'static str, keys: &'static [&'static str]) -> Self {
        Self {
            label,
            keys,
            fallback: None,
        }
    }

    const fn or(label: &'static str, keys: &'static [&'static str], fallback: &'static str) -> Self {
        Self {
            label,
            keys,
            fallback: Some(fallback),
        }
    }

    /// Resolves the label value, or `None` when the label should be omitted.
    ///
    /// A placeholder `service.name` is passed over in favor of the next
    /// candidate but still used if nothing else resolves.
    pub fn resolve(&self, attributes: &BTreeMap<String, String>) -> Option<String> {
        for key in self.keys {
            if let Some(value) = attributes.get(*key) {
                if *key == SERVICE_NAME && value.starts_with(UNKNOWN_SERVICE_PREFIX) {
                    continue;
                }
                return Some(value.clone());
            }
        }

        if self.keys.contains(&SERVICE_NAME) {
            if let Some(value) = attributes.get(SERVICE_NAME) {
                return Some(value.clone());
            }
        }

        self.fallback.map(str::to_string)
    }
}

const LOCATION_KEYS: &[&str] = &[CLOUD_AVAILABILITY_ZONE, CLOUD_REGION];

static GCE_INSTANCE: &[AttributeMapping] = &[
    AttributeMapping::new("zone", &[CLOUD_AVAILABILITY_ZONE]),
    AttributeMapping::new("instance_id", &[HOST_ID]),
];

static K8S_CONTAINER: &[AttributeMapping] = &[
    AttributeMapping::or("location", LOCATION_KEYS, "global"),
    AttributeMapping::new("cluster_name", &[K8S_CLUSTER_NAME]),
    AttributeMapping::or("namespace_name", &[K8S_NAMESPACE_NAME], ""),
    AttributeMapping::new("pod_name", &[K8S_POD_NAME]),
    AttributeMapping::new("container_name", &[K8S_CONTAINER_NAME]),
];

static K8S_POD: &[AttributeMapping] = &[
    AttributeMapping::or("location", LOCATION_KEYS, "global"),
    AttributeMapping::new("cluster_name", &[K8S_CLUSTER_NAME]),
    AttributeMapping::or("namespace_name", &[K8S_NAMESPACE_NAME], ""),
    AttributeMapping::new("pod_name", &[K8S_POD_NAME]),
];

static K8S_NODE: &[AttributeMapping] = &[
    AttributeMapping::or("location", LOCATION_KEYS, "global"),
    AttributeMapping::new("cluster_name", &[K8S_CLUSTER_NAME]),
    AttributeMapping::new("node_name", &[K8S_NODE_NAME]),
];

static K8S_CLUSTER: &[AttributeMapping] = &[
    AttributeMapping::or("location", LOCATION_KEYS, "global"),
    AttributeMapping::new("cluster_name", &[K8S_CLUSTER_NAME]),
];

static AWS_EC2_INSTANCE: &[AttributeMapping] = &[
    AttributeMapping::new("instance_id", &[HOST_ID]),
    AttributeMapping::new("region", &[CLOUD_AVAILABILITY_ZONE]),
    AttributeMapping::new("aws_account", &[CLOUD_ACCOUNT_ID]),
];

static GAE_INSTANCE: &[AttributeMapping] = &[
    AttributeMapping::new("module_id", &[FAAS_NAME]),
    AttributeMapping::new("version_id", &[FAAS_VERSION]),
    AttributeMapping::new("instance_id", &[FAAS_INSTANCE]),
    AttributeMapping::new("location", &[CLOUD_REGION]),
];

static GENERIC_TASK: &[AttributeMapping] = &[
    AttributeMapping::or("location", LOCATION_KEYS, "global"),
    AttributeMapping::or("namespace", &[SERVICE_NAMESPACE], ""),
    AttributeMapping::or("job", &[SERVICE_NAME, FAAS_NAME], ""),
    AttributeMapping::or("task_id", &[SERVICE_INSTANCE_ID, FAAS_INSTANCE], ""),
];

static GENERIC_NODE: &[AttributeMapping] = &[
    AttributeMapping::or("location", LOCATION_KEYS, "global"),
    AttributeMapping::or("namespace", &[SERVICE_NAMESPACE], ""),
    AttributeMapping::or("node_id", &[HOST_ID, HOST_NAME], ""),
];

/// A monitored resource: type plus labels. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MappedResource {
    #[serde(rename = "type")]
    resource_type: String,
    labels: BTreeMap<String, String>,
}

impl MappedResource {
    pub fn new(resource_type: impl Into<String>, labels: BTreeMap<String, String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            labels,
        }
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }
}

/// A user-chosen monitored resource type.
///
/// Each label is copied from the resource attribute with the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredResourceDescription {
    pub resource_type: String,
    pub labels: Vec<String>,
}

impl MonitoredResourceDescription {
    pub fn new<I, S>(resource_type: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resource_type: resource_type.into(),
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn map(&self, attributes: &BTreeMap<String, String>) -> MappedResource {
        let labels = self
            .labels
            .iter()
            .filter_map(|label| attributes.get(label).map(|v| (label.clone(), v.clone())))
            .collect();
        MappedResource::new(self.resource_type.clone(), labels)
    }
}

/// Flattens a telemetry resource into string attributes.
pub fn resource_attributes(resource: &Resource) -> BTreeMap<String, String> {
    resource
        .iter()
        .map(|(key, value)| (key.as_str().to_string(), value.as_str().into_owned()))
        .collect()
}

/// Picks the monitored resource type and its label table.
fn select_table(attributes: &BTreeMap<String, String>) -> (&'static str, &'static [AttributeMapping]) {
    match attributes.get(CLOUD_PLATFORM).map(String::as_str) {
        Some("gcp_compute_engine") => return ("gce_instance", GCE_INSTANCE),
        Some("aws_ec2") => return ("aws_ec2_instance", AWS_EC2_INSTANCE),
        Some("gcp_app_engine") => return ("gae_instance", GAE_INSTANCE),
        _ => {}
    }

    if attributes.contains_key(K8S_CLUSTER_NAME) {
        return if attributes.contains_key(K8S_CONTAINER_NAME) {
            ("k8s_container", K8S_CONTAINER)
        } else if attributes.contains_key(K8S_POD_NAME) {
            ("k8s_pod", K8S_POD)
        } else if attributes.contains_key(K8S_NODE_NAME) {
            ("k8s_node", K8S_NODE)
        } else {
            ("k8s_cluster", K8S_CLUSTER)
        };
    }

    let has_job = attributes.contains_key(SERVICE_NAME) || attributes.contains_key(FAAS_NAME);
    let has_task =
        attributes.contains_key(SERVICE_INSTANCE_ID) || attributes.contains_key(FAAS_INSTANCE);
    if has_job && has_task {
        ("generic_task", GENERIC_TASK)
    } else {
        ("generic_node", GENERIC_NODE)
    }
}

/// Maps resource attributes to a monitored resource.
pub fn map_resource(attributes: &BTreeMap<String, String>) -> MappedResource {
    let (resource_type, table) = select_table(attributes);
    let labels = table
        .iter()
        .filter_map(|mapping| {
            mapping
                .resolve(attributes)
                .map(|value| (mapping.label.to_string(), value))
        })
        .collect();
    MappedResource::new(resource_type, labels)
}
