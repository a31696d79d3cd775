use std::future::Future;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

/// Base URL of the GCE-style instance metadata server.
pub const METADATA_BASE_URL: &str = "http://metadata.google.internal/computeMetadata/v1/";

const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
const METADATA_FLAVOR_VALUE: &str = "Google";
const METADATA_TIMEOUT: Duration = Duration::from_secs(2);

/// Metadata paths, relative to [`METADATA_BASE_URL`].
pub mod paths {
    pub const PROJECT_ID: &str = "project/project-id";
    pub const ZONE: &str = "instance/zone";
    pub const REGION: &str = "instance/region";
    pub const INSTANCE_ID: &str = "instance/id";
    pub const INSTANCE_NAME: &str = "instance/name";
    pub const MACHINE_TYPE: &str = "instance/machine-type";
    pub const HOSTNAME: &str = "instance/hostname";
    pub const CLUSTER_NAME: &str = "instance/attributes/cluster-name";
    pub const CLUSTER_LOCATION: &str = "instance/attributes/cluster-location";
}

/// Key/value lookup against the instance metadata server.
///
/// A lookup never fails loudly: transport errors, bad status codes and
/// responses without the metadata flavor header all come back as `None`.
pub trait MetadataLookup: Send + Sync {
    fn get(&self, path: &str) -> impl Future<Output = Option<String>> + Send;

    fn project_id(&self) -> impl Future<Output = Option<String>> + Send {
        self.get(paths::PROJECT_ID)
    }

    /// Zone name, e.g. `us-central1-a` from `projects/123/zones/us-central1-a`.
    fn zone(&self) -> impl Future<Output = Option<String>> + Send {
        async move { self.get(paths::ZONE).await.map(|z| last_segment(&z).to_string()) }
    }

    /// Region as reported by the server. Only GAE standard relies on this;
    /// everything else derives the region from the zone.
    fn region(&self) -> impl Future<Output = Option<String>> + Send {
        async move { self.get(paths::REGION).await.map(|r| last_segment(&r).to_string()) }
    }

    fn region_from_zone(&self) -> impl Future<Output = Option<String>> + Send {
        async move { self.zone().await.and_then(|zone| region_from_zone(&zone)) }
    }

    fn machine_type(&self) -> impl Future<Output = Option<String>> + Send {
        async move {
            self.get(paths::MACHINE_TYPE)
                .await
                .map(|m| last_segment(&m).to_string())
        }
    }

    fn instance_id(&self) -> impl Future<Output = Option<String>> + Send {
        self.get(paths::INSTANCE_ID)
    }

    fn instance_name(&self) -> impl Future<Output = Option<String>> + Send {
        self.get(paths::INSTANCE_NAME)
    }

    fn instance_hostname(&self) -> impl Future<Output = Option<String>> + Send {
        self.get(paths::HOSTNAME)
    }

    fn cluster_name(&self) -> impl Future<Output = Option<String>> + Send {
        self.get(paths::CLUSTER_NAME)
    }

    fn cluster_location(&self) -> impl Future<Output = Option<String>> + Send {
        self.get(paths::CLUSTER_LOCATION)
    }
}

/// Everything after the last `/`, or the whole value when there is none.
pub fn last_segment(value: &str) -> &str {
    value.rsplit('/').next().unwrap_or(value)
}

/// Derives `us-central1` from `us-central1-a`.
///
/// Zones with two or fewer dash-separated components are rejected.
pub fn region_from_zone(zone: &str) -> Option<String> {
    if zone.is_empty() {
        return None;
    }
    let parts: Vec<&str> = zone.split('-').collect();
    if parts.len() > 2 {
        Some(format!("{}-{}", parts[0], parts[1]))
    } else {
        None
    }
}

/// HTTP metadata client with a per-path cache.
///
/// The first value resolved for a path is kept for the client's lifetime,
/// empty strings included. Failed lookups are not cached, so attributes that
/// show up late (GKE cluster location, for one) are picked up on a later call.
#[derive(Debug)]
pub struct GcpMetadataClient {
    base_url: String,
    http: reqwest::Client,
    cache: DashMap<String, String>,
}

impl Default for GcpMetadataClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GcpMetadataClient {
    pub fn new() -> Self {
        Self::with_base_url(METADATA_BASE_URL)
    }

    /// Points the client at a different server. `base_url` must end with `/`.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(METADATA_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.into(),
            http,
            cache: DashMap::new(),
        }
    }

    async fn fetch(&self, path: &str) -> Option<String> {
        let url = format!("{}{}", self.base_url, path);
        let response = match self
            .http
            .get(&url)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR_VALUE)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                debug!(path, error = %err, "metadata server unreachable");
                return None;
            }
        };

        if response.status() != reqwest::StatusCode::OK {
            debug!(path, status = %response.status(), "metadata lookup rejected");
            return None;
        }

        let flavor = response
            .headers()
            .get(METADATA_FLAVOR_HEADER)
            .and_then(|value| value.to_str().ok());
        if flavor != Some(METADATA_FLAVOR_VALUE) {
            debug!(path, "metadata response missing flavor header");
            return None;
        }

        let body = response.text().await.ok()?;
        Some(body.lines().next().unwrap_or_default().to_string())
    }
}

impl MetadataLookup for GcpMetadataClient {
    async fn get(&self, path: &str) -> Option<String> {
        let cached = self.cache.get(path).map(|entry| entry.value().clone());
        if cached.is_some() {
            return cached;
        }

        let value = self.fetch(path).await?;
        let kept = self
            .cache
            .entry(path.to_string())
            .or_insert(value)
            .value()
            .clone();
        Some(kept)
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;

    use super::testing::StaticMetadata;
    use super::*;

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/")
    }

    fn flavored(headers: &HeaderMap) -> bool {
        headers
            .get("metadata-flavor")
            .and_then(|v| v.to_str().ok())
            == Some("Google")
    }

    /// Serves `body` at `route`, counting hits.
    fn counting_route(route: &str, body: &'static str, hits: Arc<AtomicUsize>) -> Router {
        Router::new().route(
            route,
            get(move |headers: HeaderMap| {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    if !flavored(&headers) {
                        return StatusCode::FORBIDDEN.into_response();
                    }
                    ([("metadata-flavor", "Google")], body).into_response()
                }
            }),
        )
    }

    #[test]
    fn region_from_zone_drops_zone_suffix() {
        assert_eq!(region_from_zone("us-central1-a").as_deref(), Some("us-central1"));
        assert_eq!(
            region_from_zone("australia-southeast1-b").as_deref(),
            Some("australia-southeast1")
        );
    }

    #[test]
    fn region_from_zone_rejects_short_zones() {
        assert_eq!(region_from_zone("us-central1"), None);
        assert_eq!(region_from_zone("global"), None);
        assert_eq!(region_from_zone(""), None);
    }

    #[test]
    fn last_segment_strips_resource_path() {
        assert_eq!(last_segment("projects/640212054955/zones/us-east1-b"), "us-east1-b");
        assert_eq!(last_segment("e2-medium"), "e2-medium");
    }

    #[tokio::test]
    async fn zone_and_machine_type_use_last_segment() {
        let metadata = StaticMetadata::new(&[
            (paths::ZONE, "projects/1/zones/europe-west4-c"),
            (paths::MACHINE_TYPE, "projects/1/machineTypes/n2-standard-4"),
        ]);

        assert_eq!(metadata.zone().await.as_deref(), Some("europe-west4-c"));
        assert_eq!(metadata.region_from_zone().await.as_deref(), Some("europe-west4"));
        assert_eq!(metadata.machine_type().await.as_deref(), Some("n2-standard-4"));
    }

    #[tokio::test]
    async fn client_returns_first_line_of_flavored_response() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = spawn_server(counting_route(
            "/project/project-id",
            "my-project\ntrailing",
            hits.clone(),
        ))
        .await;
        let client = GcpMetadataClient::with_base_url(base);

        let project = client.project_id().await;

        assert_eq!(project.as_deref(), Some("my-project"));
    }

    #[tokio::test]
    async fn client_caches_resolved_values() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = spawn_server(counting_route("/instance/id", "12345", hits.clone())).await;
        let client = GcpMetadataClient::with_base_url(base);

        assert_eq!(client.instance_id().await.as_deref(), Some("12345"));
        assert_eq!(client.instance_id().await.as_deref(), Some("12345"));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn client_caches_empty_values() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = spawn_server(counting_route(
            "/instance/attributes/cluster-name",
            "",
            hits.clone(),
        ))
        .await;
        let client = GcpMetadataClient::with_base_url(base);

        assert_eq!(client.cluster_name().await.as_deref(), Some(""));
        assert_eq!(client.cluster_name().await.as_deref(), Some(""));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn client_retries_absent_values() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/instance/attributes/cluster-location",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    StatusCode::NOT_FOUND
                }
            }),
        );
        let base = spawn_server(router).await;
        let client = GcpMetadataClient::with_base_url(base);

        assert_eq!(client.cluster_location().await, None);
        assert_eq!(client.cluster_location().await, None);

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn client_rejects_response_without_flavor_header() {
        let router = Router::new().route("/project/project-id", get(|| async { "spoofed" }));
        let base = spawn_server(router).await;
        let client = GcpMetadataClient::with_base_url(base);

        assert_eq!(client.project_id().await, None);
    }

    #[tokio::test]
    async fn client_returns_none_when_server_unreachable() {
        // Port 9 (discard) on loopback is not expected to be listening.
        let client = GcpMetadataClient::with_base_url("http://127.0.0.1:9/");

        assert_eq!(client.project_id().await, None);
    }
}
