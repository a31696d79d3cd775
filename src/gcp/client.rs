use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::error::ExporterError;
use crate::gcp::auth::GcpAuth;
use crate::metric::client::CloudMetricClient;
use crate::metric::wire::{MetricDescriptor, TimeSeries};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTimeSeriesRequest<'a> {
    time_series: &'a [TimeSeries],
}

/// Cloud Monitoring v3 REST client.
///
/// Keeps a handle to the runtime it was created on. Calls made from a thread
/// with no runtime, such as the SDK's periodic reader thread, run their
/// request on that handle.
pub struct HttpMetricClient {
    http: reqwest::Client,
    endpoint: String,
    auth: Option<Arc<GcpAuth>>,
    runtime: Option<Handle>,
    is_shutdown: AtomicBool,
}

impl HttpMetricClient {
    /// Client authenticated with Application Default Credentials
    pub async fn from_adc(
        endpoint: &str,
        project_id: &str,
        deadline: Duration,
    ) -> Result<Self, ExporterError> {
        let auth = GcpAuth::from_adc(project_id).await?;
        let client = Self::build(endpoint, deadline, Some(Arc::new(auth)))?;
        info!(endpoint, "📤 Cloud Monitoring client ready");
        Ok(client)
    }

    /// Client without credentials, for emulators and local test servers
    pub fn insecure(endpoint: &str, deadline: Duration) -> Result<Self, ExporterError> {
        Self::build(endpoint, deadline, None)
    }

    fn build(endpoint: &str, deadline: Duration, auth: Option<Arc<GcpAuth>>) -> Result<Self, ExporterError> {
        let http = reqwest::Client::builder().timeout(deadline).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            auth,
            runtime: Handle::try_current().ok(),
            is_shutdown: AtomicBool::new(false),
        })
    }

    fn url(&self, project_name: &str, method: &str) -> String {
        format!("{}/v3/{}/{}", self.endpoint, project_name, method)
    }

    async fn post<T: Serialize + ?Sized>(&self, url: String, body: &T) -> Result<(), ExporterError> {
        if self.is_shutdown.load(Ordering::Acquire) {
            return Err(ExporterError::Shutdown);
        }

        let body = serde_json::to_vec(body)
            .map_err(|e| ExporterError::Rpc(format!("Failed to encode request: {}", e)))?;
        let request = send(self.http.clone(), self.auth.clone(), url, body);

        match &self.runtime {
            Some(handle) if Handle::try_current().is_err() => handle
                .spawn(request)
                .await
                .map_err(|e| ExporterError::Rpc(format!("Request task failed: {}", e)))?,
            _ => request.await,
        }
    }
}

async fn send(
    http: reqwest::Client,
    auth: Option<Arc<GcpAuth>>,
    url: String,
    body: Vec<u8>,
) -> Result<(), ExporterError> {
    let mut request = http
        .post(&url)
        .header(CONTENT_TYPE, "application/json")
        .body(body);
    if let Some(auth) = &auth {
        request = request.headers(auth.headers().await?);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(ExporterError::Rpc(format!("{} returned {}: {}", url, status, detail)));
    }
    debug!(url = %url, status = %status, "Cloud Monitoring call succeeded");
    Ok(())
}

#[async_trait]
impl CloudMetricClient for HttpMetricClient {
    async fn create_metric_descriptor(
        &self,
        project_name: &str,
        descriptor: &MetricDescriptor,
    ) -> Result<(), ExporterError> {
        self.post(self.url(project_name, "metricDescriptors"), descriptor)
            .await
    }

    async fn create_time_series(
        &self,
        project_name: &str,
        series: &[TimeSeries],
    ) -> Result<(), ExporterError> {
        let body = CreateTimeSeriesRequest { time_series: series };
        self.post(self.url(project_name, "timeSeries"), &body).await
    }

    async fn create_service_time_series(
        &self,
        project_name: &str,
        series: &[TimeSeries],
    ) -> Result<(), ExporterError> {
        let body = CreateTimeSeriesRequest { time_series: series };
        self.post(self.url(project_name, "timeSeries:createService"), &body)
            .await
    }

    async fn shutdown(&self) -> Result<(), ExporterError> {
        self.is_shutdown.store(true, Ordering::Release);
        debug!("Cloud Monitoring client shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::SystemTime;

    use axum::http::{StatusCode, Uri};
    use axum::Router;
    use parking_lot::Mutex;
    use serde_json::Value;

    use super::*;
    use crate::metric::wire::{Metric, MetricKind, Point, TimeInterval, TypedValue, ValueType};
    use crate::resource::MappedResource;

    type Requests = Arc<Mutex<Vec<(String, Value)>>>;

    async fn spawn_server(status: StatusCode) -> (String, Requests) {
        let requests: Requests = Arc::default();
        let recorded = requests.clone();
        let router = Router::new().fallback(move |uri: Uri, body: String| {
            let recorded = recorded.clone();
            async move {
                let json = serde_json::from_str(&body).unwrap_or(Value::Null);
                recorded.lock().push((uri.path().to_string(), json));
                status
            }
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{addr}"), requests)
    }

    fn series() -> TimeSeries {
        TimeSeries {
            metric: Metric {
                metric_type: "workload.googleapis.com/requests".to_string(),
                labels: BTreeMap::new(),
            },
            resource: MappedResource::new("generic_node", BTreeMap::new()),
            metric_kind: MetricKind::Gauge,
            value_type: ValueType::Int64,
            points: vec![Point {
                interval: TimeInterval::instant(SystemTime::UNIX_EPOCH),
                value: TypedValue::Int64(1),
            }],
        }
    }

    #[tokio::test]
    async fn create_time_series_posts_wrapped_series() {
        let (endpoint, requests) = spawn_server(StatusCode::OK).await;
        let client = HttpMetricClient::insecure(&endpoint, Duration::from_secs(5)).unwrap();

        client
            .create_time_series("projects/my-project", &[series(), series()])
            .await
            .unwrap();

        let requests = requests.lock();
        assert_eq!(requests[0].0, "/v3/projects/my-project/timeSeries");
        assert_eq!(requests[0].1["timeSeries"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn create_service_time_series_uses_create_service_method() {
        let (endpoint, requests) = spawn_server(StatusCode::OK).await;
        let client = HttpMetricClient::insecure(&endpoint, Duration::from_secs(5)).unwrap();

        client
            .create_service_time_series("projects/my-project", &[series()])
            .await
            .unwrap();

        assert_eq!(
            requests.lock()[0].0,
            "/v3/projects/my-project/timeSeries:createService"
        );
    }

    #[tokio::test]
    async fn create_metric_descriptor_posts_descriptor() {
        let (endpoint, requests) = spawn_server(StatusCode::OK).await;
        let client = HttpMetricClient::insecure(&endpoint, Duration::from_secs(5)).unwrap();
        let descriptor = MetricDescriptor {
            metric_type: "workload.googleapis.com/requests".to_string(),
            display_name: "requests".to_string(),
            description: String::new(),
            unit: "1".to_string(),
            metric_kind: MetricKind::Cumulative,
            value_type: ValueType::Int64,
            labels: Vec::new(),
        };

        client
            .create_metric_descriptor("projects/my-project", &descriptor)
            .await
            .unwrap();

        let requests = requests.lock();
        assert_eq!(requests[0].0, "/v3/projects/my-project/metricDescriptors");
        assert_eq!(requests[0].1["metricKind"], "CUMULATIVE");
    }

    #[tokio::test]
    async fn error_status_becomes_rpc_error() {
        let (endpoint, _requests) = spawn_server(StatusCode::SERVICE_UNAVAILABLE).await;
        let client = HttpMetricClient::insecure(&endpoint, Duration::from_secs(5)).unwrap();

        let result = client.create_time_series("projects/p", &[series()]).await;

        assert!(matches!(result, Err(ExporterError::Rpc(message)) if message.contains("503")));
    }

    #[tokio::test]
    async fn calls_from_a_thread_without_runtime_use_creating_runtime() {
        let (endpoint, requests) = spawn_server(StatusCode::OK).await;
        let client = HttpMetricClient::insecure(&endpoint, Duration::from_secs(5)).unwrap();

        let reader_thread = std::thread::spawn(move || {
            futures::executor::block_on(client.create_time_series("projects/p", &[series()]))
        });
        let result = tokio::task::spawn_blocking(move || reader_thread.join())
            .await
            .unwrap()
            .unwrap();

        assert!(result.is_ok());
        assert_eq!(requests.lock()[0].0, "/v3/projects/p/timeSeries");
    }

    #[tokio::test]
    async fn calls_after_shutdown_are_rejected() {
        let (endpoint, requests) = spawn_server(StatusCode::OK).await;
        let client = HttpMetricClient::insecure(&endpoint, Duration::from_secs(5)).unwrap();
        client.shutdown().await.unwrap();

        let result = client.create_time_series("projects/p", &[series()]).await;

        assert!(matches!(result, Err(ExporterError::Shutdown)));
        assert!(requests.lock().is_empty());
    }
}
