use std::sync::Arc;

use gcp_auth::TokenProvider;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

use crate::error::ExporterError;

const MONITORING_SCOPE: &str = "https://www.googleapis.com/auth/monitoring.write";
const USER_PROJECT_HEADER: &str = "x-goog-user-project";

/// Request headers from Application Default Credentials
pub struct GcpAuth {
    provider: Arc<dyn TokenProvider>,
    project_id: String,
}

impl GcpAuth {
    /// Create auth from Application Default Credentials
    pub async fn from_adc(project_id: &str) -> Result<Self, ExporterError> {
        let provider = gcp_auth::provider()
            .await
            .map_err(|e| ExporterError::Auth(format!("Failed to create auth provider: {}", e)))?;

        Ok(Self {
            provider,
            project_id: project_id.to_string(),
        })
    }

    /// Fresh headers for one request. The provider caches and refreshes the
    /// underlying token.
    pub async fn headers(&self) -> Result<HeaderMap, ExporterError> {
        let token = self
            .provider
            .token(&[MONITORING_SCOPE])
            .await
            .map_err(|e| ExporterError::Auth(format!("Failed to get token: {}", e)))?;

        authorization_headers(token.as_str(), &self.project_id)
    }
}

pub(crate) fn authorization_headers(token: &str, project_id: &str) -> Result<HeaderMap, ExporterError> {
    let mut headers = HeaderMap::new();

    headers.insert(
        AUTHORIZATION,
        HeaderValue::try_from(format!("Bearer {}", token))
            .map_err(|e| ExporterError::Auth(format!("Invalid token format: {}", e)))?,
    );

    if !project_id.is_empty() {
        headers.insert(
            USER_PROJECT_HEADER,
            HeaderValue::try_from(project_id)
                .map_err(|e| ExporterError::Auth(format!("Invalid project ID: {}", e)))?,
        );
    }

    Ok(headers)
}
