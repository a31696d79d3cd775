use opentelemetry_sdk::error::OTelSdkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization error: {0}")]
    Init(String),

    #[error("Unsupported metric kind {kind} for metric {metric}")]
    UnsupportedKind { metric: String, kind: &'static str },

    #[error("Exporter has been shut down")]
    Shutdown,
}

impl From<reqwest::Error> for ExporterError {
    fn from(err: reqwest::Error) -> Self {
        Self::Rpc(err.to_string())
    }
}

#[cfg(feature = "gcp")]
impl From<gcp_auth::Error> for ExporterError {
    fn from(err: gcp_auth::Error) -> Self {
        Self::Auth(err.to_string())
    }
}

impl From<ExporterError> for OTelSdkError {
    fn from(err: ExporterError) -> Self {
        match err {
            ExporterError::Shutdown => OTelSdkError::AlreadyShutdown,
            other => OTelSdkError::InternalFailure(other.to_string()),
        }
    }
}
