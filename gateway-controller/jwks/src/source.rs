use jsonwebtoken::jwk::JwkSet;
use reqwest::{StatusCode, Url};
use std::time::Duration;

/// Bounds a single fetch from a remote JWKS endpoint.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Fetches a complete JSON Web Key Set.
///
/// Implementations make a single attempt; retries are left to the caller.
#[async_trait::async_trait]
pub trait Source: Send + Sync + 'static {
    async fn get_jwks(&self) -> Result<JwkSet, SourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to fetch JWKS: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected JWKS response status: {0}")]
    Status(StatusCode),

    #[error("invalid JWKS document: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Fetches key sets with an HTTP GET against a fixed URI.
#[derive(Clone, Debug)]
pub struct RemoteSource {
    client: reqwest::Client,
    uri: Url,
}

// === impl RemoteSource ===

impl RemoteSource {
    /// Creates a source whose requests time out after [`DEFAULT_TIMEOUT`].
    pub fn new(uri: Url) -> Result<Self, SourceError> {
        Self::with_timeout(uri, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(uri: Url, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, uri })
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }
}

#[async_trait::async_trait]
impl Source for RemoteSource {
    async fn get_jwks(&self) -> Result<JwkSet, SourceError> {
        let rsp = self.client.get(self.uri.clone()).send().await?;

        let status = rsp.status();
        if status != StatusCode::OK {
            return Err(SourceError::Status(status));
        }

        let body = rsp.bytes().await?;
        let jwks = serde_json::from_slice(&body)?;
        tracing::debug!(uri = %self.uri, "Fetched JWKS");
        Ok(jwks)
    }
}
