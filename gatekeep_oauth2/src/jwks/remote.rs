use std::time::Duration;

use async_trait::async_trait;
use gatekeep::Jwks;
use reqwest::Client;

use super::{FetchError, JwksSource};

/// A key set published at a URL, typically the identity provider's
/// `/.well-known/jwks.json`
#[derive(Debug, Clone)]
pub struct RemoteJwks {
    jwks_url: String,
    client: Client,
}

impl RemoteJwks {
    /// The default bound on a single fetch, including connecting and reading
    /// the body
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Fetches from `jwks_url` with the default timeout
    ///
    /// # Errors
    ///
    /// The HTTP client could not be constructed.
    pub fn new(jwks_url: impl Into<String>) -> Result<Self, FetchError> {
        Self::with_timeout(jwks_url, Self::DEFAULT_TIMEOUT)
    }

    /// Fetches from `jwks_url`, giving up after `timeout`
    ///
    /// # Errors
    ///
    /// The HTTP client could not be constructed.
    pub fn with_timeout(jwks_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!("gatekeep_oauth2/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|err| FetchError::Transport(err.into()))?;

        Ok(Self::with_client(jwks_url, client))
    }

    /// Fetches from `jwks_url` using an existing client
    ///
    /// The client's own timeout settings apply.
    #[must_use]
    pub fn with_client(jwks_url: impl Into<String>, client: Client) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            client,
        }
    }

    /// The URL the key set is fetched from
    #[must_use]
    pub fn url(&self) -> &str {
        &self.jwks_url
    }

    #[tracing::instrument(skip(self), fields(jwks.url = %self.jwks_url))]
    async fn get(&self) -> Result<Jwks, FetchError> {
        tracing::debug!("requesting JWKS");

        let response = match self.client.get(&self.jwks_url).send().await {
            Ok(response) => response,
            Err(err) => {
                let error: &dyn std::error::Error = &err;
                tracing::warn!(error, timeout = err.is_timeout(), "JWKS request failed");
                return Err(FetchError::Transport(err.into()));
            }
        };

        let status = response.status();
        if let Err(err) = response.error_for_status_ref() {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(
                error,
                http.status_code = status.as_u16(),
                "JWKS request failed; unexpected response status",
            );
            return Err(FetchError::Status(status.as_u16()));
        }

        match response.json::<Jwks>().await {
            Ok(jwks) => {
                tracing::debug!(jwks.len = jwks.len(), "JWKS received");
                Ok(jwks)
            }
            Err(err) if err.is_timeout() => {
                let error: &dyn std::error::Error = &err;
                tracing::warn!(error, timeout = true, "JWKS request failed");
                Err(FetchError::Transport(err.into()))
            }
            Err(err) => {
                let error: &dyn std::error::Error = &err;
                tracing::warn!(error, "JWKS request failed; unexpected body");
                Err(FetchError::Body(err.into()))
            }
        }
    }
}

#[async_trait]
impl JwksSource for RemoteJwks {
    async fn fetch(&self) -> Result<Jwks, FetchError> {
        self.get().await
    }
}
