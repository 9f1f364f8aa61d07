//! Sources of the identity provider's JSON Web Key Set

use std::{error::Error as StdError, fmt, sync::Arc};

use async_trait::async_trait;
use gatekeep::Jwks;
use thiserror::Error;

#[cfg(feature = "reqwest")]
mod remote;

#[cfg(feature = "reqwest")]
pub use remote::RemoteJwks;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// An error retrieving a key set
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request could not be completed, including on timeout
    #[error("JWKS request failed")]
    Transport(#[source] BoxError),

    /// The endpoint responded with an unsuccessful status code
    #[error("JWKS endpoint responded with status {0}")]
    Status(u16),

    /// The response body was not a key set
    #[error("JWKS response was not a valid key set")]
    Body(#[source] BoxError),
}

/// A place from which the current key set can be fetched
#[async_trait]
pub trait JwksSource: fmt::Debug + Send + Sync {
    /// Fetches the complete, current key set
    ///
    /// # Errors
    ///
    /// The key set could not be retrieved.
    async fn fetch(&self) -> Result<Jwks, FetchError>;
}

#[async_trait]
impl<T: JwksSource + ?Sized> JwksSource for Arc<T> {
    async fn fetch(&self) -> Result<Jwks, FetchError> {
        T::fetch(self).await
    }
}

#[async_trait]
impl<T: JwksSource + ?Sized> JwksSource for Box<T> {
    async fn fetch(&self) -> Result<Jwks, FetchError> {
        T::fetch(self).await
    }
}

/// A fixed key set held in memory
#[derive(Clone, Debug, Default)]
pub struct StaticJwks(Jwks);

impl StaticJwks {
    /// Serves `jwks` on every fetch
    #[must_use]
    pub fn new(jwks: Jwks) -> Self {
        Self(jwks)
    }
}

impl From<Jwks> for StaticJwks {
    fn from(jwks: Jwks) -> Self {
        Self(jwks)
    }
}

#[async_trait]
impl JwksSource for StaticJwks {
    async fn fetch(&self) -> Result<Jwks, FetchError> {
        Ok(self.0.clone())
    }
}
