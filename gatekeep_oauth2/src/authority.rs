use std::sync::Arc;

use gatekeep::{
    clock::{Clock, System},
    jwa,
    jwt::{self, CoreClaims},
    JwtRef,
};
use serde::Deserialize;

#[cfg(feature = "reqwest")]
use crate::{FetchError, RemoteJwks};
use crate::{
    guard, AuthError, AuthErrorKind, AuthorityConfig, HasPermissions, JwksSource, KeySetCache,
    PermissionPolicy,
};

#[derive(Debug)]
struct Inner {
    cache: KeySetCache,
    validator: jwt::CoreValidator,
    algorithm: jwa::Algorithm,
    clock: Arc<dyn Clock>,
}

/// Verifies bearer tokens against an identity provider's signing keys
///
/// Cloning the authority is cheap and every clone shares the same key set
/// cache.
#[derive(Debug, Clone)]
#[must_use]
pub struct Authority {
    inner: Arc<Inner>,
}

impl Authority {
    /// Constructs an authority that resolves keys through `cache` and accepts
    /// only tokens signed with `algorithm` that pass `validator`
    ///
    /// `validator` should approve `algorithm`; tokens declaring any other
    /// algorithm are rejected before a key is resolved.
    pub fn new(
        cache: KeySetCache,
        algorithm: jwa::Algorithm,
        validator: jwt::CoreValidator,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                validator,
                algorithm,
                clock: Arc::new(System),
            }),
        }
    }

    /// Constructs an authority for `config` that fetches keys from `source`
    pub fn from_source(source: impl JwksSource + 'static, config: &AuthorityConfig) -> Self {
        Self::new(
            KeySetCache::new(source),
            config.algorithm,
            config.validator(),
        )
    }

    /// Constructs an authority for `config` that fetches keys from the
    /// identity provider's published JWKS
    ///
    /// Keys are fetched on first use, not during construction.
    ///
    /// # Errors
    ///
    /// The HTTP client could not be constructed.
    #[cfg(feature = "reqwest")]
    #[cfg_attr(docsrs, doc(cfg(feature = "reqwest")))]
    pub fn from_config(config: &AuthorityConfig) -> Result<Self, FetchError> {
        let source = RemoteJwks::with_timeout(config.jwks_url(), config.jwks_timeout)?;
        tracing::debug!(jwks.url = source.url(), "configured remote JWKS");
        Ok(Self::from_source(source, config))
    }

    /// Evaluates time-bound claims against `clock` instead of the system
    /// clock
    pub fn with_clock(self, clock: impl Clock + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache: self.inner.cache.clone(),
                validator: self.inner.validator.clone(),
                algorithm: self.inner.algorithm,
                clock: Arc::new(clock),
            }),
        }
    }

    /// The cache of signing keys
    pub fn cache(&self) -> &KeySetCache {
        &self.inner.cache
    }

    /// Verifies the token and decodes its claims
    ///
    /// The header is decoded first to find the key identifier and algorithm.
    /// The signature is then verified with the resolved key before the
    /// payload is decoded and its registered claims are checked.
    ///
    /// # Errors
    ///
    /// * [`InvalidHeader`][AuthErrorKind::InvalidHeader]: the header segment
    ///   is absent, undecodable, or names no key
    /// * [`InvalidToken`][AuthErrorKind::InvalidToken]: the algorithm is not
    ///   the configured one, or the payload or signature cannot be decoded,
    ///   or the signature does not match
    /// * [`KeySetUnavailable`][AuthErrorKind::KeySetUnavailable] and
    ///   [`UnknownKey`][AuthErrorKind::UnknownKey] from the key set cache
    /// * [`SignatureExpired`][AuthErrorKind::SignatureExpired]: the token has
    ///   expired
    /// * [`InvalidClaims`][AuthErrorKind::InvalidClaims]: the issuer,
    ///   audience, or another registered claim is not acceptable
    pub async fn verify<C>(&self, token: &JwtRef) -> Result<C, AuthError>
    where
        C: for<'de> Deserialize<'de> + CoreClaims,
    {
        let decomposed: jwt::Decomposed = token.decompose()?;

        let kid = decomposed.kid().ok_or_else(|| {
            tracing::debug!("token header names no key");
            AuthError::new(AuthErrorKind::InvalidHeader)
        })?;

        match decomposed.algorithm() {
            Ok(alg) if alg == self.inner.algorithm => {}
            Ok(alg) => {
                tracing::debug!(%alg, expected = %self.inner.algorithm, "token algorithm not approved");
                return Err(AuthErrorKind::InvalidToken.into());
            }
            Err(err) => {
                tracing::debug!(alg = err.name(), "token algorithm not supported");
                return Err(AuthError::with_source(AuthErrorKind::InvalidToken, err));
            }
        }

        let key = self.inner.cache.resolve(kid).await?;

        let validated: jwt::Validated<C> =
            decomposed.verify_with_clock(&key, &self.inner.validator, &self.inner.clock)?;

        Ok(validated.into_claims())
    }

    /// Extracts the bearer token from `header`, verifies it, and checks the
    /// claims against `policy`
    ///
    /// # Errors
    ///
    /// Any failure of extraction, verification, or the permission check.
    pub async fn authorize<C>(
        &self,
        header: Option<&str>,
        policy: &PermissionPolicy,
    ) -> Result<C, AuthError>
    where
        C: for<'de> Deserialize<'de> + CoreClaims + HasPermissions,
    {
        guard::authorize(self, header, policy).await
    }
}
