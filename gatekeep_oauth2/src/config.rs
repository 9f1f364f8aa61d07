use std::time::Duration;

use gatekeep::{jwa, jwt};
use serde::{Deserialize, Serialize};

/// The identity provider and API an [`Authority`][crate::Authority] verifies
/// tokens for
///
/// ```
/// use gatekeep_oauth2::AuthorityConfig;
///
/// let config = AuthorityConfig::new("example.us.auth0.com", "casting-agency");
/// assert_eq!(config.issuer().as_str(), "https://example.us.auth0.com/");
/// assert_eq!(config.jwks_url(), "https://example.us.auth0.com/.well-known/jwks.json");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub struct AuthorityConfig {
    /// The identity provider's domain, such as `example.us.auth0.com`
    pub domain: String,

    /// The audience tokens must be issued for
    pub audience: jwt::Audience,

    /// The single signing algorithm tokens must use
    #[serde(default = "default_algorithm")]
    pub algorithm: jwa::Algorithm,

    /// Grace period applied to the `exp` claim
    #[serde(default, with = "seconds")]
    pub leeway: Duration,

    /// Bound on a single key set fetch
    #[serde(default = "default_jwks_timeout", with = "seconds")]
    pub jwks_timeout: Duration,
}

fn default_algorithm() -> jwa::Algorithm {
    jwa::Algorithm::RS256
}

fn default_jwks_timeout() -> Duration {
    Duration::from_secs(5)
}

impl AuthorityConfig {
    /// Configures an authority for `domain` and `audience` with the default
    /// algorithm (`RS256`), no leeway, and a 5 second fetch timeout
    pub fn new(domain: impl Into<String>, audience: impl Into<jwt::Audience>) -> Self {
        Self {
            domain: domain.into(),
            audience: audience.into(),
            algorithm: default_algorithm(),
            leeway: Duration::ZERO,
            jwks_timeout: default_jwks_timeout(),
        }
    }

    /// Sets the signing algorithm
    pub fn with_algorithm(self, algorithm: jwa::Algorithm) -> Self {
        Self { algorithm, ..self }
    }

    /// Sets the grace period
    pub fn with_leeway(self, leeway: Duration) -> Self {
        Self { leeway, ..self }
    }

    /// Sets the key set fetch timeout
    pub fn with_jwks_timeout(self, jwks_timeout: Duration) -> Self {
        Self {
            jwks_timeout,
            ..self
        }
    }

    fn host(&self) -> &str {
        let domain = self.domain.trim_end_matches('/');
        domain.strip_prefix("https://").unwrap_or(domain)
    }

    /// The issuer tokens must name: `https://{domain}/`
    pub fn issuer(&self) -> jwt::Issuer {
        jwt::Issuer::new(format!("https://{}/", self.host()))
    }

    /// The URL the key set is published at
    #[must_use]
    pub fn jwks_url(&self) -> String {
        format!("https://{}/.well-known/jwks.json", self.host())
    }

    /// A validator enforcing this configuration
    pub fn validator(&self) -> jwt::CoreValidator {
        jwt::CoreValidator::default()
            .add_approved_algorithm(self.algorithm)
            .add_allowed_audience(self.audience.clone())
            .require_issuer(self.issuer())
            .with_leeway(self.leeway)
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;

    #[test]
    fn deserializes_with_defaults() -> Result<()> {
        let config: AuthorityConfig = serde_json::from_str(
            r#"{"domain":"example.us.auth0.com","audience":"casting-agency"}"#,
        )?;
        assert_eq!(
            config,
            AuthorityConfig::new("example.us.auth0.com", "casting-agency")
        );
        assert_eq!(config.jwks_timeout, Duration::from_secs(5));
        assert_eq!(config.algorithm, jwa::Algorithm::RS256);
        Ok(())
    }

    #[test]
    fn durations_are_seconds() -> Result<()> {
        let config: AuthorityConfig = serde_json::from_str(
            r#"{"domain":"d","audience":"a","algorithm":"PS256","leeway":30,"jwks_timeout":2}"#,
        )?;
        assert_eq!(config.leeway, Duration::from_secs(30));
        assert_eq!(config.jwks_timeout, Duration::from_secs(2));
        assert_eq!(config.algorithm, jwa::Algorithm::PS256);
        Ok(())
    }

    #[test]
    fn tolerates_scheme_and_trailing_slash() {
        let config = AuthorityConfig::new("https://example.us.auth0.com/", "a");
        assert_eq!(config.issuer().as_str(), "https://example.us.auth0.com/");
        assert_eq!(
            config.jwks_url(),
            "https://example.us.auth0.com/.well-known/jwks.json"
        );
    }

    #[test]
    fn rejects_symmetric_algorithm() {
        let res: Result<AuthorityConfig, _> =
            serde_json::from_str(r#"{"domain":"d","audience":"a","algorithm":"HS256"}"#);
        assert!(res.is_err());
    }
}
