//! The decoded claims of a verified access token

use gatekeep::{clock::UnixTime, jwt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{HasPermissions, Permissions};

/// The claims of an access token issued for an API
///
/// The registered claims, the OAuth2 `scope`, and the `permissions` claim
/// are decoded into typed fields. Every other claim is kept in
/// [`extra()`][Self::extra], so serializing the claims reproduces the
/// payload they were decoded from.
///
/// Values of this type handed out by an [`Authority`][crate::Authority]
/// have always had their signature and registered claims verified.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<jwt::Issuer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<jwt::Subject>,
    #[serde(default, skip_serializing_if = "jwt::Audiences::is_empty")]
    aud: jwt::Audiences,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iat: Option<UnixTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nbf: Option<UnixTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<UnixTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    azp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    permissions: Option<Permissions>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Claims {
    /// The subject, usually the identity provider's user ID
    #[must_use]
    pub fn subject(&self) -> Option<&jwt::SubjectRef> {
        self.sub.as_deref()
    }

    /// The issuer
    #[must_use]
    pub fn issuer(&self) -> Option<&jwt::IssuerRef> {
        self.iss.as_deref()
    }

    /// The audiences the token was issued for
    pub fn audiences(&self) -> &jwt::Audiences {
        &self.aud
    }

    /// When the token was issued
    #[must_use]
    pub fn issued_at(&self) -> Option<UnixTime> {
        self.iat
    }

    /// When the token expires
    #[must_use]
    pub fn expires_at(&self) -> Option<UnixTime> {
        self.exp
    }

    /// The client the token was issued to
    #[must_use]
    pub fn authorized_party(&self) -> Option<&str> {
        self.azp.as_deref()
    }

    /// The raw, space-delimited OAuth2 scope
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Claims that are not otherwise decoded
    #[must_use]
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Looks up a claim that is not otherwise decoded
    #[must_use]
    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.extra.get(claim)
    }
}

impl jwt::CoreClaims for Claims {
    fn nbf(&self) -> Option<UnixTime> {
        self.nbf
    }

    fn exp(&self) -> Option<UnixTime> {
        self.exp
    }

    fn aud(&self) -> &jwt::Audiences {
        &self.aud
    }

    fn iss(&self) -> Option<&jwt::IssuerRef> {
        self.iss.as_deref()
    }

    fn sub(&self) -> Option<&jwt::SubjectRef> {
        self.sub.as_deref()
    }
}

impl HasPermissions for Claims {
    fn permissions(&self) -> Option<&Permissions> {
        self.permissions.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;
    use serde_json::json;

    use super::*;
    use crate::{test, PermissionRef};

    #[test]
    fn round_trips_the_payload() -> Result<()> {
        let mut payload = test::payload(&["get:actors", "get:movies"]);
        payload["https://casting.example/roles"] = json!(["Casting Assistant"]);

        let claims: Claims = serde_json::from_value(payload.clone())?;
        assert_eq!(serde_json::to_value(&claims)?, payload);
        Ok(())
    }

    #[test]
    fn round_trips_single_audience_array_and_delimited_permissions() -> Result<()> {
        let mut payload = test::payload(&[]);
        payload["aud"] = json!([test::AUDIENCE]);
        payload["permissions"] = json!("get:actors get:movies");

        let claims: Claims = serde_json::from_value(payload.clone())?;
        assert_eq!(serde_json::to_value(&claims)?, payload);
        Ok(())
    }

    #[test]
    fn decodes_registered_and_custom_claims() -> Result<()> {
        let mut payload = test::payload(&["get:actors"]);
        payload["https://casting.example/roles"] = json!(["Casting Assistant"]);

        let claims: Claims = serde_json::from_value(payload)?;
        assert_eq!(claims.subject().map(|s| s.as_str()), Some("auth0|5f0e8a1b"));
        assert_eq!(claims.issuer().map(|s| s.as_str()), Some(test::ISSUER));
        assert_eq!(claims.audiences().iter().count(), 2);
        assert_eq!(claims.authorized_party(), Some("Zb3Q0nU3"));
        assert_eq!(claims.issued_at(), Some(UnixTime(test::NOW.0 - 60)));
        assert_eq!(claims.expires_at(), Some(UnixTime(test::NOW.0 + 3600)));
        assert_eq!(
            claims.get("https://casting.example/roles"),
            Some(&json!(["Casting Assistant"]))
        );
        assert!(claims
            .permissions()
            .unwrap()
            .contains(PermissionRef::from_str("get:actors")));
        Ok(())
    }

    #[test]
    fn absent_permissions_stay_absent() -> Result<()> {
        let claims: Claims = serde_json::from_value(json!({ "sub": "client@clients" }))?;
        assert!(claims.permissions().is_none());

        let claims: Claims = serde_json::from_value(json!({ "permissions": [] }))?;
        assert!(claims.permissions().unwrap().is_empty());
        Ok(())
    }
}
