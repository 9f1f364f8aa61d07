//! Implementations of the JSON Web Keys (JWK) standard
//!
//! The specifications for JSON Web Keys can be found in [RFC7517][].
//!
//! [RFC7517]: https://tools.ietf.org/html/rfc7517

use aliri_braid::braid;
use serde::{Deserialize, Serialize, Serializer};

use crate::{b64::Base64Url, error, jwa, jws::Verifier};

/// An identifier for a JWK
#[braid(serde, ref_doc = "A borrowed reference to JWK identifier ([`KeyId`])")]
pub struct KeyId;

/// An identified RSA JSON Web Key
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "JwkDto")]
#[must_use]
pub struct Jwk {
    key_id: Option<KeyId>,
    usage: Option<jwa::Usage>,
    algorithm: Option<jwa::Algorithm>,
    key: jwa::PublicKey,
}

impl Jwk {
    /// The key ID
    #[must_use]
    pub fn key_id(&self) -> Option<&KeyIdRef> {
        self.key_id.as_deref()
    }

    /// The intended usage of the key
    #[must_use]
    pub fn usage(&self) -> Option<jwa::Usage> {
        self.usage
    }

    /// The algorithm to be used with this JWK
    #[must_use]
    pub fn algorithm(&self) -> Option<jwa::Algorithm> {
        self.algorithm
    }

    /// The public key material
    pub fn public_key(&self) -> &jwa::PublicKey {
        &self.key
    }

    /// Sets the key ID
    pub fn with_key_id(self, kid: KeyId) -> Self {
        Self {
            key_id: Some(kid),
            ..self
        }
    }

    /// Sets the algorithm and usage consistent with that algorithm
    pub fn with_algorithm(self, alg: jwa::Algorithm) -> Self {
        Self {
            algorithm: Some(alg),
            usage: Some(alg.to_usage()),
            ..self
        }
    }
}

impl From<jwa::PublicKey> for Jwk {
    fn from(key: jwa::PublicKey) -> Self {
        Self {
            key_id: None,
            usage: None,
            algorithm: None,
            key,
        }
    }
}

impl Verifier for Jwk {
    type Algorithm = jwa::Algorithm;
    type Error = error::JwkVerifyError;

    fn can_verify(&self, alg: Self::Algorithm) -> bool {
        self.usage.map_or(true, |u| u == jwa::Usage::Signing)
            && self.algorithm.map_or(true, |a| a == alg)
    }

    fn verify(
        &self,
        alg: Self::Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Self::Error> {
        if let Some(u) = self.usage {
            if u != jwa::Usage::Signing {
                return Err(error::jwk_usage_mismatch().into());
            }
        }

        match self.algorithm {
            Some(key_alg) if key_alg == alg => {}
            Some(_) => {
                return Err(error::incompatible_algorithm(alg).into());
            }
            None => {}
        }

        self.key.verify(alg, data, signature)?;

        Ok(())
    }
}

/// Error produced while materializing a JWK from its JSON form
#[derive(Debug, thiserror::Error)]
pub enum UnsupportedJwk {
    /// The `kty` member names a key type other than `RSA`
    #[error("unsupported key type '{0}'")]
    KeyType(String),

    /// The `alg` member names an algorithm that cannot be used for verification
    #[error(transparent)]
    Algorithm(#[from] error::UnknownAlgorithm),

    /// A required key component is missing
    #[error("missing RSA key component '{0}'")]
    MissingComponent(&'static str),

    /// The key components were rejected
    #[error(transparent)]
    KeyRejected(#[from] error::KeyRejected),
}

#[derive(Deserialize)]
struct JwkDto {
    #[serde(rename = "kty")]
    key_type: String,

    #[serde(rename = "kid", default)]
    key_id: Option<KeyId>,

    #[serde(rename = "use", default)]
    usage: Option<jwa::Usage>,

    #[serde(rename = "alg", default)]
    algorithm: Option<String>,

    #[serde(default)]
    n: Option<Base64Url>,

    #[serde(default)]
    e: Option<Base64Url>,
}

impl TryFrom<JwkDto> for Jwk {
    type Error = UnsupportedJwk;

    fn try_from(dto: JwkDto) -> Result<Self, Self::Error> {
        if dto.key_type != "RSA" {
            return Err(UnsupportedJwk::KeyType(dto.key_type));
        }

        let algorithm = dto
            .algorithm
            .as_deref()
            .map(jwa::Algorithm::try_from)
            .transpose()?;

        let n = dto.n.ok_or(UnsupportedJwk::MissingComponent("n"))?;
        let e = dto.e.ok_or(UnsupportedJwk::MissingComponent("e"))?;
        let key = jwa::PublicKey::from_components(n, e)?;

        Ok(Self {
            key_id: dto.key_id,
            usage: dto.usage,
            algorithm,
            key,
        })
    }
}

#[derive(Serialize)]
struct JwkDtoRef<'a> {
    kty: &'static str,
    #[serde(rename = "kid", skip_serializing_if = "Option::is_none")]
    key_id: Option<&'a KeyIdRef>,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    usage: Option<jwa::Usage>,
    #[serde(rename = "alg", skip_serializing_if = "Option::is_none")]
    algorithm: Option<jwa::Algorithm>,
    n: &'a Base64Url,
    e: &'a Base64Url,
}

impl Serialize for Jwk {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        JwkDtoRef {
            kty: "RSA",
            key_id: self.key_id.as_deref(),
            usage: self.usage,
            algorithm: self.algorithm,
            n: self.key.modulus(),
            e: self.key.exponent(),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;
    use crate::test::rsa;

    #[test]
    fn decodes_published_jwk() -> Result<()> {
        let jwk = rsa::jwk()?;
        assert_eq!(jwk.key_id(), Some(KeyIdRef::from_str(rsa::KEY_ID)));
        assert_eq!(jwk.algorithm(), Some(jwa::Algorithm::RS256));
        assert_eq!(jwk.usage(), Some(jwa::Usage::Signing));
        Ok(())
    }

    #[test]
    fn rejects_symmetric_key() {
        let res: Result<Jwk, _> =
            serde_json::from_str(r#"{"kty":"oct","kid":"s","alg":"HS256","k":"c2VjcmV0"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn rejects_encryption_algorithm() {
        let json = rsa::jwk_json().replace("RS256", "RSA-OAEP");
        let res: Result<Jwk, _> = serde_json::from_str(&json);
        assert!(res.is_err());
    }

    #[test]
    fn refuses_other_algorithm_than_declared() -> Result<()> {
        let jwk = rsa::jwk()?;
        assert!(jwk.can_verify(jwa::Algorithm::RS256));
        assert!(!jwk.can_verify(jwa::Algorithm::PS256));

        let err = jwk
            .verify(jwa::Algorithm::PS256, b"data", &[0; 256])
            .unwrap_err();
        assert!(err.is_incompatible_alg());
        Ok(())
    }

    #[test]
    fn serializes_back_to_published_form() -> Result<()> {
        let jwk = rsa::jwk()?;
        let value = serde_json::to_value(&jwk)?;
        let expected: serde_json::Value = serde_json::from_str(&rsa::jwk_json())?;
        assert_eq!(value, expected);
        Ok(())
    }
}
