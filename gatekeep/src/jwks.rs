use std::fmt;

use serde::{de, Deserialize, Serialize};

use crate::{jwa, jwk, Jwk};

/// A JSON Web Key Set (JWKS)
///
/// Keys that cannot be used to verify RSA signatures are dropped while
/// deserializing so that a single unexpected entry published by the identity
/// provider does not make the whole set unusable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    #[serde(deserialize_with = "deserialize_keys")]
    keys: Vec<Jwk>,
}

impl Jwks {
    /// A view of the keys in this set
    #[must_use]
    pub fn keys(&self) -> &[Jwk] {
        &self.keys
    }

    /// The number of usable keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set holds no usable keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether a key with the given identifier is present
    #[must_use]
    pub fn contains(&self, kid: &jwk::KeyIdRef) -> bool {
        self.keys.iter().any(|k| k.key_id() == Some(kid))
    }

    /// Gets the key with exactly the given key identifier
    ///
    /// When several keys share an identifier, one intended for signatures is
    /// preferred.
    #[must_use]
    pub fn get_key_by_id(&self, kid: &jwk::KeyIdRef) -> Option<&Jwk> {
        let mut matching = self.keys.iter().filter(|k| k.key_id() == Some(kid));
        let first = matching.next()?;

        if first.usage() == Some(jwa::Usage::Signing) {
            return Some(first);
        }

        matching
            .find(|k| k.usage() == Some(jwa::Usage::Signing))
            .or(Some(first))
    }
}

impl FromIterator<Jwk> for Jwks {
    fn from_iter<I: IntoIterator<Item = Jwk>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

fn deserialize_keys<'de, D>(deserializer: D) -> Result<Vec<Jwk>, D::Error>
where
    D: de::Deserializer<'de>,
{
    struct MaybeJwksVisitor;

    impl<'de> de::Visitor<'de> for MaybeJwksVisitor {
        type Value = Vec<Jwk>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a list of JWK objects")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut values = Vec::with_capacity(seq.size_hint().unwrap_or_default());
            #[cfg(feature = "tracing")]
            let mut index = 0_usize;

            while let Some(raw) = seq.next_element::<serde_json::Value>()? {
                match Jwk::deserialize(&raw) {
                    Ok(jwk) => values.push(jwk),
                    #[cfg(feature = "tracing")]
                    Err(err) => {
                        let error: &dyn std::error::Error = &err;
                        tracing::warn!(
                            error,
                            jwks.idx = index,
                            jwk.kid = ?raw.get("kid"),
                            jwk.kty = ?raw.get("kty"),
                            jwk.alg = ?raw.get("alg"),
                            "ignoring unusable JWK"
                        );
                    }
                    #[cfg(not(feature = "tracing"))]
                    Err(_) => {}
                }

                #[cfg(feature = "tracing")]
                {
                    index += 1;
                }
            }

            Ok(values)
        }
    }

    deserializer.deserialize_seq(MaybeJwksVisitor)
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;
    #[cfg(feature = "tracing")]
    use tracing_test::traced_test;

    use super::*;
    use crate::test::rsa;

    const JWKS_WITH_UNKNOWN_ALG: &str = r#"
        {
            "keys": [
                {
                    "kty": "RSA",
                    "kid": "1",
                    "use": "enc",
                    "alg": "RSA-OAEP",
                    "n": "AQAB",
                    "e": "AQAB"
                }
            ]
        }
    "#;

    const JWKS_WITH_NOTHING: &str = r#"
        {
            "keys": [
                {}
            ]
        }
    "#;

    #[test]
    #[cfg_attr(feature = "tracing", traced_test)]
    fn skips_key_with_unknown_alg() -> Result<()> {
        let jwks: Jwks = serde_json::from_str(JWKS_WITH_UNKNOWN_ALG)?;
        assert!(jwks.is_empty());
        Ok(())
    }

    #[test]
    #[cfg_attr(feature = "tracing", traced_test)]
    fn skips_empty_key() -> Result<()> {
        let jwks: Jwks = serde_json::from_str(JWKS_WITH_NOTHING)?;
        assert!(jwks.is_empty());
        Ok(())
    }

    #[test]
    fn rejects_document_without_keys_member() {
        let res: Result<Jwks, _> = serde_json::from_str("{}");
        assert!(res.is_err());
    }

    #[test]
    fn keeps_usable_keys_next_to_unusable_ones() -> Result<()> {
        let json = format!(
            r#"{{"keys":[{{"kty":"EC","kid":"ec","crv":"P-256"}},{}]}}"#,
            rsa::jwk_json()
        );
        let jwks: Jwks = serde_json::from_str(&json)?;
        assert_eq!(jwks.len(), 1);
        assert!(jwks.contains(jwk::KeyIdRef::from_str(rsa::KEY_ID)));
        Ok(())
    }

    #[test]
    fn looks_up_by_exact_key_id() -> Result<()> {
        let jwks = rsa::jwks()?;
        assert!(jwks
            .get_key_by_id(jwk::KeyIdRef::from_str(rsa::KEY_ID))
            .is_some());
        assert!(jwks
            .get_key_by_id(jwk::KeyIdRef::from_str("GK-PRIMARY"))
            .is_none());
        assert!(jwks
            .get_key_by_id(jwk::KeyIdRef::from_str(rsa::ROTATED_KEY_ID))
            .is_none());
        Ok(())
    }
}
