#![allow(dead_code)]

pub mod rsa {
    use color_eyre::Result;

    use crate::{jwa, Jwk, Jwks};

    pub const KEY_ID: &str = "gk-primary";
    pub const ROTATED_KEY_ID: &str = "gk-rotated";

    pub const JWKS: &str = include_str!("../data/rsa/jwks.json");
    pub const JWKS_ROTATED: &str = include_str!("../data/rsa/jwks-rotated.json");

    #[cfg(feature = "private-keys")]
    pub const PRIVATE_KEY_DER: &[u8] = include_bytes!("../data/rsa/primary.pk8");
    #[cfg(feature = "private-keys")]
    pub const ROTATED_PRIVATE_KEY_DER: &[u8] = include_bytes!("../data/rsa/rotated.pk8");

    pub fn jwks() -> Result<Jwks> {
        Ok(serde_json::from_str(JWKS)?)
    }

    pub fn jwk_json() -> String {
        let jwks: serde_json::Value = serde_json::from_str(JWKS).unwrap();
        jwks["keys"][0].to_string()
    }

    pub fn jwk() -> Result<Jwk> {
        Ok(serde_json::from_str(&jwk_json())?)
    }

    pub fn public_key() -> Result<jwa::PublicKey> {
        Ok(jwk()?.public_key().clone())
    }

    #[cfg(feature = "private-keys")]
    pub fn private_key() -> jwa::rsa::PrivateKey {
        jwa::rsa::PrivateKey::from_pkcs8_der(PRIVATE_KEY_DER).unwrap()
    }

    #[cfg(feature = "private-keys")]
    pub fn rotated_private_key() -> jwa::rsa::PrivateKey {
        jwa::rsa::PrivateKey::from_pkcs8_der(ROTATED_PRIVATE_KEY_DER).unwrap()
    }
}
