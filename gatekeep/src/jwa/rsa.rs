//! RSA keys for the `RS*` and `PS*` algorithm families

use serde::{Deserialize, Serialize};

use crate::{b64::Base64Url, error, jwa, jws};

#[cfg(feature = "private-keys")]
mod private;

#[cfg(feature = "private-keys")]
#[cfg_attr(docsrs, doc(cfg(feature = "private-keys")))]
pub use private::PrivateKey;

const MIN_MODULUS_LEN: usize = 2048 / 8;
const MAX_MODULUS_LEN: usize = 8192 / 8;

/// RSA public key components
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PublicKeyDto")]
pub struct PublicKey {
    /// The public modulus
    #[serde(rename = "n")]
    modulus: Base64Url,

    /// The public exponent
    #[serde(rename = "e")]
    exponent: Base64Url,
}

impl PublicKey {
    /// Constructs a public key from the big-endian modulus and exponent
    ///
    /// Leading zero octets are ignored.
    ///
    /// # Errors
    ///
    /// The modulus is not between 2048 and 8192 bits long, or the exponent
    /// is empty.
    pub fn from_components(
        modulus: impl Into<Base64Url>,
        exponent: impl Into<Base64Url>,
    ) -> Result<Self, error::KeyRejected> {
        let modulus = strip_leading_zeros(modulus.into());
        let exponent = strip_leading_zeros(exponent.into());

        let len = modulus.as_slice().len();
        if !(MIN_MODULUS_LEN..=MAX_MODULUS_LEN).contains(&len) {
            return Err(error::key_rejected(format!(
                "key modulus must be between 2048 and 8192 bits, got {} bits",
                len * 8
            )));
        }

        if exponent.as_slice().is_empty() {
            return Err(error::key_rejected("key exponent must not be zero"));
        }

        Ok(Self { modulus, exponent })
    }

    /// The public key's modulus
    #[must_use]
    pub fn modulus(&self) -> &Base64Url {
        &self.modulus
    }

    /// The public key's exponent
    #[must_use]
    pub fn exponent(&self) -> &Base64Url {
        &self.exponent
    }

    /// The size of signatures produced by the matching private key
    #[must_use]
    pub fn signature_size(&self) -> usize {
        self.modulus.as_slice().len()
    }
}

impl jws::Verifier for PublicKey {
    type Algorithm = jwa::Algorithm;
    type Error = error::SignatureMismatch;

    fn can_verify(&self, _alg: Self::Algorithm) -> bool {
        true
    }

    fn verify(
        &self,
        alg: Self::Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Self::Error> {
        let pk = ring::signature::RsaPublicKeyComponents {
            n: self.modulus.as_slice(),
            e: self.exponent.as_slice(),
        };

        pk.verify(alg.verification_params(), data, signature)
            .map_err(|_| error::signature_mismatch())
    }
}

fn strip_leading_zeros(value: Base64Url) -> Base64Url {
    match value.as_slice().iter().position(|&b| b != 0) {
        Some(0) => value,
        Some(idx) => Base64Url::from_raw(&value.as_slice()[idx..]),
        None => Base64Url::default(),
    }
}

impl TryFrom<PublicKeyDto> for PublicKey {
    type Error = error::KeyRejected;

    fn try_from(dto: PublicKeyDto) -> Result<Self, Self::Error> {
        Self::from_components(dto.modulus, dto.exponent)
    }
}

#[derive(Deserialize)]
struct PublicKeyDto {
    #[serde(rename = "n")]
    modulus: Base64Url,

    #[serde(rename = "e")]
    exponent: Base64Url,
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;

    #[test]
    fn rejects_short_modulus() {
        let res = PublicKey::from_components(vec![0xC3; 128], vec![1, 0, 1]);
        assert!(res.is_err());
    }

    #[test]
    fn ignores_leading_zero_in_modulus() -> Result<()> {
        let mut n = vec![0];
        n.extend(std::iter::repeat(0xC3).take(256));

        let key = PublicKey::from_components(n, vec![0, 1, 0, 1])?;
        assert_eq!(key.modulus().as_slice().len(), 256);
        assert_eq!(key.exponent().as_slice(), &[1, 0, 1]);
        Ok(())
    }

    #[test]
    fn rejects_zero_exponent() {
        let res = PublicKey::from_components(vec![0xC3; 256], vec![0]);
        assert!(res.is_err());
    }
}
