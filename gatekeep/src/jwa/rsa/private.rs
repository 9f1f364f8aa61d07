use std::{fmt, sync::Arc};

use ring::signature::RsaKeyPair;

use crate::{error, jwa, jws};

/// An RSA key pair able to produce signatures
///
/// Only used for minting tokens in tests and tooling. The key material is
/// never printed.
#[derive(Clone)]
#[must_use]
pub struct PrivateKey {
    ring_cache: Arc<RsaKeyPair>,
}

impl PrivateKey {
    /// Imports an RSA key pair from an unencrypted PKCS#8 document in DER form
    ///
    /// # Errors
    ///
    /// The document is not a valid RSA private key of at least 2048 bits.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, error::KeyRejected> {
        let pair = RsaKeyPair::from_pkcs8(der).map_err(|e| error::key_rejected(e.to_string()))?;

        Ok(Self {
            ring_cache: Arc::new(pair),
        })
    }

    /// The size of signatures produced by this key
    #[must_use]
    pub fn signature_size(&self) -> usize {
        self.ring_cache.public().modulus_len()
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("bits", &(self.signature_size() * 8))
            .finish_non_exhaustive()
    }
}

impl jws::Signer for PrivateKey {
    type Algorithm = jwa::Algorithm;
    type Error = error::SigningError;

    fn can_sign(&self, _alg: Self::Algorithm) -> bool {
        true
    }

    fn sign(&self, alg: Self::Algorithm, data: &[u8]) -> Result<Vec<u8>, Self::Error> {
        let mut buf = vec![0; self.signature_size()];
        self.ring_cache
            .sign(
                alg.signing_params(),
                &ring::rand::SystemRandom::new(),
                data,
                &mut buf,
            )
            .map_err(|e| error::signer_failed(e.to_string()))?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;
    use crate::{jws::Verifier, test::rsa};

    #[test]
    fn signature_verifies_with_published_key() -> Result<()> {
        use jws::Signer;

        let private = rsa::private_key();
        let public = rsa::public_key()?;

        let sig = private.sign(jwa::Algorithm::RS256, b"message")?;
        assert_eq!(sig.len(), 256);

        public.verify(jwa::Algorithm::RS256, b"message", &sig)?;
        assert!(public
            .verify(jwa::Algorithm::RS256, b"messagf", &sig)
            .is_err());
        Ok(())
    }

    #[test]
    fn debug_hides_key_material() {
        let dbg = format!("{:?}", rsa::private_key());
        assert_eq!(dbg, "PrivateKey { bits: 2048, .. }");
    }
}
