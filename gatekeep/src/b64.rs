//! Unpadded base64url data, as used by every segment of a compact JWS and
//! by the binary members of a JWK

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

pub use base64::DecodeError;

/// Owned binary data that serializes as unpadded base64url text
#[derive(Clone, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Base64Url(Vec<u8>);

impl Base64Url {
    /// Wraps raw, unencoded bytes
    #[inline]
    pub fn from_raw(raw: impl Into<Vec<u8>>) -> Self {
        Self(raw.into())
    }

    /// Decodes unpadded base64url text
    ///
    /// # Errors
    ///
    /// Returns an error if the text contains padding or characters outside
    /// of the URL-safe alphabet.
    pub fn from_encoded(enc: impl AsRef<[u8]>) -> Result<Self, DecodeError> {
        URL_SAFE_NO_PAD.decode(enc).map(Self)
    }

    /// The raw bytes
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Unwraps the raw bytes
    #[inline]
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }

    /// The length of the encoded form
    #[inline]
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        Self::calc_encoded_len(self.0.len())
    }

    /// The length of the encoded form of `len` raw bytes
    #[must_use]
    pub const fn calc_encoded_len(len: usize) -> usize {
        let rem = len % 3;
        len / 3 * 4 + if rem == 0 { 0 } else { rem + 1 }
    }

    /// Appends the encoded form to `buf`
    pub fn encode_into(&self, buf: &mut String) {
        URL_SAFE_NO_PAD.encode_string(&self.0, buf);
    }
}

impl From<Vec<u8>> for Base64Url {
    #[inline]
    fn from(raw: Vec<u8>) -> Self {
        Self(raw)
    }
}

impl AsRef<[u8]> for Base64Url {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Base64Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&URL_SAFE_NO_PAD.encode(&self.0))
    }
}

impl fmt::Debug for Base64Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Base64Url({})", self)
    }
}

impl Serialize for Base64Url {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Base64Url {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        Self::from_encoded(s.as_bytes()).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;

    #[test]
    fn encoded_len_matches_encoder() {
        for len in 0..10 {
            let data = Base64Url::from_raw(vec![0xA5; len]);
            assert_eq!(data.encoded_len(), data.to_string().len(), "len {}", len);
        }
    }

    #[test]
    fn rejects_padding() {
        assert!(Base64Url::from_encoded("AQAB").is_ok());
        assert!(Base64Url::from_encoded("AQ==").is_err());
    }

    #[test]
    fn rejects_standard_alphabet() {
        assert!(Base64Url::from_encoded("a+b/").is_err());
    }

    #[test]
    fn deserializes_from_json_string() -> Result<()> {
        let data: Base64Url = serde_json::from_str(r#""AQAB""#)?;
        assert_eq!(data.as_slice(), &[1, 0, 1]);
        Ok(())
    }
}
