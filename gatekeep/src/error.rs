//! Failures raised while decoding, verifying, and signing tokens
//!
//! Most leaf errors are opaque structs that can only be built inside this
//! crate. The enums group them by the operation that failed.

#![allow(missing_copy_implementations)]

use std::{error::Error as StdError, fmt};

use thiserror::Error;

use crate::jwa;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The `alg` header names an algorithm this crate does not verify
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unsupported signing algorithm `{name}`")]
pub struct UnknownAlgorithm {
    name: String,
}

impl UnknownAlgorithm {
    /// The algorithm name as it appeared in the token or key
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub(crate) fn unknown_algorithm(name: impl Into<String>) -> UnknownAlgorithm {
    UnknownAlgorithm { name: name.into() }
}

/// The key is bound to an algorithm other than the one the token names
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("key cannot be used with {alg}")]
pub struct IncompatibleAlgorithm {
    alg: jwa::Algorithm,
}

impl IncompatibleAlgorithm {
    /// The algorithm the token asked for
    #[must_use]
    pub fn algorithm(&self) -> jwa::Algorithm {
        self.alg
    }
}

pub(crate) fn incompatible_algorithm(alg: jwa::Algorithm) -> IncompatibleAlgorithm {
    IncompatibleAlgorithm { alg }
}

/// The key is published for encryption, not for verifying signatures
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("key is not published for signature verification")]
pub struct KeyUsageMismatch {
    _p: (),
}

pub(crate) const fn jwk_usage_mismatch() -> KeyUsageMismatch {
    KeyUsageMismatch { _p: () }
}

/// The signature was not produced by the key over the signed segments
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("signature does not match the token contents")]
pub struct SignatureMismatch {
    _p: (),
}

pub(crate) const fn signature_mismatch() -> SignatureMismatch {
    SignatureMismatch { _p: () }
}

/// RSA key material could not be loaded
#[derive(Debug, Error)]
#[error("RSA key rejected")]
pub struct KeyRejected {
    #[source]
    source: BoxError,
}

pub(crate) fn key_rejected(source: impl Into<BoxError>) -> KeyRejected {
    KeyRejected {
        source: source.into(),
    }
}

/// The signing backend failed after accepting the key and algorithm
#[derive(Debug, Error)]
#[error("signer failed to produce a signature")]
pub struct SignerFailed {
    #[source]
    source: BoxError,
}

#[cfg(feature = "private-keys")]
pub(crate) fn signer_failed(source: impl Into<BoxError>) -> SignerFailed {
    SignerFailed {
        source: source.into(),
    }
}

/// The part of a compact token that could not be handled
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    /// The token is not three dot-separated segments
    Layout,
    /// The first segment, holding the JOSE header
    Header,
    /// The second segment, holding the claims
    Payload,
    /// The third segment, holding the signature
    Signature,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Layout => "layout",
            Self::Header => "header",
            Self::Payload => "payload",
            Self::Signature => "signature",
        })
    }
}

/// A token segment could not be decoded or encoded
#[derive(Debug, Error)]
#[error("malformed token {segment}")]
pub struct MalformedToken {
    segment: Segment,
    #[source]
    source: Option<BoxError>,
}

impl MalformedToken {
    /// Which part of the token was at fault
    #[must_use]
    pub fn segment(&self) -> Segment {
        self.segment
    }
}

pub(crate) fn malformed_jwt() -> MalformedToken {
    MalformedToken {
        segment: Segment::Layout,
        source: None,
    }
}

fn malformed(segment: Segment, source: impl Into<BoxError>) -> MalformedToken {
    MalformedToken {
        segment,
        source: Some(source.into()),
    }
}

pub(crate) fn malformed_jwt_header(source: impl Into<BoxError>) -> MalformedToken {
    malformed(Segment::Header, source)
}

pub(crate) fn malformed_jwt_payload(source: impl Into<BoxError>) -> MalformedToken {
    malformed(Segment::Payload, source)
}

pub(crate) fn malformed_jwt_signature(source: impl Into<BoxError>) -> MalformedToken {
    malformed(Segment::Signature, source)
}

/// A key refused to verify a signature
#[derive(Debug, Error)]
pub enum JwkVerifyError {
    /// See [`IncompatibleAlgorithm`]
    #[error(transparent)]
    IncompatibleAlgorithm(#[from] IncompatibleAlgorithm),

    /// See [`KeyUsageMismatch`]
    #[error(transparent)]
    UsageMismatch(#[from] KeyUsageMismatch),

    /// See [`SignatureMismatch`]
    #[error(transparent)]
    SignatureMismatch(#[from] SignatureMismatch),
}

impl JwkVerifyError {
    /// Whether the key was bound to a different algorithm
    #[must_use]
    pub fn is_incompatible_alg(&self) -> bool {
        matches!(self, Self::IncompatibleAlgorithm(_))
    }

    /// Whether the signature itself was wrong
    #[must_use]
    pub fn is_signature_mismatch(&self) -> bool {
        matches!(self, Self::SignatureMismatch(_))
    }
}

/// A token failed verification
#[derive(Debug, Error)]
pub enum JwtVerifyError {
    /// The token could not be taken apart
    #[error(transparent)]
    Malformed(#[from] MalformedToken),

    /// The header names an algorithm that cannot be verified
    #[error(transparent)]
    UnsupportedAlgorithm(#[from] UnknownAlgorithm),

    /// The key did not accept the signature
    #[error("token signature rejected")]
    Signature(#[from] JwkVerifyError),

    /// The signature held but the claims did not
    #[error("token claims rejected")]
    ClaimsRejected(#[from] ClaimsRejected),
}

impl JwtVerifyError {
    /// Whether the failure happened before any claim could be looked at:
    /// the token did not split into segments or its header did not decode
    #[must_use]
    pub fn is_malformed_header(&self) -> bool {
        matches!(
            self,
            Self::Malformed(m) if matches!(m.segment(), Segment::Layout | Segment::Header)
        )
    }
}

/// A private key could not sign
#[cfg(feature = "private-keys")]
#[cfg_attr(docsrs, doc(cfg(feature = "private-keys")))]
#[derive(Debug, Error)]
pub enum SigningError {
    /// See [`UnknownAlgorithm`]
    #[error(transparent)]
    UnknownAlgorithm(UnknownAlgorithm),

    /// See [`IncompatibleAlgorithm`]
    #[error(transparent)]
    IncompatibleAlgorithm(IncompatibleAlgorithm),

    /// See [`SignerFailed`]
    #[error(transparent)]
    SignerFailed(#[from] SignerFailed),
}

/// A signed token could not be assembled
#[cfg(feature = "private-keys")]
#[cfg_attr(docsrs, doc(cfg(feature = "private-keys")))]
#[derive(Debug, Error)]
pub enum JwtSigningError {
    /// The key failed to sign
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// The header or claims could not be serialized
    #[error(transparent)]
    Encoding(#[from] MalformedToken),
}

/// A registered claim was missing or unacceptable
#[derive(Debug, Error)]
pub enum ClaimsRejected {
    /// `alg` is not one the verifier approves
    #[error("`alg` is not an approved algorithm")]
    InvalidAlgorithm,

    /// `aud` names none of the accepted audiences
    #[error("`aud` names none of the accepted audiences")]
    InvalidAudience,

    /// `iss` is not the expected issuer
    #[error("`iss` is not the expected issuer")]
    InvalidIssuer,

    /// `exp` has passed
    #[error("`exp` has passed")]
    TokenExpired,

    /// `nbf` has not been reached yet
    #[error("`nbf` has not been reached")]
    TokenNotYetValid,

    /// A claim the verifier requires is absent
    #[error("required claim `{0}` is missing")]
    MissingRequiredClaim(&'static str),
}
