//! The uniform authorization failure raised by every stage of the pipeline

use std::{error::Error as StdError, fmt};

use gatekeep::error::{ClaimsRejected, JwtVerifyError};
use thiserror::Error;

use crate::PermissionDenial;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The reason a request was not authorized
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum AuthErrorKind {
    /// No `Authorization` header was presented
    MissingHeader,

    /// The `Authorization` header is not a single bearer token
    MalformedHeader,

    /// The token header segment is absent, undecodable, or names no key
    InvalidHeader,

    /// The identity provider's key set could not be retrieved
    KeySetUnavailable,

    /// The token names a key that is not in the provider's key set
    UnknownKey,

    /// The token has expired
    SignatureExpired,

    /// The token's issuer, audience, or other registered claims are not
    /// acceptable
    InvalidClaims,

    /// The token could not be decoded or its signature does not match
    InvalidToken,

    /// The verified token carries no permissions claim at all
    PermissionsClaimMissing,

    /// The verified token does not grant the required permission
    PermissionDenied,
}

impl AuthErrorKind {
    /// The HTTP status code used when reporting this failure
    #[must_use]
    pub const fn status_code(self) -> u16 {
        match self {
            Self::PermissionsClaimMissing => 400,
            Self::PermissionDenied => 403,
            _ => 401,
        }
    }

    /// A stable, machine-readable code
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::MissingHeader => "authorization_header_missing",
            Self::MalformedHeader | Self::InvalidHeader | Self::UnknownKey | Self::InvalidToken => {
                "invalid_header"
            }
            Self::KeySetUnavailable => "jwks_unavailable",
            Self::SignatureExpired => "token_expired",
            Self::InvalidClaims | Self::PermissionsClaimMissing => "invalid_claims",
            Self::PermissionDenied => "unauthorized",
        }
    }

    /// A stable, human-readable description
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::MissingHeader => "Authorization header is expected.",
            Self::MalformedHeader => "Authorization header must be a bearer token.",
            Self::InvalidHeader => "Authorization malformed.",
            Self::KeySetUnavailable => "Unable to retrieve signing keys.",
            Self::UnknownKey => "Unable to find the appropriate key.",
            Self::SignatureExpired => "Token expired.",
            Self::InvalidClaims => "Incorrect claims. Please, check the audience and issuer.",
            Self::InvalidToken => "Unable to parse authentication token.",
            Self::PermissionsClaimMissing => "Permissions not included in JWT.",
            Self::PermissionDenied => "Permission not found.",
        }
    }
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// An authorization failure
///
/// Every stage of the pipeline fails with this one type so that callers can
/// translate it at a single boundary. The underlying cause, when there is
/// one, is available through [`Error::source`][StdError::source] for logging
/// but is never part of the reported description.
#[derive(Debug, Error)]
#[error("{}", .kind.description())]
pub struct AuthError {
    kind: AuthErrorKind,
    #[source]
    source: Option<BoxError>,
}

impl AuthError {
    /// Constructs a failure of the given kind without an underlying cause
    #[must_use]
    pub const fn new(kind: AuthErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// Constructs a failure of the given kind caused by `source`
    #[must_use]
    pub fn with_source(kind: AuthErrorKind, source: impl Into<BoxError>) -> Self {
        Self {
            kind,
            source: Some(source.into()),
        }
    }

    /// The reason for the failure
    #[must_use]
    pub const fn kind(&self) -> AuthErrorKind {
        self.kind
    }

    /// The HTTP status code used when reporting this failure
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    /// A stable, machine-readable code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// A stable, human-readable description
    #[must_use]
    pub const fn description(&self) -> &'static str {
        self.kind.description()
    }

    /// The permission denial behind this failure, if any
    #[must_use]
    pub fn permission_denial(&self) -> Option<&PermissionDenial> {
        self.source.as_deref()?.downcast_ref()
    }
}

impl From<AuthErrorKind> for AuthError {
    #[inline]
    fn from(kind: AuthErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<JwtVerifyError> for AuthError {
    fn from(err: JwtVerifyError) -> Self {
        let kind = match &err {
            e if e.is_malformed_header() => AuthErrorKind::InvalidHeader,
            JwtVerifyError::ClaimsRejected(ClaimsRejected::TokenExpired) => {
                AuthErrorKind::SignatureExpired
            }
            JwtVerifyError::ClaimsRejected(ClaimsRejected::InvalidAlgorithm) => {
                AuthErrorKind::InvalidToken
            }
            JwtVerifyError::ClaimsRejected(_) => AuthErrorKind::InvalidClaims,
            _ => AuthErrorKind::InvalidToken,
        };

        Self::with_source(kind, err)
    }
}

impl From<PermissionDenial> for AuthError {
    fn from(denial: PermissionDenial) -> Self {
        let kind = match &denial {
            PermissionDenial::ClaimMissing => AuthErrorKind::PermissionsClaimMissing,
            PermissionDenial::NotGranted(_) => AuthErrorKind::PermissionDenied,
        };

        Self::with_source(kind, denial)
    }
}
