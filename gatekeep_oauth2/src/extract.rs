//! Extraction of the bearer token from an `Authorization` header

use gatekeep::JwtRef;

use crate::{AuthError, AuthErrorKind};

/// The case-sensitive scheme expected in the `Authorization` header
pub const BEARER_SCHEME: &str = "Bearer";

/// Extracts the bearer token from the raw value of an `Authorization`
/// header
///
/// The header must consist of exactly two whitespace-separated parts, the
/// first of which is exactly `Bearer`. The second part is returned
/// unmodified.
///
/// # Errors
///
/// * [`MissingHeader`][AuthErrorKind::MissingHeader] if no header is given
/// * [`MalformedHeader`][AuthErrorKind::MalformedHeader] if the header has
///   another scheme or does not have exactly two parts
///
/// # Example
///
/// ```
/// use gatekeep_oauth2::{extract::bearer_token, AuthErrorKind};
///
/// let token = bearer_token(Some("Bearer abc.def.ghi")).unwrap();
/// assert_eq!(token.as_str(), "abc.def.ghi");
///
/// let err = bearer_token(Some("NotBearer abc123")).unwrap_err();
/// assert_eq!(err.kind(), AuthErrorKind::MalformedHeader);
/// ```
pub fn bearer_token(header: Option<&str>) -> Result<&JwtRef, AuthError> {
    let header = header.ok_or(AuthErrorKind::MissingHeader)?;

    let mut parts = header.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(BEARER_SCHEME), Some(token), None) => Ok(JwtRef::from_str(token)),
        _ => Err(AuthErrorKind::MalformedHeader.into()),
    }
}
