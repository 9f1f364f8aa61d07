//! Axum utilities that make it easier to enforce per-endpoint permissions in
//! your application.
//!
//! Guards declared with [`permission_guards!`] are request extractors. Each
//! one reads the `Authorization` header, verifies the bearer token with the
//! [`Authority`][gatekeep_oauth2::Authority] found in the router state, and
//! checks that the token grants the guard's permission. Rejected requests
//! never reach the handler; they are answered with the JSON error envelope:
//!
//! ```json
//! {"success": false, "error": 403, "message": "Permission not found."}
//! ```
//!
//! # Full Example
//!
//! ```no_run
//! use axum::{
//!     extract::{FromRef, Path},
//!     routing::{delete, get},
//!     Json, Router,
//! };
//! use gatekeep_axum::{method_not_allowed, not_found};
//! use gatekeep_oauth2::{Authority, AuthorityConfig};
//! use serde_json::{json, Value};
//!
//! mod permission {
//!     gatekeep_axum::permission_guards! {
//!         pub permission GetActors = "get:actors";
//!         pub permission DeleteActors = "delete:actors";
//!     }
//! }
//!
//! #[derive(Clone)]
//! struct AppState {
//!     authority: Authority,
//! }
//!
//! impl FromRef<AppState> for Authority {
//!     fn from_ref(state: &AppState) -> Self {
//!         state.authority.clone()
//!     }
//! }
//!
//! async fn list_actors(_: permission::GetActors) -> Json<Value> {
//!     Json(json!({ "success": true, "actors": [] }))
//! }
//!
//! async fn delete_actor(
//!     permission::DeleteActors(claims): permission::DeleteActors,
//!     Path(id): Path<u64>,
//! ) -> Json<Value> {
//!     tracing::info!(subject = ?claims.subject(), id, "deleting actor");
//!     Json(json!({ "success": true, "delete": id }))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AuthorityConfig::new("example.us.auth0.com", "casting-agency");
//!     let state = AppState {
//!         authority: Authority::from_config(&config)?,
//!     };
//!
//!     let router = Router::new()
//!         .route("/actors", get(list_actors).fallback(method_not_allowed))
//!         .route("/actors/:id", delete(delete_actor).fallback(method_not_allowed))
//!         .fallback(not_found)
//!         .with_state(state);
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, router).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused_must_use
)]
#![forbid(unsafe_code)]

use std::{error::Error, fmt};

use axum_core::response::{IntoResponse, Response};
use gatekeep_oauth2::{
    AuthError, AuthErrorKind, HasPermissions, PermissionDenial, PermissionPolicy,
};
use http::{header, HeaderValue, StatusCode};
use serde::Serialize;

mod macros;

/// Defines a permission policy for a given endpoint guard
pub trait EndpointPermissionPolicy {
    /// The claims structure to decode from the token and return if authorized
    type Claims: HasPermissions;

    /// The permission policy to be enforced when this type is used as an
    /// endpoint guard
    fn permission_policy() -> &'static PermissionPolicy;
}

/// The rejection produced when an endpoint guard refuses a request
///
/// Responds with the status mapped from the failure, the JSON error
/// envelope, and a `WWW-Authenticate` challenge.
#[derive(Debug)]
pub struct AuthRejection(pub AuthError);

impl AuthRejection {
    /// The underlying authorization failure
    pub fn error(&self) -> &AuthError {
        &self.0
    }

    /// Unwraps the underlying authorization failure
    pub fn into_error(self) -> AuthError {
        self.0
    }
}

impl From<AuthError> for AuthRejection {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Error for AuthRejection {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        ApiError::Auth(self.0).into_response()
    }
}

/// A failure reported to API clients with the JSON error envelope
#[derive(Debug)]
#[non_exhaustive]
pub enum ApiError {
    /// The request could not be authorized
    Auth(AuthError),

    /// No resource exists at the requested path
    NotFound,

    /// The resource does not support the requested method
    MethodNotAllowed,

    /// The request body could not be processed
    Unprocessable,
}

impl ApiError {
    /// The HTTP status reported for this failure
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth(err) => {
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::UNAUTHORIZED)
            }
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Unprocessable => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    /// The message reported in the envelope
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::Auth(err) => err.description(),
            Self::NotFound => "resource not found",
            Self::MethodNotAllowed => "method not allowed",
            Self::Unprocessable => "unprocessable",
        }
    }

    fn challenge(&self) -> Option<HeaderValue> {
        let Self::Auth(err) = self else {
            return None;
        };

        let challenge = match err.kind() {
            AuthErrorKind::MissingHeader => String::from("Bearer"),
            AuthErrorKind::PermissionDenied => match err.permission_denial() {
                Some(PermissionDenial::NotGranted(permission)) => format!(
                    r#"Bearer error="insufficient_scope", scope="{}""#,
                    permission.as_str().escape_default()
                ),
                _ => String::from(r#"Bearer error="insufficient_scope""#),
            },
            AuthErrorKind::PermissionsClaimMissing => format!(
                r#"Bearer error="invalid_request", error_description="{}""#,
                err.description()
            ),
            _ => format!(
                r#"Bearer error="invalid_token", error_description="{}""#,
                err.description()
            ),
        };

        HeaderValue::from_str(&challenge).ok()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<AuthRejection> for ApiError {
    fn from(rejection: AuthRejection) -> Self {
        Self::Auth(rejection.0)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Auth(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    success: bool,
    error: u16,
    message: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let envelope = Envelope {
            success: false,
            error: status.as_u16(),
            message: self.message(),
        };

        let mut response = match serde_json::to_vec(&envelope) {
            Ok(body) => (
                status,
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                )],
                body,
            )
                .into_response(),
            Err(error) => {
                let error: &dyn Error = &error;
                tracing::warn!(error, "unable to serialize error envelope");
                status.into_response()
            }
        };

        if let Some(challenge) = self.challenge() {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, challenge);
        }

        response
    }
}

/// A router fallback answering with a `404` envelope
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// A method router fallback answering with a `405` envelope
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

#[doc(hidden)]
pub mod __private {
    pub use async_trait::async_trait;
    pub use axum_core::extract::{FromRef, FromRequestParts};
    use gatekeep::jwt::CoreClaims;
    pub use gatekeep_oauth2::{Authority, Claims, PermissionPolicy};
    use gatekeep_oauth2::HasPermissions;
    pub use http::request::Parts;
    pub use once_cell::sync::OnceCell;
    use serde::Deserialize;

    use crate::AuthRejection;

    pub async fn from_request<C, S>(
        req: &mut Parts,
        state: &S,
        policy: &'static PermissionPolicy,
    ) -> Result<C, AuthRejection>
    where
        C: for<'de> Deserialize<'de> + CoreClaims + HasPermissions + Send,
        Authority: FromRef<S>,
        S: Send + Sync,
    {
        let header = req.headers.get(http::header::AUTHORIZATION).map(|value| {
            value.to_str().unwrap_or_else(|_| {
                tracing::trace!("authorization header is not visible ASCII");
                ""
            })
        });

        let authority = Authority::from_ref(state);
        authority
            .authorize::<C>(header, policy)
            .await
            .map_err(AuthRejection)
    }
}
