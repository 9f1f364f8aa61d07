//! Bearer token authorization for APIs protected by an external identity
//! provider
//!
//! A request is authorized in three steps, each of which can short-circuit
//! with an [`AuthError`]:
//!
//! 1. the bearer token is taken from the `Authorization` header
//!    ([`extract::bearer_token`]);
//! 2. the token is verified by an [`Authority`] against the provider's
//!    signing keys, which are held in a [`KeySetCache`] and refreshed when a
//!    token names a key that has not been seen yet;
//! 3. the verified claims are checked against a [`PermissionPolicy`].
//!
//! A [`Guard`] composes these steps around any protected operation.
//!
//! # Feature flags
//!
//! * `reqwest` (default): fetch the JWKS from the provider with [`RemoteJwks`]
//! * `rt` (default): periodic background refresh with
//!   [`KeySetCache::spawn_refresh`]
//! * `default-tls`/`rustls-tls`: enable TLS support in `reqwest`
//!
//! This crate does not enable TLS support in `reqwest` by itself. If your
//! application already uses `reqwest` with TLS, those settings apply here
//! too. Otherwise, enable `default-tls` or `rustls-tls` to reach an HTTPS
//! JWKS endpoint.
//!
//! # Example
//!
//! ```no_run
//! use gatekeep_oauth2::{Authority, AuthorityConfig, Claims, PermissionPolicy};
//!
//! # async fn run(header: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthorityConfig::new("example.us.auth0.com", "casting-agency");
//! let authority = Authority::from_config(&config)?;
//!
//! let policy = PermissionPolicy::require("get:actors");
//! let claims: Claims = authority.authorize(header, &policy).await?;
//! println!("authorized {:?}", claims.subject());
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
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
    unsafe_code,
    unused_must_use
)]

mod authority;
mod cache;
pub mod claims;
mod config;
pub mod error;
pub mod extract;
pub mod guard;
pub mod jwks;
pub mod permission;
mod policy;


pub use authority::Authority;
pub use cache::KeySetCache;
pub use claims::Claims;
pub use config::AuthorityConfig;
pub use error::{AuthError, AuthErrorKind};
pub use guard::{Guard, Protected};
#[cfg(feature = "reqwest")]
pub use jwks::RemoteJwks;
pub use jwks::{FetchError, JwksSource, StaticJwks};
pub use permission::{HasPermissions, Permission, PermissionRef, Permissions};
pub use policy::{PermissionDenial, PermissionPolicy};
