//! JOSE building blocks for verifying bearer tokens signed by an external
//! identity provider.
//!
//! Only the asymmetric RSA family of JSON Web Algorithms is supported.
//! Symmetric (`HS*`) and unsecured (`none`) algorithms cannot be
//! represented by [`jwa::Algorithm`] and so can never be accepted.
//!
//! * JSON Web Signature (JWS): [RFC7515][]
//! * JSON Web Key (JWK): [RFC7517][]
//! * JSON Web Algorithms (JWA): [RFC7518][]
//! * JSON Web Token (JWT): [RFC7519][]
//!
//! [RFC7515]: https://tools.ietf.org/html/rfc7515
//! [RFC7517]: https://tools.ietf.org/html/rfc7517
//! [RFC7518]: https://tools.ietf.org/html/rfc7518
//! [RFC7519]: https://tools.ietf.org/html/rfc7519
//!
//! # Example
//!
//! ```no_run
//! use gatekeep::{jwa, jwt, Jwks, JwtRef};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let jwks_json = "";
//! let keys: Jwks = serde_json::from_str(jwks_json)?;
//! let token = JwtRef::from_str("eyJhbGciOiJSUzI1NiIsImtpZCI6ImsxIn0.e30.c2ln");
//!
//! let validator = jwt::CoreValidator::default()
//!     .add_approved_algorithm(jwa::Algorithm::RS256)
//!     .add_allowed_audience(jwt::Audience::from_static("casting-agency"))
//!     .require_issuer(jwt::Issuer::from_static("https://example.auth0.com/"));
//!
//! let decomposed: jwt::Decomposed = token.decompose()?;
//! let kid = decomposed.kid().ok_or("missing kid")?;
//! let key = keys.get_key_by_id(kid).ok_or("unknown kid")?;
//!
//! let validated: jwt::Validated = decomposed.verify(key, &validator)?;
//! # let _ = validated;
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
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

pub mod b64;
pub mod clock;
pub mod error;
pub mod jwa;
pub mod jwk;
mod jwks;
pub mod jws;
pub mod jwt;

#[cfg(test)]
pub(crate) mod test;

#[doc(inline)]
pub use jwk::Jwk;
#[doc(inline)]
pub use jwks::Jwks;
#[doc(inline)]
pub use jwt::{Jwt, JwtRef};
