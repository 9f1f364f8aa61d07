//! Implementations of the JSON Web Tokens (JWT) standard
//!
//! The specifications for this standard can be found in [RFC7519][].
//!
//! A compact JWT is three base64url segments separated by `.`: a JSON
//! header naming the signing algorithm and key, a JSON payload of claims,
//! and the signature over the first two segments.
//!
//! Nothing in the header or payload may be trusted before the signature has
//! been verified. [`JwtRef::decompose`] only exposes the header so that the
//! right key can be selected; [`Decomposed::verify`] checks the signature
//! before the payload is even decoded.
//!
//! [RFC7519]: https://tools.ietf.org/html/rfc7519

use std::{fmt, time::Duration};

use aliri_braid::braid;
use serde::{Deserialize, Serialize};

use crate::{
    b64::Base64Url,
    clock::{Clock, System, UnixTime},
    error, jwa, jwk, jws,
};

/// The validated headers and claims of a JWT
///
/// This type can _only_ be generated within this crate to assert that the
/// headers and claims held by this type have already been validated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validated<C = BasicClaims, H = BasicHeaders> {
    headers: H,
    claims: C,
}

impl<C, H> Validated<C, H> {
    /// Extracts the header and claims from the token
    pub fn extract(self) -> (H, C) {
        (self.headers, self.claims)
    }

    /// The validated token headers
    pub fn headers(&self) -> &H {
        &self.headers
    }

    /// The validated token claims
    pub fn claims(&self) -> &C {
        &self.claims
    }

    /// Discards the headers, keeping the validated claims
    pub fn into_claims(self) -> C {
        self.claims
    }
}

/// A JWT split into its segments, with only the header decoded
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct Decomposed<'a, H = BasicHeaders> {
    header: H,
    message: &'a str,
    payload: &'a str,
    signature: Base64Url,
}

macro_rules! expect_two {
    ($iter:expr) => {{
        let mut i = $iter;
        match (i.next(), i.next(), i.next()) {
            (Some(first), Some(second), None) => Some((first, second)),
            _ => None,
        }
    }};
}

impl<'a, H> Decomposed<'a, H>
where
    H: CoreHeaders,
{
    /// The algorithm declared in the header, if it is supported
    ///
    /// # Errors
    ///
    /// The header names an algorithm outside of the RSA family.
    pub fn algorithm(&self) -> Result<jwa::Algorithm, error::UnknownAlgorithm> {
        self.header.algorithm()
    }

    /// The key identifier declared in the header
    #[must_use]
    pub fn kid(&self) -> Option<&jwk::KeyIdRef> {
        self.header.kid()
    }

    /// Verifies the signature using `key`, then decodes the payload and checks
    /// it against `validator` using the system clock
    ///
    /// # Errors
    ///
    /// Returns an error if the signature does not match, the payload cannot
    /// be decoded, or the claims are rejected.
    pub fn verify<C, V>(
        self,
        key: &V,
        validator: &CoreValidator,
    ) -> Result<Validated<C, H>, error::JwtVerifyError>
    where
        C: for<'de> Deserialize<'de> + CoreClaims,
        V: jws::Verifier<Algorithm = jwa::Algorithm>,
        error::JwtVerifyError: From<V::Error>,
    {
        self.verify_with_clock(key, validator, &System)
    }

    /// Verifies the token as [`verify()`][Self::verify] does, evaluating
    /// time-bound claims against `clock`
    ///
    /// # Errors
    ///
    /// Returns an error if the signature does not match, the payload cannot
    /// be decoded, or the claims are rejected.
    pub fn verify_with_clock<C, V, K>(
        self,
        key: &V,
        validator: &CoreValidator,
        clock: &K,
    ) -> Result<Validated<C, H>, error::JwtVerifyError>
    where
        C: for<'de> Deserialize<'de> + CoreClaims,
        V: jws::Verifier<Algorithm = jwa::Algorithm>,
        error::JwtVerifyError: From<V::Error>,
        K: Clock + ?Sized,
    {
        let alg = self.header.algorithm()?;
        validator.check_algorithm(alg)?;

        key.verify(alg, self.message.as_bytes(), self.signature.as_slice())?;

        let p_raw = Base64Url::from_encoded(self.payload).map_err(error::malformed_jwt_payload)?;
        let claims: C =
            serde_json::from_slice(p_raw.as_slice()).map_err(error::malformed_jwt_payload)?;

        validator.validate_with_clock(&claims, clock)?;

        Ok(Validated {
            headers: self.header,
            claims,
        })
    }

    /// The untrusted headers of the JWT
    ///
    /// **WARNING:** *These headers have not been validated.* They are only
    /// suitable for selecting the key that will verify the token.
    pub fn untrusted_header(&self) -> &H {
        &self.header
    }

    /// The raw signature of the JWT
    pub fn signature(&self) -> &Base64Url {
        &self.signature
    }
}

impl JwtRef {
    /// Splits the JWT into its segments and decodes its header
    ///
    /// # Errors
    ///
    /// Returns an error if the JWT does not have exactly three segments, if
    /// the header is not base64url-encoded JSON, or if the signature is not
    /// base64url.
    pub fn decompose<H>(&self) -> Result<Decomposed<H>, error::JwtVerifyError>
    where
        H: for<'de> Deserialize<'de>,
    {
        let (s_str, message) =
            expect_two!(self.as_str().rsplitn(2, '.')).ok_or_else(error::malformed_jwt)?;
        let (payload, h_str) =
            expect_two!(message.rsplitn(2, '.')).ok_or_else(error::malformed_jwt)?;
        let h_raw = Base64Url::from_encoded(h_str).map_err(error::malformed_jwt_header)?;
        let header: H =
            serde_json::from_slice(h_raw.as_slice()).map_err(error::malformed_jwt_header)?;
        let signature = Base64Url::from_encoded(s_str).map_err(error::malformed_jwt_signature)?;
        Ok(Decomposed {
            header,
            message,
            payload,
            signature,
        })
    }

    /// Decomposes the token, then verifies it against `key` and `validator`
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed or fails verification.
    pub fn verify<C, H, V>(
        &self,
        key: &V,
        validator: &CoreValidator,
    ) -> Result<Validated<C, H>, error::JwtVerifyError>
    where
        C: for<'de> Deserialize<'de> + CoreClaims,
        H: for<'de> Deserialize<'de> + CoreHeaders,
        V: jws::Verifier<Algorithm = jwa::Algorithm>,
        error::JwtVerifyError: From<V::Error>,
    {
        self.decompose()?.verify(key, validator)
    }
}

/// Core claims that most compliant and secure JWT tokens should have
pub trait CoreClaims {
    /// Not before
    fn nbf(&self) -> Option<UnixTime>;

    /// Expires
    fn exp(&self) -> Option<UnixTime>;

    /// Audience
    fn aud(&self) -> &Audiences;

    /// Issuer
    fn iss(&self) -> Option<&IssuerRef>;

    /// Subject
    fn sub(&self) -> Option<&SubjectRef>;
}

/// Indicates that the type has values common to a JWT header
pub trait CoreHeaders {
    /// The algorithm name exactly as declared
    fn alg(&self) -> &str;

    /// Key ID
    ///
    /// The ID of the JWK that signed this token.
    fn kid(&self) -> Option<&jwk::KeyIdRef>;

    /// The declared algorithm, if it is one that this crate supports
    ///
    /// # Errors
    ///
    /// The declared algorithm is unsupported, which includes every symmetric
    /// algorithm and `none`.
    fn algorithm(&self) -> Result<jwa::Algorithm, error::UnknownAlgorithm> {
        self.alg().parse()
    }
}

/// An audience
#[braid(serde, ref_doc = "A borrowed reference to an [`Audience`]")]
pub struct Audience;

/// An issuer of JWTs
#[braid(serde, ref_doc = "A borrowed reference to an [`Issuer`]")]
pub struct Issuer;

/// The subject of a JWT
#[braid(serde, ref_doc = "A borrowed reference to a [`Subject`]")]
pub struct Subject;

/// A JSON Web Token
///
/// [`Debug`][JwtRef#impl-Debug] and [`Display`][JwtRef#impl-Display] never
/// reveal the signature, and reveal nothing at all unless the alternate flag
/// (`{:#}`) is given.
#[braid(
    serde,
    debug = "owned",
    display = "owned",
    ord = "omit",
    ref_doc = "A borrowed reference to a JSON Web Token ([`Jwt`])"
)]
#[must_use]
pub struct Jwt;

#[cfg(feature = "private-keys")]
#[cfg_attr(docsrs, doc(cfg(feature = "private-keys")))]
impl Jwt {
    /// Serializes `headers` and `payload` and signs them with `key`
    ///
    /// # Errors
    ///
    /// * The algorithm named in the header is not supported
    /// * Serialization of either the header or payload fails
    /// * The key cannot produce the signature
    pub fn try_from_parts_with_signature<H, P, K>(
        headers: &H,
        payload: &P,
        key: &K,
    ) -> Result<Self, error::JwtSigningError>
    where
        H: Serialize + CoreHeaders,
        P: Serialize,
        K: jws::Signer<Algorithm = jwa::Algorithm>,
        error::SigningError: From<K::Error>,
    {
        let alg = headers
            .algorithm()
            .map_err(error::SigningError::UnknownAlgorithm)?;
        if !key.can_sign(alg) {
            return Err(
                error::SigningError::IncompatibleAlgorithm(error::incompatible_algorithm(alg))
                    .into(),
            );
        }

        let h_raw =
            Base64Url::from_raw(serde_json::to_vec(headers).map_err(error::malformed_jwt_header)?);
        let p_raw =
            Base64Url::from_raw(serde_json::to_vec(payload).map_err(error::malformed_jwt_payload)?);

        let mut message = String::with_capacity(h_raw.encoded_len() + p_raw.encoded_len() + 2);
        h_raw.encode_into(&mut message);
        message.push('.');
        p_raw.encode_into(&mut message);

        let signature = key
            .sign(alg, message.as_bytes())
            .map_err(error::SigningError::from)?;

        message.push('.');
        Base64Url::from_raw(signature).encode_into(&mut message);

        Ok(Self::new(message))
    }
}

impl JwtRef {
    fn fmt_redacted(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            let token = self.as_str();
            match token.rfind('.') {
                Some(idx) => {
                    f.write_str(&token[..=idx])?;
                    f.write_str("…")
                }
                None => f.write_str("…"),
            }
        } else {
            f.write_str("***JWT***")
        }
    }
}

/// Prints `***JWT***`, or with `{:#?}` the quoted header and payload segments
/// followed by an elided signature
impl fmt::Debug for JwtRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            f.write_str("\"")?;
            self.fmt_redacted(f)?;
            f.write_str("\"")
        } else {
            self.fmt_redacted(f)
        }
    }
}

/// Prints `***JWT***`, or with `{:#}` the header and payload segments
/// followed by an elided signature
impl fmt::Display for JwtRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.fmt_redacted(f)
    }
}

/// A set of zero or more [`Audience`]s
///
/// The `aud` claim may be either a bare string or an array. The set keeps
/// track of which form it was read from and serializes back in that form.
/// Equality considers only the audiences.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(from = "OneOrMany<Audience>", into = "OneOrMany<Audience>")]
#[must_use]
pub struct Audiences {
    values: Vec<Audience>,
    bare: bool,
}

impl Audiences {
    /// An empty audience set
    #[inline]
    pub const fn empty() -> Self {
        Self {
            values: Vec::new(),
            bare: false,
        }
    }

    /// An audience set with a single audience, serialized as a bare string
    #[inline]
    pub fn single(aud: impl Into<Audience>) -> Self {
        Self {
            values: vec![aud.into()],
            bare: true,
        }
    }

    /// Indicates whether the audience set is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates through references to the audiences in the set
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &AudienceRef> {
        self.values.iter().map(AsRef::as_ref)
    }
}

impl PartialEq for Audiences {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl Eq for Audiences {}

impl From<OneOrMany<Audience>> for Audiences {
    #[inline]
    fn from(vals: OneOrMany<Audience>) -> Self {
        match vals {
            OneOrMany::One(x) => Self::single(x),
            OneOrMany::Many(values) => Self {
                values,
                bare: false,
            },
        }
    }
}

impl From<Audiences> for OneOrMany<Audience> {
    #[inline]
    fn from(mut auds: Audiences) -> Self {
        match auds.values.pop() {
            Some(only) if auds.bare && auds.values.is_empty() => Self::One(only),
            Some(last) => {
                auds.values.push(last);
                Self::Many(auds.values)
            }
            None => Self::Many(Vec::new()),
        }
    }
}

/// Serialized as an array, even when holding a single audience
impl From<Vec<Audience>> for Audiences {
    #[inline]
    fn from(values: Vec<Audience>) -> Self {
        Self {
            values,
            bare: false,
        }
    }
}

impl From<Audience> for Audiences {
    #[inline]
    fn from(aud: Audience) -> Self {
        Self::single(aud)
    }
}

/// Checks the registered claims of a token
///
/// By default no algorithm is approved, expiration is required and checked
/// with no grace period, `nbf` is checked only when present, and neither
/// audience nor issuer is checked.
#[derive(Clone, Debug)]
#[must_use]
pub struct CoreValidator {
    approved_algorithms: Vec<jwa::Algorithm>,
    leeway: Duration,
    validate_nbf: bool,
    allowed_audiences: Vec<Audience>,
    issuer: Option<Issuer>,
}

impl Default for CoreValidator {
    #[inline]
    fn default() -> Self {
        Self {
            approved_algorithms: Vec::new(),
            leeway: Duration::ZERO,
            validate_nbf: false,
            allowed_audiences: Vec::new(),
            issuer: None,
        }
    }
}

impl CoreValidator {
    /// Allows a grace period on either side of the `nbf` and `exp` claims
    #[inline]
    pub fn with_leeway(self, leeway: Duration) -> Self {
        Self { leeway, ..self }
    }

    /// Requires the `nbf` claim
    ///
    /// A present `nbf` claim is always checked.
    #[inline]
    pub fn check_not_before(self) -> Self {
        Self {
            validate_nbf: true,
            ..self
        }
    }

    /// Adds a single audience to the set of allowed audiences
    #[inline]
    pub fn add_allowed_audience(mut self, audience: Audience) -> Self {
        self.allowed_audiences.push(audience);
        self
    }

    /// Approves a single algorithm
    #[inline]
    pub fn add_approved_algorithm(mut self, alg: jwa::Algorithm) -> Self {
        self.approved_algorithms.push(alg);
        self
    }

    /// Require that tokens specify a particular issuer
    #[inline]
    pub fn require_issuer(self, issuer: Issuer) -> Self {
        Self {
            issuer: Some(issuer),
            ..self
        }
    }

    /// The configured grace period
    #[must_use]
    pub fn leeway(&self) -> Duration {
        self.leeway
    }

    /// Whether `alg` is approved
    ///
    /// A validator with no approved algorithms approves nothing.
    ///
    /// # Errors
    ///
    /// The algorithm is not approved.
    pub fn check_algorithm(&self, alg: jwa::Algorithm) -> Result<(), error::ClaimsRejected> {
        if self.approved_algorithms.contains(&alg) {
            Ok(())
        } else {
            Err(error::ClaimsRejected::InvalidAlgorithm)
        }
    }

    /// Validates time-bound, audience, and issuer claims as of `clock.now()`
    ///
    /// # Errors
    ///
    /// The first claim found to be missing or unacceptable, checked in the
    /// order `exp`, `nbf`, `aud`, `iss`.
    pub fn validate_with_clock<T, K>(&self, claims: &T, clock: &K) -> Result<(), error::ClaimsRejected>
    where
        T: CoreClaims,
        K: Clock + ?Sized,
    {
        let now = clock.now();
        let leeway = self.leeway.as_secs();

        match claims.exp() {
            Some(exp) if exp < now.saturating_sub(leeway) => {
                return Err(error::ClaimsRejected::TokenExpired)
            }
            Some(_) => {}
            None => return Err(error::ClaimsRejected::MissingRequiredClaim("exp")),
        }

        match claims.nbf() {
            Some(nbf) if nbf > now.saturating_add(leeway) => {
                return Err(error::ClaimsRejected::TokenNotYetValid)
            }
            Some(_) => {}
            None if self.validate_nbf => {
                return Err(error::ClaimsRejected::MissingRequiredClaim("nbf"))
            }
            None => {}
        }

        if !self.allowed_audiences.is_empty() {
            if claims.aud().is_empty() {
                return Err(error::ClaimsRejected::MissingRequiredClaim("aud"));
            }

            let found = claims
                .aud()
                .iter()
                .any(|a| self.allowed_audiences.iter().any(|e| a == e));
            if !found {
                return Err(error::ClaimsRejected::InvalidAudience);
            }
        }

        if let Some(allowed_iss) = &self.issuer {
            match claims.iss() {
                Some(iss) if iss == allowed_iss => {}
                Some(_) => return Err(error::ClaimsRejected::InvalidIssuer),
                None => return Err(error::ClaimsRejected::MissingRequiredClaim("iss")),
            }
        }

        Ok(())
    }
}

/// Minimal set of headers for common JWTs
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct BasicHeaders {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kid: Option<jwk::KeyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

impl BasicHeaders {
    /// Constructs JWT headers for a token signed with `alg`
    pub fn new(alg: jwa::Algorithm) -> Self {
        Self {
            alg: alg.name().to_owned(),
            kid: None,
            typ: Some("JWT".to_owned()),
        }
    }

    /// Constructs JWT headers naming the signing algorithm and key
    pub fn with_key_id(alg: jwa::Algorithm, kid: impl Into<jwk::KeyId>) -> Self {
        Self {
            kid: Some(kid.into()),
            ..Self::new(alg)
        }
    }

    /// The `typ` header, if present
    #[must_use]
    pub fn typ(&self) -> Option<&str> {
        self.typ.as_deref()
    }
}

impl CoreHeaders for BasicHeaders {
    fn alg(&self) -> &str {
        &self.alg
    }

    fn kid(&self) -> Option<&jwk::KeyIdRef> {
        self.kid.as_deref()
    }
}

/// Registered claims used by most JWTs
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[must_use]
pub struct BasicClaims {
    #[serde(default, skip_serializing_if = "Audiences::is_empty")]
    aud: Audiences,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<Issuer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<Subject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<UnixTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nbf: Option<UnixTime>,
}

impl CoreClaims for BasicClaims {
    fn nbf(&self) -> Option<UnixTime> {
        self.nbf
    }

    fn exp(&self) -> Option<UnixTime> {
        self.exp
    }

    fn aud(&self) -> &Audiences {
        &self.aud
    }

    fn iss(&self) -> Option<&IssuerRef> {
        self.iss.as_deref()
    }

    fn sub(&self) -> Option<&SubjectRef> {
        self.sub.as_deref()
    }
}

impl BasicClaims {
    /// Constructs a new, empty payload
    pub const fn new() -> Self {
        Self {
            aud: Audiences::empty(),
            iss: None,
            sub: None,
            exp: None,
            nbf: None,
        }
    }

    /// Sets the `aud` claim
    pub fn with_audience(mut self, aud: impl Into<Audience>) -> Self {
        self.aud = Audiences::single(aud);
        self
    }

    /// Sets the `iss` claim
    pub fn with_issuer(mut self, iss: impl Into<Issuer>) -> Self {
        self.iss = Some(iss.into());
        self
    }

    /// Sets the `sub` claim
    pub fn with_subject(mut self, sub: impl Into<Subject>) -> Self {
        self.sub = Some(sub.into());
        self
    }

    /// Sets the `exp` claim
    pub fn with_expiration(mut self, time: UnixTime) -> Self {
        self.exp = Some(time);
        self
    }

    /// Sets the `nbf` claim
    pub fn with_not_before(mut self, time: UnixTime) -> Self {
        self.nbf = Some(time);
        self
    }
}

/// A type representing one or more items, primarily for serialization
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// A single item
    One(T),

    /// Zero or more items, to be serialized/deserialized as an array
    Many(Vec<T>),
}
