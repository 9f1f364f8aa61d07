//! Enforcement of a permission policy around protected operations

use std::{fmt, future::Future, marker::PhantomData};

use gatekeep::jwt::CoreClaims;
use serde::Deserialize;

use crate::{extract, AuthError, AuthErrorKind, Authority, Claims, HasPermissions, PermissionPolicy};

/// The progress of a single request through the authorization pipeline
///
/// `Authorized` and `Denied` are terminal. Once either is reached no
/// further checks run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AuthStage {
    /// Nothing has been checked yet
    NoToken,
    /// A bearer token was found in the `Authorization` header
    HeaderExtracted,
    /// The token's signature matched a trusted key
    SignatureVerified,
    /// The token's registered claims were accepted
    ClaimsValidated,
    /// The required permission was granted
    PermissionChecked,
    /// The request may proceed
    Authorized,
    /// The request was refused
    Denied(AuthErrorKind),
}

impl AuthStage {
    /// Whether no further checks will run
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Authorized | Self::Denied(_))
    }

    fn advance(&mut self, next: Self) {
        tracing::trace!(from = ?*self, to = ?next, "authorization stage");
        *self = next;
    }

    fn deny(&mut self, err: AuthError) -> AuthError {
        // Claim failures are only found once the signature has been verified
        if matches!(
            err.kind(),
            AuthErrorKind::SignatureExpired | AuthErrorKind::InvalidClaims
        ) {
            self.advance(Self::SignatureVerified);
        }

        let error: &dyn std::error::Error = &err;
        tracing::debug!(
            stage = ?*self,
            error,
            error.code = err.code(),
            http.status_code = err.status_code(),
            "request denied",
        );
        *self = Self::Denied(err.kind());
        err
    }
}

pub(crate) async fn authorize<C>(
    authority: &Authority,
    header: Option<&str>,
    policy: &PermissionPolicy,
) -> Result<C, AuthError>
where
    C: for<'de> Deserialize<'de> + CoreClaims + HasPermissions,
{
    let mut stage = AuthStage::NoToken;

    let token = match extract::bearer_token(header) {
        Ok(token) => token,
        Err(err) => return Err(stage.deny(err)),
    };
    stage.advance(AuthStage::HeaderExtracted);

    let claims: C = match authority.verify(token).await {
        Ok(claims) => claims,
        Err(err) => return Err(stage.deny(err)),
    };
    stage.advance(AuthStage::SignatureVerified);
    stage.advance(AuthStage::ClaimsValidated);

    if let Err(denial) = policy.check(&claims) {
        return Err(stage.deny(denial.into()));
    }
    stage.advance(AuthStage::PermissionChecked);

    stage.advance(AuthStage::Authorized);
    tracing::debug!(
        permission = policy.required().map(|p| p.as_str()),
        "request authorized"
    );

    Ok(claims)
}

/// An authority paired with the permission policy of a protected operation
///
/// ```no_run
/// use gatekeep_oauth2::{Authority, Claims, Guard, PermissionPolicy};
///
/// # async fn run(authority: Authority, header: Option<&str>) -> Result<(), gatekeep_oauth2::AuthError> {
/// let guard: Guard = Guard::new(authority, PermissionPolicy::require("delete:actors"));
///
/// let delete_actor = guard.protect(|claims: Claims, id: u64| async move {
///     format!("{:?} deleted actor {id}", claims.subject())
/// });
///
/// let message = delete_actor.call(header, 7).await?;
/// # let _ = message;
/// # Ok(())
/// # }
/// ```
pub struct Guard<C = Claims> {
    authority: Authority,
    policy: PermissionPolicy,
    _claims: PhantomData<fn() -> C>,
}

impl<C> Guard<C> {
    /// Guards operations with `policy`, verifying tokens with `authority`
    pub fn new(authority: Authority, policy: PermissionPolicy) -> Self {
        Self {
            authority,
            policy,
            _claims: PhantomData,
        }
    }

    /// The policy enforced by this guard
    pub fn policy(&self) -> &PermissionPolicy {
        &self.policy
    }

    /// The authority used to verify tokens
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Wraps `op` so that it only runs once a request has been authorized
    pub fn protect<F>(self, op: F) -> Protected<C, F> {
        Protected { guard: self, op }
    }
}

impl<C> Guard<C>
where
    C: for<'de> Deserialize<'de> + CoreClaims + HasPermissions,
{
    /// Authorizes a request carrying the `Authorization` header `header`
    ///
    /// # Errors
    ///
    /// Any failure of extraction, verification, or the permission check.
    pub async fn authorize(&self, header: Option<&str>) -> Result<C, AuthError> {
        authorize(&self.authority, header, &self.policy).await
    }

    /// Authorizes the request, then runs `op` with the verified claims
    ///
    /// `op` is never invoked if authorization fails.
    ///
    /// # Errors
    ///
    /// Any failure of extraction, verification, or the permission check.
    pub async fn run<F, Fut, T>(&self, header: Option<&str>, op: F) -> Result<T, AuthError>
    where
        F: FnOnce(C) -> Fut,
        Fut: Future<Output = T>,
    {
        let claims = self.authorize(header).await?;
        Ok(op(claims).await)
    }
}

impl<C> Clone for Guard<C> {
    fn clone(&self) -> Self {
        Self {
            authority: self.authority.clone(),
            policy: self.policy.clone(),
            _claims: PhantomData,
        }
    }
}

impl<C> fmt::Debug for Guard<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("authority", &self.authority)
            .field("policy", &self.policy)
            .finish()
    }
}

/// An operation that only runs for authorized requests
///
/// Constructed with [`Guard::protect`].
pub struct Protected<C, F> {
    guard: Guard<C>,
    op: F,
}

impl<C, F> Protected<C, F>
where
    C: for<'de> Deserialize<'de> + CoreClaims + HasPermissions,
{
    /// Authorizes the request, then invokes the operation with the verified
    /// claims and `args`, returning its result unchanged
    ///
    /// # Errors
    ///
    /// Any failure of extraction, verification, or the permission check. The
    /// operation is not invoked.
    pub async fn call<A, Fut, T>(&self, header: Option<&str>, args: A) -> Result<T, AuthError>
    where
        F: Fn(C, A) -> Fut,
        Fut: Future<Output = T>,
    {
        let claims = self.guard.authorize(header).await?;
        Ok((self.op)(claims, args).await)
    }

    /// The guard enforced before the operation runs
    pub fn guard(&self) -> &Guard<C> {
        &self.guard
    }
}

impl<C, F> fmt::Debug for Protected<C, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protected")
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use color_eyre::Result;
    use serde_json::json;
    use tracing_test::traced_test;

    use super::*;
    use crate::test::{self, CountingSource};

    fn guard(source: std::sync::Arc<CountingSource>, permission: &str) -> Guard {
        Guard::new(test::authority(source), PermissionPolicy::require(permission))
    }

    fn bearer(token: &gatekeep::JwtRef) -> String {
        format!("Bearer {}", token.as_str())
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_header_fails_before_fetching() {
        let source = CountingSource::serving(test::jwks());
        let guard = guard(source.clone(), "get:actors");

        let err = guard.authorize(None).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::MissingHeader);
        assert_eq!(err.status_code(), 401);
        assert_eq!(source.fetches(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn wrong_scheme_is_malformed() {
        let source = CountingSource::serving(test::jwks());
        let guard = guard(source.clone(), "get:actors");

        let err = guard.authorize(Some("NotBearer abc123")).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::MalformedHeader);
        assert_eq!(err.status_code(), 401);
        assert_eq!(source.fetches(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn authorized_request_runs_operation_with_claims() -> Result<()> {
        let guard = guard(CountingSource::serving(test::jwks()), "get:actors");
        let token = test::sign(&test::payload(&["get:actors", "get:movies"]));

        let subject = guard
            .run(Some(&bearer(&token)), |claims| async move {
                claims.subject().map(|s| s.as_str().to_owned())
            })
            .await?;
        assert_eq!(subject.as_deref(), Some("auth0|5f0e8a1b"));
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn denied_permission_never_runs_operation() {
        let guard = guard(CountingSource::serving(test::jwks()), "delete:actors");
        let token = test::sign(&test::payload(&["get:actors"]));
        let invoked = AtomicUsize::new(0);

        let protected = guard.protect(|_claims: Claims, _id: u64| async {
            invoked.fetch_add(1, Ordering::SeqCst);
        });

        let err = protected.call(Some(&bearer(&token)), 7).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::PermissionDenied);
        assert_eq!(err.status_code(), 403);
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn expired_token_never_runs_operation() {
        let guard = guard(CountingSource::serving(test::jwks()), "get:actors");
        let mut payload = test::payload(&["get:actors"]);
        payload["exp"] = json!(test::NOW.0 - 1);
        let token = test::sign(&payload);
        let invoked = AtomicUsize::new(0);

        let err = guard
            .run(Some(&bearer(&token)), |_| async {
                invoked.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::SignatureExpired);
        assert_eq!(err.status_code(), 401);
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_permissions_claim_is_a_bad_request() {
        let guard = guard(CountingSource::serving(test::jwks()), "get:actors");
        let mut payload = test::payload(&[]);
        payload.as_object_mut().unwrap().remove("permissions");
        let token = test::sign(&payload);

        let err = guard.authorize(Some(&bearer(&token))).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::PermissionsClaimMissing);
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    #[traced_test]
    async fn protected_operation_receives_arguments_and_result_is_unchanged() -> Result<()> {
        let guard = guard(CountingSource::serving(test::jwks()), "patch:movies");
        let token = test::sign(&test::payload(&["patch:movies"]));

        let protected = guard.protect(|claims: Claims, (id, title): (u64, &'static str)| {
            let granted = claims.permissions().map_or(0, |p| p.len());
            async move { format!("{id}:{title}:{granted}") }
        });

        let result = protected.call(Some(&bearer(&token)), (3, "Heat")).await?;
        assert_eq!(result, "3:Heat:1");
        Ok(())
    }

    #[test]
    fn terminal_stages() {
        assert!(AuthStage::Authorized.is_terminal());
        assert!(AuthStage::Denied(AuthErrorKind::UnknownKey).is_terminal());
        assert!(!AuthStage::ClaimsValidated.is_terminal());
    }
}
