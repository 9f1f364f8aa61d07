//! Extractors asserting that a request carries a token granting a permission

/// Constructs an extractor that authorizes the request against a single
/// required permission.
///
/// For a more concise way to construct several guards, see
/// [`permission_guards!`][crate::permission_guards!].
///
/// ```
/// use gatekeep_axum::permission_guard;
///
/// permission_guard!(DeleteActors; "delete:actors");
/// ```
///
/// A guard that accepts any verified token, whatever its permissions, is
/// declared with `*`:
///
/// ```
/// use gatekeep_axum::permission_guard;
///
/// permission_guard!(AnyCaller; *);
/// ```
///
/// The extractor reads the `Authorization` header, verifies the bearer token
/// with the [`Authority`][gatekeep_oauth2::Authority] taken from the router
/// state, and checks the policy. Handlers receive the verified claims; when
/// authorization fails, the handler is never run and the request is
/// rejected with an [`AuthRejection`][crate::AuthRejection].
///
/// ```no_run
/// use axum::{routing::delete, Router};
/// use gatekeep_axum::permission_guard;
/// use gatekeep_oauth2::{Authority, AuthorityConfig};
///
/// permission_guard!(DeleteActors; "delete:actors");
///
/// async fn delete_actor(DeleteActors(claims): DeleteActors) -> String {
///     format!("deleted by {:?}", claims.subject())
/// }
///
/// # #[tokio::main(flavor = "current_thread")] async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = AuthorityConfig::new("example.us.auth0.com", "casting-agency");
/// let authority = Authority::from_config(&config)?;
///
/// let router: Router = Router::new()
///     .route("/actors/:id", delete(delete_actor))
///     .with_state(authority);
///
/// let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
/// axum::serve(listener, router).await?;
/// # Ok(())
/// # }
/// ```
///
/// A custom claims type can be used instead of [`Claims`][gatekeep_oauth2::Claims]:
///
/// ```
/// use gatekeep::{clock::UnixTime, jwt};
/// use gatekeep_axum::permission_guard;
/// use gatekeep_oauth2::{HasPermissions, Permissions};
/// use serde::Deserialize;
///
/// #[derive(Clone, Debug, Deserialize)]
/// pub struct CustomClaims {
///     iss: jwt::Issuer,
///     aud: jwt::Audiences,
///     sub: jwt::Subject,
///     exp: UnixTime,
///     permissions: Option<Permissions>,
/// }
///
/// impl jwt::CoreClaims for CustomClaims {
///     fn nbf(&self) -> Option<UnixTime> { None }
///     fn exp(&self) -> Option<UnixTime> { Some(self.exp) }
///     fn aud(&self) -> &jwt::Audiences { &self.aud }
///     fn iss(&self) -> Option<&jwt::IssuerRef> { Some(&self.iss) }
///     fn sub(&self) -> Option<&jwt::SubjectRef> { Some(&self.sub) }
/// }
///
/// impl HasPermissions for CustomClaims {
///     fn permissions(&self) -> Option<&Permissions> { self.permissions.as_ref() }
/// }
///
/// permission_guard!(GetMovies(CustomClaims); "get:movies");
///
/// async fn list_movies(GetMovies(claims): GetMovies) -> String {
///     format!("listed by {}", claims.sub)
/// }
/// ```
#[macro_export]
macro_rules! permission_guard {
    ($vis:vis $i:ident; *) => {
        $crate::permission_guard!($vis $i($crate::__private::Claims); *);
    };
    ($vis:vis $i:ident; $permission:literal) => {
        $crate::permission_guard!($vis $i($crate::__private::Claims); $permission);
    };
    ($vis:vis $i:ident($claim:ty); *) => {
        $crate::__permission_guard_impl!(
            $vis $i($claim);
            $crate::__private::PermissionPolicy::allow_any();
            "Accepts any verified token, whatever its permissions."
        );
    };
    ($vis:vis $i:ident($claim:ty); $permission:literal) => {
        $crate::__permission_guard_impl!(
            $vis $i($claim);
            $crate::__private::PermissionPolicy::require($permission);
            concat!("Requires the `", $permission, "` permission.")
        );
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __permission_guard_impl {
    ($vis:vis $i:ident($claim:ty); $policy:expr; $doc:expr) => {
        /// Authorizes the request, extracting the verified claims
        ///
        #[doc = $doc]
        $vis struct $i($vis $claim);

        impl $i {
            #[allow(dead_code)]
            $vis fn into_claims(self) -> $claim {
                self.0
            }

            #[allow(dead_code)]
            $vis fn claims(&self) -> &$claim {
                &self.0
            }
        }

        impl $crate::EndpointPermissionPolicy for $i {
            type Claims = $claim;

            fn permission_policy() -> &'static $crate::__private::PermissionPolicy {
                static POLICY: $crate::__private::OnceCell<$crate::__private::PermissionPolicy> =
                    $crate::__private::OnceCell::new();
                POLICY.get_or_init(|| $policy)
            }
        }

        #[$crate::__private::async_trait]
        impl<S> $crate::__private::FromRequestParts<S> for $i
        where
            $crate::__private::Authority: $crate::__private::FromRef<S>,
            S: Send + Sync,
        {
            type Rejection = $crate::AuthRejection;

            async fn from_request_parts(
                req: &mut $crate::__private::Parts,
                state: &S,
            ) -> Result<Self, Self::Rejection> {
                $crate::__private::from_request::<$claim, S>(
                    req,
                    state,
                    <Self as $crate::EndpointPermissionPolicy>::permission_policy(),
                )
                .await
                .map(Self)
            }
        }
    };
}

/// Convenience macro for services that need to define many permission
/// guards.
///
/// # Example
///
/// ```
/// use gatekeep_axum::permission_guards;
///
/// permission_guards! {
///     pub permission GetActors = "get:actors";
///     pub permission PostActors = "post:actors";
///     pub permission PatchActors = "patch:actors";
///     pub permission DeleteActors = "delete:actors";
///     permission AnyCaller = *;
/// }
/// ```
///
/// Each declaration defines a guard as [`permission_guard!`] does. A custom
/// claims type can be given with a leading `type Claims = <...>;`
/// declaration.
#[macro_export]
macro_rules! permission_guards {
    ($($vis:vis permission $i:ident = $permission:tt);* $(;)?) => {
        $(
            $crate::permission_guard!($vis $i; $permission);
        )*
    };
    (type Claims = $claims:ty; $($vis:vis permission $i:ident = $permission:tt);* $(;)?) => {
        $(
            $crate::permission_guard!($vis $i($claims); $permission);
        )*
    };
}

#[cfg(test)]
mod tests {
    use axum::{extract::FromRequestParts, http::Request};
    use color_eyre::Result;
    use gatekeep_oauth2::{AuthErrorKind, Authority, HasPermissions, Permissions};

    use crate::{test, EndpointPermissionPolicy};

    permission_guard!(DeleteActors; "delete:actors");

    permission_guards! {
        permission GetActors = "get:actors";
        permission AnyCaller = *;
    }

    #[derive(Debug, serde::Deserialize)]
    struct MovieClaims {
        exp: gatekeep::clock::UnixTime,
        iss: gatekeep::jwt::Issuer,
        #[serde(default)]
        aud: gatekeep::jwt::Audiences,
        permissions: Option<Permissions>,
    }

    impl gatekeep::jwt::CoreClaims for MovieClaims {
        fn nbf(&self) -> Option<gatekeep::clock::UnixTime> {
            None
        }

        fn exp(&self) -> Option<gatekeep::clock::UnixTime> {
            Some(self.exp)
        }

        fn aud(&self) -> &gatekeep::jwt::Audiences {
            &self.aud
        }

        fn iss(&self) -> Option<&gatekeep::jwt::IssuerRef> {
            Some(&self.iss)
        }

        fn sub(&self) -> Option<&gatekeep::jwt::SubjectRef> {
            None
        }
    }

    impl HasPermissions for MovieClaims {
        fn permissions(&self) -> Option<&Permissions> {
            self.permissions.as_ref()
        }
    }

    permission_guards! {
        type Claims = MovieClaims;

        permission PostMovies = "post:movies";
    }

    fn request(header: Option<&str>) -> axum::http::request::Parts {
        let mut builder = Request::builder();
        if let Some(header) = header {
            builder = builder.header("authorization", header);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn authority() -> Authority {
        test::authority()
    }

    #[test]
    fn policies_are_static_per_guard() {
        assert_eq!(
            DeleteActors::permission_policy()
                .required()
                .map(|p| p.as_str()),
            Some("delete:actors")
        );
        assert_eq!(AnyCaller::permission_policy().required(), None);
        assert!(std::ptr::eq(
            GetActors::permission_policy(),
            GetActors::permission_policy()
        ));
    }

    #[tokio::test]
    async fn guard_without_header_rejects() {
        let err = GetActors::from_request_parts(&mut request(None), &authority())
            .await
            .err()
            .unwrap();
        assert_eq!(err.0.kind(), AuthErrorKind::MissingHeader);
    }

    #[tokio::test]
    async fn guard_with_permission_extracts_claims() -> Result<()> {
        let token = test::sign(&test::payload(&["get:actors"]));
        let header = format!("Bearer {}", token.as_str());

        let GetActors(claims) =
            GetActors::from_request_parts(&mut request(Some(&header)), &authority()).await?;
        assert_eq!(claims.subject().map(|s| s.as_str()), Some(test::SUBJECT));
        Ok(())
    }

    #[tokio::test]
    async fn guard_without_permission_rejects() {
        let token = test::sign(&test::payload(&["get:actors"]));
        let header = format!("Bearer {}", token.as_str());

        let err = DeleteActors::from_request_parts(&mut request(Some(&header)), &authority())
            .await
            .err()
            .unwrap();
        assert_eq!(err.0.kind(), AuthErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn any_caller_guard_accepts_token_without_permissions() -> Result<()> {
        let mut payload = test::payload(&[]);
        payload.as_object_mut().unwrap().remove("permissions");
        let token = test::sign(&payload);
        let header = format!("Bearer {}", token.as_str());

        AnyCaller::from_request_parts(&mut request(Some(&header)), &authority()).await?;
        Ok(())
    }

    #[tokio::test]
    async fn guard_with_custom_claims() -> Result<()> {
        let token = test::sign(&test::payload(&["post:movies"]));
        let header = format!("Bearer {}", token.as_str());

        let guard =
            PostMovies::from_request_parts(&mut request(Some(&header)), &authority()).await?;
        assert_eq!(guard.claims().permissions.as_ref().map(Permissions::len), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn non_ascii_header_is_malformed() {
        let mut parts = request(None);
        parts.headers.insert(
            "authorization",
            axum::http::HeaderValue::from_bytes(b"Bearer \xfftoken").unwrap(),
        );

        let err = GetActors::from_request_parts(&mut parts, &authority())
            .await
            .err()
            .unwrap();
        assert_eq!(err.0.kind(), AuthErrorKind::MalformedHeader);
    }
}
