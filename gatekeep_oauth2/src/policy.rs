use thiserror::Error;

use crate::{HasPermissions, Permission, PermissionRef};

/// The reason a permission check failed
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PermissionDenial {
    /// The claims carry no permissions claim at all
    #[error("permissions claim missing")]
    ClaimMissing,

    /// The required permission was not granted
    #[error("permission '{0}' not granted")]
    NotGranted(Permission),
}

/// The permission a protected operation demands
///
/// # Examples
///
/// ## Require a single permission
/// ```
/// use gatekeep_oauth2::{PermissionDenial, PermissionPolicy, Permissions};
///
/// let policy = PermissionPolicy::require("delete:actors");
///
/// let granted = Permissions::single("delete:actors");
/// assert!(policy.check_permissions(Some(&granted)).is_ok());
///
/// let granted = Permissions::single("get:actors");
/// assert!(matches!(
///     policy.check_permissions(Some(&granted)),
///     Err(PermissionDenial::NotGranted(_))
/// ));
///
/// assert_eq!(
///     policy.check_permissions(None),
///     Err(PermissionDenial::ClaimMissing)
/// );
/// ```
///
/// ## Allow any verified token
/// ```
/// use gatekeep_oauth2::PermissionPolicy;
///
/// let policy = PermissionPolicy::allow_any();
/// assert!(policy.check_permissions(None).is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct PermissionPolicy {
    required: Option<Permission>,
}

impl PermissionPolicy {
    /// Constructs a policy requiring that `permission` has been granted
    pub fn require(permission: impl Into<Permission>) -> Self {
        Self {
            required: Some(permission.into()),
        }
    }

    /// Constructs a policy that accepts any verified token, whether or not it
    /// carries permissions
    pub const fn allow_any() -> Self {
        Self { required: None }
    }

    /// The permission required by this policy, if any
    #[must_use]
    pub fn required(&self) -> Option<&PermissionRef> {
        self.required.as_deref()
    }

    /// Checks the permissions granted by `claims`
    ///
    /// # Errors
    ///
    /// The claims carry no permissions claim, or do not include the
    /// required permission.
    pub fn check<C>(&self, claims: &C) -> Result<(), PermissionDenial>
    where
        C: HasPermissions + ?Sized,
    {
        self.check_permissions(claims.permissions())
    }

    /// Checks a set of granted permissions, `None` meaning the claim is absent
    ///
    /// # Errors
    ///
    /// The permissions are absent, or do not include the required
    /// permission.
    pub fn check_permissions(
        &self,
        granted: Option<&crate::Permissions>,
    ) -> Result<(), PermissionDenial> {
        let required = match &self.required {
            Some(required) => required,
            None => return Ok(()),
        };

        let granted = granted.ok_or(PermissionDenial::ClaimMissing)?;

        if granted.contains(required) {
            Ok(())
        } else {
            tracing::debug!(permission = %required, "required permission not granted");
            Err(PermissionDenial::NotGranted(required.clone()))
        }
    }
}
