//! Permissions granted to the bearer of a token

use std::{iter, slice, vec};

use aliri_braid::braid;
use serde::{ser::SerializeSeq, Deserialize, Serialize, Serializer};

/// A single permission, such as `get:actors`
///
/// Permissions are compared by exact string equality. There is no wildcard
/// or hierarchical matching.
#[braid(serde, ref_doc = "A borrowed reference to a [`Permission`]")]
pub struct Permission;

/// Indicates that the type carries the permissions granted to a token
pub trait HasPermissions {
    /// The granted permissions
    ///
    /// Returns `None` when the claim is absent altogether, which is distinct
    /// from a present but empty set.
    fn permissions(&self) -> Option<&Permissions>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PermissionsDto {
    String(String),
    Array(Vec<Permission>),
}

impl From<PermissionsDto> for Permissions {
    fn from(dto: PermissionsDto) -> Self {
        match dto {
            PermissionsDto::String(s) => Self {
                list: s.split_whitespace().map(Permission::from).collect(),
                delimited: true,
            },
            PermissionsDto::Array(list) => Self {
                list,
                delimited: false,
            },
        }
    }
}

/// The ordered list of permissions granted to a token
///
/// Deserializes from either a JSON array of strings or a single
/// space-delimited string, and serializes back in the form it was read in.
/// Sets built in code serialize as an array.
///
/// Equality considers only the permissions and their order, not the form.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(from = "PermissionsDto")]
#[must_use]
pub struct Permissions {
    list: Vec<Permission>,
    delimited: bool,
}

impl Permissions {
    /// An empty set of permissions
    pub const fn empty() -> Self {
        Self {
            list: Vec::new(),
            delimited: false,
        }
    }

    /// A set holding a single permission
    pub fn single(permission: impl Into<Permission>) -> Self {
        Self {
            list: vec![permission.into()],
            delimited: false,
        }
    }

    /// Adds a permission to the end of the list
    pub fn push(&mut self, permission: impl Into<Permission>) {
        self.list.push(permission.into());
    }

    /// Whether exactly `permission` has been granted
    #[must_use]
    pub fn contains(&self, permission: &PermissionRef) -> bool {
        self.list.iter().any(|p| &**p == permission)
    }

    /// The number of granted permissions
    #[must_use]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Whether no permissions have been granted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Whether the permissions serialize as a single space-delimited string
    #[must_use]
    pub fn is_space_delimited(&self) -> bool {
        self.delimited
    }

    /// Iterates over the granted permissions in order
    pub fn iter(&self) -> Iter<'_> {
        Iter(self.list.iter())
    }
}

impl PartialEq for Permissions {
    fn eq(&self, other: &Self) -> bool {
        self.list == other.list
    }
}

impl Eq for Permissions {}

impl Serialize for Permissions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.delimited {
            let mut joined = String::new();
            for (i, permission) in self.list.iter().enumerate() {
                if i > 0 {
                    joined.push(' ');
                }
                joined.push_str(permission.as_str());
            }
            serializer.serialize_str(&joined)
        } else {
            let mut seq = serializer.serialize_seq(Some(self.list.len()))?;
            for permission in &self.list {
                seq.serialize_element(permission)?;
            }
            seq.end()
        }
    }
}

impl<P: Into<Permission>> FromIterator<P> for Permissions {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self {
            list: iter.into_iter().map(Into::into).collect(),
            delimited: false,
        }
    }
}

impl<P: Into<Permission>> Extend<P> for Permissions {
    fn extend<I: IntoIterator<Item = P>>(&mut self, iter: I) {
        self.list.extend(iter.into_iter().map(Into::into));
    }
}

impl From<Permissions> for Vec<Permission> {
    fn from(permissions: Permissions) -> Self {
        permissions.list
    }
}

/// An iterator over a set of permissions
#[derive(Debug)]
pub struct Iter<'a>(slice::Iter<'a, Permission>);

impl<'a> Iterator for Iter<'a> {
    type Item = &'a PermissionRef;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|p| &**p)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl<'a> iter::FusedIterator for Iter<'a> {}

impl<'a> IntoIterator for &'a Permissions {
    type Item = &'a PermissionRef;
    type IntoIter = Iter<'a>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for Permissions {
    type Item = Permission;
    type IntoIter = vec::IntoIter<Permission>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.list.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;

    #[test]
    fn deserializes_from_array() -> Result<()> {
        let permissions: Permissions = serde_json::from_str(r#"["get:actors","post:actors"]"#)?;
        assert_eq!(permissions.len(), 2);
        assert!(permissions.contains(PermissionRef::from_str("post:actors")));
        Ok(())
    }

    #[test]
    fn deserializes_from_space_delimited_string() -> Result<()> {
        let permissions: Permissions = serde_json::from_str(r#""get:actors  get:movies""#)?;
        let names: Vec<&str> = permissions.iter().map(PermissionRef::as_str).collect();
        assert_eq!(names, ["get:actors", "get:movies"]);
        Ok(())
    }

    #[test]
    fn serializes_as_array_in_order() -> Result<()> {
        let permissions: Permissions = ["patch:movies", "get:movies"].into_iter().collect();
        assert_eq!(
            serde_json::to_string(&permissions)?,
            r#"["patch:movies","get:movies"]"#
        );
        Ok(())
    }

    #[test]
    fn delimited_string_serializes_back_as_string() -> Result<()> {
        let permissions: Permissions = serde_json::from_str(r#""get:actors  get:movies""#)?;
        assert!(permissions.is_space_delimited());
        assert_eq!(
            serde_json::to_string(&permissions)?,
            r#""get:actors get:movies""#
        );

        let array: Permissions = serde_json::from_str(r#"["get:actors","get:movies"]"#)?;
        assert!(!array.is_space_delimited());
        assert_eq!(array, permissions);
        Ok(())
    }

    #[test]
    fn single_element_array_stays_an_array() -> Result<()> {
        let permissions: Permissions = serde_json::from_str(r#"["get:actors"]"#)?;
        assert_eq!(serde_json::to_string(&permissions)?, r#"["get:actors"]"#);
        Ok(())
    }

    #[test]
    fn membership_is_exact() {
        let permissions = Permissions::single("get:actors");
        assert!(permissions.contains(PermissionRef::from_str("get:actors")));
        assert!(!permissions.contains(PermissionRef::from_str("get:actor")));
        assert!(!permissions.contains(PermissionRef::from_str("GET:actors")));
        assert!(!permissions.contains(PermissionRef::from_str("get:*")));
    }
}
