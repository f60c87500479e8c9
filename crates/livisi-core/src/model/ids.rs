// ── Identity types ──
//
// The controller refers to entities either by bare id or by link
// (`/device/{id}`, `/capability/{id}`, `/location/{id}`). These newtypes
// always hold the bare id and know how to strip and rebuild the link.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! link_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Accept either a bare id or a link and keep the bare id.
            pub fn from_link(link: &str) -> Self {
                Self(link.strip_prefix($prefix).unwrap_or(link).to_owned())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// The controller link form, e.g. `/device/{id}`.
            pub fn link(&self) -> String {
                format!("{}{}", $prefix, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::from_link(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                if s.starts_with($prefix) {
                    Self::from_link(&s)
                } else {
                    Self(s)
                }
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

link_id!(
    /// Device identifier.
    DeviceId,
    "/device/"
);

link_id!(
    /// Capability identifier: the stable, externally visible identity of
    /// everything the controller can report or be told to do.
    CapabilityId,
    "/capability/"
);

link_id!(
    /// Location (room) identifier.
    LocationId,
    "/location/"
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn link_prefix_is_stripped() {
        assert_eq!(CapabilityId::from("/capability/abc").as_str(), "abc");
        assert_eq!(CapabilityId::from("abc").as_str(), "abc");
        assert_eq!(DeviceId::from("/device/d1".to_string()).link(), "/device/d1");
    }

    #[test]
    fn lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(LocationId::new("l1"), "Kitchen");
        assert_eq!(map.get("l1"), Some(&"Kitchen"));
    }
}
