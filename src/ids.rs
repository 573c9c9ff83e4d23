//! Opaque, per-entity identifiers.
//!
//! The source system treats ids as plain strings at its API boundary but
//! keeps them distinct internally. We keep that distinction as the type
//! system: each entity gets its own newtype over a UUID, so a `FolderId`
//! can never be passed where a `VersionId` is expected. Serialization is
//! always as a plain string, matching the opaque-string boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

typed_id!(FolderId);
typed_id!(AssetId);
typed_id!(VersionId);
typed_id!(IntentId);
typed_id!(ChangelogId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_string() {
        let id = FolderId::new();
        let parsed: FolderId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn distinct_types_do_not_compare() {
        let folder = FolderId::new();
        let asset = AssetId::new();
        // Different newtypes entirely - this just checks both construct fine.
        assert_ne!(folder.to_string(), asset.to_string());
    }
}
