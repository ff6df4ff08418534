//! Records and their identifiers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Field map of a record, keyed by field name.
pub type Fields = BTreeMap<String, serde_json::Value>;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new value from anything string-like.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the underlying string is empty.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_newtype!(
    /// Identifier of a record, unique within its entity type.
    RecordId
);

string_newtype!(
    /// Name of the entity type a record belongs to.
    EntityType
);

string_newtype!(
    /// Opaque concurrency stamp assigned by the server on every write.
    ///
    /// Tags are only ever compared for equality; they carry no ordering.
    VersionTag
);

/// Identifies a record for local deletion.
///
/// The local store is keyed per entity type, so a bare `RecordId` is not
/// enough to locate the object to delete.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    /// Record ID.
    pub id: RecordId,
    /// Entity type.
    pub entity_type: EntityType,
}

impl RecordRef {
    /// Creates a new record reference.
    pub fn new(id: impl Into<RecordId>, entity_type: impl Into<EntityType>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
        }
    }
}

/// A remote-addressable snapshot of one entity instance.
///
/// `version_tag` is the last tag the holder of this record observed from
/// the server. A record that was never stored remotely has no tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record ID.
    pub id: RecordId,
    /// Entity type.
    pub entity_type: EntityType,
    /// Field values.
    pub fields: Fields,
    /// Server-assigned version tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_tag: Option<VersionTag>,
}

impl Record {
    /// Creates a record with no fields and no version tag.
    pub fn new(id: impl Into<RecordId>, entity_type: impl Into<EntityType>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            fields: Fields::new(),
            version_tag: None,
        }
    }

    /// Sets a field value.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Sets the version tag.
    pub fn with_version_tag(mut self, tag: impl Into<VersionTag>) -> Self {
        self.version_tag = Some(tag.into());
        self
    }

    /// Returns a reference to this record (id and entity type).
    pub fn record_ref(&self) -> RecordRef {
        RecordRef {
            id: self.id.clone(),
            entity_type: self.entity_type.clone(),
        }
    }

    /// Returns a field value by name.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }
}
