//! Record identity and the statically declared record contract.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::keys::KEY_SEPARATOR;
use crate::domain::{DecodeError, EntityType, Error, FieldMap};

/// Validation errors returned when constructing a [`RecordId`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordIdError {
    /// Identifier is empty.
    #[error("record identifier must not be empty")]
    Empty,
    /// Identifier contains the key separator.
    #[error("record identifier '{id}' must not contain ':'")]
    ContainsSeparator {
        /// Rejected identifier.
        id: String,
    },
}

/// Identifier unique within one entity type.
///
/// ## Invariants
/// - Never empty.
/// - Never contains [`KEY_SEPARATOR`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(String);

impl RecordId {
    /// Validate and construct an identifier.
    ///
    /// # Examples
    /// ```
    /// use bookstore::domain::RecordId;
    ///
    /// assert!(RecordId::new("9780134685991").is_ok());
    /// assert!(RecordId::new("").is_err());
    /// assert!(RecordId::new("Book:1").is_err());
    /// ```
    pub fn new(id: impl Into<String>) -> Result<Self, RecordIdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(RecordIdError::Empty);
        }
        if id.contains(KEY_SEPARATOR) {
            return Err(RecordIdError::ContainsSeparator { id });
        }
        Ok(Self(id))
    }

    /// Fresh random identifier for records saved without one.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecordId {
    type Err = RecordIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RecordId {
    type Error = RecordIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RecordId> for String {
    fn from(value: RecordId) -> Self {
        value.0
    }
}

/// Multi-valued reference attribute declared by a record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceField {
    /// Attribute name; element fields are stored as `{name}.[{id}]`.
    pub name: &'static str,
    /// Entity type the referenced identifiers belong to.
    pub target: EntityType,
}

/// A typed record persisted as one hash.
///
/// Implementations declare their entity type, indexed attributes and
/// reference attributes statically, and provide an explicit encode/decode
/// pair satisfying `from_fields(&r.to_fields()) == Ok(r)` for every valid
/// record, transient attributes aside.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Entity type, which is also the record's key prefix.
    const ENTITY: EntityType;

    /// Scalar attributes maintained in secondary indexes.
    const INDEXED_FIELDS: &'static [&'static str] = &[];

    /// Multi-valued reference attributes.
    const REFERENCES: &'static [ReferenceField] = &[];

    /// Identifier, absent until the record is first saved.
    fn id(&self) -> Option<&RecordId>;

    /// Assign the identifier of a record saved without one.
    fn assign_id(&mut self, id: RecordId);

    /// Encode every non-transient attribute.
    fn to_fields(&self) -> FieldMap;

    /// Decode a stored field map; unknown fields are ignored.
    fn from_fields(fields: &FieldMap) -> Result<Self, DecodeError>;

    /// Reject records that must not be written.
    fn validate(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Declared reference attribute called `name`.
    fn reference_field(name: &str) -> Option<ReferenceField> {
        Self::REFERENCES
            .iter()
            .copied()
            .find(|field| field.name == name)
    }

    /// Whether `name` is a declared indexed attribute.
    fn is_indexed(name: &str) -> bool {
        Self::INDEXED_FIELDS.contains(&name)
    }
}
