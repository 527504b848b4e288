//! Role record, looked up by its indexed name.

use serde::{Deserialize, Serialize};

use crate::domain::{
    DecodeError, EntityType, Error, FieldMap, FieldReader, FieldWriter, Record, RecordId,
};

/// Role granted to users, e.g. `admin` or `customer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<RecordId>,
    name: String,
}

impl Role {
    /// Stored and indexed field holding the role name.
    pub const NAME: &'static str = "name";

    /// New role without an identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    /// Same role with identifier `id`.
    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    /// Role name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Record for Role {
    const ENTITY: EntityType = EntityType::ROLE;
    const INDEXED_FIELDS: &'static [&'static str] = &[Self::NAME];

    fn id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }

    fn assign_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    fn to_fields(&self) -> FieldMap {
        FieldWriter::new()
            .put_optional("id", self.id.as_ref())
            .put(Self::NAME, &self.name)
            .finish()
    }

    fn from_fields(fields: &FieldMap) -> Result<Self, DecodeError> {
        let reader = FieldReader::new(Self::ENTITY, fields);
        Ok(Self {
            id: Some(reader.required_id("id")?),
            name: reader.required(Self::NAME)?.to_owned(),
        })
    }

    fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid_record("role name must not be blank"));
        }
        Ok(())
    }
}
