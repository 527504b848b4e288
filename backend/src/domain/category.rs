//! Book category record.

use serde::{Deserialize, Serialize};

use crate::domain::{
    DecodeError, EntityType, Error, FieldMap, FieldReader, FieldWriter, Record, RecordId,
};

/// Category books are filed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<RecordId>,
    name: String,
}

impl Category {
    /// Stored field holding the category name.
    pub const NAME: &'static str = "name";

    /// New category without an identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    /// Same category with identifier `id`.
    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    /// Category name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Record for Category {
    const ENTITY: EntityType = EntityType::CATEGORY;

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
            return Err(Error::invalid_record("category name must not be blank"));
        }
        Ok(())
    }
}
