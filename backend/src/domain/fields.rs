//! Flat field-map representation of records.
//!
//! Every record is stored as a hash of string fields. Scalars occupy one
//! field each. Collections use one field per element, named
//! `{field}.[{element}]`:
//!
//! - reference sets key each element by the referenced identifier
//!   (`roles.[4f1c] = 4f1c`), so attaching the same child twice writes the
//!   same field;
//! - plain string lists key each element by its position
//!   (`authors.[0] = Ada`).
//!
//! Absent optional attributes are omitted rather than stored empty.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

use crate::domain::{EntityType, RecordId};

/// Field name to value map stored as one hash per record.
pub type FieldMap = BTreeMap<String, String>;

/// Errors raised when a stored field map cannot be read as a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// A required attribute is absent.
    #[error("{entity} record is missing required field '{field}'")]
    MissingField {
        /// Entity type being decoded.
        entity: EntityType,
        /// Name of the missing field.
        field: String,
    },
    /// An attribute is present but cannot be parsed.
    #[error("{entity} field '{field}' holds invalid value '{value}': {reason}")]
    InvalidValue {
        /// Entity type being decoded.
        entity: EntityType,
        /// Name of the offending field.
        field: String,
        /// Raw stored value.
        value: String,
        /// Parser diagnostic.
        reason: String,
    },
}

/// Name of the hash field holding one collection element.
pub fn element_field(field: &str, element: impl Display) -> String {
    format!("{field}.[{element}]")
}

fn element_of<'a>(field: &str, name: &'a str) -> Option<&'a str> {
    name.strip_prefix(field)?
        .strip_prefix(".[")?
        .strip_suffix(']')
}

/// Typed read access over a stored field map.
#[derive(Debug, Clone, Copy)]
pub struct FieldReader<'a> {
    entity: EntityType,
    fields: &'a FieldMap,
}

impl<'a> FieldReader<'a> {
    /// Reader decoding `fields` as an `entity` record.
    pub fn new(entity: EntityType, fields: &'a FieldMap) -> Self {
        Self { entity, fields }
    }

    fn missing(&self, field: &str) -> DecodeError {
        DecodeError::MissingField {
            entity: self.entity,
            field: field.to_owned(),
        }
    }

    fn invalid(&self, field: &str, value: &str, reason: impl Display) -> DecodeError {
        DecodeError::InvalidValue {
            entity: self.entity,
            field: field.to_owned(),
            value: value.to_owned(),
            reason: reason.to_string(),
        }
    }

    /// Value of an optional scalar field.
    pub fn optional(&self, field: &str) -> Option<&'a str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Value of a required scalar field.
    pub fn required(&self, field: &str) -> Result<&'a str, DecodeError> {
        self.optional(field).ok_or_else(|| self.missing(field))
    }

    /// Parse a required scalar field.
    pub fn parse_required<T>(&self, field: &str) -> Result<T, DecodeError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.required(field)?;
        raw.parse().map_err(|err| self.invalid(field, raw, err))
    }

    /// Parse an optional scalar field.
    pub fn parse_optional<T>(&self, field: &str) -> Result<Option<T>, DecodeError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.optional(field)
            .map(|raw| raw.parse().map_err(|err| self.invalid(field, raw, err)))
            .transpose()
    }

    /// Required single reference or identifier field.
    pub fn required_id(&self, field: &str) -> Result<RecordId, DecodeError> {
        self.parse_required(field)
    }

    /// Reference set stored as `{field}.[{id}]` elements.
    pub fn reference_set(&self, field: &str) -> Result<BTreeSet<RecordId>, DecodeError> {
        self.fields
            .iter()
            .filter_map(|(name, value)| element_of(field, name).map(|_| (name, value)))
            .map(|(name, value)| {
                RecordId::new(value.as_str()).map_err(|err| self.invalid(name, value, err))
            })
            .collect()
    }

    /// String list stored as `{field}.[{position}]` elements, in position
    /// order.
    pub fn string_list(&self, field: &str) -> Result<Vec<String>, DecodeError> {
        let mut elements = self
            .fields
            .iter()
            .filter_map(|(name, value)| element_of(field, name).map(|pos| (name, pos, value)))
            .map(|(name, pos, value)| {
                pos.parse::<usize>()
                    .map(|position| (position, value.clone()))
                    .map_err(|err| self.invalid(name, pos, err))
            })
            .collect::<Result<Vec<_>, _>>()?;
        elements.sort_by_key(|(position, _)| *position);
        Ok(elements.into_iter().map(|(_, value)| value).collect())
    }
}

/// Builder for the field map written for a record.
#[derive(Debug, Clone, Default)]
pub struct FieldWriter {
    fields: FieldMap,
}

impl FieldWriter {
    /// Empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a scalar field.
    pub fn put(mut self, field: &str, value: impl Display) -> Self {
        self.fields.insert(field.to_owned(), value.to_string());
        self
    }

    /// Write a scalar field when present; omit it otherwise.
    pub fn put_optional<T: Display>(self, field: &str, value: Option<T>) -> Self {
        match value {
            Some(value) => self.put(field, value),
            None => self,
        }
    }

    /// Write a reference set, one element field per identifier.
    pub fn put_references<'i>(
        mut self,
        field: &str,
        ids: impl IntoIterator<Item = &'i RecordId>,
    ) -> Self {
        for id in ids {
            self.fields
                .insert(element_field(field, id), id.as_ref().to_owned());
        }
        self
    }

    /// Write a string list, one element field per position.
    pub fn put_list<'i>(mut self, field: &str, values: impl IntoIterator<Item = &'i String>) -> Self {
        for (position, value) in values.into_iter().enumerate() {
            self.fields
                .insert(element_field(field, position), value.clone());
        }
        self
    }

    /// Finished field map.
    pub fn finish(self) -> FieldMap {
        self.fields
    }
}
