//! Store key layout for records, indexes and index tracking sets.
//!
//! Keys follow a `:`-separated keyspace:
//!
//! | key                            | type | content                          |
//! |--------------------------------|------|----------------------------------|
//! | `{Entity}`                     | set  | every live identifier            |
//! | `{Entity}:{id}`                | hash | the record's field map           |
//! | `{Entity}:{id}:idx`            | set  | index keys the record belongs to |
//! | `{Entity}:idx:{field}:{value}` | set  | one index entry                  |
//!
//! Identifiers never contain the separator, so record keys always have two
//! segments, tracking keys three, and index keys four or more. The layouts
//! cannot collide for a fixed entity type.

use std::fmt;

use crate::domain::{RecordId, RecordIdError};

/// Separator between key segments.
pub const KEY_SEPARATOR: char = ':';

const INDEX_SEGMENT: &str = "idx";

/// Name of a registered record type; the first segment of its keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityType(&'static str);

impl EntityType {
    /// Roles granted to users.
    pub const ROLE: Self = Self("Role");
    /// Registered users.
    pub const USER: Self = Self("User");
    /// Book categories.
    pub const CATEGORY: Self = Self("Category");
    /// Books keyed by ISBN.
    pub const BOOK: Self = Self("Book");
    /// User ratings of books.
    pub const BOOK_RATING: Self = Self("BookRating");

    /// Every entity type with a registered key prefix.
    pub const REGISTERED: [Self; 5] = [
        Self::ROLE,
        Self::USER,
        Self::CATEGORY,
        Self::BOOK,
        Self::BOOK_RATING,
    ];

    /// Prefix used for this entity type's keys.
    pub const fn name(self) -> &'static str {
        self.0
    }

    /// Recover the entity type owning `key` from its registered prefix.
    ///
    /// # Examples
    /// ```
    /// use bookstore::domain::EntityType;
    ///
    /// assert_eq!(EntityType::from_key("User:42"), Some(EntityType::USER));
    /// assert_eq!(EntityType::from_key("Usr:42"), None);
    /// ```
    pub fn from_key(key: &str) -> Option<Self> {
        let prefix = key.split(KEY_SEPARATOR).next()?;
        Self::REGISTERED
            .into_iter()
            .find(|entity| entity.name() == prefix)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Builds store keys for one entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyCodec {
    entity: EntityType,
}

impl KeyCodec {
    /// Codec for `entity`.
    pub const fn new(entity: EntityType) -> Self {
        Self { entity }
    }

    /// Entity type this codec builds keys for.
    pub const fn entity(&self) -> EntityType {
        self.entity
    }

    /// Validate a raw identifier and build its record key.
    ///
    /// # Errors
    ///
    /// Returns [`RecordIdError`] when `id` is empty or contains
    /// [`KEY_SEPARATOR`].
    pub fn key(&self, id: &str) -> Result<String, RecordIdError> {
        let id = RecordId::new(id)?;
        Ok(self.record_key(&id))
    }

    /// Key of the set listing every live identifier.
    pub fn collection_key(&self) -> String {
        self.entity.name().to_owned()
    }

    /// Key of the hash holding the record's fields.
    pub fn record_key(&self, id: &RecordId) -> String {
        format!("{}{KEY_SEPARATOR}{id}", self.entity)
    }

    /// Key of the set tracking which index entries hold `id`.
    pub fn tracking_key(&self, id: &RecordId) -> String {
        format!("{}{KEY_SEPARATOR}{id}{KEY_SEPARATOR}{INDEX_SEGMENT}", self.entity)
    }

    /// Key of the index entry for `field == value`.
    pub fn index_key(&self, field: &str, value: &str) -> String {
        format!("{}{value}", self.index_field_prefix(field))
    }

    /// Common prefix of every index entry for `field`.
    pub fn index_field_prefix(&self, field: &str) -> String {
        format!(
            "{}{KEY_SEPARATOR}{INDEX_SEGMENT}{KEY_SEPARATOR}{field}{KEY_SEPARATOR}",
            self.entity
        )
    }
}

#[cfg(test)]
mod tests {
    //! Key layout and injectivity checks.
    use super::*;
    use rstest::rstest;

    fn id(raw: &str) -> RecordId {
        RecordId::new(raw).expect("valid id")
    }

    #[rstest]
    fn builds_spring_style_keyspace() {
        let codec = KeyCodec::new(EntityType::USER);
        let user = id("4f1c");

        assert_eq!(codec.collection_key(), "User");
        assert_eq!(codec.record_key(&user), "User:4f1c");
        assert_eq!(codec.tracking_key(&user), "User:4f1c:idx");
        assert_eq!(codec.index_key("email", "ada@example.com"), "User:idx:email:ada@example.com");
    }

    #[rstest]
    #[case("")]
    #[case("a:b")]
    fn key_rejects_invalid_identifiers(#[case] raw: &str) {
        let codec = KeyCodec::new(EntityType::ROLE);
        assert!(codec.key(raw).is_err());
    }

    #[rstest]
    fn distinct_ids_yield_distinct_keys() {
        let codec = KeyCodec::new(EntityType::BOOK);
        let keys: std::collections::BTreeSet<_> = ["a", "ab", "a-b", "idx", "A"]
            .into_iter()
            .map(|raw| codec.key(raw).expect("valid id"))
            .collect();
        assert_eq!(keys.len(), 5);
    }

    #[rstest]
    fn tracking_key_for_idx_id_differs_from_index_keys() {
        let codec = KeyCodec::new(EntityType::USER);
        let tracking = codec.tracking_key(&id("idx"));
        assert_ne!(tracking, codec.index_key("idx", ""));
        assert_eq!(tracking.matches(KEY_SEPARATOR).count(), 2);
        assert_eq!(codec.index_key("email", "x").matches(KEY_SEPARATOR).count(), 3);
    }

    #[rstest]
    #[case("Role", Some(EntityType::ROLE))]
    #[case("BookRating:r1", Some(EntityType::BOOK_RATING))]
    #[case("Book:idx:language:en", Some(EntityType::BOOK))]
    #[case("cache:Book:q:findPage", None)]
    fn entity_type_is_recovered_from_prefix(
        #[case] key: &str,
        #[case] expected: Option<EntityType>,
    ) {
        assert_eq!(EntityType::from_key(key), expected);
    }
}
