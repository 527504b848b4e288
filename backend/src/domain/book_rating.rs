//! Rating a user gave a book.

use serde::{Deserialize, Serialize};

use crate::domain::{
    DecodeError, EntityType, Error, FieldMap, FieldReader, FieldWriter, Record, RecordId,
};

/// Lowest accepted rating.
pub const RATING_MIN: u8 = 1;
/// Highest accepted rating.
pub const RATING_MAX: u8 = 5;

/// A user's rating of a book. Both references are indexed so ratings can
/// be listed per book or per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRating {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<RecordId>,
    user: RecordId,
    book: RecordId,
    rating: u8,
}

impl BookRating {
    /// Indexed reference to the rating user.
    pub const USER: &'static str = "user";
    /// Indexed reference to the rated book.
    pub const BOOK: &'static str = "book";
    /// Stored field holding the score.
    pub const RATING: &'static str = "rating";

    /// New rating without an identifier.
    pub fn new(user: RecordId, book: RecordId, rating: u8) -> Self {
        Self {
            id: None,
            user,
            book,
            rating,
        }
    }

    /// Same rating with identifier `id`.
    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    /// Rating user.
    pub fn user(&self) -> &RecordId {
        &self.user
    }

    /// Rated book.
    pub fn book(&self) -> &RecordId {
        &self.book
    }

    /// Score between [`RATING_MIN`] and [`RATING_MAX`].
    pub fn rating(&self) -> u8 {
        self.rating
    }
}

impl Record for BookRating {
    const ENTITY: EntityType = EntityType::BOOK_RATING;
    const INDEXED_FIELDS: &'static [&'static str] = &[Self::USER, Self::BOOK];

    fn id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }

    fn assign_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    fn to_fields(&self) -> FieldMap {
        FieldWriter::new()
            .put_optional("id", self.id.as_ref())
            .put(Self::USER, &self.user)
            .put(Self::BOOK, &self.book)
            .put(Self::RATING, self.rating)
            .finish()
    }

    fn from_fields(fields: &FieldMap) -> Result<Self, DecodeError> {
        let reader = FieldReader::new(Self::ENTITY, fields);
        Ok(Self {
            id: Some(reader.required_id("id")?),
            user: reader.required_id(Self::USER)?,
            book: reader.required_id(Self::BOOK)?,
            rating: reader.parse_required(Self::RATING)?,
        })
    }

    fn validate(&self) -> Result<(), Error> {
        if !(RATING_MIN..=RATING_MAX).contains(&self.rating) {
            return Err(Error::invalid_record(format!(
                "rating must be between {RATING_MIN} and {RATING_MAX}, got {}",
                self.rating
            )));
        }
        Ok(())
    }
}
