//! Book record keyed by ISBN, referencing its categories.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::{
    DecodeError, EntityType, Error, FieldMap, FieldReader, FieldWriter, Record, RecordId,
    ReferenceField,
};

/// Book in the catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<RecordId>,
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    page_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    info_link: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    categories: BTreeSet<RecordId>,
}

impl Book {
    /// Stored field holding the title.
    pub const TITLE: &'static str = "title";
    /// Reference set of categories.
    pub const CATEGORIES: &'static str = "categories";
    /// String list of author names.
    pub const AUTHORS: &'static str = "authors";

    /// New book with only a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            subtitle: None,
            description: None,
            language: None,
            page_count: None,
            thumbnail: None,
            price: None,
            currency: None,
            info_link: None,
            authors: Vec::new(),
            categories: BTreeSet::new(),
        }
    }

    /// Same book with identifier (ISBN) `id`.
    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    /// Same book with a subtitle.
    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    /// Same book with a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Same book with a language code.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Same book with a page count.
    pub fn with_page_count(mut self, page_count: u32) -> Self {
        self.page_count = Some(page_count);
        self
    }

    /// Same book with a thumbnail URL.
    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    /// Same book with a price in `currency`.
    pub fn with_price(mut self, price: f64, currency: impl Into<String>) -> Self {
        self.price = Some(price);
        self.currency = Some(currency.into());
        self
    }

    /// Same book with an information link.
    pub fn with_info_link(mut self, info_link: impl Into<String>) -> Self {
        self.info_link = Some(info_link.into());
        self
    }

    /// Same book with an additional author.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    /// Same book filed under an additional category.
    pub fn with_category(mut self, category: RecordId) -> Self {
        self.categories.insert(category);
        self
    }

    /// Title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Subtitle.
    pub fn subtitle(&self) -> Option<&str> {
        self.subtitle.as_deref()
    }

    /// Language code.
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Page count.
    pub fn page_count(&self) -> Option<u32> {
        self.page_count
    }

    /// Price, in [`Book::currency`].
    pub fn price(&self) -> Option<f64> {
        self.price
    }

    /// Currency code of the price.
    pub fn currency(&self) -> Option<&str> {
        self.currency.as_deref()
    }

    /// Author names in catalogue order.
    pub fn authors(&self) -> &[String] {
        &self.authors
    }

    /// Identifiers of the categories, possibly dangling.
    pub fn categories(&self) -> &BTreeSet<RecordId> {
        &self.categories
    }
}

impl Record for Book {
    const ENTITY: EntityType = EntityType::BOOK;
    const REFERENCES: &'static [ReferenceField] = &[ReferenceField {
        name: Self::CATEGORIES,
        target: EntityType::CATEGORY,
    }];

    fn id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }

    fn assign_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    fn to_fields(&self) -> FieldMap {
        FieldWriter::new()
            .put_optional("id", self.id.as_ref())
            .put(Self::TITLE, &self.title)
            .put_optional("subtitle", self.subtitle.as_deref())
            .put_optional("description", self.description.as_deref())
            .put_optional("language", self.language.as_deref())
            .put_optional("pageCount", self.page_count)
            .put_optional("thumbnail", self.thumbnail.as_deref())
            .put_optional("price", self.price)
            .put_optional("currency", self.currency.as_deref())
            .put_optional("infoLink", self.info_link.as_deref())
            .put_list(Self::AUTHORS, &self.authors)
            .put_references(Self::CATEGORIES, &self.categories)
            .finish()
    }

    fn from_fields(fields: &FieldMap) -> Result<Self, DecodeError> {
        let reader = FieldReader::new(Self::ENTITY, fields);
        let text = |field: &str| reader.optional(field).map(str::to_owned);
        Ok(Self {
            id: Some(reader.required_id("id")?),
            title: reader.required(Self::TITLE)?.to_owned(),
            subtitle: text("subtitle"),
            description: text("description"),
            language: text("language"),
            page_count: reader.parse_optional("pageCount")?,
            thumbnail: text("thumbnail"),
            price: reader.parse_optional("price")?,
            currency: text("currency"),
            info_link: text("infoLink"),
            authors: reader.string_list(Self::AUTHORS)?,
            categories: reader.reference_set(Self::CATEGORIES)?,
        })
    }

    fn validate(&self) -> Result<(), Error> {
        if self.title.trim().is_empty() {
            return Err(Error::invalid_record("book title must not be blank"));
        }
        if self
            .price
            .is_some_and(|price| !price.is_finite() || price < 0.0)
        {
            return Err(Error::invalid_record(
                "book price must be a non-negative number",
            ));
        }
        Ok(())
    }
}
