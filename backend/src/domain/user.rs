//! User record.
//!
//! Users hold a write-only password and a weak set of role references.
//! Roles are owned elsewhere; a deleted role leaves a dangling identifier in
//! the set, which readers treat as data rather than corruption.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{
    DecodeError, EntityType, Error, FieldMap, FieldReader, FieldWriter, Record, RecordId,
    ReferenceField,
};

/// Minimum allowed length for a user name.
pub const USER_NAME_MIN: usize = 2;
/// Maximum allowed length for a user name.
pub const USER_NAME_MAX: usize = 48;

/// Validation errors returned by [`User::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserValidationError {
    NameTooShort { min: usize },
    NameTooLong { max: usize },
    InvalidEmail,
    MissingPassword,
    PasswordMismatch,
}

impl fmt::Display for UserValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NameTooShort { min } => write!(f, "user name must be at least {min} characters"),
            Self::NameTooLong { max } => write!(f, "user name must be at most {max} characters"),
            Self::InvalidEmail => write!(f, "user email must be a valid email address"),
            Self::MissingPassword => write!(f, "user password must not be empty"),
            Self::PasswordMismatch => write!(f, "password confirmation does not match"),
        }
    }
}

impl std::error::Error for UserValidationError {}

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL_RE.get_or_init(|| {
        // One `@`, no whitespace, and a dotted domain without empty labels.
        let pattern = r"^[^@\s]+@[^@\s.]+(\.[^@\s.]+)+$";
        Regex::new(pattern).unwrap_or_else(|error| panic!("email regex failed to compile: {error}"))
    })
}

/// Registered user.
///
/// `password` is persisted but never serialised to callers;
/// `password_confirm` is neither persisted nor serialised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<RecordId>,
    name: String,
    email: String,
    #[serde(default, skip_serializing)]
    password: Option<String>,
    #[serde(default, skip_serializing)]
    password_confirm: Option<String>,
    #[serde(default)]
    roles: BTreeSet<RecordId>,
}

impl User {
    /// Stored field holding the user name.
    pub const NAME: &'static str = "name";
    /// Stored and indexed field holding the email address.
    pub const EMAIL: &'static str = "email";
    /// Stored field holding the encoded password.
    pub const PASSWORD: &'static str = "password";
    /// Reference set of granted roles.
    pub const ROLES: &'static str = "roles";

    /// New user without an identifier or roles.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            email: email.into(),
            password: Some(password.into()),
            password_confirm: None,
            roles: BTreeSet::new(),
        }
    }

    /// Same user with identifier `id`.
    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    /// Same user carrying a transient password confirmation.
    pub fn with_password_confirm(mut self, confirm: impl Into<String>) -> Self {
        self.password_confirm = Some(confirm.into());
        self
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Email address.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Encoded password, when loaded from the store or set by the caller.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Replace the password, e.g. with its encoded form.
    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = Some(password.into());
    }

    /// Identifiers of the granted roles, possibly dangling.
    pub fn roles(&self) -> &BTreeSet<RecordId> {
        &self.roles
    }

    /// Grant a role by identifier; granting twice has no further effect.
    pub fn add_role(&mut self, role: RecordId) {
        self.roles.insert(role);
    }

    /// Check every constraint enforced before a save.
    pub fn check(&self) -> Result<(), UserValidationError> {
        let length = self.name.chars().count();
        if length < USER_NAME_MIN {
            return Err(UserValidationError::NameTooShort {
                min: USER_NAME_MIN,
            });
        }
        if length > USER_NAME_MAX {
            return Err(UserValidationError::NameTooLong {
                max: USER_NAME_MAX,
            });
        }
        if !email_regex().is_match(&self.email) {
            return Err(UserValidationError::InvalidEmail);
        }
        let password = self
            .password
            .as_deref()
            .filter(|password| !password.is_empty())
            .ok_or(UserValidationError::MissingPassword)?;
        match self.password_confirm.as_deref() {
            Some(confirm) if confirm != password => Err(UserValidationError::PasswordMismatch),
            _ => Ok(()),
        }
    }
}

impl Record for User {
    const ENTITY: EntityType = EntityType::USER;
    const INDEXED_FIELDS: &'static [&'static str] = &[Self::EMAIL];
    const REFERENCES: &'static [ReferenceField] = &[ReferenceField {
        name: Self::ROLES,
        target: EntityType::ROLE,
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
            .put(Self::NAME, &self.name)
            .put(Self::EMAIL, &self.email)
            .put_optional(Self::PASSWORD, self.password.as_deref())
            .put_references(Self::ROLES, &self.roles)
            .finish()
    }

    fn from_fields(fields: &FieldMap) -> Result<Self, DecodeError> {
        let reader = FieldReader::new(Self::ENTITY, fields);
        Ok(Self {
            id: Some(reader.required_id("id")?),
            name: reader.required(Self::NAME)?.to_owned(),
            email: reader.required(Self::EMAIL)?.to_owned(),
            password: reader.optional(Self::PASSWORD).map(str::to_owned),
            password_confirm: None,
            roles: reader.reference_set(Self::ROLES)?,
        })
    }

    fn validate(&self) -> Result<(), Error> {
        self.check()
            .map_err(|err| Error::invalid_record(err.to_string()))
    }
}
