//! Port for the password hashing collaborator used by bootstrap seeding.
//!
//! Hashing itself lives outside the record store; seeding only needs a way
//! to turn a raw seed password into the value persisted on the user.

use super::define_port_error;

define_port_error! {
    /// Errors raised by password encoders.
    pub enum PasswordEncoderError {
        /// The encoder could not hash the supplied password.
        Encoding { message: String } => "password encoding failed: {message}",
    }
}

/// Encodes raw passwords before they are persisted.
#[cfg_attr(test, mockall::automock)]
pub trait PasswordEncoder: Send + Sync {
    /// Encode `raw` into its stored representation.
    fn encode(&self, raw: &str) -> Result<String, PasswordEncoderError>;
}
