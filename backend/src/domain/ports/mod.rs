//! Domain ports for the store and the collaborators around it.

mod macros;
pub(crate) use macros::define_port_error;

mod key_value_store;
mod password_encoder;

#[cfg(test)]
pub use key_value_store::MockKeyValueStore;
pub use key_value_store::{KeyValueStore, KeyValueStoreError};
#[cfg(test)]
pub use password_encoder::MockPasswordEncoder;
pub use password_encoder::{PasswordEncoder, PasswordEncoderError};
