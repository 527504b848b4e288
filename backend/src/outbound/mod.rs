//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! This module follows the hexagonal architecture pattern, providing concrete
//! implementations of domain port traits:
//!
//! - **persistence**: Redis-backed and in-memory key-value stores
//!
//! Adapters are thin translators between domain calls and infrastructure
//! commands. They contain no business logic.

pub mod persistence;
