//! C4: per-user configuration resolution (spec §4.4).
//!
//! Sits in front of a pluggable [`ConfigStore`] with an LRU+TTL cache,
//! single-flight loading, credential decryption, and ownership checks,
//! plus the session layer (spec §4.4 "Sessions") that gates the config
//! API behind bearer tokens.

pub mod crypto;
pub mod error;
pub mod model;
pub mod resolver;
pub mod session;
pub mod store;

pub use error::ConfigError;
pub use model::{CatalogDefinition, EncryptedBlob, PosterSource, Preferences, UserConfig};
pub use resolver::ConfigResolver;
pub use session::{RevocationList, SessionClaims, SessionIssuer};
pub use store::{ConfigStore, InMemoryConfigStore};
