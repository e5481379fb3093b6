//! Cache layer: C1 (KV backend) + C2 (facade) from spec §3/§4.2.

pub mod envelope;
pub mod error;
pub mod facade;
pub mod kv;

pub use envelope::{Envelope, EnvelopeBody, Freshness};
pub use error::{CacheError, ClassifiableError, ErrorKind};
pub use facade::{CacheFacade, CacheLookup, WrapOptions};
pub use kv::{build_backend, InMemoryKv, KvBackend, RedisKv};
