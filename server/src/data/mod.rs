//! Data layer
//!
//! - `topics` - consumer-group streams feeding the queue intake (memory or Redis)
//! - `store` - document store backends and index mappings
//! - `cache` - index existence cache

pub mod cache;
pub mod store;
pub mod topics;

pub use cache::ExistenceCache;
pub use store::{DocumentStore, MappingRegistry, StoreError};
pub use topics::{TopicError, TopicService};
