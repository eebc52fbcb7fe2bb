//! docstore-mongo - MongoDB-backed document backend.
//!
//! Maps each [`DocumentBackend`](docstore_core::DocumentBackend) call onto the
//! matching driver operation and classifies driver failures into
//! [`StoreErrorKind`](docstore_core::StoreErrorKind)s.

mod backend;
mod config;
mod error;

pub use backend::MongoBackend;
pub use config::{ConnectionConfig, url_database};
