//! docstore-memory - In-memory document backend.
//!
//! Implements [`DocumentBackend`](docstore_core::DocumentBackend) over
//! collections held in process memory. Supports the common query operators,
//! a subset of aggregation stages and the update operators docstore itself
//! issues. Anything else is rejected as unsupported input.

mod evaluator;
mod pipeline;
mod store;

pub use store::InMemoryBackend;
