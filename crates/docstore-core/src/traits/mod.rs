//! Core traits for store backends.

mod backend;

pub use backend::DocumentBackend;
