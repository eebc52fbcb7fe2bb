//! Core docstore types.
//!
//! These types validate their inputs at construction time, so a client
//! never holds a malformed URL or collection name.

mod collection;
mod db_url;

pub use collection::{CollectionRef, DEFAULT_COLLECTION, DEFAULT_DATABASE};
pub(crate) use collection::validate_collection_name;
pub use db_url::DbUrl;
