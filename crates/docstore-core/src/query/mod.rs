//! Query descriptions, read options and results.

mod description;
mod options;
mod output;

pub use description::QueryDescription;
pub use options::{FindOptions, SortOrder, TIMESTAMP_FIELD};
pub use output::QueryOutput;
