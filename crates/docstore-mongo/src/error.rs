//! Driver error classification.

use mongodb::error::{Error as DriverError, ErrorKind, WriteFailure};

use docstore_core::Error;
use docstore_core::error::{Operation, StoreError, StoreErrorKind};

/// Server code for a missing namespace.
const NAMESPACE_NOT_FOUND: i32 = 26;
/// Server code returned when creating a collection that already exists.
pub(crate) const NAMESPACE_EXISTS: i32 = 48;
const UNAUTHORIZED: i32 = 13;
const AUTHENTICATION_FAILED: i32 = 18;

/// The server error code carried by a command or write error, if any.
pub(crate) fn server_code(err: &DriverError) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Command(cmd) => Some(cmd.code),
        ErrorKind::Write(WriteFailure::WriteError(write)) => Some(write.code),
        ErrorKind::Write(WriteFailure::WriteConcernError(concern)) => Some(concern.code),
        _ => None,
    }
}

fn classify_kind(err: &DriverError) -> StoreErrorKind {
    if let Some(code) = server_code(err) {
        return match code {
            NAMESPACE_NOT_FOUND => StoreErrorKind::CollectionNotFound,
            UNAUTHORIZED | AUTHENTICATION_FAILED => StoreErrorKind::Unauthorized,
            _ => StoreErrorKind::Rejected,
        };
    }

    match err.kind.as_ref() {
        ErrorKind::Authentication { .. } => StoreErrorKind::Unauthorized,
        ErrorKind::Io(_)
        | ErrorKind::ServerSelection { .. }
        | ErrorKind::DnsResolve { .. }
        | ErrorKind::ConnectionPoolCleared { .. } => StoreErrorKind::Transport,
        _ => StoreErrorKind::Rejected,
    }
}

/// Convert a driver error into a store error tagged with its operation.
pub(crate) fn store_error(operation: Operation, collection: &str, err: DriverError) -> Error {
    StoreError::new(operation, collection, classify_kind(&err), err.to_string()).into()
}
