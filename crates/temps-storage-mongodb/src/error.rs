//! Classification of driver errors.

use mongodb::error::{Error, ErrorKind, WriteFailure};
use temps_storage::StorageError;

/// Server code of a duplicate key violation
pub const DUPLICATE_KEY: i32 = 11000;
/// Index exists with different options
pub const INDEX_OPTIONS_CONFLICT: i32 = 85;
/// Index exists with the same name but different keys
pub const INDEX_KEY_SPECS_CONFLICT: i32 = 86;
/// Collection already exists
pub const NAMESPACE_EXISTS: i32 = 48;

/// Server error code carried by a command or write error
pub fn server_code(err: &Error) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Command(command) => Some(command.code),
        ErrorKind::Write(WriteFailure::WriteError(write)) => Some(write.code),
        ErrorKind::Write(WriteFailure::WriteConcernError(concern)) => Some(concern.code),
        _ => None,
    }
}

pub fn is_duplicate_key(err: &Error) -> bool {
    server_code(err) == Some(DUPLICATE_KEY)
}

pub fn is_index_conflict(err: &Error) -> bool {
    matches!(
        server_code(err),
        Some(INDEX_OPTIONS_CONFLICT) | Some(INDEX_KEY_SPECS_CONFLICT)
    )
}

/// Wrap a driver error, keeping duplicate keys distinguishable
pub fn classify(context: &str, err: Error) -> StorageError {
    if is_duplicate_key(&err) {
        StorageError::already_exists(format!("{}: {}", context, err))
    } else {
        StorageError::backend(format!("{}: {}", context, err))
    }
}
