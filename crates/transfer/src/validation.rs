use std::path::{Component, Path};

use crate::TransferError;

/// Joins a remote directory and a file name into an object key.
///
/// Leading and trailing slashes of `dir` are dropped, so `"/"`, `""` and
/// `"/photos/"` all work. The result is validated with
/// [`validate_object_key`].
pub fn object_key(dir: &str, name: &str) -> Result<String, TransferError> {
    let dir = dir.trim_matches('/');
    let key = if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    };
    validate_object_key(&key)?;
    Ok(key)
}

/// Validates that an object key stays inside the bucket root.
///
/// Rejects:
/// - Empty keys
/// - Absolute keys (`/etc/passwd`, `C:\`)
/// - Parent directory traversal (`..`)
pub fn validate_object_key(key: &str) -> Result<(), TransferError> {
    if key.is_empty() {
        return Err(TransferError::InvalidInput("empty object key".into()));
    }

    let path = Path::new(key);
    if path.is_absolute() {
        return Err(TransferError::InvalidInput(format!(
            "absolute object key not allowed: {key}"
        )));
    }

    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(TransferError::InvalidInput(format!(
                    "parent directory traversal not allowed: {key}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(TransferError::InvalidInput(format!(
                    "absolute object key not allowed: {key}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}
