//! Functions for working with the host environment.

use std::ffi::OsStr;

/// Attempts to find a binary of the given name on `$PATH`.
pub fn which<T: AsRef<OsStr>>(
    binary_name: T,
) -> Result<std::path::PathBuf, ExecutableNotFoundError> {
    let binary_name = binary_name.as_ref();
    which::which(binary_name).map_err(|err| ExecutableNotFoundError {
        command: binary_name.to_string_lossy().into_owned(),
        inner: err,
    })
}

#[derive(Debug, thiserror::Error)]
#[error("command '{command}' not found: {inner}")]
pub struct ExecutableNotFoundError {
    command: String,
    #[source]
    inner: which::Error,
}
