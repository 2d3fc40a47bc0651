//! URI <-> filesystem path conversion.

use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum FilePathError {
    #[error("unsupported scheme in URI: {0}")]
    UnsupportedScheme(Url),
    #[error("unable to convert URI to file path: {0}")]
    UnableToConvert(Url),
}

/// Converts a [`Url`] into a [`PathBuf`], rejecting non-`file` schemes.
///
/// Unlike [`Url::to_file_path`], this returns a typed error rather than
/// silently producing a nonsense path for non-file schemes.
pub fn uri_to_file_path(uri: &Url) -> Result<PathBuf, FilePathError> {
    if uri.scheme() == "file" {
        uri.to_file_path()
            .map_err(|_| FilePathError::UnableToConvert(uri.clone()))
    } else {
        Err(FilePathError::UnsupportedScheme(uri.clone()))
    }
}

/// Converts a filesystem path into a `file://` URI.
pub fn file_path_to_uri(path: &Path) -> Result<Url, FilePathError> {
    Url::from_file_path(path).map_err(|_| FilePathError::UnableToConvert(Url::parse("file:///").unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_file_scheme() {
        let uri = Url::parse("https://example.com/a.rs").unwrap();
        assert!(matches!(
            uri_to_file_path(&uri),
            Err(FilePathError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn round_trips_file_scheme() {
        let path = Path::new("/tmp/a.rs");
        let uri = file_path_to_uri(path).unwrap();
        assert_eq!(uri_to_file_path(&uri).unwrap(), path);
    }
}
