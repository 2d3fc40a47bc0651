//! The small set of abstract injected collaborators this crate needs: a
//! URI→language helper, a workspace-root discovery function, and a
//! workspace→language detector (used when a caller gives a workspace but not
//! a specific file, e.g. `executeCommand`). Concrete implementations are
//! supplied by the embedding program, typically backed by
//! `gateway-providers`; this crate only depends on the trait objects so the
//! core stays decoupled from any particular provider set.

use std::path::{Path, PathBuf};

use gateway_stdx::uri::{uri_to_file_path, FilePathError};

/// Resolves a document URI's language id from its extension.
pub trait UriLanguageResolver: Send + Sync {
    fn language_for_uri(&self, uri: &str) -> Option<String>;
}

/// Discovers the workspace root that owns `file_path`, given its resolved
/// language. [`WorkspaceLanguageDetector`] below runs the mirror image of
/// this (workspace path → language id): this trait needs the opposite
/// direction, file path to workspace, to turn a bare URI into a pool key.
pub trait WorkspaceResolver: Send + Sync {
    fn resolve_workspace(&self, file_path: &Path, language: &str) -> PathBuf;
}

/// Best-effort guess at the primary language of an already-known workspace
/// root, used by `executeCommand` when the caller supplies a workspace but
/// no specific file.
pub trait WorkspaceLanguageDetector: Send + Sync {
    fn detect(&self, workspace: &Path) -> Option<String>;
}

/// Splits a `file://` URI into its filesystem path, the caller's resolved
/// language, and a discovered workspace root — the three pieces of context
/// every per-file tool operation needs before it can call [`gateway_pool::Pool::get`].
pub(crate) fn resolve_uri(
    uri: &str,
    uri_resolver: &dyn UriLanguageResolver,
    workspace_resolver: &dyn WorkspaceResolver,
) -> Result<(PathBuf, String), FilePathError> {
    let parsed = url::Url::parse(uri).map_err(|_| FilePathError::UnsupportedScheme(
        url::Url::parse("file:///").unwrap(),
    ))?;
    let path = uri_to_file_path(&parsed)?;
    let language = uri_resolver
        .language_for_uri(uri)
        .unwrap_or_else(|| "plaintext".to_string());
    let workspace = workspace_resolver.resolve_workspace(&path, &language);
    Ok((workspace, language))
}
