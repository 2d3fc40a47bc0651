//! Concrete implementations of the abstract injected collaborators the core
//! and pool crates depend on (a language detector, a provider lookup, a
//! URI→language helper, a workspace-root finder), wired to
//! `gateway-providers`'s closed [`gateway_providers::LanguageServerProvider`]
//! set plus the operator's `external_servers`/`environment` configuration.
//!
//! Grounded in the same separation `helix-core::syntax::config` (language
//! detection/root discovery data) draws from `helix-view`'s editor wiring
//! (the thing that actually turns that data into a running client) — this
//! binary is the wiring, the data and lookup logic live in
//! `gateway-providers`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use gateway_lsp::client::LanguageServerConfig;
use gateway_providers::{discover_workspace_root, language_id_for_path, LanguageId, LanguageServerProvider};

use crate::config::GatewayConfig;

/// Resolves a `(language, workspace)` pool key to a spawnable
/// [`LanguageServerConfig`] using the closed provider set, falling back to
/// an operator-configured override or external server definition.
pub struct ProviderConfigResolver {
    external: HashMap<String, gateway_providers::ExternalServerConfig>,
    base_environment: Vec<(String, String)>,
    default_timeout: Duration,
}

impl ProviderConfigResolver {
    pub fn new(config: &GatewayConfig) -> Self {
        ProviderConfigResolver {
            external: config.external_servers.clone(),
            base_environment: config.environment.clone().into_iter().collect(),
            default_timeout: config.pool.request_timeout(),
        }
    }
}

impl gateway_pool::ConfigResolver for ProviderConfigResolver {
    fn resolve(&self, language: &str, _workspace: &Path) -> Option<LanguageServerConfig> {
        let id = LanguageId::parse(language);
        if let Some(external) = self.external.get(id.as_str()) {
            let provider = LanguageServerProvider::External(external.clone());
            return Some(provider.config(
                self.base_environment.clone(),
                None,
                self.default_timeout,
            ));
        }
        let provider = LanguageServerProvider::for_language(&id)?;
        Some(provider.config(self.base_environment.clone(), None, self.default_timeout))
    }
}

/// Maps a document URI to a language id by file extension, used by
/// `getForFile` as the pool's and core's URI→language helper.
pub struct ExtensionLanguageResolver;

fn language_for_uri(uri: &str) -> Option<String> {
    let path = url::Url::parse(uri)
        .ok()
        .and_then(|url| gateway_stdx::uri::uri_to_file_path(&url).ok())?;
    language_id_for_path(&path).map(|id| id.as_str().to_string())
}

impl gateway_pool::UriLanguageResolver for ExtensionLanguageResolver {
    fn language_for_uri(&self, uri: &str) -> Option<String> {
        language_for_uri(uri)
    }
}

impl gateway_core::UriLanguageResolver for ExtensionLanguageResolver {
    fn language_for_uri(&self, uri: &str) -> Option<String> {
        language_for_uri(uri)
    }
}

/// Walks upward from a file to the nearest root-marker directory for its
/// language. [`RootMarkerLanguageDetector`] below runs the inverse lookup
/// (workspacePath → languageId).
pub struct RootMarkerWorkspaceResolver;

impl gateway_core::WorkspaceResolver for RootMarkerWorkspaceResolver {
    fn resolve_workspace(&self, file_path: &Path, language: &str) -> PathBuf {
        let id = LanguageId::parse(language);
        discover_workspace_root(file_path, &id)
    }
}

/// Best-effort guess at a workspace's primary language from the root
/// markers present in its top-level directory, used by `executeCommand`
/// when the caller supplies a workspace but no specific file.
pub struct RootMarkerLanguageDetector;

const DETECTABLE: &[LanguageId] = &[
    LanguageId::Rust,
    LanguageId::Go,
    LanguageId::Python,
    LanguageId::Ruby,
    LanguageId::Php,
    LanguageId::Java,
    LanguageId::CSharp,
    LanguageId::Haskell,
    LanguageId::TypeScript,
    LanguageId::C,
];

impl gateway_core::WorkspaceLanguageDetector for RootMarkerLanguageDetector {
    fn detect(&self, workspace: &Path) -> Option<String> {
        for language in DETECTABLE {
            let markers = gateway_providers::root_markers(language);
            let matched = markers.iter().any(|marker| match marker.strip_prefix('*') {
                Some(suffix) => std::fs::read_dir(workspace)
                    .map(|entries| {
                        entries
                            .filter_map(|e| e.ok())
                            .any(|e| e.file_name().to_str().is_some_and(|n| n.ends_with(suffix)))
                    })
                    .unwrap_or(false),
                None => workspace.join(marker).exists(),
            });
            if matched {
                return Some(language.as_str().to_string());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_resolver_maps_rust_files() {
        let resolver = ExtensionLanguageResolver;
        assert_eq!(
            gateway_pool::UriLanguageResolver::language_for_uri(&resolver, "file:///a/b/main.rs"),
            Some("rust".to_string())
        );
    }

    #[test]
    fn language_detector_finds_cargo_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();
        let detector = RootMarkerLanguageDetector;
        assert_eq!(
            gateway_core::WorkspaceLanguageDetector::detect(&detector, dir.path()),
            Some("rust".to_string())
        );
    }
}
