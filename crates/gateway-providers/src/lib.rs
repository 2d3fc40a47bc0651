//! Per-language provider modules: detection, command selection, and
//! `LanguageServerConfig` construction for the backends the gateway knows
//! how to launch.
//!
//! Deliberately kept out of the core crate — this crate is a thin wrapper
//! the core consumes only through [`LanguageServerProvider::config`] and a
//! handful of URI/path helpers. Providers are modeled as a closed sum type
//! rather than an open, string-keyed `LanguageConfiguration` registry
//! (`helix-core/src/syntax/config.rs`) dispatch — there is no plugin
//! mechanism here, and installation behavior (binary download/build) is
//! explicitly not part of this crate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use gateway_lsp::client::LanguageServerConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One of the languages this gateway ships a provider for, or an
/// operator-configured external binary for anything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LanguageId {
    Rust,
    TypeScript,
    JavaScript,
    Python,
    Go,
    C,
    Cpp,
    Java,
    CSharp,
    Ruby,
    Php,
    Haskell,
    Lua,
    Bash,
    Json,
    Yaml,
    /// Any id not in the closed set above, resolved via `external_servers`
    /// in [`GatewayConfig`]'s configuration surface rather than a builtin.
    Other(String),
}

impl LanguageId {
    /// The lowercase, stable identifier used as the pool-key `language`
    /// component.
    pub fn as_str(&self) -> &str {
        match self {
            LanguageId::Rust => "rust",
            LanguageId::TypeScript => "typescript",
            LanguageId::JavaScript => "javascript",
            LanguageId::Python => "python",
            LanguageId::Go => "go",
            LanguageId::C => "c",
            LanguageId::Cpp => "cpp",
            LanguageId::Java => "java",
            LanguageId::CSharp => "csharp",
            LanguageId::Ruby => "ruby",
            LanguageId::Php => "php",
            LanguageId::Haskell => "haskell",
            LanguageId::Lua => "lua",
            LanguageId::Bash => "bash",
            LanguageId::Json => "json",
            LanguageId::Yaml => "yaml",
            LanguageId::Other(id) => id.as_str(),
        }
    }

    pub fn parse(id: &str) -> LanguageId {
        match id {
            "rust" => LanguageId::Rust,
            "typescript" | "typescriptreact" => LanguageId::TypeScript,
            "javascript" | "javascriptreact" => LanguageId::JavaScript,
            "python" => LanguageId::Python,
            "go" => LanguageId::Go,
            "c" => LanguageId::C,
            "cpp" | "c++" => LanguageId::Cpp,
            "java" => LanguageId::Java,
            "csharp" | "c#" => LanguageId::CSharp,
            "ruby" => LanguageId::Ruby,
            "php" => LanguageId::Php,
            "haskell" => LanguageId::Haskell,
            "lua" => LanguageId::Lua,
            "bash" | "sh" | "shellscript" => LanguageId::Bash,
            "json" | "jsonc" => LanguageId::Json,
            "yaml" => LanguageId::Yaml,
            other => LanguageId::Other(other.to_string()),
        }
    }
}

/// Resolves a `languageId` from a document's file extension, grounded in the
/// per-language `file-types` table of `helix-core`'s
/// `syntax::config::LanguageConfiguration` but collapsed to the closed set
/// above rather than an open registry keyed by arbitrary strings.
pub fn language_id_for_path(path: &Path) -> Option<LanguageId> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let id = match ext.as_str() {
        "rs" => LanguageId::Rust,
        "ts" | "tsx" | "mts" | "cts" => LanguageId::TypeScript,
        "js" | "jsx" | "mjs" | "cjs" => LanguageId::JavaScript,
        "py" | "pyi" => LanguageId::Python,
        "go" => LanguageId::Go,
        "c" | "h" => LanguageId::C,
        "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" => LanguageId::Cpp,
        "java" => LanguageId::Java,
        "cs" => LanguageId::CSharp,
        "rb" => LanguageId::Ruby,
        "php" => LanguageId::Php,
        "hs" => LanguageId::Haskell,
        "lua" => LanguageId::Lua,
        "sh" | "bash" => LanguageId::Bash,
        "json" | "jsonc" => LanguageId::Json,
        "yaml" | "yml" => LanguageId::Yaml,
        other => LanguageId::Other(other.to_string()),
    };
    Some(id)
}

/// Root markers used for best-effort workspace-root discovery, mirroring
/// `helix_lsp::find_lsp_workspace`'s per-language `roots` table without its
/// full multi-root workspace-folder machinery, which is out of scope for a
/// gateway that receives an explicit workspace path.
pub fn root_markers(language: &LanguageId) -> &'static [&'static str] {
    match language {
        LanguageId::Rust => &["Cargo.toml"],
        LanguageId::TypeScript | LanguageId::JavaScript => {
            &["package.json", "tsconfig.json", "jsconfig.json"]
        }
        LanguageId::Python => &["pyproject.toml", "setup.py", "requirements.txt"],
        LanguageId::Go => &["go.mod"],
        LanguageId::C | LanguageId::Cpp => &["compile_commands.json", "CMakeLists.txt"],
        LanguageId::Java => &["pom.xml", "build.gradle"],
        LanguageId::CSharp => &["*.sln", "*.csproj"],
        LanguageId::Ruby => &["Gemfile"],
        LanguageId::Php => &["composer.json"],
        LanguageId::Haskell => &["*.cabal", "stack.yaml"],
        LanguageId::Lua => &[".luarc.json"],
        LanguageId::Bash | LanguageId::Json | LanguageId::Yaml | LanguageId::Other(_) => &[],
    }
}

/// Operator-supplied configuration for a server outside the closed set, or
/// an override of a builtin's command/args.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExternalServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub environment: Vec<(String, String)>,
    #[serde(default)]
    pub initialization_options: Option<Value>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// A sum type over the providers this gateway ships, plus the operator's
/// `external` catch-all for everything else. `config()` is the single
/// accessor the core consumes.
#[derive(Debug, Clone)]
pub enum LanguageServerProvider {
    RustAnalyzer,
    TypeScriptLanguageServer,
    Pyright,
    Gopls,
    Clangd,
    Jdtls,
    OmniSharp,
    Solargraph,
    Intelephense,
    HaskellLanguageServer,
    LuaLanguageServer,
    BashLanguageServer,
    VscodeJsonLanguageServer,
    YamlLanguageServer,
    /// Loaded verbatim from `GatewayConfig::external_servers[language]`.
    External(ExternalServerConfig),
}

impl LanguageServerProvider {
    /// Picks the builtin provider for a closed-set language id, or `None`
    /// if the caller should fall back to an operator-configured external
    /// server (`LanguageId::Other`, or a known id the operator overrode).
    pub fn for_language(language: &LanguageId) -> Option<LanguageServerProvider> {
        use LanguageServerProvider::*;
        Some(match language {
            LanguageId::Rust => RustAnalyzer,
            LanguageId::TypeScript | LanguageId::JavaScript => TypeScriptLanguageServer,
            LanguageId::Python => Pyright,
            LanguageId::Go => Gopls,
            LanguageId::C | LanguageId::Cpp => Clangd,
            LanguageId::Java => Jdtls,
            LanguageId::CSharp => OmniSharp,
            LanguageId::Ruby => Solargraph,
            LanguageId::Php => Intelephense,
            LanguageId::Haskell => HaskellLanguageServer,
            LanguageId::Lua => LuaLanguageServer,
            LanguageId::Bash => BashLanguageServer,
            LanguageId::Json => VscodeJsonLanguageServer,
            LanguageId::Yaml => YamlLanguageServer,
            LanguageId::Other(_) => return None,
        })
    }

    fn command_and_args(&self) -> (&str, Vec<String>) {
        match self {
            LanguageServerProvider::RustAnalyzer => ("rust-analyzer", vec![]),
            LanguageServerProvider::TypeScriptLanguageServer => {
                ("typescript-language-server", vec!["--stdio".to_string()])
            }
            LanguageServerProvider::Pyright => ("pyright-langserver", vec!["--stdio".to_string()]),
            LanguageServerProvider::Gopls => ("gopls", vec![]),
            LanguageServerProvider::Clangd => ("clangd", vec![]),
            LanguageServerProvider::Jdtls => ("jdtls", vec![]),
            LanguageServerProvider::OmniSharp => ("OmniSharp", vec!["-lsp".to_string()]),
            LanguageServerProvider::Solargraph => {
                ("solargraph", vec!["stdio".to_string()])
            }
            LanguageServerProvider::Intelephense => {
                ("intelephense", vec!["--stdio".to_string()])
            }
            LanguageServerProvider::HaskellLanguageServer => {
                ("haskell-language-server-wrapper", vec!["--lsp".to_string()])
            }
            LanguageServerProvider::LuaLanguageServer => ("lua-language-server", vec![]),
            LanguageServerProvider::BashLanguageServer => {
                ("bash-language-server", vec!["start".to_string()])
            }
            LanguageServerProvider::VscodeJsonLanguageServer => {
                ("vscode-json-language-server", vec!["--stdio".to_string()])
            }
            LanguageServerProvider::YamlLanguageServer => {
                ("yaml-language-server", vec!["--stdio".to_string()])
            }
            LanguageServerProvider::External(cfg) => (cfg.command.as_str(), cfg.args.clone()),
        }
    }

    /// Builds the immutable [`LanguageServerConfig`] the client consumes to
    /// spawn this backend. `initialization_options` and `environment` come
    /// only from operator configuration; builtins never hardcode either.
    pub fn config(
        &self,
        environment: Vec<(String, String)>,
        initialization_options: Option<Value>,
        default_timeout: Duration,
    ) -> LanguageServerConfig {
        let (command, args) = self.command_and_args();
        let request_timeout = match self {
            LanguageServerProvider::External(cfg) => cfg
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(default_timeout),
            _ => default_timeout,
        };
        let initialization_options = match self {
            LanguageServerProvider::External(cfg) => {
                initialization_options.or_else(|| cfg.initialization_options.clone())
            }
            _ => initialization_options,
        };
        LanguageServerConfig {
            command: command.to_string(),
            args,
            environment,
            initialization_options,
            request_timeout,
        }
    }
}

/// Best-effort search for the nearest ancestor directory (starting at
/// `start` and walking upward) containing one of `language`'s root
/// markers, mirroring `helix_lsp::find_lsp_workspace`'s root-marker walk
/// without its multi-workspace-folder bookkeeping. Falls back to `start`
/// itself.
pub fn discover_workspace_root(start: &Path, language: &LanguageId) -> PathBuf {
    let markers = root_markers(language);
    if markers.is_empty() {
        return gateway_stdx::path::normalize(start);
    }
    let mut dir = if start.is_dir() {
        start
    } else {
        start.parent().unwrap_or(start)
    };
    loop {
        for marker in markers {
            if has_marker(dir, marker) {
                return gateway_stdx::path::normalize(dir);
            }
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return gateway_stdx::path::normalize(start),
        }
    }
}

fn has_marker(dir: &Path, pattern: &str) -> bool {
    if let Some(literal) = pattern.strip_prefix('*') {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries.filter_map(|e| e.ok()).any(|e| {
                    e.file_name()
                        .to_str()
                        .is_some_and(|name| name.ends_with(literal))
                })
            })
            .unwrap_or(false)
    } else {
        dir.join(pattern).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_id_round_trips_through_as_str() {
        for id in [
            LanguageId::Rust,
            LanguageId::TypeScript,
            LanguageId::Python,
            LanguageId::Go,
        ] {
            assert_eq!(LanguageId::parse(id.as_str()).as_str(), id.as_str());
        }
    }

    #[test]
    fn unknown_extension_falls_back_to_other() {
        let id = language_id_for_path(Path::new("foo.zig")).unwrap();
        assert_eq!(id, LanguageId::Other("zig".to_string()));
        assert!(LanguageServerProvider::for_language(&id).is_none());
    }

    #[test]
    fn rust_extension_maps_to_rust_analyzer_provider() {
        let id = language_id_for_path(Path::new("src/main.rs")).unwrap();
        assert_eq!(id, LanguageId::Rust);
        let provider = LanguageServerProvider::for_language(&id).unwrap();
        let (command, _) = provider.command_and_args();
        assert_eq!(command, "rust-analyzer");
    }

    #[test]
    fn discover_workspace_root_walks_up_to_cargo_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();
        let nested = dir.path().join("src").join("bin");
        std::fs::create_dir_all(&nested).unwrap();
        let root = discover_workspace_root(&nested, &LanguageId::Rust);
        assert_eq!(root, gateway_stdx::path::normalize(dir.path()));
    }

    #[test]
    fn external_provider_config_uses_operator_overrides() {
        let provider = LanguageServerProvider::External(ExternalServerConfig {
            command: "zls".to_string(),
            args: vec![],
            environment: vec![],
            initialization_options: Some(serde_json::json!({"foo": "bar"})),
            timeout_secs: Some(15),
        });
        let config = provider.config(vec![], None, Duration::from_secs(20));
        assert_eq!(config.command, "zls");
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.initialization_options, Some(serde_json::json!({"foo": "bar"})));
    }
}
