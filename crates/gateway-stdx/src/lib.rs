//! Standard library extensions shared by the gateway crates.
//!
//! Trimmed from the editor-oriented `helix-stdx` down to the pieces a
//! headless subprocess gateway actually needs: path normalization/safety
//! and URI<->path conversion. No rope or text-buffer helpers live here.

pub mod env;
pub mod path;
pub mod uri;
