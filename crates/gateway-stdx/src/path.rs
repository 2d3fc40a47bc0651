//! Functions for working with [Path].

use std::path::{Component, Path, PathBuf};

/// Normalize a path without resolving symlinks.
///
/// Strategy: walk the components, collapsing `.` and resolving `..` against
/// the components collected so far. This does not touch the filesystem.
pub fn normalize(path: impl AsRef<Path>) -> PathBuf {
    let mut components = path.as_ref().components().peekable();
    let mut ret = if let Some(c @ Component::Prefix(..)) = components.peek().copied() {
        components.next();
        PathBuf::from(c.as_os_str())
    } else {
        PathBuf::new()
    };

    for component in components {
        match component {
            Component::Prefix(..) => unreachable!(),
            Component::RootDir => {
                ret.push(component.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                ret.pop();
            }
            Component::Normal(c) => {
                ret.push(c);
            }
        }
    }

    dunce::simplified(&ret).to_path_buf()
}

/// Returns the canonical, absolute form of `path` with symlinks resolved.
///
/// Falls back to a purely lexical normalization relative to `base` when the
/// path does not exist on disk yet (the workspace root itself is expected to
/// exist, but individual files named inside a `WorkspaceEdit` may not).
pub fn canonicalize(path: impl AsRef<Path>, base: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.as_ref().join(path)
    };

    match joined.canonicalize() {
        Ok(resolved) => dunce::simplified(&resolved).to_path_buf(),
        Err(_) => normalize(joined),
    }
}

/// Resolves the canonical workspace root used as a connection pool key.
///
/// Symlinks are resolved and the trailing separator is stripped, matching
/// the pool key's `(language, workspace)` contract.
pub fn canonicalize_workspace(path: impl AsRef<Path>) -> std::io::Result<PathBuf> {
    let canonical = path.as_ref().canonicalize()?;
    Ok(dunce::simplified(&canonical).to_path_buf())
}

/// Returns true if `candidate` (once normalized) lies inside `root` (once
/// normalized). Used by the edit transaction manager to reject paths that
/// escape the workspace via `..`, an absolute override, or similar.
pub fn is_within(root: &Path, candidate: &Path) -> bool {
    let root = normalize(root);
    let candidate = normalize(candidate);
    candidate.starts_with(&root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dotdot() {
        assert_eq!(
            normalize(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
    }

    #[test]
    fn normalize_does_not_escape_root_via_leading_dotdot() {
        // A leading `..` with nothing to pop just drops it, it never makes
        // the path climb above the filesystem root.
        assert_eq!(normalize(Path::new("/../../etc")), PathBuf::from("/etc"));
    }

    #[test]
    fn is_within_rejects_escape() {
        let root = Path::new("/workspace/project");
        assert!(is_within(root, Path::new("/workspace/project/src/lib.rs")));
        assert!(!is_within(root, Path::new("/workspace/project/../secret")));
        assert!(!is_within(root, Path::new("/etc/passwd")));
    }

    #[test]
    fn canonicalize_workspace_resolves_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real");
        std::fs::create_dir(&real).unwrap();
        #[cfg(unix)]
        {
            let link = dir.path().join("link");
            std::os::unix::fs::symlink(&real, &link).unwrap();
            let resolved = canonicalize_workspace(&link).unwrap();
            assert_eq!(resolved, real.canonicalize().unwrap());
        }
    }
}
