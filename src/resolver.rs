//! Classifies a requested path before any bytes are produced.
//!
//! The path is trusted verbatim unless an allowed root is configured; relative
//! paths resolve against the server's working directory.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ServeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// A path that exists and has been classified.
#[derive(Debug, Clone)]
pub struct Target {
    pub path: PathBuf,
    pub kind: EntryKind,
}

/// Resolve a raw `path` query value.
///
/// An empty value fails with [`ServeError::MissingParameter`] without touching
/// the filesystem. Metadata follows symlinks, so a link to a directory is a
/// directory.
pub fn resolve(raw: &str, allowed_root: Option<&Path>) -> Result<Target, ServeError> {
    if raw.is_empty() {
        return Err(ServeError::MissingParameter);
    }

    let path = PathBuf::from(raw);
    let metadata = match fs::metadata(&path) {
        Ok(metadata) => metadata,
        Err(err) => {
            debug!("stat failed for {}: {}", path.display(), err);
            return Err(ServeError::NotFound(raw.to_string()));
        }
    };

    if let Some(root) = allowed_root {
        verify_under_root(&path, root, raw)?;
    }

    let kind = if metadata.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::File
    };

    Ok(Target { path, kind })
}

/// `root` must already be canonical.
fn verify_under_root(path: &Path, root: &Path, raw: &str) -> Result<(), ServeError> {
    let canonical = path
        .canonicalize()
        .map_err(|_| ServeError::NotFound(raw.to_string()))?;

    if !canonical.starts_with(root) {
        return Err(ServeError::OutsideRoot(raw.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_path_is_missing_parameter() {
        let result = resolve("", None);
        assert!(matches!(result, Err(ServeError::MissingParameter)));
    }

    #[test]
    fn test_nonexistent_path_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");
        let result = resolve(missing.to_str().unwrap(), None);
        assert!(matches!(result, Err(ServeError::NotFound(_))));
    }

    #[test]
    fn test_classifies_file_and_directory() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.txt");
        std::fs::write(&file, "a").unwrap();

        let target = resolve(file.to_str().unwrap(), None).unwrap();
        assert_eq!(target.kind, EntryKind::File);
        assert_eq!(target.path, file);

        let target = resolve(temp_dir.path().to_str().unwrap(), None).unwrap();
        assert_eq!(target.kind, EntryKind::Directory);
    }

    #[test]
    fn test_allowed_root_accepts_inside_and_rejects_outside() {
        let root = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::fs::write(root.path().join("in.txt"), "in").unwrap();
        std::fs::write(outside.path().join("out.txt"), "out").unwrap();
        let canonical_root = root.path().canonicalize().unwrap();

        let inside = root.path().join("in.txt");
        let target = resolve(inside.to_str().unwrap(), Some(&canonical_root)).unwrap();
        assert_eq!(target.kind, EntryKind::File);

        // Both temp dirs share a parent, so this walks out of root and back in.
        let escaped = root
            .path()
            .join("..")
            .join(outside.path().file_name().unwrap())
            .join("out.txt");
        let result = resolve(escaped.to_str().unwrap(), Some(&canonical_root));
        assert!(matches!(result, Err(ServeError::OutsideRoot(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_allowed_root_detects_symlink_escape() {
        let root = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("escape")).unwrap();
        let canonical_root = root.path().canonicalize().unwrap();

        let via_link = root.path().join("escape").join("secret.txt");
        let result = resolve(via_link.to_str().unwrap(), Some(&canonical_root));
        assert!(matches!(result, Err(ServeError::OutsideRoot(_))));
    }
}
