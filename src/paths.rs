//! Path resolution helpers
//!
//! Relative paths typed at the shell are resolved against the working
//! directory. `/`, `\` and `|` are all accepted as separators so paths copied
//! from other platforms still resolve.

use crate::error::{CanopyError, Result};
use std::path::{Path, PathBuf};

/// Resolve `path` to an absolute path. Performs no existence checks.
pub fn resolve(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        return path.to_path_buf();
    }

    let root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    path.to_string_lossy()
        .split(|c| matches!(c, '/' | '\\' | '|'))
        .filter(|part| !part.is_empty())
        .fold(root, |acc, part| acc.join(part))
}

/// True if `path` resolves to an existing regular file.
pub fn exists_as_file(path: impl AsRef<Path>) -> bool {
    resolve(path).is_file()
}

/// True if the directory that would contain `path` exists.
pub fn parent_dir_exists(path: impl AsRef<Path>) -> bool {
    resolve(path).parent().map_or(false, Path::is_dir)
}

/// Case-insensitive extension check; `extension` is given without the dot.
pub fn has_extension(path: impl AsRef<Path>, extension: &str) -> bool {
    path.as_ref()
        .to_string_lossy()
        .to_lowercase()
        .ends_with(&format!(".{}", extension.to_lowercase()))
}

/// Resolve `path` and require it to be an existing file.
pub fn require_file(path: impl AsRef<Path>) -> Result<PathBuf> {
    let resolved = resolve(path);
    if resolved.is_file() {
        Ok(resolved)
    } else {
        Err(CanopyError::PathNotFound(resolved))
    }
}

/// Require `path` to carry the given extension.
pub fn require_extension(path: impl AsRef<Path>, extension: &str) -> Result<()> {
    if has_extension(&path, extension) {
        Ok(())
    } else {
        Err(CanopyError::InvalidExtensionError {
            path: resolve(path),
            expected: extension.to_string(),
        })
    }
}

/// Resolve `path` and require its parent directory to exist.
pub fn require_parent_dir(path: impl AsRef<Path>) -> Result<PathBuf> {
    let resolved = resolve(path);
    match resolved.parent() {
        Some(parent) if parent.is_dir() => Ok(resolved),
        Some(parent) => Err(CanopyError::PathNotFound(parent.to_path_buf())),
        None => Err(CanopyError::PathNotFound(resolved)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_path_unchanged() {
        let abs = std::env::temp_dir().join("canopy_abs.csv");
        assert_eq!(resolve(&abs), abs);
    }

    #[test]
    fn test_relative_path_joined_to_cwd() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(resolve("data/train.csv"), cwd.join("data").join("train.csv"));
    }

    #[test]
    fn test_mixed_separators_normalized() {
        let cwd = std::env::current_dir().unwrap();
        let expected = cwd.join("data").join("nested").join("train.csv");
        assert_eq!(resolve("data\\nested//train.csv"), expected);
        assert_eq!(resolve("data|nested|train.csv"), expected);
    }

    #[test]
    fn test_has_extension_case_insensitive() {
        assert!(has_extension("data/TRAIN.CSV", "csv"));
        assert!(has_extension("model.bin", "BIN"));
        assert!(!has_extension("model.bin.bak", "bin"));
        assert!(!has_extension("csv", "csv"));
    }

    #[test]
    fn test_existence_checks() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("present.csv");
        std::fs::write(&file, "a,b\n1,2\n").unwrap();

        assert!(exists_as_file(&file));
        assert!(!exists_as_file(dir.path()));
        assert!(!exists_as_file(dir.path().join("absent.csv")));
        assert!(parent_dir_exists(dir.path().join("new_model.bin")));
        assert!(!parent_dir_exists(dir.path().join("missing").join("model.bin")));
    }

    #[test]
    fn test_require_file_reports_resolved_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.csv");
        match require_file(&missing) {
            Err(CanopyError::PathNotFound(p)) => assert_eq!(p, missing),
            other => panic!("expected PathNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_require_extension() {
        assert!(require_extension("x.csv", "csv").is_ok());
        assert!(matches!(
            require_extension("x.txt", "csv"),
            Err(CanopyError::InvalidExtensionError { .. })
        ));
    }
}
