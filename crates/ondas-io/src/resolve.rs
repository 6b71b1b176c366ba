//! File lookup against a base directory and an ordered search path.

use std::path::{Path, PathBuf};

use ondas_core::{Error, Result};

/// Resolves soundfile names the way the host environment would: relative
/// to a base directory first, then through an ordered list of search
/// directories. Immutable once built, so it is safe to consult from any
/// thread; resolution always happens on the calling thread, before any
/// worker hand-off.
#[derive(Debug, Clone)]
pub struct PathResolver {
    base: PathBuf,
    search: Vec<PathBuf>,
}

impl PathResolver {
    /// Resolve against `base` only.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        PathResolver {
            base: base.into(),
            search: Vec::new(),
        }
    }

    /// Resolve against `base`, then each search directory in order.
    pub fn with_search_paths(base: impl Into<PathBuf>, search: Vec<PathBuf>) -> Self {
        PathResolver {
            base: base.into(),
            search,
        }
    }

    /// Locate an existing file for reading.
    pub fn resolve_read(&self, name: &str) -> Result<PathBuf> {
        let direct = Path::new(name);
        if direct.is_absolute() {
            if direct.is_file() {
                return Ok(direct.to_path_buf());
            }
            return Err(Error::PathNotFound(name.to_string()));
        }
        let candidate = self.base.join(direct);
        if candidate.is_file() {
            return Ok(candidate);
        }
        for dir in &self.search {
            let candidate = dir.join(direct);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        Err(Error::PathNotFound(name.to_string()))
    }

    /// Place a file for writing, relative to the base directory.
    pub fn resolve_write(&self, name: &str) -> PathBuf {
        let direct = Path::new(name);
        if direct.is_absolute() {
            direct.to_path_buf()
        } else {
            self.base.join(direct)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn searches_base_then_path() {
        let base = tempdir().unwrap();
        let extra = tempdir().unwrap();
        std::fs::write(extra.path().join("b.wav"), b"x").unwrap();
        std::fs::write(base.path().join("a.wav"), b"x").unwrap();

        let resolver = PathResolver::with_search_paths(base.path(), vec![extra.path().into()]);
        assert_eq!(resolver.resolve_read("a.wav").unwrap(), base.path().join("a.wav"));
        assert_eq!(resolver.resolve_read("b.wav").unwrap(), extra.path().join("b.wav"));
        assert!(matches!(
            resolver.resolve_read("c.wav"),
            Err(Error::PathNotFound(_))
        ));
    }

    #[test]
    fn write_paths_land_in_base() {
        let base = tempdir().unwrap();
        let resolver = PathResolver::new(base.path());
        assert_eq!(
            resolver.resolve_write("out.wav"),
            base.path().join("out.wav")
        );
    }
}
