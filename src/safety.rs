use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Keeps a run inside the source tree it was pointed at.
///
/// Every file a run reads and rewrites must resolve, after following
/// symlinks, to a path under the root and outside every excluded directory.
#[derive(Debug, Clone)]
pub struct SourceGuard {
    /// Canonical source root
    root: PathBuf,
    /// Canonical directories never rewritten
    excluded: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Path is outside the source root: {path} (root: {root})")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("Path is in an excluded directory: {path} (excluded: {excluded})")]
    Excluded { path: PathBuf, excluded: PathBuf },

    #[error("Failed to canonicalize path: {0}")]
    Canonicalize(#[from] std::io::Error),

    #[error("Failed to walk {path}: {message}")]
    Walk { path: PathBuf, message: String },
}

impl SourceGuard {
    /// Guard rooted at `root`. The root's `.git` directory is excluded.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let root = root.as_ref().canonicalize()?;

        let mut excluded = Vec::new();
        if let Ok(git) = root.join(".git").canonicalize() {
            excluded.push(git);
        }

        Ok(Self { root, excluded })
    }

    /// Also refuse anything under `dir`. A directory that does not exist is
    /// ignored.
    pub fn exclude(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let absolute = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.root.join(dir)
        };
        if let Ok(canonical) = absolute.canonicalize() {
            self.excluded.push(canonical);
        }
        self
    }

    /// Canonical form of `path` if it may be rewritten.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        let canonical = absolute.canonicalize()?;
        self.check_canonical(&canonical)?;
        Ok(canonical)
    }

    fn check_canonical(&self, canonical: &Path) -> Result<(), SafetyError> {
        if !canonical.starts_with(&self.root) {
            return Err(SafetyError::OutsideRoot {
                path: canonical.to_path_buf(),
                root: self.root.clone(),
            });
        }

        for excluded in &self.excluded {
            if canonical.starts_with(excluded) {
                return Err(SafetyError::Excluded {
                    path: canonical.to_path_buf(),
                    excluded: excluded.clone(),
                });
            }
        }

        Ok(())
    }

    /// C sources named by `inputs`: files as given, directories walked for
    /// `*.c`. Sorted and deduplicated.
    pub fn discover(&self, inputs: &[PathBuf]) -> Result<Vec<PathBuf>, SafetyError> {
        let mut found = Vec::new();
        for input in inputs {
            let canonical = self.validate_path(input)?;
            if !canonical.is_dir() {
                found.push(canonical);
                continue;
            }

            let walker = WalkDir::new(&canonical)
                .follow_links(false)
                .into_iter()
                .filter_entry(|e| !self.excluded.iter().any(|x| e.path().starts_with(x)));
            for entry in walker {
                let entry = entry.map_err(|e| SafetyError::Walk {
                    path: canonical.clone(),
                    message: e.to_string(),
                })?;
                if entry.file_type().is_file()
                    && entry.path().extension().is_some_and(|ext| ext == "c")
                {
                    found.push(entry.into_path());
                }
            }
        }
        found.sort();
        found.dedup();
        Ok(found)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn accepts_files_under_the_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        let guard = SourceGuard::new(root).unwrap();

        let file = root.join("src/main.c");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"").unwrap();

        assert!(guard.validate_path(&file).is_ok());
        assert!(guard.validate_path("src/main.c").is_ok());
    }

    #[test]
    fn rejects_files_outside_the_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("project");
        fs::create_dir_all(&root).unwrap();
        let guard = SourceGuard::new(&root).unwrap();

        let outside = temp_dir.path().join("outside.c");
        fs::write(&outside, b"").unwrap();

        let result = guard.validate_path(&outside);
        assert!(matches!(result, Err(SafetyError::OutsideRoot { .. })));
    }

    #[test]
    fn rejects_excluded_directories() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        let vendor = root.join("vendor");
        fs::create_dir_all(&vendor).unwrap();
        fs::write(vendor.join("lib.c"), b"").unwrap();

        let guard = SourceGuard::new(root).unwrap().exclude("vendor");
        let result = guard.validate_path(vendor.join("lib.c"));
        assert!(matches!(result, Err(SafetyError::Excluded { .. })));
    }

    #[test]
    #[cfg(unix)]
    fn rejects_symlink_escapes() {
        use std::os::unix::fs::symlink;

        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("project");
        fs::create_dir_all(&root).unwrap();

        let outside = temp_dir.path().join("outside.c");
        fs::write(&outside, b"").unwrap();
        let link = root.join("escape.c");
        symlink(&outside, &link).unwrap();

        let guard = SourceGuard::new(&root).unwrap();
        let result = guard.validate_path(&link);
        assert!(matches!(result, Err(SafetyError::OutsideRoot { .. })));
    }

    #[test]
    fn discovery_walks_for_c_sources() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("src/a.c"), b"").unwrap();
        fs::write(root.join("src/nested/b.c"), b"").unwrap();
        fs::write(root.join("src/notes.txt"), b"").unwrap();
        fs::write(root.join("src/a.h"), b"").unwrap();
        fs::write(root.join(".git/hook.c"), b"").unwrap();

        let guard = SourceGuard::new(root).unwrap();
        let found = guard
            .discover(&[PathBuf::from("."), PathBuf::from("src/a.c")])
            .unwrap();

        let names: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(guard.root()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            [PathBuf::from("src/a.c"), PathBuf::from("src/nested/b.c")]
        );
    }
}
