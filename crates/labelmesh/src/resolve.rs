//! Turning path arguments into existing files and directories.
//!
//! A front end hands the pipeline whatever the user typed. A [`PathResolver`]
//! decides what that text refers to:
//!
//! - [`DirectPaths`] takes arguments as paths relative to the working directory.
//! - [`RecursiveSearch`] also accepts bare names and looks for them below a root
//!   directory.

use std::path::{Path, PathBuf};

use labelmesh_core::{LabelMeshError, Result};
use walkdir::WalkDir;

/// Strategy for resolving path arguments.
pub trait PathResolver {
    /// Resolves `name` to an existing file whose extension is one of
    /// `extensions` (compared case-insensitively, without the dot).
    fn resolve_file(&self, name: &str, extensions: &[&str]) -> Result<PathBuf>;

    /// Resolves `name` to an existing directory.
    fn resolve_dir(&self, name: &str) -> Result<PathBuf>;
}

/// Arguments must already name an existing file or directory.
///
/// Relative paths are taken from the working directory. Results are
/// canonicalized.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectPaths;

impl PathResolver for DirectPaths {
    fn resolve_file(&self, name: &str, extensions: &[&str]) -> Result<PathBuf> {
        let path = canonical(name)?;
        check_file(name, &path, extensions)?;
        Ok(path)
    }

    fn resolve_dir(&self, name: &str) -> Result<PathBuf> {
        let path = canonical(name)?;
        if !path.is_dir() {
            return Err(LabelMeshError::invalid(
                name,
                format!("'{}' is not a directory", path.display()),
            ));
        }
        Ok(path)
    }
}

/// Absolute paths are used as given; anything else is searched for below `root`.
///
/// The search is depth-first with directory entries sorted by name, and the
/// first match wins. A bare name matches any entry with that file name; a
/// relative path with several components must exist under `root` as written.
#[derive(Debug, Clone)]
pub struct RecursiveSearch {
    /// Directory the search starts from.
    pub root: PathBuf,
}

impl RecursiveSearch {
    /// Searches below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn find(&self, name: &str, accept: impl Fn(&Path) -> bool) -> Result<PathBuf> {
        let relative = Path::new(name);
        if relative.components().count() > 1 {
            let candidate = self.root.join(relative);
            if accept(&candidate) {
                return canonical_path(name, &candidate);
            }
        } else {
            let found = WalkDir::new(&self.root)
                .sort_by_file_name()
                .into_iter()
                .filter_map(std::result::Result::ok)
                .find(|entry| entry.file_name() == relative.as_os_str() && accept(entry.path()));
            if let Some(entry) = found {
                log::debug!("resolved '{name}' to {}", entry.path().display());
                return canonical_path(name, entry.path());
            }
        }
        Err(LabelMeshError::invalid(
            name,
            format!("not found under '{}'", self.root.display()),
        ))
    }
}

impl PathResolver for RecursiveSearch {
    fn resolve_file(&self, name: &str, extensions: &[&str]) -> Result<PathBuf> {
        if Path::new(name).is_absolute() {
            return DirectPaths.resolve_file(name, extensions);
        }
        let path = self.find(name, |p| p.is_file() && has_extension(p, extensions))?;
        check_file(name, &path, extensions)?;
        Ok(path)
    }

    fn resolve_dir(&self, name: &str) -> Result<PathBuf> {
        if Path::new(name).is_absolute() {
            return DirectPaths.resolve_dir(name);
        }
        self.find(name, Path::is_dir)
    }
}

fn canonical(name: &str) -> Result<PathBuf> {
    if name.is_empty() {
        return Err(LabelMeshError::invalid("path", "must not be empty"));
    }
    canonical_path(name, Path::new(name))
}

fn canonical_path(name: &str, path: &Path) -> Result<PathBuf> {
    path.canonicalize().map_err(|e| {
        LabelMeshError::invalid(name, format!("cannot resolve '{}': {e}", path.display()))
    })
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|allowed| e.eq_ignore_ascii_case(allowed)))
}

fn check_file(name: &str, path: &Path, extensions: &[&str]) -> Result<()> {
    if !path.is_file() {
        return Err(LabelMeshError::invalid(
            name,
            format!("'{}' is not a file", path.display()),
        ));
    }
    if !has_extension(path, extensions) {
        return Err(LabelMeshError::invalid(
            name,
            format!("expected one of the extensions {extensions:?}"),
        ));
    }
    Ok(())
}
