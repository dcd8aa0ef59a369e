//! Boundary with whatever knows where backup files live
//!
//! Hashed, physical and desktop backups each lay files out differently.
//! The assembler only asks a [`BackupLocator`] to turn a logical path such
//! as `Accounts/<id>/Media/<uuid>/photo.jpeg` into a readable file, and to
//! store a copy under a display name.

use crate::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Locates and stores backing files for embedded objects
pub trait BackupLocator {
    /// Absolute path of `logical_path`, or `None` if the backup lacks it
    fn resolve_path(&self, logical_path: &str) -> Option<PathBuf>;

    /// Copy the file found at `absolute` into output storage under
    /// `display_name`, returning where it was stored.
    fn materialize(&self, logical_path: &str, display_name: &str, absolute: &Path) -> Result<PathBuf>;

    /// Store decrypted bytes of a protected file under `display_name`.
    fn materialize_bytes(&self, logical_path: &str, display_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let _ = (display_name, bytes);
        Err(Error::Validation(format!(
            "Locator cannot store decrypted copy of {}",
            logical_path
        )))
    }
}

/// Locator for bare databases without any backup around them
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLocator;

impl BackupLocator for NullLocator {
    fn resolve_path(&self, _logical_path: &str) -> Option<PathBuf> {
        None
    }

    fn materialize(&self, logical_path: &str, _display_name: &str, _absolute: &Path) -> Result<PathBuf> {
        Err(Error::NotFound(logical_path.to_string()))
    }
}

/// Locator over a plain directory tree mirroring the note container
/// (`<root>/Accounts/...`), copying files into `output`.
#[derive(Debug, Clone)]
pub struct DirectoryLocator {
    root: PathBuf,
    output: Option<PathBuf>,
}

impl DirectoryLocator {
    /// Resolve under `root`; nothing is copied until an output is set
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            output: None,
        }
    }

    /// Copy materialized files into `output`
    pub fn with_output<P: AsRef<Path>>(mut self, output: P) -> Self {
        self.output = Some(output.as_ref().to_path_buf());
        self
    }

    fn destination(&self, logical_path: &str, display_name: &str) -> Result<PathBuf> {
        let output = self
            .output
            .as_ref()
            .ok_or_else(|| Error::Validation("No output directory configured".to_string()))?;
        let parent = sanitize(Path::new(logical_path).parent().unwrap_or(Path::new("")))?;
        let name = sanitize(Path::new(display_name))?;
        let dir = output.join(parent);
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join(name))
    }
}

impl BackupLocator for DirectoryLocator {
    fn resolve_path(&self, logical_path: &str) -> Option<PathBuf> {
        let relative = sanitize(Path::new(logical_path)).ok()?;
        let candidate = self.root.join(relative);
        if candidate.is_file() {
            Some(candidate)
        } else {
            tracing::debug!("{} not present under {}", logical_path, self.root.display());
            None
        }
    }

    fn materialize(&self, logical_path: &str, display_name: &str, absolute: &Path) -> Result<PathBuf> {
        let destination = self.destination(logical_path, display_name)?;
        std::fs::copy(absolute, &destination)?;
        Ok(destination)
    }

    fn materialize_bytes(&self, logical_path: &str, display_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let destination = self.destination(logical_path, display_name)?;
        std::fs::write(&destination, bytes)?;
        Ok(destination)
    }
}

/// Keep only normal components so stored names cannot escape their root.
fn sanitize(path: &Path) -> Result<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => {
                return Err(Error::Validation(format!(
                    "Refusing path outside backup root: {}",
                    path.display()
                )))
            }
        }
    }
    Ok(clean)
}
