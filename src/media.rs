//! Filesystem storage for original and labeled rasters.
//!
//! Two roots: uploads are written byte-for-byte under the original root
//! (no re-encode), annotated output under the labeled root. Fetching is
//! by generated filename only; anything that fails the filename allowlist
//! resolves to not-found.

use anyhow::{Context, Result};
use image::RgbImage;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::FetchError;
use crate::is_valid_stored_filename;

#[derive(Clone, Debug)]
pub struct MediaStore {
    original_root: PathBuf,
    labeled_root: PathBuf,
}

impl MediaStore {
    /// Creates both roots if missing.
    pub fn open(original_root: impl Into<PathBuf>, labeled_root: impl Into<PathBuf>) -> Result<Self> {
        let original_root = original_root.into();
        let labeled_root = labeled_root.into();
        std::fs::create_dir_all(&original_root)
            .with_context(|| format!("creating image root {}", original_root.display()))?;
        std::fs::create_dir_all(&labeled_root)
            .with_context(|| format!("creating labeled root {}", labeled_root.display()))?;
        Ok(Self {
            original_root,
            labeled_root,
        })
    }

    pub fn original_root(&self) -> &Path {
        &self.original_root
    }

    pub fn labeled_root(&self) -> &Path {
        &self.labeled_root
    }

    /// Writes the upload bytes unmodified; returns the stored path.
    pub fn save_original(&self, filename: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.original_root.join(filename);
        std::fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Encodes the annotated raster under the labeled root (format follows
    /// the filename extension); returns the stored path.
    pub fn save_labeled(&self, filename: &str, image: &RgbImage) -> Result<PathBuf> {
        let path = self.labeled_root.join(filename);
        image
            .save(&path)
            .with_context(|| format!("encoding labeled image {}", path.display()))?;
        Ok(path)
    }

    pub fn fetch_original(&self, filename: &str) -> Result<Vec<u8>, FetchError> {
        fetch_from(&self.original_root, filename)
    }

    pub fn fetch_labeled(&self, filename: &str) -> Result<Vec<u8>, FetchError> {
        fetch_from(&self.labeled_root, filename)
    }
}

fn fetch_from(root: &Path, filename: &str) -> Result<Vec<u8>, FetchError> {
    if !is_valid_stored_filename(filename) {
        return Err(FetchError::NotFound(filename.to_string()));
    }
    match std::fs::read(root.join(filename)) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(FetchError::NotFound(filename.to_string()))
        }
        Err(e) => Err(FetchError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, MediaStore) {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStore::open(dir.path().join("images"), dir.path().join("labeled")).unwrap();
        (dir, media)
    }

    #[test]
    fn original_round_trips_byte_for_byte() {
        let (_dir, media) = store();
        let bytes = b"not-actually-a-jpeg".to_vec();
        media.save_original("abc123.jpg", &bytes).unwrap();
        assert_eq!(media.fetch_original("abc123.jpg").unwrap(), bytes);
    }

    #[test]
    fn missing_file_is_not_found() {
        let (_dir, media) = store();
        assert!(matches!(
            media.fetch_labeled("labeled_7.jpg"),
            Err(FetchError::NotFound(_))
        ));
    }

    #[test]
    fn traversal_names_resolve_to_not_found() {
        let (_dir, media) = store();
        assert!(matches!(
            media.fetch_original("../secrets.jpg"),
            Err(FetchError::NotFound(_))
        ));
        assert!(matches!(
            media.fetch_original("/etc/passwd"),
            Err(FetchError::NotFound(_))
        ));
    }

    #[test]
    fn roots_are_separate_namespaces() {
        let (_dir, media) = store();
        media.save_original("shared.jpg", b"orig").unwrap();
        assert!(matches!(
            media.fetch_labeled("shared.jpg"),
            Err(FetchError::NotFound(_))
        ));
    }
}
