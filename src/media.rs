use std::path::{Path, PathBuf};

use data_encoding::HEXLOWER;
use ring::digest;

use crate::{error::MediaError, validate::IMAGE_EXTENSIONS};

/// Largest image accepted from a form upload.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const UPLOAD_DIR: &str = "destinations";

/// Uploaded images on disk, named after the sha256 of their contents.
#[derive(Clone, Debug)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The media-relative reference `bytes` would be stored under. Nothing is written.
    pub fn reference(&self, filename: &str, bytes: &[u8]) -> Result<String, MediaError> {
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(MediaError::TooLarge { max: MAX_IMAGE_BYTES });
        }
        let extension = extension(filename)?;

        let hash = digest::digest(&digest::SHA256, bytes);
        Ok(format!("{}/{}.{}", UPLOAD_DIR, HEXLOWER.encode(hash.as_ref()), extension))
    }

    /// Store `bytes` and return the media-relative reference to it.
    pub async fn save(&self, filename: &str, bytes: &[u8]) -> Result<String, MediaError> {
        let reference = self.reference(filename, bytes)?;
        let path = self.root.join(&reference);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!("stored image {} ({} bytes)", path.display(), bytes.len());
        Ok(reference)
    }
}

fn extension(filename: &str) -> Result<String, MediaError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(MediaError::UnsupportedType(filename.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::is_image_reference;

    #[tokio::test]
    async fn test_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let reference = store.save("Beach.JPG", b"not really a jpeg").await.unwrap();
        assert!(reference.starts_with("destinations/"));
        assert!(reference.ends_with(".jpg"));
        assert!(is_image_reference(&reference));
        let stored = std::fs::read(dir.path().join(&reference)).unwrap();
        assert_eq!(stored, b"not really a jpeg");

        // same bytes, same reference
        let again = store.save("other.jpg", b"not really a jpeg").await.unwrap();
        assert_eq!(again, reference);
    }

    #[test]
    fn test_reference_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let reference = store.reference("beach.png", b"png").unwrap();
        assert!(reference.ends_with(".png"));
        assert!(!dir.path().join(&reference).exists());
        assert!(!dir.path().join(UPLOAD_DIR).exists());
    }

    #[tokio::test]
    async fn test_rejects_unknown_type() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let e = store.save("script.sh", b"#!/bin/sh").await.unwrap_err();
        assert!(matches!(e, MediaError::UnsupportedType(_)));
        assert!(store.save("noextension", b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_large() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let big = vec![0u8; MAX_IMAGE_BYTES + 1];
        let e = store.save("big.png", &big).await.unwrap_err();
        assert!(matches!(e, MediaError::TooLarge { .. }));
    }
}
