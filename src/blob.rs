//! Blob storage for uploaded images.
//!
//! The `BlobStore` trait is the seam between admin workflows and wherever the
//! bytes live; `FsBlobStore` keeps them on local disk and hands out URLs served
//! by the REST layer under `/blobs`.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::error::StoreError;

pub const ALLOWED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

#[derive(Debug, Clone, PartialEq)]
pub struct StoredBlob {
    pub path: String,
    pub url: String,
    /// False when identical content already sat at this path.
    pub created: bool,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `bytes` at `path`, overwriting whatever is there.
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<StoredBlob, StoreError>;

    async fn exists(&self, path: &str) -> Result<bool, StoreError>;

    /// Remove a blob. Missing blobs are not an error.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    fn url_for(&self, path: &str) -> String;
}

pub struct FsBlobStore {
    root: PathBuf,
    base_url: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: format!("{}/blobs", public_base_url.trim_end_matches('/')),
        }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        validate_path(path)?;
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<StoredBlob, StoreError> {
        let target = self.resolve(path)?;
        let existed = tokio::fs::try_exists(&target).await?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        tracing::info!(path, size = bytes.len(), overwrote = existed, "blob stored");
        Ok(StoredBlob {
            path: path.to_string(),
            url: self.url_for(path),
            created: !existed,
        })
    }

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        let target = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&target).await?)
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => {
                tracing::info!(path, "blob deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

/// Reject absolute paths, traversal and other characters that could escape the root.
pub fn validate_path(path: &str) -> Result<(), StoreError> {
    let bad = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.contains('\0')
        || path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(StoreError::Invalid(format!("blob path {:?}", path)));
    }
    Ok(())
}

/// Sniff the image type from its leading bytes.
pub fn detect_image_mime(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        _ => None,
    }
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "bin",
    }
}

/// Lowercase, whitespace to hyphens, anything outside `[a-z0-9-]` dropped.
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for word in s.split_whitespace() {
        if !out.is_empty() {
            out.push('-');
        }
        out.extend(
            word.chars()
                .flat_map(char::to_lowercase)
                .filter(|c| c.is_ascii_alphanumeric() || *c == '-'),
        );
    }
    if out.is_empty() {
        "untitled".to_string()
    } else {
        out
    }
}

/// Validates an image and derives its content-addressed path:
/// `{prefix}/{slug}/{sha256[..16]}.{ext}`. The same bytes always map to the
/// same path, so retrying a submission rewrites rather than duplicates.
pub fn image_path(prefix: &str, name: &str, bytes: &[u8], max_bytes: usize) -> Result<String, StoreError> {
    if bytes.is_empty() {
        return Err(StoreError::Invalid("image: file is empty".into()));
    }
    if bytes.len() > max_bytes {
        return Err(StoreError::Invalid(format!(
            "image: file too large ({} bytes, max {})",
            bytes.len(),
            max_bytes
        )));
    }
    let mime = detect_image_mime(bytes).ok_or_else(|| {
        StoreError::Invalid("image: unsupported file type. Allowed: JPEG, PNG, WebP, GIF.".into())
    })?;
    let digest = Sha256::digest(bytes);
    let hex: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    Ok(format!(
        "{}/{}/{}.{}",
        slugify(prefix),
        slugify(name),
        hex,
        extension_for(mime)
    ))
}
