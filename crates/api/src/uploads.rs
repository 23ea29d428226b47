//! Narrow interface onto the upload collaborator.
//!
//! The broker never manages uploads itself; it only resolves a previously
//! uploaded reference image into bytes (as a data URL) when building a
//! provider request.

use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Reference image '{0}' does not exist or has expired")]
    NotFound(String),

    #[error("Invalid reference image id")]
    InvalidId,

    #[error("Failed to read reference image: {0}")]
    Io(#[from] std::io::Error),
}

/// Read-only view of the temporary upload directory.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve an uploaded file id into a `data:` URL with a sniffed mime
    /// type, ready to embed in a provider request.
    pub async fn data_url(&self, file_id: &str) -> Result<String, UploadError> {
        // File ids are opaque tokens, never paths.
        if file_id.is_empty() || file_id.contains(['/', '\\', '.']) {
            return Err(UploadError::InvalidId);
        }

        let path = self.root.join(file_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(UploadError::NotFound(file_id.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        let mime = sniff_mime(&bytes);
        Ok(format!("data:{mime};base64,{}", BASE64.encode(&bytes)))
    }
}

/// Detect the image mime type from magic bytes, defaulting to PNG.
fn sniff_mime(data: &[u8]) -> &'static str {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(b"\x89PNG") {
        "image/png"
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        "image/gif"
    } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/png"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_sniffing() {
        assert_eq!(sniff_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(sniff_mime(b"\x89PNG\r\n\x1a\n"), "image/png");
        assert_eq!(sniff_mime(b"GIF89a......"), "image/gif");
        assert_eq!(sniff_mime(b"RIFF\x00\x00\x00\x00WEBPVP8 "), "image/webp");
        assert_eq!(sniff_mime(b"unknown"), "image/png");
    }

    #[tokio::test]
    async fn resolves_an_uploaded_file_to_a_data_url() {
        let tmp = tempfile::tempdir().unwrap();
        tokio::fs::write(tmp.path().join("file-1"), b"\x89PNG\r\n\x1a\nrest")
            .await
            .unwrap();

        let store = UploadStore::new(tmp.path());
        let url = store.data_url("file-1").await.unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn missing_and_malicious_ids_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = UploadStore::new(tmp.path());

        assert_matches::assert_matches!(
            store.data_url("absent").await,
            Err(UploadError::NotFound(_))
        );
        assert_matches::assert_matches!(
            store.data_url("../etc/passwd").await,
            Err(UploadError::InvalidId)
        );
    }
}
