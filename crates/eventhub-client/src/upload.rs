//! Inline image uploads.
//!
//! The backend accepts images embedded in the resource body as
//! `data:<mime>;base64,<payload>` URLs rather than through a separate upload
//! endpoint.

use std::fs;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::UploadError;

/// Default size limit for inline images (5 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// MIME type for an image file, from its extension.
pub fn image_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

/// Reads an image file and encodes it as a data URL.
pub fn encode_data_url(path: &Path, max_bytes: u64) -> Result<String, UploadError> {
    let mime = image_mime_type(path)
        .ok_or_else(|| UploadError::UnsupportedType(path.display().to_string()))?;

    let size = fs::metadata(path)?.len();
    if size > max_bytes {
        return Err(UploadError::TooLarge {
            size,
            max: max_bytes,
        });
    }

    let bytes = fs::read(path)?;
    tracing::debug!(path = %path.display(), size, mime, "encoded upload");
    Ok(encode_bytes(mime, &bytes))
}

/// Encodes raw bytes as a data URL of the given MIME type.
pub fn encode_bytes(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_types() {
        assert_eq!(image_mime_type(Path::new("a/cover.PNG")), Some("image/png"));
        assert_eq!(image_mime_type(Path::new("logo.jpeg")), Some("image/jpeg"));
        assert_eq!(image_mime_type(Path::new("notes.txt")), None);
        assert_eq!(image_mime_type(Path::new("no_extension")), None);
    }

    #[test]
    fn test_encode_data_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixel.gif");
        fs::write(&path, b"GIF89a").unwrap();

        let url = encode_data_url(&path, DEFAULT_MAX_UPLOAD_BYTES).unwrap();
        assert_eq!(url, "data:image/gif;base64,R0lGODlh");
    }

    #[test]
    fn test_size_limit_and_type_checks() {
        let dir = tempfile::tempdir().unwrap();
        let big = dir.path().join("big.png");
        fs::write(&big, vec![0u8; 64]).unwrap();
        assert!(matches!(
            encode_data_url(&big, 16),
            Err(UploadError::TooLarge { size: 64, max: 16 })
        ));

        let text = dir.path().join("readme.txt");
        fs::write(&text, b"hi").unwrap();
        assert!(matches!(
            encode_data_url(&text, DEFAULT_MAX_UPLOAD_BYTES),
            Err(UploadError::UnsupportedType(_))
        ));

        let missing = dir.path().join("missing.png");
        assert!(matches!(
            encode_data_url(&missing, DEFAULT_MAX_UPLOAD_BYTES),
            Err(UploadError::Io(_))
        ));
    }
}
