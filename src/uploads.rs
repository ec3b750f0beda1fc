//! Uploaded content files.
//!
//! Files are checked against a per-type extension allow-list and the configured
//! size limit, then stored under `{upload_dir}/content/` with a random name.
//! The HTTP layer serves `upload_dir` at `/storage`.

use anyhow::{Context, Result};
use std::path::Path;

use crate::models::ContentType;

/// A file received in a multipart `file` part, not yet stored.
#[derive(Debug, Clone)]
pub struct PendingUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl PendingUpload {
    /// Lower-cased extension of the client-supplied file name.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

pub fn allowed_extensions(content_type: ContentType) -> &'static [&'static str] {
    match content_type {
        ContentType::Video => &["mp4", "webm", "mov", "avi", "mkv"],
        ContentType::Pdf => &["pdf"],
        ContentType::Document => &["doc", "docx", "odt", "rtf", "txt"],
        ContentType::Presentation => &["ppt", "pptx", "odp"],
        ContentType::Spreadsheet => &["xls", "xlsx", "ods", "csv"],
        ContentType::Link | ContentType::Quiz => &[],
    }
}

/// Public URL of a stored file.
pub fn file_url(file_path: &str) -> String {
    format!("/storage/{}", file_path)
}

/// Check an upload against the type's allow-list and the size limit.
/// Returns the accepted extension, or the message to report on `file`.
pub fn check_upload(
    content_type: ContentType,
    upload: &PendingUpload,
    max_bytes: usize,
) -> std::result::Result<String, String> {
    let allowed = allowed_extensions(content_type);
    if allowed.is_empty() {
        return Err(format!(
            "Files cannot be uploaded for {} content.",
            content_type
        ));
    }

    if upload.bytes.len() > max_bytes {
        return Err(format!(
            "The file field must not be greater than {} kilobytes.",
            max_bytes / 1024
        ));
    }

    match upload.extension() {
        Some(ext) if allowed.contains(&ext.as_str()) => Ok(ext),
        _ => Err(format!(
            "The file field must be a file of type: {}.",
            allowed.join(", ")
        )),
    }
}

/// Write an accepted upload and return its path relative to `upload_dir`.
pub async fn store(upload_dir: &Path, ext: &str, bytes: &[u8]) -> Result<String> {
    let dir = upload_dir.join("content");
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("Failed to create upload directory: {}", dir.display()))?;

    let relative = format!("content/{}.{}", uuid::Uuid::new_v4(), ext);
    let target = upload_dir.join(&relative);
    tokio::fs::write(&target, bytes)
        .await
        .with_context(|| format!("Failed to write upload: {}", target.display()))?;

    tracing::debug!(path = %relative, size = bytes.len(), "stored upload");
    Ok(relative)
}

/// Remove a stored file. A file that is already gone is not an error.
pub async fn remove(upload_dir: &Path, file_path: &str) -> Result<()> {
    let target = upload_dir.join(file_path);
    match tokio::fs::remove_file(&target).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove upload: {}", target.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, size: usize) -> PendingUpload {
        PendingUpload {
            file_name: name.to_string(),
            bytes: vec![0u8; size],
        }
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        let ext = check_upload(ContentType::Video, &upload("Lesson.MP4", 10), 1024).unwrap();
        assert_eq!(ext, "mp4");
    }

    #[test]
    fn test_rejects_wrong_extension() {
        let err = check_upload(ContentType::Pdf, &upload("notes.docx", 10), 1024).unwrap_err();
        assert_eq!(err, "The file field must be a file of type: pdf.");
    }

    #[test]
    fn test_rejects_types_without_files() {
        assert!(check_upload(ContentType::Link, &upload("a.pdf", 10), 1024).is_err());
        assert!(check_upload(ContentType::Quiz, &upload("a.pdf", 10), 1024).is_err());
    }

    #[test]
    fn test_rejects_oversized() {
        let err = check_upload(ContentType::Pdf, &upload("a.pdf", 2048), 1024).unwrap_err();
        assert!(err.contains("1 kilobytes"));
    }

    #[test]
    fn test_file_url() {
        assert_eq!(file_url("content/abc.pdf"), "/storage/content/abc.pdf");
    }

    #[tokio::test]
    async fn test_store_and_remove() {
        let tmp = tempfile::TempDir::new().unwrap();
        let rel = store(tmp.path(), "txt", b"hello").await.unwrap();
        assert!(rel.starts_with("content/"));
        assert!(rel.ends_with(".txt"));
        assert!(tmp.path().join(&rel).exists());

        remove(tmp.path(), &rel).await.unwrap();
        assert!(!tmp.path().join(&rel).exists());
        // second removal is a no-op
        remove(tmp.path(), &rel).await.unwrap();
    }
}
