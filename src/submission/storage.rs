use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use super::multipart::FilePart;
use super::sanitize::{sanitize_filename, unique_storage_name};

/// A validated upload on its way to disk.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub original_filename: String,
    pub sanitized_filename: String,
    /// `<prefix>_<sanitized>`, unique per request.
    pub storage_name: String,
    pub storage_path: PathBuf,
    pub content: Bytes,
}

impl Attachment {
    pub fn size_bytes(&self) -> usize {
        self.content.len()
    }
}

/// Flat, append-only directory of uploaded PDFs.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    dir: PathBuf,
    public_domain: Option<String>,
}

impl AttachmentStore {
    pub fn new(dir: impl Into<PathBuf>, public_domain: Option<String>) -> Self {
        Self {
            dir: dir.into(),
            public_domain,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Assign a sanitized, uniquely prefixed storage path to an upload.
    pub fn prepare(&self, file: FilePart) -> Attachment {
        let sanitized_filename = sanitize_filename(&file.filename);
        let storage_name = unique_storage_name(&sanitized_filename);
        Attachment {
            storage_path: self.dir.join(&storage_name),
            original_filename: file.filename,
            sanitized_filename,
            storage_name,
            content: file.content,
        }
    }

    /// Write the attachment. Fails rather than overwrite an existing file.
    pub async fn persist(&self, attachment: &Attachment) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&attachment.storage_path)
            .await?;
        file.write_all(&attachment.content).await?;
        file.flush().await?;
        tracing::info!(
            name = %attachment.storage_name,
            size = attachment.size_bytes(),
            "attachment stored"
        );
        Ok(())
    }

    /// Absolute URL when a public domain is configured, else a site-relative path.
    pub fn public_url(&self, attachment: &Attachment) -> String {
        let path = format!("/uploads/{}", attachment.storage_name);
        match self.public_domain.as_deref() {
            Some(domain) if domain.starts_with("http://") || domain.starts_with("https://") => {
                format!("{}{}", domain.trim_end_matches('/'), path)
            }
            Some(domain) => format!("https://{}{}", domain.trim_end_matches('/'), path),
            None => path,
        }
    }
}
