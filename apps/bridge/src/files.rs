use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::error::FileSourceError;

pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
pub const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

/// Read access to files users attached in the chat platform.
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn fetch(&self, file_id: &str) -> Result<Bytes, FileSourceError>;
}

/// Best-effort MIME type of `bytes`: known image formats, then UTF-8 text, then binary.
pub fn sniff_content_type(bytes: &[u8]) -> &'static str {
    if let Ok(format) = image::guess_format(bytes) {
        return format.to_mime_type();
    }
    if !bytes.is_empty() && std::str::from_utf8(bytes).is_ok() {
        return TEXT_CONTENT_TYPE;
    }
    BINARY_CONTENT_TYPE
}

/// Files kept in a local directory, one file per id.
pub struct DirFileSource {
    root: PathBuf,
}

impl DirFileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, file_id: &str) -> Result<PathBuf, FileSourceError> {
        let candidate = Path::new(file_id);
        let single_component = candidate.components().count() == 1
            && matches!(
                candidate.components().next(),
                Some(std::path::Component::Normal(_))
            );
        if file_id.is_empty() || !single_component {
            return Err(FileSourceError::InvalidId(file_id.to_string()));
        }
        Ok(self.root.join(candidate))
    }
}

#[async_trait]
impl FileSource for DirFileSource {
    async fn fetch(&self, file_id: &str) -> Result<Bytes, FileSourceError> {
        let path = self.resolve(file_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(FileSourceError::NotFound(file_id.to_string()))
            }
            Err(err) => Err(FileSourceError::Unavailable(err.to_string())),
        }
    }
}

/// In-process file source, used by tests and local runs.
#[derive(Default)]
pub struct MemoryFileSource {
    files: DashMap<String, Bytes>,
}

impl MemoryFileSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, file_id: impl Into<String>, bytes: impl Into<Bytes>) {
        self.files.insert(file_id.into(), bytes.into());
    }
}

#[async_trait]
impl FileSource for MemoryFileSource {
    async fn fetch(&self, file_id: &str) -> Result<Bytes, FileSourceError> {
        self.files
            .get(file_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FileSourceError::NotFound(file_id.to_string()))
    }
}
