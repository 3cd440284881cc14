use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::errors::ServiceError;
use crate::models::DocumentCategory;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Invalid document key: {0}")]
    InvalidKey(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => ServiceError::NotFound(format!("Document {}", key)),
            other => ServiceError::StorageError(other.to_string()),
        }
    }
}

/// Reduces an uploaded file name to a single safe path segment.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "document.pdf".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `{supplierCode}/v{version}/{category}/{filename}`
pub fn document_key(
    supplier_code: &str,
    version: u32,
    category: DocumentCategory,
    file_name: &str,
) -> String {
    format!(
        "{}/v{}/{}/{}",
        supplier_code,
        version,
        category,
        sanitize_file_name(file_name)
    )
}

pub fn package_key(supplier_code: &str, file_name: &str) -> String {
    format!("{}/package/{}", supplier_code, sanitize_file_name(file_name))
}

/// Byte storage for supplier documents, addressed by the keys above.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn write(&self, key: &str, bytes: Bytes) -> Result<(), StorageError>;
    async fn read(&self, key: &str) -> Result<Bytes, StorageError>;
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Documents on the local filesystem under a root directory.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !safe {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    async fn write(&self, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;
        debug!(path = %path.display(), "document written");
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    files: DashMap<String, Bytes>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.files.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn write(&self, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        self.files.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Bytes, StorageError> {
        self.files
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.files.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_version_scoped() {
        assert_eq!(
            document_key("SUP-1-ABCDEF", 2, DocumentCategory::TaxClearance, "tax.pdf"),
            "SUP-1-ABCDEF/v2/taxClearance/tax.pdf"
        );
        assert_eq!(
            package_key("SUP-1-ABCDEF", "approval.pdf"),
            "SUP-1-ABCDEF/package/approval.pdf"
        );
    }

    #[test]
    fn file_names_cannot_escape_their_folder() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\docs\\bank letter.pdf"), "bank_letter.pdf");
        assert_eq!(sanitize_file_name(".."), "document.pdf");
    }

    #[tokio::test]
    async fn filesystem_store_round_trips_and_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());
        let key = document_key("SUP-1-ABCDEF", 1, DocumentCategory::Nda, "nda.pdf");

        store.write(&key, Bytes::from_static(b"%PDF-1.4")).await.unwrap();
        assert_eq!(store.read(&key).await.unwrap(), Bytes::from_static(b"%PDF-1.4"));
        assert!(dir.path().join("SUP-1-ABCDEF/v1/nda/nda.pdf").exists());

        store.delete(&key).await.unwrap();
        assert!(matches!(store.read(&key).await, Err(StorageError::NotFound(_))));
        assert!(matches!(
            store.write("../outside.pdf", Bytes::new()).await,
            Err(StorageError::InvalidKey(_))
        ));
    }
}
