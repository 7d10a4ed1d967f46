//! Document storage for approval proofs and signed agreements

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use uuid::Uuid;

/// A stored document: an opaque reference plus a retrievable URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub reference: String,
    pub url: String,
}

/// Storage capability for uploaded documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn save(&self, suggested_name: &str, bytes: &[u8]) -> Result<StoredDocument>;
}

/// Stores documents on the local filesystem, served under `/uploads`
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    pub async fn new(base_path: impl Into<PathBuf>, base_url: impl Into<String>) -> Result<Self> {
        let base_path = base_path.into();
        tokio::fs::create_dir_all(&base_path)
            .await
            .with_context(|| format!("Failed to create storage directory {}", base_path.display()))?;

        Ok(Self {
            base_path,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Public URL for a stored reference
    pub fn url_for(&self, reference: &str) -> String {
        format!("{}/uploads/{}", self.base_url, reference)
    }
}

/// Keep only a short alphanumeric extension from the client-supplied name
fn safe_extension(suggested_name: &str) -> Option<String> {
    Path::new(suggested_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 10)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
}

#[async_trait]
impl DocumentStore for LocalStorage {
    async fn save(&self, suggested_name: &str, bytes: &[u8]) -> Result<StoredDocument> {
        let reference = match safe_extension(suggested_name) {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };

        let full_path = self.base_path.join(&reference);
        tokio::fs::write(&full_path, bytes)
            .await
            .with_context(|| format!("Failed to write file {}", full_path.display()))?;

        tracing::debug!(reference = %reference, size = bytes.len(), "Document stored");

        Ok(StoredDocument {
            url: self.url_for(&reference),
            reference,
        })
    }
}
