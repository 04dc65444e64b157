//! `DocumentStore` trait — the three backend operations the bridge needs.

use async_trait::async_trait;

use crate::error::BackendError;
use crate::paperless::types::{DocumentSubmission, Tag, TagMap};

/// Backend-agnostic document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the complete tag mapping.
    async fn list_tags(&self) -> Result<TagMap, BackendError>;

    /// Create a tag named `name`. Returns the created record.
    async fn create_tag(&self, name: &str) -> Result<Tag, BackendError>;

    /// Upload one document.
    async fn create_document(&self, submission: DocumentSubmission) -> Result<(), BackendError>;
}
