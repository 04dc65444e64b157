//! In-memory `DocumentStore` for unit tests. Records every call.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::BackendError;
use crate::paperless::store::DocumentStore;
use crate::paperless::types::{DocumentSubmission, Tag, TagId, TagMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListTags,
    CreateTag(String),
    CreateDocument(Option<String>),
}

#[derive(Default)]
pub struct MockStore {
    tags: Mutex<TagMap>,
    next_id: AtomicU64,
    calls: Mutex<Vec<Call>>,
    uploads: Mutex<Vec<DocumentSubmission>>,
    fail_list: AtomicBool,
    fail_create: Mutex<HashSet<String>>,
    fail_upload: Mutex<HashSet<String>>,
}

impl MockStore {
    pub fn with_tags(tags: &[(&str, u64)]) -> Self {
        let store = Self::default();
        let max = tags.iter().map(|(_, id)| *id).max().unwrap_or(0);
        store.next_id.store(max, Ordering::SeqCst);
        store
            .tags
            .lock()
            .unwrap()
            .extend(tags.iter().map(|(n, id)| (n.to_string(), TagId(*id))));
        store
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn fail_creating(&self, name: &str) {
        self.fail_create.lock().unwrap().insert(name.to_string());
    }

    pub fn fail_uploading(&self, file_name: &str) {
        self.fail_upload.lock().unwrap().insert(file_name.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub fn uploads(&self) -> Vec<DocumentSubmission> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn tag_id(&self, name: &str) -> Option<TagId> {
        self.tags.lock().unwrap().get(&name.to_lowercase()).copied()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn rejected(operation: &'static str) -> BackendError {
        BackendError::Status {
            operation,
            status: StatusCode::BAD_REQUEST,
            body: "rejected by mock".into(),
        }
    }
}

#[async_trait]
impl DocumentStore for MockStore {
    async fn list_tags(&self) -> Result<TagMap, BackendError> {
        self.record(Call::ListTags);
        tokio::task::yield_now().await;
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(BackendError::Status {
                operation: "list tags",
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: "boom".into(),
            });
        }
        Ok(self.tags.lock().unwrap().clone())
    }

    async fn create_tag(&self, name: &str) -> Result<Tag, BackendError> {
        self.record(Call::CreateTag(name.to_string()));
        tokio::task::yield_now().await;
        if self.fail_create.lock().unwrap().contains(name) {
            return Err(Self::rejected("create tag"));
        }
        // Slugs are lower-cased and must be unique, as in Paperless.
        let slug = name.to_lowercase();
        let mut tags = self.tags.lock().unwrap();
        if tags.contains_key(&slug) {
            return Err(Self::rejected("create tag"));
        }
        let id = TagId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        tags.insert(slug.clone(), id);
        Ok(Tag {
            id,
            slug,
            name: name.to_string(),
        })
    }

    async fn create_document(&self, submission: DocumentSubmission) -> Result<(), BackendError> {
        self.record(Call::CreateDocument(submission.file_name.clone()));
        tokio::task::yield_now().await;
        let failing = submission
            .file_name
            .as_ref()
            .is_some_and(|n| self.fail_upload.lock().unwrap().contains(n));
        if failing {
            return Err(Self::rejected("create document"));
        }
        self.uploads.lock().unwrap().push(submission);
        Ok(())
    }
}
