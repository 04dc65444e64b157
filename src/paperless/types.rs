//! Paperless-ngx wire types.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mail::Attachment;

/// Backend-assigned tag identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(pub u64);

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A tag record as returned by `GET /api/tags/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub slug: String,
    #[serde(default)]
    pub name: String,
}

/// One page of `GET /api/tags/`.
#[derive(Debug, Clone, Deserialize)]
pub struct TagPage {
    pub results: Vec<Tag>,
    #[serde(default)]
    pub next: Option<String>,
}

/// Complete name → identifier mapping, keyed by slug.
pub type TagMap = HashMap<String, TagId>;

/// Body of `POST /api/tags/`.
#[derive(Debug, Clone, Serialize)]
pub struct NewTag<'a> {
    pub name: &'a str,
    pub slug: &'a str,
    /// 0 = no automatic matching for bridge-created tags.
    pub matching_algorithm: u8,
}

impl<'a> NewTag<'a> {
    pub fn new(name: &'a str) -> Self {
        Self {
            name,
            slug: name,
            matching_algorithm: 0,
        }
    }
}

/// One document upload: a single attachment plus its resolved tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSubmission {
    pub file_name: Option<String>,
    pub media_type: String,
    pub content: Vec<u8>,
    pub tags: BTreeSet<TagId>,
}

impl DocumentSubmission {
    pub fn new(attachment: Attachment, tags: BTreeSet<TagId>) -> Self {
        Self {
            file_name: attachment.file_name,
            media_type: attachment.media_type,
            content: attachment.content,
            tags,
        }
    }

    /// Name for log lines.
    pub fn display_name(&self) -> &str {
        self.file_name.as_deref().unwrap_or("(unnamed)")
    }
}
