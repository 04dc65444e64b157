//! Document-store backend (Paperless-ngx).

pub mod client;
pub mod store;
pub mod types;

pub use client::PaperlessClient;
pub use store::DocumentStore;
pub use types::{DocumentSubmission, Tag, TagId, TagMap};

#[cfg(test)]
pub(crate) mod mock;
