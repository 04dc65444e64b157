//! Document dispatcher — one upload per attachment, failures isolated.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info};

use crate::mail::Attachment;
use crate::paperless::{DocumentStore, DocumentSubmission};
use crate::pipeline::types::DispatchReport;
use crate::tags::TagIds;

/// Result of a single upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Filed(String),
    Failed(String),
}

pub struct DocumentDispatcher {
    store: Arc<dyn DocumentStore>,
}

impl DocumentDispatcher {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Upload one attachment. Never fails; errors are logged and reported.
    pub async fn dispatch(&self, attachment: Attachment, tags: &TagIds) -> DispatchOutcome {
        let submission = DocumentSubmission::new(attachment, tags.clone());
        let name = submission.display_name().to_string();
        let tag_list: Vec<String> = tags.iter().map(ToString::to_string).collect();

        info!(
            file = %name,
            tags = %tag_list.join(","),
            "Sending file to Paperless-ngx for processing"
        );

        match self.store.create_document(submission).await {
            Ok(()) => {
                info!(file = %name, "Document submitted");
                DispatchOutcome::Filed(name)
            }
            Err(e) => {
                error!(
                    file = %name,
                    status = ?e.status(),
                    "Something went wrong attempting to send document to Paperless-ngx: {e}"
                );
                DispatchOutcome::Failed(name)
            }
        }
    }

    /// Upload every attachment concurrently with the same tag set.
    pub async fn dispatch_all(&self, attachments: Vec<Attachment>, tags: &TagIds) -> DispatchReport {
        let outcomes = join_all(attachments.into_iter().map(|a| self.dispatch(a, tags))).await;

        let mut report = DispatchReport::default();
        for outcome in outcomes {
            match outcome {
                DispatchOutcome::Filed(name) => report.filed.push(name),
                DispatchOutcome::Failed(name) => report.failed.push(name),
            }
        }
        report
    }
}
