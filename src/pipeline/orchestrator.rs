//! Message orchestrator — the per-message entry point.
//!
//! 1. Parse the message and collect its attachments
//! 2. Derive requested tag names from the envelope recipients
//! 3. Resolve them through the shared [`TagCache`]
//! 4. Upload every attachment concurrently with the resolved tag ids
//!
//! Upload outcomes never change the SMTP reply; only a tag refresh
//! failure is propagated.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::mail::{Attachment, attachments, parse_message, recipient_tags};
use crate::pipeline::dispatcher::DocumentDispatcher;
use crate::pipeline::types::{ACCEPTED_REPLY, DispatchReport, Envelope, MessageHandler};
use crate::tags::TagCache;

pub struct MessageOrchestrator {
    email_domain: String,
    cache: Arc<TagCache>,
    dispatcher: DocumentDispatcher,
}

impl MessageOrchestrator {
    pub fn new(
        email_domain: impl Into<String>,
        cache: Arc<TagCache>,
        dispatcher: DocumentDispatcher,
    ) -> Self {
        Self {
            email_domain: email_domain.into(),
            cache,
            dispatcher,
        }
    }

    pub fn cache(&self) -> &Arc<TagCache> {
        &self.cache
    }

    /// Run one message through the pipeline.
    pub async fn process(&self, envelope: &Envelope) -> Result<DispatchReport, PipelineError> {
        let files: Vec<Attachment> = {
            let message = parse_message(&envelope.data).ok_or(PipelineError::Unparseable)?;
            attachments(&message).map(Attachment::from_part).collect()
        };

        info!(
            rcpt_to = ?envelope.rcpt_to,
            attachments = files.len(),
            "Message incoming"
        );

        if files.is_empty() {
            debug!("No attachments, nothing to file");
            return Ok(DispatchReport::default());
        }

        let names = recipient_tags(&envelope.rcpt_to, &self.email_domain);
        let tags = self.cache.resolve(&names).await?;
        let unresolved = self.cache.unresolved(&names).await;
        if !unresolved.is_empty() {
            warn!(
                ?unresolved,
                resolved = tags.len(),
                "Some tags could not be resolved; filing with the rest"
            );
        }

        let report = self.dispatcher.dispatch_all(files, &tags).await;
        info!(
            filed = report.filed.len(),
            failed = report.failed.len(),
            "Message processed"
        );
        Ok(report)
    }
}

#[async_trait]
impl MessageHandler for MessageOrchestrator {
    async fn handle_message(&self, envelope: &Envelope) -> Result<String, PipelineError> {
        let span = info_span!("message", id = %Uuid::new_v4(), from = %envelope.mail_from);
        self.process(envelope).instrument(span).await?;
        Ok(ACCEPTED_REPLY.to_string())
    }
}
