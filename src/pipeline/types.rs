//! Shared types for the message pipeline.

use async_trait::async_trait;

use crate::error::PipelineError;

/// Reply line for a message that reached the pipeline and parsed.
pub const ACCEPTED_REPLY: &str = "250 Message accepted for delivery";

/// A completed mail transaction, as handed over by the SMTP front-end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Reverse path, without angle brackets. Empty for the null sender.
    pub mail_from: String,
    /// Forward paths, without angle brackets, in RCPT order.
    pub rcpt_to: Vec<String>,
    /// Message bytes after dot-unstuffing.
    pub data: Vec<u8>,
}

/// Callback invoked once per completed message.
///
/// `Ok` carries the full SMTP reply line to send back. An `Err` that
/// [`is_fatal`](PipelineError::is_fatal) stops the server.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_message(&self, envelope: &Envelope) -> Result<String, PipelineError>;
}

/// Per-message upload outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Display names of attachments the backend accepted.
    pub filed: Vec<String>,
    /// Display names of attachments whose upload failed.
    pub failed: Vec<String>,
}
