//! Message pipeline.
//!
//! Every completed SMTP transaction flows through:
//! 1. `MessageOrchestrator`: parse, extract attachments, derive tags
//! 2. `TagCache::resolve()`: name → id, creating unknown tags
//! 3. `DocumentDispatcher`: concurrent uploads, failures logged per file

pub mod dispatcher;
pub mod orchestrator;
pub mod types;

pub use dispatcher::{DispatchOutcome, DocumentDispatcher};
pub use orchestrator::MessageOrchestrator;
pub use types::{ACCEPTED_REPLY, DispatchReport, Envelope, MessageHandler};
