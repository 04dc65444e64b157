//! Inbound mail handling: MIME parsing, attachments, recipient tags.

pub mod attachments;
pub mod recipients;

pub use attachments::{Attachment, Attachments, attachments};
pub use recipients::{TagNames, recipient_tags};

use mail_parser::{Message, MessageParser};

/// Parse raw RFC 5322 bytes. Returns `None` when nothing parseable was found.
pub fn parse_message(raw: &[u8]) -> Option<Message<'_>> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    MessageParser::default().parse(raw)
}
