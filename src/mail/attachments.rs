//! Attachment extraction from parsed MIME messages.

use mail_parser::{Message, MessagePart, MimeHeaders, PartType};

/// Media type assumed when a part has no Content-Type header (RFC 2045 §5.2).
pub const DEFAULT_MEDIA_TYPE: &str = "text/plain";

/// A file carried by an inbound message, decoded and owned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Declared file name, if the part carried one.
    pub file_name: Option<String>,
    /// `type/subtype`, lower-cased.
    pub media_type: String,
    /// Transfer-decoded content.
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn from_part(part: &MessagePart<'_>) -> Self {
        Self {
            file_name: part.attachment_name().map(str::to_string),
            media_type: media_type(part),
            content: part.contents().to_vec(),
        }
    }
}

/// Whether a part is explicitly marked for delivery as a file.
pub fn is_attachment(part: &MessagePart<'_>) -> bool {
    if matches!(part.body, PartType::Multipart(_)) {
        return false;
    }
    part.content_disposition()
        .is_some_and(|d| d.ctype().eq_ignore_ascii_case("attachment"))
}

fn media_type(part: &MessagePart<'_>) -> String {
    let Some(ct) = part.content_type() else {
        return DEFAULT_MEDIA_TYPE.to_string();
    };
    match ct.subtype() {
        Some(sub) => format!("{}/{}", ct.ctype(), sub).to_ascii_lowercase(),
        None => ct.ctype().to_ascii_lowercase(),
    }
}

/// Lazy depth-first walk over the attachment parts of a message.
///
/// Nested `message/rfc822` parts are descended into after the enclosing
/// part itself has been considered. Call [`attachments`] again to restart.
#[derive(Debug, Clone)]
pub struct Attachments<'a, 'x> {
    stack: Vec<(&'a Message<'x>, usize)>,
}

/// Iterate the attachment-marked parts of `message` in document order.
pub fn attachments<'a, 'x>(message: &'a Message<'x>) -> Attachments<'a, 'x> {
    Attachments {
        stack: vec![(message, 0)],
    }
}

impl<'a, 'x> Iterator for Attachments<'a, 'x> {
    type Item = &'a MessagePart<'x>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (message, idx) = self.stack.last_mut()?;
            let message: &'a Message<'x> = *message;
            let Some(part) = message.parts.get(*idx) else {
                self.stack.pop();
                continue;
            };
            *idx += 1;

            if let PartType::Message(inner) = &part.body {
                self.stack.push((inner, 0));
            }

            if is_attachment(part) {
                return Some(part);
            }
        }
    }
}
