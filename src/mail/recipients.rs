//! Recipient addresses as a tagging DSL.
//!
//! `reports.2024@docs.example.com` requests the tags `reports` and `2024`.
//! Recipients outside the accepted domain are ignored with a warning.

use std::collections::BTreeSet;

use tracing::warn;

/// Set of requested tag names, duplicates collapsed.
pub type TagNames = BTreeSet<String>;

/// Local part of `address` if it belongs to `domain` (ASCII case-insensitive).
pub fn local_part<'a>(address: &'a str, domain: &str) -> Option<&'a str> {
    let split = address.len().checked_sub(domain.len() + 1)?;
    let (local, suffix) = (address.get(..split)?, address.get(split..)?);
    let suffix_domain = suffix.strip_prefix('@')?;
    suffix_domain.eq_ignore_ascii_case(domain).then_some(local)
}

/// Tag names requested by one local part.
pub fn local_part_tags(local: &str) -> impl Iterator<Item = &str> {
    local.split('.').filter(|t| !t.is_empty())
}

/// Union of the tags requested by every recipient in `domain`.
pub fn recipient_tags<I, S>(recipients: I, domain: &str) -> TagNames
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tags = TagNames::new();
    for rcpt in recipients {
        let rcpt = rcpt.as_ref();
        let Some(local) = local_part(rcpt, domain) else {
            warn!(recipient = %rcpt, "Email domain mismatch, ignored");
            continue;
        };
        tags.extend(local_part_tags(local).map(str::to_string));
    }
    tags
}
