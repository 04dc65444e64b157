//! SMTP command line parsing.

use std::sync::LazyLock;

use regex::Regex;

static MAIL_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^FROM:\s*(?:<([^>]*)>|(\S+))(?:\s+(.*))?$").expect("valid MAIL regex")
});

static RCPT_TO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^TO:\s*(?:<([^>]*)>|(\S+))(?:\s+(.*))?$").expect("valid RCPT regex")
});

static SIZE_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|\s)SIZE=(\d+)").expect("valid SIZE regex"));

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Helo(String),
    Ehlo(String),
    Mail {
        from: String,
        /// Declared message size from the `SIZE=` parameter.
        size: Option<usize>,
    },
    Rcpt(String),
    Data,
    Rset,
    Noop,
    Vrfy,
    Quit,
    Unknown(String),
}

/// Syntax errors, answered with 501.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("{0} requires a domain")]
    MissingDomain(&'static str),

    #[error("Expected MAIL FROM:<address>")]
    BadMailFrom,

    #[error("Expected RCPT TO:<address>")]
    BadRcptTo,

    #[error("Empty recipient")]
    EmptyRecipient,

    #[error("{0} takes no arguments")]
    UnexpectedArgument(&'static str),
}

impl Command {
    /// Parse one command line (without the trailing CRLF).
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb.to_ascii_uppercase().as_str() {
            "HELO" => domain_arg("HELO", rest).map(Self::Helo),
            "EHLO" => domain_arg("EHLO", rest).map(Self::Ehlo),
            "MAIL" => {
                let caps = MAIL_FROM.captures(rest).ok_or(CommandError::BadMailFrom)?;
                let from = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
                let size = caps
                    .get(3)
                    .and_then(|p| SIZE_PARAM.captures(p.as_str()))
                    .and_then(|c| c[1].parse().ok());
                Ok(Self::Mail {
                    from: strip_source_route(from).to_string(),
                    size,
                })
            }
            "RCPT" => {
                let caps = RCPT_TO.captures(rest).ok_or(CommandError::BadRcptTo)?;
                let to = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
                let to = strip_source_route(to);
                if to.is_empty() {
                    return Err(CommandError::EmptyRecipient);
                }
                Ok(Self::Rcpt(to.to_string()))
            }
            "DATA" => no_args("DATA", rest, Self::Data),
            "RSET" => no_args("RSET", rest, Self::Rset),
            "QUIT" => no_args("QUIT", rest, Self::Quit),
            "NOOP" => Ok(Self::Noop),
            "VRFY" => Ok(Self::Vrfy),
            _ => Ok(Self::Unknown(verb.to_string())),
        }
    }
}

fn domain_arg(verb: &'static str, rest: &str) -> Result<String, CommandError> {
    match rest.split_whitespace().next() {
        Some(domain) => Ok(domain.to_string()),
        None => Err(CommandError::MissingDomain(verb)),
    }
}

fn no_args(verb: &'static str, rest: &str, cmd: Command) -> Result<Command, CommandError> {
    if rest.is_empty() {
        Ok(cmd)
    } else {
        Err(CommandError::UnexpectedArgument(verb))
    }
}

/// `<@relay1,@relay2:user@example.com>` → `user@example.com` (RFC 5321 §C).
fn strip_source_route(path: &str) -> &str {
    if path.starts_with('@')
        && let Some((_, mailbox)) = path.split_once(':')
    {
        return mailbox;
    }
    path
}
