//! Per-connection SMTP state machine.
//!
//! Accepts one or more mail transactions and hands each completed message
//! to the configured [`MessageHandler`].

use std::sync::Arc;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
    ReadHalf, WriteHalf,
};
use tracing::{debug, error, warn};

use crate::config::SmtpConfig;
use crate::error::SmtpError;
use crate::pipeline::{Envelope, MessageHandler};
use crate::smtp::command::Command;

/// Longest accepted command line, CRLF included.
pub const MAX_COMMAND_LINE: usize = 4096;

/// Longest accepted line inside DATA.
pub const MAX_DATA_LINE: usize = 1024 * 1024;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client sent QUIT.
    Quit,
    /// Client hung up.
    Closed,
    /// The handler reported a fatal error; intake must stop.
    Fatal,
}

#[derive(Debug, Default)]
struct Transaction {
    mail_from: String,
    rcpt_to: Vec<String>,
}

pub struct Session<T> {
    reader: BufReader<ReadHalf<T>>,
    writer: BufWriter<WriteHalf<T>>,
    config: Arc<SmtpConfig>,
    handler: Arc<dyn MessageHandler>,
    said_hello: Option<String>,
    transaction: Option<Transaction>,
}

impl<T: AsyncRead + AsyncWrite + Send> Session<T> {
    pub fn new(socket: T, config: Arc<SmtpConfig>, handler: Arc<dyn MessageHandler>) -> Self {
        let (reader, writer) = tokio::io::split(socket);
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            config,
            handler,
            said_hello: None,
            transaction: None,
        }
    }

    /// Drive the session to completion.
    pub async fn run(mut self) -> Result<SessionEnd, SmtpError> {
        let greeting = format!("{} ESMTP paperless-smtp", self.config.hostname);
        self.write_response(220, &greeting).await?;

        match self.process().await {
            Ok(end) => Ok(end),
            Err(SmtpError::LineTooLong { max }) => {
                warn!(max, "Client line too long, closing");
                self.write_response(500, "5.5.2 Line too long").await.ok();
                Ok(SessionEnd::Closed)
            }
            Err(SmtpError::ConnectionClosed) => Ok(SessionEnd::Closed),
            Err(e) => Err(e),
        }
    }

    async fn process(&mut self) -> Result<SessionEnd, SmtpError> {
        loop {
            let Some(raw) = self.read_line(MAX_COMMAND_LINE).await? else {
                debug!("Client closed connection");
                return Ok(SessionEnd::Closed);
            };
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\r', '\n']);

            let command = match Command::parse(line) {
                Ok(cmd) => cmd,
                Err(e) => {
                    self.write_response(501, &format!("5.5.4 {e}")).await?;
                    continue;
                }
            };

            match command {
                Command::Quit => {
                    self.write_response(221, "2.0.0 Bye").await?;
                    return Ok(SessionEnd::Quit);
                }
                Command::Ehlo(domain) => {
                    let reply = format!(
                        "{} Hello {domain}\n8BITMIME\nSIZE {}",
                        self.config.hostname, self.config.max_message_size
                    );
                    self.write_response(250, &reply).await?;
                    self.said_hello = Some(domain);
                    self.transaction = None;
                }
                Command::Helo(domain) => {
                    let reply = format!("{} Hello {domain}", self.config.hostname);
                    self.write_response(250, &reply).await?;
                    self.said_hello = Some(domain);
                    self.transaction = None;
                }
                Command::Mail { from, size } => {
                    if self.transaction.is_some() {
                        self.write_response(503, "5.5.1 MAIL already issued; RSET first")
                            .await?;
                        continue;
                    }
                    if size.is_some_and(|s| s > self.config.max_message_size) {
                        self.write_response(552, "5.3.4 Message size exceeds fixed limit")
                            .await?;
                        continue;
                    }
                    debug!(from = %from, hello = ?self.said_hello, "MAIL FROM");
                    self.transaction = Some(Transaction {
                        mail_from: from,
                        rcpt_to: Vec::new(),
                    });
                    self.write_response(250, "2.1.0 OK").await?;
                }
                Command::Rcpt(to) => {
                    let Some(transaction) = self.transaction.as_mut() else {
                        self.write_response(503, "5.5.1 MAIL FROM must be issued first")
                            .await?;
                        continue;
                    };
                    transaction.rcpt_to.push(to);
                    self.write_response(250, "2.1.5 OK").await?;
                }
                Command::Data => {
                    let ready = self
                        .transaction
                        .as_ref()
                        .is_some_and(|t| !t.rcpt_to.is_empty());
                    if !ready {
                        self.write_response(503, "5.5.1 RCPT TO must be issued first")
                            .await?;
                        continue;
                    }
                    if let Some(end) = self.receive_data().await? {
                        return Ok(end);
                    }
                }
                Command::Rset => {
                    self.transaction = None;
                    self.write_response(250, "2.0.0 OK").await?;
                }
                Command::Noop => self.write_response(250, "2.0.0 OK").await?,
                Command::Vrfy => {
                    self.write_response(252, "2.5.0 Cannot VRFY user").await?;
                }
                Command::Unknown(verb) => {
                    debug!(verb = %verb, "Unrecognized command");
                    self.write_response(500, "5.5.2 Command not recognized").await?;
                }
            }
        }
    }

    /// Read the DATA payload and pass it to the handler. Returns
    /// `Some(end)` when the session must stop.
    async fn receive_data(&mut self) -> Result<Option<SessionEnd>, SmtpError> {
        self.write_response(354, "End data with <CR><LF>.<CR><LF>").await?;

        let max = self.config.max_message_size;
        let mut data = Vec::new();
        let mut too_large = false;

        loop {
            let Some(line) = self.read_line(MAX_DATA_LINE).await? else {
                return Err(SmtpError::ConnectionClosed);
            };
            if line == b".\r\n" || line == b".\n" {
                break;
            }
            let line = line.strip_prefix(b".").unwrap_or(&line);
            if too_large {
                continue;
            }
            if data.len() + line.len() > max {
                too_large = true;
                data = Vec::new();
                continue;
            }
            data.extend_from_slice(line);
        }

        let Some(transaction) = self.transaction.take() else {
            return Ok(None);
        };

        if too_large {
            warn!(max, "Message exceeds size limit, rejected");
            self.write_response(552, "5.3.4 Message exceeds fixed maximum message size")
                .await?;
            return Ok(None);
        }

        let envelope = Envelope {
            mail_from: transaction.mail_from,
            rcpt_to: transaction.rcpt_to,
            data,
        };

        match self.handler.handle_message(&envelope).await {
            Ok(reply) => {
                self.write_line(&reply).await?;
                Ok(None)
            }
            Err(e) if e.is_fatal() => {
                error!("Stopping mail intake: {e}");
                self.write_response(421, "4.3.0 Service not available, shutting down")
                    .await
                    .ok();
                Ok(Some(SessionEnd::Fatal))
            }
            Err(e) => {
                warn!("Rejecting message: {e}");
                self.write_response(554, "5.6.0 Message could not be parsed").await?;
                Ok(None)
            }
        }
    }

    /// Read one line, CRLF included. `None` on EOF.
    async fn read_line(&mut self, max: usize) -> Result<Option<Vec<u8>>, SmtpError> {
        let mut buf = Vec::new();
        let limit = u64::try_from(max).unwrap_or(u64::MAX);
        let n = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut buf)
            .await?;
        if n == 0 {
            return Ok(None);
        }
        if !buf.ends_with(b"\n") {
            if buf.len() >= max {
                return Err(SmtpError::LineTooLong { max });
            }
            return Err(SmtpError::ConnectionClosed);
        }
        Ok(Some(buf))
    }

    /// Write a possibly multi-line reply with `status` on every line.
    async fn write_response(&mut self, status: u16, message: &str) -> Result<(), SmtpError> {
        let mut lines = message.lines().peekable();
        while let Some(line) = lines.next() {
            let sep = if lines.peek().is_none() { ' ' } else { '-' };
            self.writer
                .write_all(format!("{status}{sep}{line}\r\n").as_bytes())
                .await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    /// Write a complete reply line as given by the handler.
    async fn write_line(&mut self, line: &str) -> Result<(), SmtpError> {
        self.writer.write_all(line.trim_end().as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}
