//! Integration tests for the SMTP front-end.
//!
//! A real server is bound on a random port with a recording handler, then
//! driven either line by line over a raw socket or through lettre.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use paperless_smtp::config::SmtpConfig;
use paperless_smtp::error::{BackendError, PipelineError, SmtpError, TagCacheError};
use paperless_smtp::pipeline::{ACCEPTED_REPLY, Envelope, MessageHandler};
use paperless_smtp::smtp::{ShutdownHandle, SmtpServer, StopReason};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Records every envelope. Bodies containing `X-Test: fatal` or
/// `X-Test: garbage` trigger the matching pipeline error.
#[derive(Default)]
struct Recorder {
    envelopes: Mutex<Vec<Envelope>>,
}

impl Recorder {
    fn envelopes(&self) -> Vec<Envelope> {
        self.envelopes.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageHandler for Recorder {
    async fn handle_message(&self, envelope: &Envelope) -> Result<String, PipelineError> {
        self.envelopes.lock().unwrap().push(envelope.clone());
        let body = String::from_utf8_lossy(&envelope.data);
        if body.contains("X-Test: fatal") {
            return Err(PipelineError::Fatal(TagCacheError::Refresh(
                BackendError::Decode("backend down".into()),
            )));
        }
        if body.contains("X-Test: garbage") {
            return Err(PipelineError::Unparseable);
        }
        Ok(ACCEPTED_REPLY.to_string())
    }
}

struct Harness {
    port: u16,
    recorder: Arc<Recorder>,
    shutdown: ShutdownHandle,
    server: JoinHandle<Result<StopReason, SmtpError>>,
}

async fn start_server(max_message_size: usize) -> Harness {
    let mut config = SmtpConfig::new("127.0.0.1", 0);
    config.hostname = "mx.test".into();
    config.max_message_size = max_message_size;

    let recorder = Arc::new(Recorder::default());
    let server = SmtpServer::new(config, recorder.clone());
    let listener = server.bind().await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let shutdown = server.shutdown_handle();
    let server = tokio::spawn(async move { server.serve(listener).await });

    Harness {
        port,
        recorder,
        shutdown,
        server,
    }
}

/// Line-oriented SMTP client for driving the server by hand.
struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(port: u16) -> Self {
        let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let (read, write) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer: write,
        }
    }

    /// Read one (possibly multi-line) reply. Returns the code and every
    /// line's text.
    async fn reply(&mut self) -> (u16, Vec<String>) {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line).await.unwrap();
            assert!(n > 0, "server closed connection mid-reply");
            let line = line.trim_end();
            let code: u16 = line[..3].parse().unwrap();
            lines.push(line[4..].to_string());
            if line.as_bytes()[3] == b' ' {
                return (code, lines);
            }
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .unwrap();
    }

    async fn command(&mut self, line: &str) -> u16 {
        self.send(line).await;
        self.reply().await.0
    }

    /// Connect, read the greeting and say EHLO.
    async fn ready(port: u16) -> Self {
        let mut client = Self::connect(port).await;
        assert_eq!(client.reply().await.0, 220);
        assert_eq!(client.command("EHLO client.test").await, 250);
        client
    }

    /// Run one full transaction and return the final reply code.
    async fn transaction(&mut self, rcpt: &str, body: &str) -> u16 {
        assert_eq!(self.command("MAIL FROM:<scanner@office.test>").await, 250);
        assert_eq!(self.command(&format!("RCPT TO:<{rcpt}>")).await, 250);
        assert_eq!(self.command("DATA").await, 354);
        for line in body.lines() {
            self.send(line).await;
        }
        self.command(".").await
    }
}

#[tokio::test]
async fn greeting_and_ehlo_advertise_limits() {
    timeout(TEST_TIMEOUT, async {
        let harness = start_server(1000).await;
        let mut client = Client::connect(harness.port).await;

        let (code, greeting) = client.reply().await;
        assert_eq!(code, 220);
        assert!(greeting[0].starts_with("mx.test"));

        client.send("EHLO client.test").await;
        let (code, lines) = client.reply().await;
        assert_eq!(code, 250);
        assert!(lines[0].contains("client.test"));
        assert!(lines.contains(&"8BITMIME".to_string()));
        assert!(lines.contains(&"SIZE 1000".to_string()));

        assert_eq!(client.command("NOOP").await, 250);
        assert_eq!(client.command("QUIT").await, 221);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn commands_out_of_order_are_refused() {
    timeout(TEST_TIMEOUT, async {
        let harness = start_server(1000).await;
        let mut client = Client::ready(harness.port).await;

        assert_eq!(client.command("RCPT TO:<a@docs.test>").await, 503);
        assert_eq!(client.command("DATA").await, 503);
        assert_eq!(client.command("MAIL FROM:<x@y.test>").await, 250);
        assert_eq!(client.command("MAIL FROM:<x@y.test>").await, 503);
        assert_eq!(client.command("DATA").await, 503);
        assert_eq!(client.command("RSET").await, 250);
        assert_eq!(client.command("MAIL nonsense").await, 501);
        assert_eq!(client.command("FROB").await, 500);
        assert_eq!(client.command("QUIT").await, 221);

        assert!(harness.recorder.envelopes().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn message_is_handed_over_with_envelope() {
    timeout(TEST_TIMEOUT, async {
        let harness = start_server(10_000).await;
        let mut client = Client::ready(harness.port).await;

        assert_eq!(client.command("MAIL FROM:<scanner@office.test>").await, 250);
        assert_eq!(client.command("RCPT TO:<taxes.2024@docs.test>").await, 250);
        assert_eq!(client.command("RCPT TO:<bank@docs.test>").await, 250);
        assert_eq!(client.command("DATA").await, 354);
        for line in ["Subject: hi", "", "..leading dot", "body"] {
            client.send(line).await;
        }
        client.send(".").await;
        let (code, lines) = client.reply().await;
        assert_eq!(code, 250);
        assert_eq!(lines, ["Message accepted for delivery"]);

        // A second transaction on the same connection.
        assert_eq!(client.transaction("inbox@docs.test", "Subject: two\n\nx").await, 250);
        assert_eq!(client.command("QUIT").await, 221);

        let envelopes = harness.recorder.envelopes();
        assert_eq!(envelopes.len(), 2);
        assert_eq!(envelopes[0].mail_from, "scanner@office.test");
        assert_eq!(envelopes[0].rcpt_to, ["taxes.2024@docs.test", "bank@docs.test"]);
        assert_eq!(
            envelopes[0].data,
            b"Subject: hi\r\n\r\n.leading dot\r\nbody\r\n"
        );
        assert_eq!(envelopes[1].rcpt_to, ["inbox@docs.test"]);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn oversized_messages_are_rejected() {
    timeout(TEST_TIMEOUT, async {
        let harness = start_server(64).await;
        let mut client = Client::ready(harness.port).await;

        // Declared size over the limit.
        assert_eq!(client.command("MAIL FROM:<a@b.test> SIZE=65").await, 552);

        // Actual size over the limit.
        let body = format!("Subject: big\n\n{}", "x".repeat(100));
        assert_eq!(client.transaction("a@docs.test", &body).await, 552);

        // The session is still usable afterwards.
        assert_eq!(client.transaction("a@docs.test", "Subject: s\n\nok").await, 250);
        assert_eq!(harness.recorder.envelopes().len(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unparseable_message_gets_554_and_intake_continues() {
    timeout(TEST_TIMEOUT, async {
        let harness = start_server(10_000).await;
        let mut client = Client::ready(harness.port).await;

        assert_eq!(client.transaction("a@docs.test", "X-Test: garbage").await, 554);
        assert_eq!(client.transaction("a@docs.test", "Subject: fine\n\nok").await, 250);
        assert_eq!(client.command("QUIT").await, 221);

        assert!(harness.shutdown.reason().is_none());
        harness.shutdown.stop(StopReason::Requested);
        let reason = harness.server.await.unwrap().unwrap();
        assert_eq!(reason, StopReason::Requested);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn fatal_handler_error_stops_the_server() {
    timeout(TEST_TIMEOUT, async {
        let harness = start_server(10_000).await;
        let mut client = Client::ready(harness.port).await;

        assert_eq!(client.transaction("a@docs.test", "X-Test: fatal").await, 421);

        let reason = harness.server.await.unwrap().unwrap();
        assert_eq!(reason, StopReason::IntakeFailure);

        // Later stop requests do not overwrite the first reason.
        harness.shutdown.stop(StopReason::Requested);
        assert_eq!(harness.shutdown.reason(), Some(StopReason::IntakeFailure));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn standard_client_can_deliver() {
    use lettre::{Message, SmtpTransport, Transport};

    timeout(TEST_TIMEOUT, async {
        let harness = start_server(10_000).await;
        let port = harness.port;

        let email = Message::builder()
            .from("Scanner <scanner@office.test>".parse().unwrap())
            .to("reports.q3@docs.test".parse().unwrap())
            .subject("Scan")
            .body(String::from("Scanned document attached."))
            .unwrap();

        let response = tokio::task::spawn_blocking(move || {
            let mailer = SmtpTransport::builder_dangerous("127.0.0.1")
                .port(port)
                .build();
            mailer.send(&email)
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(response.code().to_string(), "250");

        let envelopes = harness.recorder.envelopes();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].mail_from, "scanner@office.test");
        assert_eq!(envelopes[0].rcpt_to, ["reports.q3@docs.test"]);
        let data = String::from_utf8_lossy(&envelopes[0].data);
        assert!(data.contains("Subject: Scan"));
    })
    .await
    .expect("test timed out");
}
