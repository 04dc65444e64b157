//! TCP accept loop. One task per connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span};

use crate::config::SmtpConfig;
use crate::error::SmtpError;
use crate::pipeline::MessageHandler;
use crate::smtp::session::{Session, SessionEnd};

/// Why the server stopped accepting connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown was requested (signal, test harness).
    Requested,
    /// A message handler hit a fatal error.
    IntakeFailure,
}

/// Cloneable trigger that stops the accept loop. First reason wins.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<Option<StopReason>>>,
}

impl ShutdownHandle {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn stop(&self, reason: StopReason) {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    pub fn reason(&self) -> Option<StopReason> {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<Option<StopReason>> {
        self.tx.subscribe()
    }
}

pub struct SmtpServer {
    config: Arc<SmtpConfig>,
    handler: Arc<dyn MessageHandler>,
    shutdown: ShutdownHandle,
}

impl SmtpServer {
    pub fn new(config: SmtpConfig, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            config: Arc::new(config),
            handler,
            shutdown: ShutdownHandle::new(),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Bind the configured host and port.
    pub async fn bind(&self) -> Result<TcpListener, SmtpError> {
        Ok(TcpListener::bind(self.config.bind_addr()).await?)
    }

    /// Accept connections until shutdown is triggered.
    pub async fn serve(&self, listener: TcpListener) -> Result<StopReason, SmtpError> {
        let mut stop = self.shutdown.subscribe();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((socket, peer)) => self.spawn_session(socket, peer),
                        Err(e) => error!("Failed to accept connection: {e}"),
                    }
                }
                _ = stop.wait_for(Option::is_some) => break,
            }
        }

        let reason = self.shutdown.reason().unwrap_or(StopReason::Requested);
        info!(?reason, "SMTP server stopped accepting connections");
        Ok(reason)
    }

    fn spawn_session(&self, socket: tokio::net::TcpStream, peer: SocketAddr) {
        let config = Arc::clone(&self.config);
        let handler = Arc::clone(&self.handler);
        let shutdown = self.shutdown.clone();
        let span = info_span!("smtp", %peer);

        tokio::spawn(
            async move {
                debug!("Connection accepted");
                match Session::new(socket, config, handler).run().await {
                    Ok(SessionEnd::Fatal) => shutdown.stop(StopReason::IntakeFailure),
                    Ok(end) => debug!(?end, "Session finished"),
                    Err(e) => error!("Session failed: {e}"),
                }
            }
            .instrument(span),
        );
    }
}
