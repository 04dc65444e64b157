//! Minimal SMTP receiver feeding the message pipeline.

pub mod command;
pub mod server;
pub mod session;

pub use command::{Command, CommandError};
pub use server::{ShutdownHandle, SmtpServer, StopReason};
pub use session::{Session, SessionEnd};
