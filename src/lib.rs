//! Paperless SMTP: files email attachments into Paperless-ngx, tagged by
//! recipient address.

pub mod config;
pub mod error;
pub mod mail;
pub mod paperless;
pub mod pipeline;
pub mod smtp;
pub mod tags;

pub use error::{Error, Result};
