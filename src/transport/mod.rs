//! The narrow contract the loaders drive a server through.
//!
//! A [`Connector`] opens a [`Transport`]; the transport executes single SQL
//! statements and runs one bulk copy. How statements reach the server is
//! the transport's business.

use std::path::Path;

use encoding_rs::Encoding;

use crate::{config::ConnectionSettings, error::LoadError};

pub mod mapi;
pub mod mclient;

pub use mapi::MapiConnector;
pub use mclient::MclientConnector;

/// Where a bulk copy's rows come from.
#[derive(Debug, Clone, Copy)]
pub enum RowSource<'a> {
    /// The COPY statement names a file the server reads itself.
    ServerSide,
    /// The transport streams this file, decoded to UTF-8, after the statement.
    File {
        path: &'a Path,
        encoding: &'static Encoding,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct BulkCopy<'a> {
    pub table: &'a str,
    /// COPY INTO text already encoding separator, quote, and NULL token.
    pub statement: &'a str,
    pub rows: RowSource<'a>,
}

pub trait Transport {
    /// Executes one independently committed statement.
    fn execute(&mut self, sql: &str) -> Result<(), LoadError>;

    /// Runs the bulk copy. Returns the number of rows the server rejected,
    /// or `None` when the transport cannot observe rejections.
    fn bulk_copy(&mut self, copy: &BulkCopy<'_>) -> Result<Option<u64>, LoadError>;
}

pub trait Connector {
    fn connect(&self, settings: &ConnectionSettings) -> Result<Box<dyn Transport>, LoadError>;
}
