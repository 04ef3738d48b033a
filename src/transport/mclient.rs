//! Transport that drives the `mclient` command-line client.
//!
//! Each statement runs as one `mclient -s <sql>` process. Credentials travel
//! through a private `DOTMONETDBFILE` that lives as long as the session, so
//! the password never appears on a command line. Bulk copies read
//! `FROM STDIN`: the file is decoded and piped into the client's stdin.

use std::{
    io::{self, Write},
    path::Path,
    process::{Command, Stdio},
    thread,
};

use encoding_rs::Encoding;
use log::debug;
use tempfile::NamedTempFile;

use super::{BulkCopy, Connector, RowSource, Transport};
use crate::{config::ConnectionSettings, error::LoadError, io_utils};

const PROBE_STATEMENT: &str = "SELECT 1;";

#[derive(Debug, Clone, Copy, Default)]
pub struct MclientConnector;

impl Connector for MclientConnector {
    fn connect(&self, settings: &ConnectionSettings) -> Result<Box<dyn Transport>, LoadError> {
        let mut session = MclientSession::new(settings)?;
        session
            .run(PROBE_STATEMENT, None)
            .map_err(|err| match err {
                LoadError::Statement { message, .. } => LoadError::Connection {
                    target: settings.target(),
                    message,
                },
                other => other,
            })?;
        debug!("{} reached {}", settings.driver, settings.target());
        Ok(Box::new(session))
    }
}

pub struct MclientSession {
    program: String,
    host: String,
    port: u16,
    database: String,
    target: String,
    credentials: NamedTempFile,
}

impl MclientSession {
    pub fn new(settings: &ConnectionSettings) -> Result<Self, LoadError> {
        let credentials = write_credentials(settings).map_err(|err| LoadError::Connection {
            target: settings.target(),
            message: format!("writing the client credentials file failed: {err}"),
        })?;
        Ok(Self {
            program: settings.driver.clone(),
            host: settings.host.clone(),
            port: settings.port,
            database: settings.database.clone(),
            target: settings.target(),
            credentials,
        })
    }

    fn command(&self, sql: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .env("DOTMONETDBFILE", self.credentials.path())
            .arg("-h")
            .arg(&self.host)
            .arg("-p")
            .arg(self.port.to_string())
            .arg("-d")
            .arg(&self.database)
            .arg("-s")
            .arg(sql);
        command
    }

    /// Runs `sql`; with `input`, the decoded file is piped to stdin after it.
    fn run(
        &mut self,
        sql: &str,
        input: Option<(&Path, &'static Encoding)>,
    ) -> Result<(), LoadError> {
        let mut command = self.command(sql);
        if input.is_some() {
            command.arg("-").stdin(Stdio::piped());
        } else {
            command.stdin(Stdio::null());
        }
        command.stdout(Stdio::piped()).stderr(Stdio::piped());

        let reader = match input {
            Some((path, encoding)) => Some(
                io_utils::open_decoded_reader(path, encoding)
                    .map_err(|err| LoadError::io(path, err))?,
            ),
            None => None,
        };
        let mut child = command.spawn().map_err(|err| LoadError::Connection {
            target: self.target.clone(),
            message: format!("failed to start '{}': {err}", self.program),
        })?;

        let feeder = match (reader, child.stdin.take()) {
            (Some(mut reader), Some(mut stdin)) => Some(thread::spawn(move || {
                let copied = io::copy(&mut reader, &mut stdin)?;
                stdin.flush()?;
                Ok::<u64, io::Error>(copied)
            })),
            _ => None,
        };
        let output = child
            .wait_with_output()
            .map_err(|err| LoadError::statement(sql, err.to_string()))?;
        let fed = match feeder {
            Some(handle) => Some(handle.join().map_err(|_| {
                LoadError::statement(sql, "the thread feeding the client's stdin panicked")
            })?),
            None => None,
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if !output.status.success() || !stderr.is_empty() {
            let message = if stderr.is_empty() {
                format!("'{}' exited with status {}", self.program, output.status)
            } else {
                stderr.to_string()
            };
            return Err(LoadError::statement(sql, message));
        }
        if let Some(fed) = fed {
            let bytes = fed.map_err(|err| {
                LoadError::statement(sql, format!("streaming rows failed: {err}"))
            })?;
            debug!("Streamed {bytes} byte(s) to '{}'", self.program);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("{}: {}", self.program, stdout.trim());
        }
        Ok(())
    }
}

impl Transport for MclientSession {
    fn execute(&mut self, sql: &str) -> Result<(), LoadError> {
        self.run(sql, None)
    }

    fn bulk_copy(&mut self, copy: &BulkCopy<'_>) -> Result<Option<u64>, LoadError> {
        match copy.rows {
            RowSource::File { path, encoding } => self.run(copy.statement, Some((path, encoding)))?,
            RowSource::ServerSide => self.run(copy.statement, None)?,
        }
        // The client reports affected rows only as free text.
        Ok(None)
    }
}

fn write_credentials(settings: &ConnectionSettings) -> io::Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "user={}", settings.user)?;
    writeln!(file, "password={}", settings.password)?;
    file.flush()?;
    Ok(file)
}
