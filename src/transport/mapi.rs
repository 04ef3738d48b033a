//! In-process MonetDB client speaking MAPI over TCP.
//!
//! Messages travel in blocks of at most 8190 bytes, each prefixed by a
//! little-endian `u16` holding `length << 1 | last`. Logging in answers the
//! server's salted challenge; merovingian may proxy (new challenge on the
//! same socket) or redirect (reconnect elsewhere). Every statement runs in
//! the server's default auto-commit mode.

use std::{
    io::{self, Read, Write},
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use log::debug;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use super::{BulkCopy, Connector, RowSource, Transport};
use crate::{config::ConnectionSettings, error::LoadError, io_utils};

const MAX_BLOCK_SIZE: usize = 8190;
const MAX_REDIRECTS: usize = 10;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const PROTOCOL_VERSION: &str = "9";
const SUPPORTED_HASHES: &[&str] = &["SHA512", "SHA384", "SHA256", "SHA224"];
/// Server prompt asking the client for more COPY data.
const MORE_PROMPT: &str = "\u{1}\u{2}\n";

#[derive(Debug, Clone, Copy, Default)]
pub struct MapiConnector;

impl Connector for MapiConnector {
    fn connect(&self, settings: &ConnectionSettings) -> Result<Box<dyn Transport>, LoadError> {
        Ok(Box::new(MapiConnection::open(settings)?))
    }
}

pub struct MapiConnection {
    stream: TcpStream,
}

enum LoginOutcome {
    Ready,
    Redirect {
        host: String,
        port: u16,
        database: String,
    },
}

impl MapiConnection {
    pub fn open(settings: &ConnectionSettings) -> Result<Self, LoadError> {
        let mut host = settings.host.clone();
        let mut port = settings.port;
        let mut database = settings.database.clone();
        for _ in 0..MAX_REDIRECTS {
            let target = format!("{host}:{port}/{database}");
            let stream = connect_tcp(&host, port).map_err(|err| LoadError::Connection {
                target: target.clone(),
                message: err.to_string(),
            })?;
            let mut connection = Self { stream };
            match connection.login(settings, &database, &target)? {
                LoginOutcome::Ready => {
                    debug!("MAPI session established with {target}");
                    return Ok(connection);
                }
                LoginOutcome::Redirect {
                    host: next_host,
                    port: next_port,
                    database: next_database,
                } => {
                    debug!("Redirected from {target} to {next_host}:{next_port}/{next_database}");
                    host = next_host;
                    port = next_port;
                    database = next_database;
                }
            }
        }
        Err(LoadError::Connection {
            target: settings.target(),
            message: "too many redirects".to_string(),
        })
    }

    fn login(
        &mut self,
        settings: &ConnectionSettings,
        database: &str,
        target: &str,
    ) -> Result<LoginOutcome, LoadError> {
        let connection_error = |message: String| LoadError::Connection {
            target: target.to_string(),
            message,
        };
        for _ in 0..MAX_REDIRECTS {
            let challenge =
                read_message(&mut self.stream).map_err(|err| connection_error(err.to_string()))?;
            let response =
                challenge_response(&challenge, &settings.user, &settings.password, database)?;
            write_message(&mut self.stream, response.as_bytes())
                .map_err(|err| connection_error(err.to_string()))?;
            let reply =
                read_message(&mut self.stream).map_err(|err| connection_error(err.to_string()))?;

            let errors = error_lines(&reply);
            if !errors.is_empty() {
                return Err(connection_error(errors.join("; ")));
            }
            let Some(redirect) = reply.lines().find_map(|line| line.strip_prefix('^')) else {
                return Ok(LoginOutcome::Ready);
            };
            if redirect.starts_with("mapi:merovingian://proxy") {
                continue;
            }
            let (host, port, database) = parse_redirect(redirect)
                .ok_or_else(|| LoadError::Protocol(format!("unsupported redirect '{redirect}'")))?;
            return Ok(LoginOutcome::Redirect {
                host,
                port,
                database,
            });
        }
        Err(connection_error("too many proxy handshakes".to_string()))
    }

    fn query(&mut self, sql: &str) -> Result<String, LoadError> {
        let message = format!("s{sql}\n;");
        write_message(&mut self.stream, message.as_bytes())
            .map_err(|err| LoadError::statement(sql, err.to_string()))?;
        self.read_reply(sql)
    }

    /// Sends `sql` followed by the rows of `rows` in one message.
    fn query_with_rows(&mut self, sql: &str, rows: &mut dyn Read) -> Result<String, LoadError> {
        let send = |stream: &mut TcpStream, rows: &mut dyn Read| -> io::Result<()> {
            let mut writer = BlockWriter::new(stream);
            writer.write_all(format!("s{sql}\n").as_bytes())?;
            io::copy(rows, &mut writer)?;
            writer.finish()
        };
        send(&mut self.stream, rows).map_err(|err| LoadError::statement(sql, err.to_string()))?;
        let mut reply = self.read_reply(sql)?;
        while reply.starts_with(MORE_PROMPT) {
            // Every row was sent; an empty message ends the data.
            write_message(&mut self.stream, b"")
                .map_err(|err| LoadError::statement(sql, err.to_string()))?;
            reply = self.read_reply(sql)?;
        }
        Ok(reply)
    }

    fn read_reply(&mut self, sql: &str) -> Result<String, LoadError> {
        let reply = read_message(&mut self.stream)
            .map_err(|err| LoadError::statement(sql, err.to_string()))?;
        let errors = error_lines(&reply);
        if !errors.is_empty() {
            return Err(LoadError::statement(sql, errors.join("; ")));
        }
        debug!("Server reply: {}", reply.lines().next().unwrap_or_default());
        Ok(reply)
    }

    fn rejected_rows(&mut self) -> Result<u64, LoadError> {
        let sql = "SELECT COUNT(*) FROM sys.rejects;";
        let reply = self.query(sql)?;
        let count = single_value(&reply)
            .ok_or_else(|| LoadError::Protocol(format!("unexpected reply to `{sql}`: {reply:?}")))?;
        self.query("CALL sys.clearrejects();")?;
        Ok(count)
    }
}

impl Transport for MapiConnection {
    fn execute(&mut self, sql: &str) -> Result<(), LoadError> {
        self.query(sql).map(|_| ())
    }

    fn bulk_copy(&mut self, copy: &BulkCopy<'_>) -> Result<Option<u64>, LoadError> {
        match copy.rows {
            RowSource::ServerSide => {
                self.query(copy.statement)?;
            }
            RowSource::File { path, encoding } => {
                let mut reader = io_utils::open_decoded_reader(path, encoding)
                    .map_err(|err| LoadError::io(path, err))?;
                self.query_with_rows(copy.statement, &mut reader)?;
            }
        }
        self.rejected_rows().map(Some)
    }
}

fn connect_tcp(host: &str, port: u16) -> io::Result<TcpStream> {
    let mut last_error = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(err) => last_error = Some(err),
        }
    }
    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
    }))
}

/// Buffers bytes into MAPI blocks; a block is sent once it is full and more
/// data follows, and [`BlockWriter::finish`] sends the final one.
struct BlockWriter<W: Write> {
    inner: W,
    buffer: Vec<u8>,
}

impl<W: Write> BlockWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            buffer: Vec::with_capacity(MAX_BLOCK_SIZE),
        }
    }

    fn emit(&mut self, last: bool) -> io::Result<()> {
        let header = ((self.buffer.len() as u16) << 1) | u16::from(last);
        self.inner.write_all(&header.to_le_bytes())?;
        self.inner.write_all(&self.buffer)?;
        self.buffer.clear();
        Ok(())
    }

    fn finish(mut self) -> io::Result<()> {
        self.emit(true)?;
        self.inner.flush()
    }
}

impl<W: Write> Write for BlockWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.buffer.len() == MAX_BLOCK_SIZE {
            self.emit(false)?;
        }
        let take = (MAX_BLOCK_SIZE - self.buffer.len()).min(buf.len());
        self.buffer.extend_from_slice(&buf[..take]);
        Ok(take)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn write_message<W: Write>(stream: W, message: &[u8]) -> io::Result<()> {
    let mut writer = BlockWriter::new(stream);
    writer.write_all(message)?;
    writer.finish()
}

fn read_message<R: Read>(stream: &mut R) -> io::Result<String> {
    let mut message = Vec::new();
    loop {
        let mut header = [0u8; 2];
        stream.read_exact(&mut header)?;
        let header = u16::from_le_bytes(header);
        let length = usize::from(header >> 1);
        let start = message.len();
        message.resize(start + length, 0);
        stream.read_exact(&mut message[start..])?;
        if header & 1 == 1 {
            break;
        }
    }
    String::from_utf8(message).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

fn error_lines(reply: &str) -> Vec<&str> {
    reply
        .lines()
        .filter_map(|line| line.strip_prefix('!'))
        .map(str::trim)
        .collect()
}

/// First value of the first tuple line (`[ 42\t]`).
fn single_value(reply: &str) -> Option<u64> {
    let tuple = reply.lines().find_map(|line| line.strip_prefix('['))?;
    tuple
        .trim_end_matches(']')
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

/// Parses `mapi:monetdb://host:port/database`.
fn parse_redirect(url: &str) -> Option<(String, u16, String)> {
    let rest = url.strip_prefix("mapi:monetdb://")?;
    let (authority, path) = rest.split_once('/')?;
    let (host, port) = authority.rsplit_once(':')?;
    let database = path.split('?').next().unwrap_or_default();
    if host.is_empty() || database.is_empty() {
        return None;
    }
    Some((host.to_string(), port.parse().ok()?, database.to_string()))
}

fn challenge_response(
    challenge: &str,
    user: &str,
    password: &str,
    database: &str,
) -> Result<String, LoadError> {
    let parts: Vec<&str> = challenge.trim_end().split(':').collect();
    if parts.len() < 6 {
        return Err(LoadError::Protocol(format!(
            "malformed login challenge '{challenge}'"
        )));
    }
    let (salt, protocol, hashes, password_algorithm) = (parts[0], parts[2], parts[3], parts[5]);
    if protocol != PROTOCOL_VERSION {
        return Err(LoadError::Protocol(format!(
            "unsupported MAPI protocol version {protocol}"
        )));
    }
    let password_hash = hex_digest(password_algorithm, password.as_bytes()).ok_or_else(|| {
        LoadError::Protocol(format!(
            "unsupported password hash algorithm {password_algorithm}"
        ))
    })?;
    let (algorithm, digest) = SUPPORTED_HASHES
        .iter()
        .filter(|candidate| hashes.split(',').any(|offered| offered == **candidate))
        .find_map(|algorithm| {
            hex_digest(algorithm, format!("{password_hash}{salt}").as_bytes())
                .map(|digest| (*algorithm, digest))
        })
        .ok_or_else(|| {
            LoadError::Protocol(format!("no supported challenge hash among {hashes}"))
        })?;
    Ok(format!(
        "BIG:{user}:{{{algorithm}}}{digest}:sql:{database}:"
    ))
}

fn hex_digest(algorithm: &str, data: &[u8]) -> Option<String> {
    let bytes = match algorithm {
        "SHA512" => Sha512::digest(data).to_vec(),
        "SHA384" => Sha384::digest(data).to_vec(),
        "SHA256" => Sha256::digest(data).to_vec(),
        "SHA224" => Sha224::digest(data).to_vec(),
        _ => return None,
    };
    Some(bytes.iter().map(|byte| format!("{byte:02x}")).collect())
}
