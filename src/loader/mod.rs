//! Bulk loaders: scan a file once, generate the table's SQL, and load it.
//!
//! [`BulkLoader`] carries the whole lifecycle as provided methods over a
//! shared [`LoaderCore`]; the two variants only decide where the server reads
//! rows from and which [`Connector`] reaches it. [`select_backend`] picks the
//! variant from the target host.

use std::{
    env, fmt, fs,
    net::IpAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use encoding_rs::{Encoding, UTF_8};
use log::{debug, info};
use serde::Serialize;

use crate::{
    config::{ConnectionParameter, ConnectionSettings},
    error::LoadError,
    io_utils,
    locale::LocaleTable,
    results::{self, ParsingResults, ScanOptions},
    sql::{self, CopySource},
    transport::{BulkCopy, Connector, RowSource},
};

pub mod client;
pub mod server;

pub use client::ClientProgramLoader;
pub use server::ServerLoader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum LoaderState {
    Unparsed,
    Parsed,
    Loaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// The server runs on this machine and reads the file itself.
    Server,
    /// Rows are piped through the external client program.
    ClientProgram,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Server => "server",
            Backend::ClientProgram => "client-program",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-file settings fixed at construction.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    pub encoding: &'static Encoding,
    pub null_token: String,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            encoding: UTF_8,
            null_token: String::new(),
        }
    }
}

/// State every loader variant owns: the file, its scan results, the
/// connection parameters, and the connector used by `load`.
pub struct LoaderCore {
    path: PathBuf,
    options: LoaderOptions,
    /// `options.encoding` unless the last scan found a byte-order mark.
    encoding: &'static Encoding,
    locales: Arc<LocaleTable>,
    parameters: Vec<ConnectionParameter>,
    results: Option<ParsingResults>,
    state: LoaderState,
    connector: Box<dyn Connector>,
}

impl LoaderCore {
    pub fn new(
        path: impl Into<PathBuf>,
        locales: Arc<LocaleTable>,
        options: LoaderOptions,
        connector: Box<dyn Connector>,
    ) -> Self {
        Self {
            path: path.into(),
            encoding: options.encoding,
            options,
            locales,
            parameters: Vec::new(),
            results: None,
            state: LoaderState::Unparsed,
            connector,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encoding the file is decoded with.
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    pub fn null_token(&self) -> &str {
        &self.options.null_token
    }

    pub fn parameters(&self) -> &[ConnectionParameter] {
        &self.parameters
    }
}

pub trait BulkLoader {
    fn core(&self) -> &LoaderCore;

    fn core_mut(&mut self) -> &mut LoaderCore;

    fn backend(&self) -> Backend;

    /// Source named in the generated COPY INTO statement.
    fn copy_source(&self) -> CopySource<'_>;

    /// Rows handed to the transport alongside the COPY INTO statement.
    fn row_source(&self) -> RowSource<'_>;

    fn state(&self) -> LoaderState {
        self.core().state
    }

    /// Replaces the connection parameters used by [`BulkLoader::load`].
    fn set_connection_parameters(&mut self, parameters: Vec<ConnectionParameter>) {
        self.core_mut().parameters = parameters;
    }

    /// Scans the file and stores the results. A second call re-scans.
    fn parse(&mut self, separator: char, quote: char) -> Result<&ParsingResults, LoadError> {
        let core = self.core_mut();
        if core.state == LoaderState::Loaded {
            return Err(LoadError::AlreadyLoaded);
        }
        let options = ScanOptions {
            separator,
            quote,
            null_token: core.options.null_token.clone(),
        };
        options.validate()?;

        core.encoding = io_utils::detect_encoding(&core.path, core.options.encoding)
            .map_err(|err| LoadError::io(&core.path, err))?;
        if core.encoding != core.options.encoding {
            info!(
                "{:?} starts with a {} byte-order mark",
                core.path,
                core.encoding.name()
            );
        }
        info!(
            "Scanning {:?} (separator '{}', quote '{}', encoding {})",
            core.path,
            io_utils::printable_char(separator),
            io_utils::printable_char(quote),
            core.encoding.name()
        );
        let reader = io_utils::open_decoded_reader(&core.path, core.encoding)
            .map_err(|err| LoadError::io(&core.path, err))?;
        let results = results::scan(reader, &options, &core.locales)
            .map_err(|err| LoadError::io(&core.path, err))?
            .ok_or_else(|| LoadError::MissingHeader(core.path.clone()))?;
        info!(
            "Scanned {} data line(s) ({} malformed) across {} column(s)",
            results.total_records(),
            results.num_malformed_lines(),
            results.columns().len()
        );
        core.state = LoaderState::Parsed;
        Ok(&*core.results.insert(results))
    }

    fn parsing_results(&self) -> Result<&ParsingResults, LoadError> {
        self.core().results.as_ref().ok_or(LoadError::NotYetParsed)
    }

    /// `requested` when non-empty, otherwise a name derived from the file.
    fn get_table_name(&self, requested: &str) -> String {
        let requested = requested.trim();
        if requested.is_empty() {
            sql::derive_table_name(self.core().path())
        } else {
            requested.to_string()
        }
    }

    fn generate_drop_table_command(&self, table: &str) -> Result<String, LoadError> {
        self.parsing_results()?;
        Ok(sql::drop_table_command(table))
    }

    fn generate_create_table_command(&self, table: &str) -> Result<String, LoadError> {
        let results = self.parsing_results()?;
        Ok(sql::create_table_command(
            table,
            results,
            &self.core().locales,
        ))
    }

    fn generate_copy_into_command(&self, table: &str) -> Result<String, LoadError> {
        let results = self.parsing_results()?;
        Ok(sql::copy_into_command(
            table,
            results,
            &self.copy_source(),
            &self.core().locales,
        ))
    }

    /// Runs DROP, CREATE, and the bulk copy, each committed on its own.
    /// Returns the server's rejected-row count when the transport sees it.
    fn load(&mut self, table: &str) -> Result<Option<u64>, LoadError> {
        match self.state() {
            LoaderState::Unparsed => return Err(LoadError::NotYetParsed),
            LoaderState::Loaded => return Err(LoadError::AlreadyLoaded),
            LoaderState::Parsed => {}
        }
        let drop = self.generate_drop_table_command(table)?;
        let create = self.generate_create_table_command(table)?;
        let copy = self.generate_copy_into_command(table)?;
        let total_records = self.parsing_results()?.total_records();

        let settings = ConnectionSettings::from_parameters(self.core().parameters());
        info!("Connecting to {} ({} backend)", settings.target(), self.backend());
        let mut transport = self.core().connector.connect(&settings)?;

        info!("Executing: {drop}");
        transport.execute(&drop)?;
        info!("Executing: {create}");
        transport.execute(&create)?;
        let rejected = if total_records == 0 {
            info!("No data lines; skipping COPY INTO");
            Some(0)
        } else {
            info!("Executing: {copy}");
            transport.bulk_copy(&BulkCopy {
                table,
                statement: &copy,
                rows: self.row_source(),
            })?
        };
        self.core_mut().state = LoaderState::Loaded;
        Ok(rejected)
    }
}

/// Builds the loader variant for `backend` with its production connector.
pub fn create_loader(
    backend: Backend,
    path: impl Into<PathBuf>,
    locales: Arc<LocaleTable>,
    options: LoaderOptions,
) -> Box<dyn BulkLoader> {
    match backend {
        Backend::Server => Box::new(ServerLoader::new(path, locales, options)),
        Backend::ClientProgram => Box::new(ClientProgramLoader::new(path, locales, options)),
    }
}

/// Local hosts get the in-process variant; anything else goes through the client program.
pub fn select_backend(settings: &ConnectionSettings) -> Backend {
    let backend = if is_local_host(&settings.host) {
        Backend::Server
    } else {
        Backend::ClientProgram
    };
    debug!("Host '{}' selects the {backend} backend", settings.host);
    backend
}

/// True for an empty host, `localhost`, loopback addresses, and this machine's name.
pub fn is_local_host(host: &str) -> bool {
    let host = host.trim();
    if host.is_empty() || host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    if let Ok(ip) = host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
        return ip.is_loopback();
    }
    machine_name().is_some_and(|name| name.eq_ignore_ascii_case(host))
}

pub fn machine_name() -> Option<String> {
    let from_env = ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .filter_map(|var| env::var(var).ok())
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty());
    from_env.or_else(|| {
        ["/proc/sys/kernel/hostname", "/etc/hostname"]
            .iter()
            .filter_map(|path| fs::read_to_string(path).ok())
            .map(|name| name.trim().to_string())
            .find(|name| !name.is_empty())
    })
}
