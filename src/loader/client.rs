//! Loader for a remote server, driven through the external client program.
//!
//! The server cannot see the local file, so COPY INTO reads `FROM STDIN`
//! and the decoded file is piped into the client process.

use std::{path::PathBuf, sync::Arc};

use super::{Backend, BulkLoader, LoaderCore, LoaderOptions};
use crate::{
    locale::LocaleTable,
    sql::CopySource,
    transport::{Connector, MclientConnector, RowSource},
};

pub struct ClientProgramLoader {
    core: LoaderCore,
}

impl ClientProgramLoader {
    pub fn new(path: impl Into<PathBuf>, locales: Arc<LocaleTable>, options: LoaderOptions) -> Self {
        Self::with_connector(path, locales, options, Box::new(MclientConnector))
    }

    pub fn with_connector(
        path: impl Into<PathBuf>,
        locales: Arc<LocaleTable>,
        options: LoaderOptions,
        connector: Box<dyn Connector>,
    ) -> Self {
        Self {
            core: LoaderCore::new(path, locales, options, connector),
        }
    }
}

impl BulkLoader for ClientProgramLoader {
    fn core(&self) -> &LoaderCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LoaderCore {
        &mut self.core
    }

    fn backend(&self) -> Backend {
        Backend::ClientProgram
    }

    fn copy_source(&self) -> CopySource<'_> {
        CopySource::Stdin
    }

    fn row_source(&self) -> RowSource<'_> {
        RowSource::File {
            path: self.core.path(),
            encoding: self.core.encoding(),
        }
    }
}
