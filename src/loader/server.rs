//! Loader for a server on this machine, driven in-process over MAPI.
//!
//! The COPY INTO statement names the file by absolute path and the server
//! reads it directly, so rejected rows land in the session's `sys.rejects`.
//! The server only reads UTF-8; files in other encodings, whether configured
//! or announced by a byte-order mark, are decoded here and streamed over the
//! same connection instead.

use std::{path::PathBuf, sync::Arc};

use encoding_rs::UTF_8;

use super::{Backend, BulkLoader, LoaderCore, LoaderOptions};
use crate::{
    locale::LocaleTable,
    sql::CopySource,
    transport::{Connector, MapiConnector, RowSource},
};

pub struct ServerLoader {
    core: LoaderCore,
    absolute_path: PathBuf,
}

impl ServerLoader {
    pub fn new(path: impl Into<PathBuf>, locales: Arc<LocaleTable>, options: LoaderOptions) -> Self {
        Self::with_connector(path, locales, options, Box::new(MapiConnector))
    }

    pub fn with_connector(
        path: impl Into<PathBuf>,
        locales: Arc<LocaleTable>,
        options: LoaderOptions,
        connector: Box<dyn Connector>,
    ) -> Self {
        let core = LoaderCore::new(path, locales, options, connector);
        let absolute_path =
            std::path::absolute(core.path()).unwrap_or_else(|_| core.path().to_path_buf());
        Self {
            core,
            absolute_path,
        }
    }

    fn streams_rows(&self) -> bool {
        self.core.encoding() != UTF_8
    }
}

impl BulkLoader for ServerLoader {
    fn core(&self) -> &LoaderCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LoaderCore {
        &mut self.core
    }

    fn backend(&self) -> Backend {
        Backend::Server
    }

    fn copy_source(&self) -> CopySource<'_> {
        if self.streams_rows() {
            CopySource::Stdin
        } else {
            CopySource::ServerFile(&self.absolute_path)
        }
    }

    fn row_source(&self) -> RowSource<'_> {
        if self.streams_rows() {
            RowSource::File {
                path: self.core.path(),
                encoding: self.core.encoding(),
            }
        } else {
            RowSource::ServerSide
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::test_support::RecordingConnector;
    use encoding_rs::{UTF_16LE, WINDOWS_1252};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn copy_names_the_absolute_file() {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(file, "amount;label\n1,5;x\n2,25;y\n").unwrap();
        let mut loader = ServerLoader::with_connector(
            file.path(),
            Arc::new(LocaleTable::standard()),
            LoaderOptions::default(),
            Box::new(RecordingConnector::default()),
        );
        loader.parse(';', '"').unwrap();
        let copy = loader.generate_copy_into_command("t").unwrap();
        let expected_path = std::path::absolute(file.path()).unwrap();
        assert!(copy.contains(&format!("FROM '{}'", expected_path.display())));
        assert!(copy.contains("USING DELIMITERS ';','\\n','\"'"));
        assert!(copy.contains("DECIMAL AS ','"));
        assert!(matches!(loader.row_source(), RowSource::ServerSide));
    }

    #[test]
    fn non_utf8_files_are_streamed() {
        let loader = ServerLoader::with_connector(
            "legacy.csv",
            Arc::new(LocaleTable::standard()),
            LoaderOptions {
                encoding: WINDOWS_1252,
                ..LoaderOptions::default()
            },
            Box::new(RecordingConnector::default()),
        );
        assert!(matches!(loader.copy_source(), CopySource::Stdin));
        assert!(matches!(
            loader.row_source(),
            RowSource::File { encoding, .. } if encoding == WINDOWS_1252
        ));
    }

    #[test]
    fn byte_order_mark_switches_to_streaming() {
        let mut file = NamedTempFile::new().expect("temp file");
        let mut bytes = vec![0xFF, 0xFE];
        bytes.extend("id,name\n1,a\n2,b\n".encode_utf16().flat_map(u16::to_le_bytes));
        file.write_all(&bytes).unwrap();
        let mut loader = ServerLoader::with_connector(
            file.path(),
            Arc::new(LocaleTable::standard()),
            LoaderOptions::default(),
            Box::new(RecordingConnector::default()),
        );
        assert!(matches!(loader.copy_source(), CopySource::ServerFile(_)));

        let results = loader.parse(',', '"').unwrap();
        assert_eq!(results.num_lines(), 2);
        assert_eq!(results.columns()[1].name(), "name");
        assert_eq!(loader.core().encoding(), UTF_16LE);
        let copy = loader.generate_copy_into_command("t").unwrap();
        assert!(copy.starts_with("COPY 2 RECORDS OFFSET 2 INTO \"t\" FROM STDIN"));
        assert!(matches!(
            loader.row_source(),
            RowSource::File { encoding, .. } if encoding == UTF_16LE
        ));
    }

    #[test]
    fn rejected_rows_are_reported() {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(file, "id\n1\n2\n").unwrap();
        let connector = RecordingConnector {
            rejected: Some(1),
            ..RecordingConnector::default()
        };
        let mut loader = ServerLoader::with_connector(
            file.path(),
            Arc::new(LocaleTable::standard()),
            LoaderOptions::default(),
            Box::new(connector),
        );
        loader.parse(',', '"').unwrap();
        assert_eq!(loader.load("t").unwrap(), Some(1));
    }
}
