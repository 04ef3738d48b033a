mod common;

use std::sync::{Arc, Mutex};

use bulkload_csv::config::{ConnectionParameter, ConnectionSettings};
use bulkload_csv::error::{ErrorKind, LoadError};
use bulkload_csv::io_utils::open_decoded_reader;
use bulkload_csv::loader::{BulkLoader, ClientProgramLoader, LoaderOptions, LoaderState};
use bulkload_csv::locale::LocaleTable;
use bulkload_csv::tokenizer::Tokenizer;
use bulkload_csv::transport::{BulkCopy, Connector, RowSource, Transport};
use common::TestWorkspace;

#[derive(Default)]
struct Server {
    statements: Vec<String>,
    loaded_rows: usize,
    settings: Option<ConnectionSettings>,
}

/// Accepts every statement and loads streamed rows the way BEST EFFORT does:
/// rows with the wrong field count are rejected, the rest are stored.
#[derive(Clone)]
struct InMemoryServer {
    state: Arc<Mutex<Server>>,
    separator: char,
    quote: char,
}

struct Session {
    state: Arc<Mutex<Server>>,
    separator: char,
    quote: char,
}

impl Connector for InMemoryServer {
    fn connect(&self, settings: &ConnectionSettings) -> Result<Box<dyn Transport>, LoadError> {
        self.state.lock().unwrap().settings = Some(settings.clone());
        Ok(Box::new(Session {
            state: Arc::clone(&self.state),
            separator: self.separator,
            quote: self.quote,
        }))
    }
}

impl Transport for Session {
    fn execute(&mut self, sql: &str) -> Result<(), LoadError> {
        self.state.lock().unwrap().statements.push(sql.to_string());
        Ok(())
    }

    fn bulk_copy(&mut self, copy: &BulkCopy<'_>) -> Result<Option<u64>, LoadError> {
        let RowSource::File { path, encoding } = copy.rows else {
            panic!("the client-program loader always streams rows");
        };
        let reader = open_decoded_reader(path, encoding).expect("readable source");
        let mut records = Tokenizer::new(reader, self.separator, self.quote);
        let header = records.next_record().unwrap().expect("header");
        let (mut loaded, mut rejected) = (0usize, 0u64);
        while let Some(record) = records.next_record().unwrap() {
            if record.is_malformed() || record.fields.len() != header.fields.len() {
                rejected += 1;
            } else {
                loaded += 1;
            }
        }
        let mut state = self.state.lock().unwrap();
        state.statements.push(copy.statement.to_string());
        state.loaded_rows = loaded;
        Ok(Some(rejected))
    }
}

fn loader_for(path: &std::path::Path, server: &InMemoryServer) -> ClientProgramLoader {
    ClientProgramLoader::with_connector(
        path,
        Arc::new(LocaleTable::standard()),
        LoaderOptions::default(),
        Box::new(server.clone()),
    )
}

#[test]
fn loaded_rows_match_well_formed_lines() {
    let workspace = TestWorkspace::new();
    let csv = workspace.write(
        "events.csv",
        "id,kind,at\n1,open,2024-01-01\n2,\"close, forced\",2024-01-02\n3,bad\n4,open,\n",
    );
    let server = InMemoryServer {
        state: Arc::default(),
        separator: ',',
        quote: '"',
    };
    let mut loader = loader_for(&csv, &server);
    let results = loader.parse(',', '"').unwrap();
    assert_eq!(results.num_lines(), 3);
    assert_eq!(results.num_malformed_lines(), 1);

    let table = loader.get_table_name("");
    let rejected = loader.load(&table).unwrap();
    assert_eq!(rejected, Some(1));
    assert_eq!(loader.state(), LoaderState::Loaded);

    let state = server.state.lock().unwrap();
    assert_eq!(state.loaded_rows, loader.parsing_results().unwrap().num_lines());
    assert_eq!(
        state.statements[0],
        "DROP TABLE IF EXISTS \"events\";"
    );
    assert_eq!(
        state.statements[1],
        "CREATE TABLE \"events\" (\"id\" TINYINT NOT NULL, \"kind\" VARCHAR(13) NOT NULL, \"at\" DATE);"
    );
    assert!(state.statements[2].starts_with("COPY 4 RECORDS OFFSET 2 INTO \"events\" FROM STDIN"));
}

#[test]
fn connection_parameters_override_defaults_in_order() {
    let workspace = TestWorkspace::new();
    let csv = workspace.write("a.csv", "x\n1\n");
    let server = InMemoryServer {
        state: Arc::default(),
        separator: ',',
        quote: '"',
    };
    let mut loader = loader_for(&csv, &server);
    loader.set_connection_parameters(vec![
        ConnectionParameter::Host("db.example".to_string()),
        ConnectionParameter::User("etl".to_string()),
        ConnectionParameter::Host("db2.example".to_string()),
    ]);
    loader.parse(',', '"').unwrap();
    loader.load("a").unwrap();

    let state = server.state.lock().unwrap();
    let settings = state.settings.as_ref().expect("connected");
    assert_eq!(settings.host, "db2.example");
    assert_eq!(settings.user, "etl");
    assert_eq!(settings.port, 50000);
}

#[test]
fn lifecycle_errors_are_state_errors() {
    let workspace = TestWorkspace::new();
    let csv = workspace.write("a.csv", "x\n1\n");
    let server = InMemoryServer {
        state: Arc::default(),
        separator: ',',
        quote: '"',
    };
    let mut loader = loader_for(&csv, &server);
    let err = loader.load("a").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
    let err = loader.generate_drop_table_command("a").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);

    let err = loader.parse('\\', '"').unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    let err = loader.parse(',', '\\').unwrap_err();
    assert!(matches!(
        err,
        LoadError::ReservedCharacter {
            character: '\\',
            role: "the quote character"
        }
    ));
    assert!(server.state.lock().unwrap().statements.is_empty());
}

#[test]
fn null_token_with_escape_character_is_rejected() {
    let workspace = TestWorkspace::new();
    let csv = workspace.write("n.csv", "x\n1\n");
    let mut loader = ClientProgramLoader::with_connector(
        &csv,
        Arc::new(LocaleTable::standard()),
        LoaderOptions {
            null_token: "\\N".to_string(),
            ..LoaderOptions::default()
        },
        Box::new(InMemoryServer {
            state: Arc::default(),
            separator: ',',
            quote: '"',
        }),
    );
    let err = loader.parse(',', '"').unwrap_err();
    assert!(matches!(
        err,
        LoadError::ReservedCharacter {
            role: "part of the NULL token",
            ..
        }
    ));
    assert_eq!(loader.state(), LoaderState::Unparsed);
}

#[test]
fn reparsing_rescans_with_new_options() {
    let workspace = TestWorkspace::new();
    let csv = workspace.write("p.csv", "a;b\n1;2\n");
    let server = InMemoryServer {
        state: Arc::default(),
        separator: ';',
        quote: '"',
    };
    let mut loader = loader_for(&csv, &server);
    assert_eq!(loader.parse(',', '"').unwrap().columns().len(), 1);
    assert_eq!(loader.parse(';', '"').unwrap().columns().len(), 2);
    let copy = loader.generate_copy_into_command("p").unwrap();
    assert!(copy.contains("USING DELIMITERS ';'"));
}
