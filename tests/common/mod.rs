#![allow(dead_code)]

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use bulkload_csv::locale::LocaleTable;
use bulkload_csv::results::{ParsingResults, ScanOptions, scan};
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Scans in-memory text with the given separator, quote, and NULL token.
pub fn scan_text(input: &str, separator: char, quote: char, null_token: &str) -> ParsingResults {
    let options = ScanOptions {
        separator,
        quote,
        null_token: null_token.to_string(),
    };
    scan(Cursor::new(input), &options, &LocaleTable::standard())
        .expect("in-memory scan")
        .expect("header present")
}

/// Scratch directory that disappears with the test.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, contents).expect("write temp file");
        path
    }
}
