//! Error taxonomy shared by the scanner, the SQL generator, and the loaders.
//!
//! Malformed records are deliberately absent: they are counted in
//! [`crate::results::ParsingResults`] and never surface as errors.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Character reserved as the escape character in generated COPY statements.
pub const ESCAPE_CHARACTER: char = '\\';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Separator/quote conflicts, reserved characters, bad settings. Raised before scanning.
    Configuration,
    /// The source file could not be opened or read.
    Io,
    /// An operation was invoked out of lifecycle order.
    State,
    /// Connecting to the server or executing a statement failed.
    Transport,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("'{}' is reserved as the escape character and cannot be used as {role}", printable(.character))]
    ReservedCharacter { character: char, role: &'static str },
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
    #[error("Reading {path:?} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("File {0:?} is empty; the first line must contain the column names")]
    MissingHeader(PathBuf),
    #[error("The file has not been parsed yet")]
    NotYetParsed,
    #[error("The table has already been loaded by this loader")]
    AlreadyLoaded,
    #[error("Connecting to {target} failed: {message}")]
    Connection { target: String, message: String },
    #[error("Executing `{sql}` failed: {message}")]
    Statement { sql: String, message: String },
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl LoadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoadError::ReservedCharacter { .. } | LoadError::InvalidOptions(_) => {
                ErrorKind::Configuration
            }
            LoadError::Io { .. } | LoadError::MissingHeader(_) => ErrorKind::Io,
            LoadError::NotYetParsed | LoadError::AlreadyLoaded => ErrorKind::State,
            LoadError::Connection { .. }
            | LoadError::Statement { .. }
            | LoadError::Protocol(_) => ErrorKind::Transport,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LoadError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn statement(sql: &str, message: impl Into<String>) -> Self {
        LoadError::Statement {
            sql: sql.trim().to_string(),
            message: message.into(),
        }
    }
}

fn printable(character: &char) -> String {
    character.escape_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        let reserved = LoadError::ReservedCharacter {
            character: ESCAPE_CHARACTER,
            role: "the separator",
        };
        assert_eq!(reserved.kind(), ErrorKind::Configuration);
        assert_eq!(LoadError::NotYetParsed.kind(), ErrorKind::State);
        assert_eq!(
            LoadError::statement("DROP TABLE t;", "no such table").kind(),
            ErrorKind::Transport
        );
        let io = LoadError::io("x.csv", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(io.kind(), ErrorKind::Io);
    }

    #[test]
    fn reserved_character_message_escapes_backslash() {
        let err = LoadError::ReservedCharacter {
            character: '\\',
            role: "the quote character",
        };
        assert_eq!(
            err.to_string(),
            "'\\\\' is reserved as the escape character and cannot be used as the quote character"
        );
    }
}
