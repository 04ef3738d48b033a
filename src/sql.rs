//! SQL text generation for MonetDB: identifier and literal quoting, column
//! type selection, and the DROP / CREATE / COPY INTO statements.

use std::{fmt, path::Path};

use heck::ToSnakeCase;
use itertools::Itertools;
use log::warn;

use crate::{
    column::{CandidateType, ColumnInfo},
    locale::{LocaleGrammar, LocaleTable, TemporalKind},
    results::ParsingResults,
};

/// Longest VARCHAR emitted before falling back to CLOB.
pub const MAX_VARCHAR_LENGTH: usize = 2048;
pub const MAX_DECIMAL_PRECISION: u32 = 38;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    HugeInt,
    Decimal { precision: u32, scale: u32 },
    Double,
    Date,
    Time,
    Timestamp,
    Varchar(usize),
    Clob,
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Boolean => write!(f, "BOOLEAN"),
            SqlType::TinyInt => write!(f, "TINYINT"),
            SqlType::SmallInt => write!(f, "SMALLINT"),
            SqlType::Int => write!(f, "INT"),
            SqlType::BigInt => write!(f, "BIGINT"),
            SqlType::HugeInt => write!(f, "HUGEINT"),
            SqlType::Decimal { precision, scale } => write!(f, "DECIMAL({precision},{scale})"),
            SqlType::Double => write!(f, "DOUBLE"),
            SqlType::Date => write!(f, "DATE"),
            SqlType::Time => write!(f, "TIME"),
            SqlType::Timestamp => write!(f, "TIMESTAMP"),
            SqlType::Varchar(length) => write!(f, "VARCHAR({length})"),
            SqlType::Clob => write!(f, "CLOB"),
        }
    }
}

impl SqlType {
    /// Picks the narrowest server type for the column's final statistics.
    pub fn for_column(column: &ColumnInfo) -> SqlType {
        if column.non_null_count() == 0 {
            return varchar(column.max_length());
        }
        match column.candidate_type() {
            CandidateType::Boolean => SqlType::Boolean,
            CandidateType::Integer => match column.integer_range() {
                Some((min, max)) => integer_type(min, max),
                None => SqlType::Int,
            },
            CandidateType::Decimal => {
                let (integer_digits, scale) = column.decimal_digits();
                let precision = (integer_digits + scale).max(1);
                if precision > MAX_DECIMAL_PRECISION {
                    SqlType::Double
                } else {
                    SqlType::Decimal { precision, scale }
                }
            }
            // COPY INTO only parses ISO dates and times.
            CandidateType::Temporal if !column.has_iso_temporals() => {
                varchar(column.max_length())
            }
            CandidateType::Temporal => match column.temporal_kind() {
                Some(TemporalKind::Date) => SqlType::Date,
                Some(TemporalKind::Time) => SqlType::Time,
                Some(TemporalKind::Timestamp) => SqlType::Timestamp,
                None => varchar(column.max_length()),
            },
            CandidateType::String => varchar(column.max_length()),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            SqlType::TinyInt
                | SqlType::SmallInt
                | SqlType::Int
                | SqlType::BigInt
                | SqlType::HugeInt
                | SqlType::Decimal { .. }
                | SqlType::Double
        )
    }
}

fn varchar(max_length: usize) -> SqlType {
    if max_length > MAX_VARCHAR_LENGTH {
        SqlType::Clob
    } else {
        SqlType::Varchar(max_length.max(1))
    }
}

// The server reserves the most negative value of each width for NULL.
fn integer_type(min: i128, max: i128) -> SqlType {
    let fits = |bound: i128| -bound <= min && max <= bound;
    if fits(i8::MAX.into()) {
        SqlType::TinyInt
    } else if fits(i16::MAX.into()) {
        SqlType::SmallInt
    } else if fits(i32::MAX.into()) {
        SqlType::Int
    } else if fits(i64::MAX.into()) {
        SqlType::BigInt
    } else {
        SqlType::HugeInt
    }
}

/// Server types for a scanned file, with the grammar named in `DECIMAL AS`.
#[derive(Debug, Clone)]
pub struct ColumnTypes<'a> {
    pub types: Vec<SqlType>,
    pub decimal_grammar: Option<&'a LocaleGrammar>,
}

/// Resolves every column's type against a single `DECIMAL AS` grammar.
///
/// The first locale-pinned numeric column fixes the separators. Later pinned
/// numeric columns whose grammar uses other separators are stored as text.
pub fn column_types<'a>(results: &ParsingResults, locales: &'a LocaleTable) -> ColumnTypes<'a> {
    let mut decimal_grammar: Option<&'a LocaleGrammar> = None;
    let types = results
        .columns()
        .iter()
        .map(|column| {
            let sql_type = SqlType::for_column(column);
            if !sql_type.is_numeric() || !column.is_locale_specific() {
                return sql_type;
            }
            let Some(grammar) = column.locale().and_then(|idx| locales.get(idx)) else {
                return sql_type;
            };
            match decimal_grammar {
                None => {
                    decimal_grammar = Some(grammar);
                    sql_type
                }
                Some(chosen) if chosen.same_separators(grammar) => sql_type,
                Some(_) => varchar(column.max_length()),
            }
        })
        .collect();
    ColumnTypes {
        types,
        decimal_grammar,
    }
}

/// Where the server reads COPY INTO data from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopySource<'a> {
    /// A file the server process opens itself.
    ServerFile(&'a Path),
    /// Rows streamed by the client after the statement.
    Stdin,
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes each dot-separated part unless the caller already quoted the name.
pub fn quote_table_name(name: &str) -> String {
    if name.starts_with('"') || name.split('.').any(str::is_empty) {
        return name.to_string();
    }
    name.split('.').map(quote_identifier).join(".")
}

pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        match ch {
            '\'' => quoted.push_str("''"),
            '\\' => quoted.push_str("\\\\"),
            '\t' => quoted.push_str("\\t"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            other => quoted.push(other),
        }
    }
    quoted.push('\'');
    quoted
}

/// Table name derived from a file name: snake_case stem limited to `[a-z0-9_]`.
pub fn derive_table_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sanitized: String = stem
        .to_snake_case()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            _ => '_',
        })
        .collect();
    if sanitized.is_empty() {
        "table".to_string()
    } else if sanitized.starts_with(|c: char| c.is_ascii_digit()) {
        format!("t_{sanitized}")
    } else {
        sanitized
    }
}

pub fn drop_table_command(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {};", quote_table_name(table))
}

pub fn create_table_command(
    table: &str,
    results: &ParsingResults,
    locales: &LocaleTable,
) -> String {
    let resolved = column_types(results, locales);
    let columns = results
        .columns()
        .iter()
        .zip(&resolved.types)
        .map(|(column, sql_type)| {
            let inferred = SqlType::for_column(column);
            if *sql_type != inferred {
                warn!(
                    "Column '{}' reads as {inferred} only under {}; storing it as {sql_type}",
                    column.name(),
                    column.locale_name().unwrap_or("another grammar")
                );
            }
            let mut definition = format!("{} {sql_type}", quote_identifier(column.name()));
            if !column.nullable() {
                definition.push_str(" NOT NULL");
            }
            definition
        })
        .join(", ");
    format!("CREATE TABLE {} ({columns});", quote_table_name(table))
}

pub fn copy_into_command(
    table: &str,
    results: &ParsingResults,
    source: &CopySource<'_>,
    locales: &LocaleTable,
) -> String {
    let options = results.options();
    let mut command = String::from("COPY ");
    if results.total_records() > 0 {
        command.push_str(&format!("{} RECORDS ", results.total_records()));
    }
    command.push_str("OFFSET 2 INTO ");
    command.push_str(&quote_table_name(table));
    command.push_str(" FROM ");
    match source {
        CopySource::ServerFile(path) => {
            command.push_str(&quote_literal(&path.to_string_lossy()));
        }
        CopySource::Stdin => command.push_str("STDIN"),
    }
    command.push_str(&format!(
        " USING DELIMITERS {},{},{} NULL AS {}",
        quote_literal(&options.separator.to_string()),
        quote_literal("\n"),
        quote_literal(&options.quote.to_string()),
        quote_literal(&options.null_token)
    ));
    if let Some(clause) = decimal_clause(results, locales) {
        command.push(' ');
        command.push_str(&clause);
    }
    command.push_str(" BEST EFFORT;");
    command
}

fn decimal_clause(results: &ParsingResults, locales: &LocaleTable) -> Option<String> {
    let grammar = column_types(results, locales).decimal_grammar?;
    let mut clause = format!(
        "DECIMAL AS {}",
        quote_literal(&grammar.decimal_separator.to_string())
    );
    if let Some(thousands) = grammar.thousands_separator {
        clause.push(',');
        clause.push_str(&quote_literal(&thousands.to_string()));
    }
    Some(clause)
}
