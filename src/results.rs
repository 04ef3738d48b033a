//! Scan driver and the aggregate it produces.
//!
//! [`scan`] runs the tokenizer over a decoded stream once, takes the first
//! record as the header, and feeds every well-formed record to the
//! per-column [`ColumnInfo`] accumulators. Malformed records are counted and
//! skipped.

use std::{collections::HashSet, io::BufRead};

use log::{debug, warn};
use serde::Serialize;

use crate::{
    column::ColumnInfo,
    error::{ESCAPE_CHARACTER, LoadError},
    io_utils::printable_char,
    locale::LocaleTable,
    tokenizer::{Malformation, Tokenizer},
};

const MALFORMED_LOG_LIMIT: usize = 5;

/// Tokenizer settings a scan ran with; COPY INTO repeats them verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanOptions {
    pub separator: char,
    pub quote: char,
    pub null_token: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            separator: ',',
            quote: '"',
            null_token: String::new(),
        }
    }
}

impl ScanOptions {
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.separator == ESCAPE_CHARACTER {
            return Err(LoadError::ReservedCharacter {
                character: self.separator,
                role: "the separator",
            });
        }
        if self.quote == ESCAPE_CHARACTER {
            return Err(LoadError::ReservedCharacter {
                character: self.quote,
                role: "the quote character",
            });
        }
        if self.separator == self.quote {
            return Err(LoadError::InvalidOptions(format!(
                "separator and quote character are both '{}'",
                printable_char(self.separator)
            )));
        }
        for (role, ch) in [("separator", self.separator), ("quote character", self.quote)] {
            if matches!(ch, '\n' | '\r') {
                return Err(LoadError::InvalidOptions(format!(
                    "the {role} cannot be a line break"
                )));
            }
        }
        if self.null_token.contains(ESCAPE_CHARACTER) {
            return Err(LoadError::ReservedCharacter {
                character: ESCAPE_CHARACTER,
                role: "part of the NULL token",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParsingResults {
    num_lines: usize,
    num_malformed_lines: usize,
    columns: Vec<ColumnInfo>,
    options: ScanOptions,
}

impl ParsingResults {
    /// Well-formed data lines (header excluded).
    pub fn num_lines(&self) -> usize {
        self.num_lines
    }

    pub fn num_malformed_lines(&self) -> usize {
        self.num_malformed_lines
    }

    /// Every data record read, well-formed or not.
    pub fn total_records(&self) -> usize {
        self.num_lines + self.num_malformed_lines
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }
}

/// Scans `reader` once. Returns `Ok(None)` when the stream has no header line.
pub fn scan<R: BufRead>(
    reader: R,
    options: &ScanOptions,
    locales: &LocaleTable,
) -> std::io::Result<Option<ParsingResults>> {
    let mut tokenizer = Tokenizer::new(reader, options.separator, options.quote);
    let Some(header) = tokenizer.next_record()? else {
        return Ok(None);
    };
    if let Some(problem) = header.malformation {
        warn!("Header line is malformed ({problem}); using the fields read before the problem");
    }

    let mut columns: Vec<ColumnInfo> = unique_column_names(&header.fields)
        .into_iter()
        .enumerate()
        .map(|(ordinal, name)| ColumnInfo::new(name, ordinal))
        .collect();
    let expected = columns.len();
    let mut num_lines = 0usize;
    let mut num_malformed_lines = 0usize;

    while let Some(record) = tokenizer.next_record()? {
        let problem = record.malformation.or_else(|| {
            (record.fields.len() != expected).then_some(Malformation::FieldCount {
                expected,
                found: record.fields.len(),
            })
        });
        if let Some(problem) = problem {
            num_malformed_lines += 1;
            if num_malformed_lines <= MALFORMED_LOG_LIMIT {
                warn!("Skipping malformed record at line {}: {problem}", record.line);
            } else if num_malformed_lines == MALFORMED_LOG_LIMIT + 1 {
                warn!("Further malformed records are counted but not reported individually");
            }
            continue;
        }
        num_lines += 1;
        for (column, value) in columns.iter_mut().zip(record.fields.iter()) {
            column.observe(value, &options.null_token, locales);
        }
    }
    debug!(
        "Scanned {} physical line(s): {} well-formed, {} malformed",
        tokenizer.lines_read(),
        num_lines,
        num_malformed_lines
    );

    Ok(Some(ParsingResults {
        num_lines,
        num_malformed_lines,
        columns,
        options: options.clone(),
    }))
}

/// Blank names become `column_<n>` (1-based); repeats get `_2`, `_3`, ...
fn unique_column_names(fields: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(fields.len());
    for (idx, field) in fields.iter().enumerate() {
        let trimmed = field.trim();
        let base = if trimmed.is_empty() {
            format!("column_{}", idx + 1)
        } else {
            trimmed.to_string()
        };
        let mut candidate = base.clone();
        let mut suffix = 2;
        while !seen.insert(candidate.to_ascii_lowercase()) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        names.push(candidate);
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::CandidateType;
    use std::io::Cursor;

    fn scan_str(input: &str) -> ParsingResults {
        scan(Cursor::new(input), &ScanOptions::default(), &LocaleTable::standard())
            .expect("in-memory scan")
            .expect("header present")
    }

    #[test]
    fn malformed_records_are_counted_and_skipped() {
        let results = scan_str("a,b\n1,2\n3\n4,5\n");
        assert_eq!(results.num_lines(), 2);
        assert_eq!(results.num_malformed_lines(), 1);
        assert_eq!(results.total_records(), 3);
        let a = &results.columns()[0];
        assert_eq!(a.non_null_count(), 2);
        assert_eq!(a.integer_range(), Some((1, 4)));
    }

    #[test]
    fn quoting_errors_count_as_malformed() {
        let results = scan_str("a,b\nx\"y,1\n2,3\n");
        assert_eq!(results.num_lines(), 1);
        assert_eq!(results.num_malformed_lines(), 1);
    }

    #[test]
    fn empty_stream_has_no_results() {
        let outcome = scan(
            Cursor::new(""),
            &ScanOptions::default(),
            &LocaleTable::standard(),
        )
        .unwrap();
        assert!(outcome.is_none());
    }

    #[test]
    fn header_only_file_has_untyped_columns() {
        let results = scan_str("id,name\n");
        assert_eq!(results.num_lines(), 0);
        assert_eq!(results.columns().len(), 2);
        assert_eq!(
            results.columns()[0].candidate_type(),
            CandidateType::Boolean
        );
        assert_eq!(results.columns()[0].non_null_count(), 0);
    }

    #[test]
    fn column_names_are_made_unique() {
        let names = unique_column_names(&[
            "id".to_string(),
            " ".to_string(),
            "ID".to_string(),
            "id".to_string(),
        ]);
        assert_eq!(names, vec!["id", "column_2", "ID_2", "id_3"]);
    }

    #[test]
    fn options_reject_reserved_and_conflicting_characters() {
        let reserved = ScanOptions {
            separator: '\\',
            ..ScanOptions::default()
        };
        assert!(matches!(
            reserved.validate(),
            Err(LoadError::ReservedCharacter { .. })
        ));
        let same = ScanOptions {
            separator: '"',
            quote: '"',
            ..ScanOptions::default()
        };
        assert!(matches!(same.validate(), Err(LoadError::InvalidOptions(_))));
        let newline = ScanOptions {
            separator: '\n',
            ..ScanOptions::default()
        };
        assert!(matches!(newline.validate(), Err(LoadError::InvalidOptions(_))));
        assert!(ScanOptions::default().validate().is_ok());
    }

    #[test]
    fn escape_character_is_rejected_in_every_role() {
        let quote = ScanOptions {
            quote: '\\',
            ..ScanOptions::default()
        };
        assert!(matches!(
            quote.validate(),
            Err(LoadError::ReservedCharacter { character: '\\', role: "the quote character" })
        ));
        let null_token = ScanOptions {
            null_token: "N\\A".to_string(),
            ..ScanOptions::default()
        };
        assert!(matches!(
            null_token.validate(),
            Err(LoadError::ReservedCharacter { role: "part of the NULL token", .. })
        ));
    }
}
