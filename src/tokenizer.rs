//! Streaming record tokenizer.
//!
//! Splits a decoded character stream into records given a one-character
//! separator and quote. A field that starts with the quote character runs to
//! the matching unescaped quote and may span physical lines; a doubled quote
//! inside it is a literal quote. Quoting errors never abort the stream: the
//! record is flagged and tokenizing resumes at the next physical line.

use std::{fmt, io::BufRead};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformation {
    /// The record does not have as many fields as the header.
    FieldCount { expected: usize, found: usize },
    /// A quoted field was still open at end of stream.
    UnterminatedQuote,
    /// A quote appeared inside an unquoted field or right after a closing quote.
    StrayQuote,
}

impl fmt::Display for Malformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Malformation::FieldCount { expected, found } => {
                write!(f, "expected {expected} field(s) but found {found}")
            }
            Malformation::UnterminatedQuote => write!(f, "quoted field is never closed"),
            Malformation::StrayQuote => write!(f, "unescaped quote inside a field"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// 1-based physical line on which the record starts.
    pub line: usize,
    pub fields: Vec<String>,
    pub malformation: Option<Malformation>,
}

impl Record {
    pub fn is_malformed(&self) -> bool {
        self.malformation.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldState {
    Start,
    Unquoted,
    Quoted,
    ClosingQuote,
}

pub struct Tokenizer<R> {
    reader: R,
    separator: char,
    quote: char,
    line: usize,
    buffer: String,
}

impl<R: BufRead> Tokenizer<R> {
    pub fn new(reader: R, separator: char, quote: char) -> Self {
        debug_assert_ne!(separator, quote, "separator and quote must differ");
        Self {
            reader,
            separator,
            quote,
            line: 0,
            buffer: String::new(),
        }
    }

    /// Number of physical lines consumed so far.
    pub fn lines_read(&self) -> usize {
        self.line
    }

    /// Reads the next record, or `None` at end of stream.
    pub fn next_record(&mut self) -> std::io::Result<Option<Record>> {
        if !self.fill_line()? {
            return Ok(None);
        }
        let start_line = self.line;
        let mut fields = Vec::new();
        let mut field = String::new();
        let mut state = FieldState::Start;

        loop {
            let (content, terminator) = split_terminator(&self.buffer);
            for ch in content.chars() {
                state = match state {
                    FieldState::Start if ch == self.quote => FieldState::Quoted,
                    FieldState::Start | FieldState::Unquoted if ch == self.separator => {
                        fields.push(std::mem::take(&mut field));
                        FieldState::Start
                    }
                    FieldState::Start | FieldState::Unquoted if ch == self.quote => {
                        fields.push(field);
                        return Ok(Some(Record {
                            line: start_line,
                            fields,
                            malformation: Some(Malformation::StrayQuote),
                        }));
                    }
                    FieldState::Start | FieldState::Unquoted => {
                        field.push(ch);
                        FieldState::Unquoted
                    }
                    FieldState::Quoted if ch == self.quote => FieldState::ClosingQuote,
                    FieldState::Quoted => {
                        field.push(ch);
                        FieldState::Quoted
                    }
                    FieldState::ClosingQuote if ch == self.quote => {
                        field.push(ch);
                        FieldState::Quoted
                    }
                    FieldState::ClosingQuote if ch == self.separator => {
                        fields.push(std::mem::take(&mut field));
                        FieldState::Start
                    }
                    FieldState::ClosingQuote => {
                        fields.push(field);
                        return Ok(Some(Record {
                            line: start_line,
                            fields,
                            malformation: Some(Malformation::StrayQuote),
                        }));
                    }
                };
            }

            if state != FieldState::Quoted {
                fields.push(field);
                return Ok(Some(Record {
                    line: start_line,
                    fields,
                    malformation: None,
                }));
            }

            // Still inside quotes: the line break belongs to the field.
            field.push_str(terminator);
            if !self.fill_line()? {
                fields.push(field);
                return Ok(Some(Record {
                    line: start_line,
                    fields,
                    malformation: Some(Malformation::UnterminatedQuote),
                }));
            }
        }
    }

    fn fill_line(&mut self) -> std::io::Result<bool> {
        self.buffer.clear();
        let read = self.reader.read_line(&mut self.buffer)?;
        if read == 0 {
            return Ok(false);
        }
        self.line += 1;
        Ok(true)
    }
}

impl<R: BufRead> Iterator for Tokenizer<R> {
    type Item = std::io::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

fn split_terminator(line: &str) -> (&str, &str) {
    if let Some(content) = line.strip_suffix("\r\n") {
        (content, "\r\n")
    } else if let Some(content) = line.strip_suffix('\n') {
        (content, "\n")
    } else if let Some(content) = line.strip_suffix('\r') {
        (content, "\r")
    } else {
        (line, "")
    }
}
