//! I/O utilities for reading the source file.
//!
//! - **Encoding**: input decoding via `encoding_rs`/`encoding_rs_io`,
//!   defaulting to UTF-8 with BOM sniffing.
//! - **Readers**: `open_decoded_reader` yields UTF-8 text for the tokenizer
//!   and for streaming rows to an external client.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use anyhow::{Result, anyhow};
use encoding_rs::{Encoding, UTF_8};
use encoding_rs_io::{DecodeReaderBytes, DecodeReaderBytesBuilder};

pub type DecodedReader = BufReader<DecodeReaderBytes<File, Vec<u8>>>;

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

/// The encoding [`open_decoded_reader`] will decode `path` with: a
/// byte-order mark at the start of the file wins over `encoding`.
pub fn detect_encoding(
    path: &Path,
    encoding: &'static Encoding,
) -> std::io::Result<&'static Encoding> {
    let mut head = Vec::with_capacity(3);
    File::open(path)?.take(3).read_to_end(&mut head)?;
    Ok(Encoding::for_bom(&head).map_or(encoding, |(detected, _)| detected))
}

/// Opens `path` and decodes it to UTF-8. A byte-order mark overrides `encoding`.
pub fn open_decoded_reader(
    path: &Path,
    encoding: &'static Encoding,
) -> std::io::Result<DecodedReader> {
    let file = File::open(path)?;
    Ok(BufReader::new(decode(file, encoding)))
}

fn decode<R: Read>(reader: R, encoding: &'static Encoding) -> DecodeReaderBytes<R, Vec<u8>> {
    DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding))
        .bom_override(true)
        .strip_bom(true)
        .build(reader)
}

pub fn printable_char(value: char) -> String {
    match value {
        '\t' => "\\t".to_string(),
        '\n' => "\\n".to_string(),
        '\r' => "\\r".to_string(),
        other => other.to_string(),
    }
}
