//! Locale grammars used to read numeric and temporal fields.
//!
//! A [`LocaleTable`] is an ordered list of [`LocaleGrammar`]s tried in
//! priority order. Parsing under a grammar is pure and total: every helper
//! returns `None` for text it does not accept.

use std::sync::{Arc, OnceLock};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemporalKind {
    Date,
    Time,
    Timestamp,
}

#[derive(Debug, Clone, Copy)]
pub struct TemporalPattern {
    pub format: &'static str,
    pub kind: TemporalKind,
    /// ISO 8601 layout, the only one the server parses on load.
    pub iso: bool,
}

const fn iso(format: &'static str, kind: TemporalKind) -> TemporalPattern {
    TemporalPattern {
        format,
        kind,
        iso: true,
    }
}

const fn pattern(format: &'static str, kind: TemporalKind) -> TemporalPattern {
    TemporalPattern {
        format,
        kind,
        iso: false,
    }
}

const ISO_PATTERNS: &[TemporalPattern] = &[
    iso("%Y-%m-%d %H:%M:%S%.f", TemporalKind::Timestamp),
    iso("%Y-%m-%dT%H:%M:%S%.f", TemporalKind::Timestamp),
    iso("%Y-%m-%d %H:%M", TemporalKind::Timestamp),
    iso("%Y-%m-%d", TemporalKind::Date),
    iso("%H:%M:%S%.f", TemporalKind::Time),
    iso("%H:%M", TemporalKind::Time),
];

const US_PATTERNS: &[TemporalPattern] = &[
    pattern("%m/%d/%Y %H:%M:%S", TemporalKind::Timestamp),
    pattern("%m/%d/%Y %H:%M", TemporalKind::Timestamp),
    pattern("%m/%d/%Y", TemporalKind::Date),
];

const GERMAN_PATTERNS: &[TemporalPattern] = &[
    pattern("%d.%m.%Y %H:%M:%S", TemporalKind::Timestamp),
    pattern("%d.%m.%Y %H:%M", TemporalKind::Timestamp),
    pattern("%d.%m.%Y", TemporalKind::Date),
];

const FRENCH_PATTERNS: &[TemporalPattern] = &[
    pattern("%d/%m/%Y %H:%M:%S", TemporalKind::Timestamp),
    pattern("%d/%m/%Y %H:%M", TemporalKind::Timestamp),
    pattern("%d/%m/%Y", TemporalKind::Date),
];

/// Shape of a number accepted by a grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberShape {
    /// Significant digits before the decimal separator (`0.5` has none).
    pub integer_digits: u32,
    /// Digits after the decimal separator.
    pub scale: u32,
    /// Whether thousands separators were present.
    pub grouped: bool,
}

impl NumberShape {
    /// True when the text only reads this way under grammars sharing this
    /// grammar's separators.
    pub fn is_locale_specific(&self) -> bool {
        self.grouped || self.scale > 0
    }
}

#[derive(Debug, Clone)]
pub struct LocaleGrammar {
    pub name: &'static str,
    pub decimal_separator: char,
    pub thousands_separator: Option<char>,
    pub temporal_patterns: Vec<TemporalPattern>,
}

impl LocaleGrammar {
    /// Parses a whole number, returning its value and shape.
    pub fn parse_integer(&self, text: &str) -> Option<(i128, NumberShape)> {
        let scanned = self.scan_number(text)?;
        if scanned.fraction.is_some() {
            return None;
        }
        let mut value: i128 = 0;
        for digit in scanned.digits.bytes() {
            value = value
                .checked_mul(10)?
                .checked_add(i128::from(digit - b'0'))?;
        }
        if scanned.negative {
            value = -value;
        }
        Some((value, scanned.shape()))
    }

    /// Parses a fixed-point number. Whole numbers are accepted with scale 0.
    pub fn parse_decimal(&self, text: &str) -> Option<NumberShape> {
        self.scan_number(text).map(|scanned| scanned.shape())
    }

    /// Returns the kind of the first temporal pattern that accepts `text`.
    pub fn parse_temporal(&self, text: &str) -> Option<TemporalKind> {
        self.match_temporal(text).map(|pattern| pattern.kind)
    }

    /// The first temporal pattern that accepts `text`.
    pub fn match_temporal(&self, text: &str) -> Option<&TemporalPattern> {
        self.temporal_patterns
            .iter()
            .find(|pattern| match pattern.kind {
                TemporalKind::Date => NaiveDate::parse_from_str(text, pattern.format).is_ok(),
                TemporalKind::Time => NaiveTime::parse_from_str(text, pattern.format).is_ok(),
                TemporalKind::Timestamp => {
                    NaiveDateTime::parse_from_str(text, pattern.format).is_ok()
                }
            })
    }

    /// True when both grammars read numbers with the same separators.
    pub fn same_separators(&self, other: &LocaleGrammar) -> bool {
        self.decimal_separator == other.decimal_separator
            && self.thousands_separator == other.thousands_separator
    }

    fn scan_number<'a>(&self, text: &'a str) -> Option<ScannedNumber<'a>> {
        let (negative, unsigned) = match text.as_bytes().first()? {
            b'-' => (true, &text[1..]),
            b'+' => (false, &text[1..]),
            _ => (false, text),
        };
        let (integer_part, fraction) = match unsigned.split_once(self.decimal_separator) {
            Some((integer, fraction)) => {
                if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                (integer, Some(fraction))
            }
            None => (unsigned, None),
        };
        if integer_part.is_empty() {
            return None;
        }

        let mut grouped = false;
        let digits = match self.thousands_separator {
            Some(sep) if integer_part.contains(sep) => {
                let mut groups = integer_part.split(sep);
                let first = groups.next()?;
                if first.is_empty() || first.len() > 3 {
                    return None;
                }
                let mut joined = first.to_string();
                for group in groups {
                    if group.len() != 3 {
                        return None;
                    }
                    joined.push_str(group);
                }
                grouped = true;
                joined
            }
            _ => integer_part.to_string(),
        };
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if digits.len() > 1 && digits.starts_with('0') {
            return None;
        }
        Some(ScannedNumber {
            negative,
            digits,
            fraction,
            grouped,
        })
    }
}

struct ScannedNumber<'a> {
    negative: bool,
    digits: String,
    fraction: Option<&'a str>,
    grouped: bool,
}

impl ScannedNumber<'_> {
    fn shape(&self) -> NumberShape {
        let integer_digits = if self.digits == "0" {
            0
        } else {
            self.digits.len() as u32
        };
        NumberShape {
            integer_digits,
            scale: self.fraction.map(|f| f.len() as u32).unwrap_or(0),
            grouped: self.grouped,
        }
    }
}

/// Accepts `true`/`false` in any letter case. Locale independent.
pub fn parse_boolean(text: &str) -> Option<bool> {
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct LocaleTable {
    grammars: Vec<LocaleGrammar>,
}

impl LocaleTable {
    pub fn new(grammars: Vec<LocaleGrammar>) -> Self {
        Self { grammars }
    }

    /// The built-in table: C/English first, then German, then French.
    pub fn standard() -> Self {
        let with_iso = |extra: &[TemporalPattern]| {
            ISO_PATTERNS
                .iter()
                .chain(extra.iter())
                .copied()
                .collect::<Vec<_>>()
        };
        Self::new(vec![
            LocaleGrammar {
                name: "en_US",
                decimal_separator: '.',
                thousands_separator: Some(','),
                temporal_patterns: with_iso(US_PATTERNS),
            },
            LocaleGrammar {
                name: "de_DE",
                decimal_separator: ',',
                thousands_separator: Some('.'),
                temporal_patterns: with_iso(GERMAN_PATTERNS),
            },
            LocaleGrammar {
                name: "fr_FR",
                decimal_separator: ',',
                thousands_separator: Some(' '),
                temporal_patterns: with_iso(FRENCH_PATTERNS),
            },
        ])
    }

    pub fn grammars(&self) -> &[LocaleGrammar] {
        &self.grammars
    }

    pub fn get(&self, index: usize) -> Option<&LocaleGrammar> {
        self.grammars.get(index)
    }

    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }

    /// Grammar indices in trial order, with `preferred` moved to the front.
    pub fn trial_order(&self, preferred: Option<usize>) -> impl Iterator<Item = usize> + '_ {
        let preferred = preferred.filter(|idx| *idx < self.grammars.len());
        preferred
            .into_iter()
            .chain((0..self.grammars.len()).filter(move |idx| Some(*idx) != preferred))
    }
}

static LOCALES: OnceLock<Arc<LocaleTable>> = OnceLock::new();

/// Builds the process-wide locale table on first use and hands out shared references.
pub fn initialize_locales() -> Arc<LocaleTable> {
    LOCALES
        .get_or_init(|| Arc::new(LocaleTable::standard()))
        .clone()
}
