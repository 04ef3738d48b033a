//! Per-column statistics and the single-pass type inference state machine.
//!
//! Every column starts at the most specific candidate ([`CandidateType::Boolean`])
//! and only ever widens. A value that fails under the current candidate
//! widens the column and is retried; values already committed are never
//! revisited. Widening skips rungs that could not hold what was already
//! committed, so the final candidate always accepts every observed value.

use serde::Serialize;

use crate::locale::{self, LocaleTable, NumberShape, TemporalKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateType {
    Boolean,
    Integer,
    Decimal,
    Temporal,
    String,
}

impl CandidateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateType::Boolean => "boolean",
            CandidateType::Integer => "integer",
            CandidateType::Decimal => "decimal",
            CandidateType::Temporal => "temporal",
            CandidateType::String => "string",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TemporalKinds {
    pub date: bool,
    pub time: bool,
    pub timestamp: bool,
}

impl TemporalKinds {
    fn admits(&self, kind: TemporalKind) -> bool {
        match kind {
            TemporalKind::Time => !self.date && !self.timestamp,
            TemporalKind::Date | TemporalKind::Timestamp => !self.time,
        }
    }

    fn record(&mut self, kind: TemporalKind) {
        match kind {
            TemporalKind::Date => self.date = true,
            TemporalKind::Time => self.time = true,
            TemporalKind::Timestamp => self.timestamp = true,
        }
    }

    /// The narrowest kind holding every value seen so far.
    pub fn resolved(&self) -> Option<TemporalKind> {
        if self.time {
            Some(TemporalKind::Time)
        } else if self.timestamp {
            Some(TemporalKind::Timestamp)
        } else if self.date {
            Some(TemporalKind::Date)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    name: String,
    ordinal: usize,
    nullable: bool,
    max_length: usize,
    candidate_type: CandidateType,
    non_null: usize,
    nulls: usize,
    /// Values committed under the current candidate, including carried ones.
    #[serde(skip)]
    accepted: usize,
    #[serde(skip)]
    locale: Option<usize>,
    locale_name: Option<&'static str>,
    /// Set once a committed value only reads correctly under `locale`.
    #[serde(skip)]
    locale_pinned: bool,
    min_value: Option<i128>,
    max_value: Option<i128>,
    integer_digits: u32,
    scale: u32,
    temporal: TemporalKinds,
    /// Every committed temporal value used an ISO layout.
    iso_temporals: bool,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, ordinal: usize) -> Self {
        Self {
            name: name.into(),
            ordinal,
            nullable: false,
            max_length: 0,
            candidate_type: CandidateType::Boolean,
            non_null: 0,
            nulls: 0,
            accepted: 0,
            locale: None,
            locale_name: None,
            locale_pinned: false,
            min_value: None,
            max_value: None,
            integer_digits: 0,
            scale: 0,
            temporal: TemporalKinds::default(),
            iso_temporals: true,
        }
    }

    /// Folds one field of a well-formed record into the column state.
    pub fn observe(&mut self, value: &str, null_token: &str, locales: &LocaleTable) {
        if value.is_empty() || value == null_token {
            self.nullable = true;
            self.nulls += 1;
            return;
        }
        self.non_null += 1;
        self.max_length = self.max_length.max(value.chars().count());

        while !self.try_accept(value, locales) {
            self.widen();
        }
    }

    fn try_accept(&mut self, value: &str, locales: &LocaleTable) -> bool {
        match self.candidate_type {
            CandidateType::String => {
                self.accepted += 1;
                true
            }
            CandidateType::Boolean => {
                if locale::parse_boolean(value).is_some() {
                    self.accepted += 1;
                    true
                } else {
                    false
                }
            }
            CandidateType::Integer => self.accept_with_locale(locales, |column, grammar| {
                let (parsed, shape) = grammar.parse_integer(value)?;
                column.min_value = Some(column.min_value.map_or(parsed, |m| m.min(parsed)));
                column.max_value = Some(column.max_value.map_or(parsed, |m| m.max(parsed)));
                Some(shape.grouped)
            }),
            CandidateType::Decimal => self.accept_with_locale(locales, |column, grammar| {
                let shape: NumberShape = grammar.parse_decimal(value)?;
                column.integer_digits = column.integer_digits.max(shape.integer_digits);
                column.scale = column.scale.max(shape.scale);
                Some(shape.is_locale_specific())
            }),
            CandidateType::Temporal => self.accept_with_locale(locales, |column, grammar| {
                let pattern = grammar.match_temporal(value)?;
                if !column.temporal.admits(pattern.kind) {
                    return None;
                }
                column.temporal.record(pattern.kind);
                column.iso_temporals &= pattern.iso;
                Some(true)
            }),
        }
    }

    /// Tries `parse` under each grammar, the last successful one first.
    /// `parse` updates accumulators on success and reports whether the value
    /// ties the column to that grammar.
    fn accept_with_locale<F>(&mut self, locales: &LocaleTable, mut parse: F) -> bool
    where
        F: FnMut(&mut Self, &locale::LocaleGrammar) -> Option<bool>,
    {
        let order: Vec<usize> = if self.locale_pinned {
            self.locale.into_iter().collect()
        } else {
            locales.trial_order(self.locale).collect()
        };
        for idx in order {
            let Some(grammar) = locales.get(idx) else {
                continue;
            };
            if let Some(specific) = parse(self, grammar) {
                self.locale = Some(idx);
                self.locale_name = Some(grammar.name);
                self.locale_pinned |= specific;
                self.accepted += 1;
                return true;
            }
        }
        false
    }

    fn widen(&mut self) {
        let committed = self.accepted > 0;
        let next = match self.candidate_type {
            CandidateType::Boolean if committed => CandidateType::String,
            CandidateType::Boolean => CandidateType::Integer,
            CandidateType::Integer => {
                // Whole numbers carry over as scale-0 decimals.
                self.integer_digits = [self.min_value, self.max_value]
                    .into_iter()
                    .flatten()
                    .map(digit_count)
                    .max()
                    .unwrap_or(0);
                self.scale = 0;
                CandidateType::Decimal
            }
            CandidateType::Decimal if committed => CandidateType::String,
            CandidateType::Decimal => CandidateType::Temporal,
            CandidateType::Temporal | CandidateType::String => CandidateType::String,
        };
        log::debug!(
            "Column '{}' widened from {} to {}",
            self.name,
            self.candidate_type.as_str(),
            next.as_str()
        );
        self.min_value = None;
        self.max_value = None;
        if next == CandidateType::String {
            self.integer_digits = 0;
            self.scale = 0;
            self.temporal = TemporalKinds::default();
            self.iso_temporals = true;
        }
        self.candidate_type = next;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn candidate_type(&self) -> CandidateType {
        self.candidate_type
    }

    /// Number of non-null values observed.
    pub fn non_null_count(&self) -> usize {
        self.non_null
    }

    pub fn null_count(&self) -> usize {
        self.nulls
    }

    /// Index into the locale table of the grammar that last accepted a value.
    pub fn locale(&self) -> Option<usize> {
        self.locale
    }

    pub fn locale_name(&self) -> Option<&'static str> {
        self.locale_name
    }

    /// True when some committed value only reads correctly under [`Self::locale`].
    pub fn is_locale_specific(&self) -> bool {
        self.locale_pinned
    }

    /// Observed integer range while the column is integer-typed.
    pub fn integer_range(&self) -> Option<(i128, i128)> {
        Some((self.min_value?, self.max_value?))
    }

    /// `(integer digits, fractional digits)` while the column is decimal-typed.
    pub fn decimal_digits(&self) -> (u32, u32) {
        (self.integer_digits, self.scale)
    }

    pub fn temporal_kind(&self) -> Option<TemporalKind> {
        self.temporal.resolved()
    }

    pub fn has_iso_temporals(&self) -> bool {
        self.iso_temporals
    }
}

fn digit_count(value: i128) -> u32 {
    let magnitude = value.unsigned_abs();
    if magnitude == 0 {
        0
    } else {
        magnitude.ilog10() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observe_all(values: &[&str]) -> ColumnInfo {
        let locales = LocaleTable::standard();
        let mut column = ColumnInfo::new("c", 0);
        for value in values {
            column.observe(value, "", &locales);
        }
        column
    }

    #[test]
    fn empty_value_marks_nullable_without_typing() {
        let column = observe_all(&["1", "", "3"]);
        assert!(column.nullable());
        assert_eq!(column.candidate_type(), CandidateType::Integer);
        assert_eq!(column.integer_range(), Some((1, 3)));
        assert_eq!(column.null_count(), 1);
    }

    #[test]
    fn null_token_is_treated_as_null() {
        let locales = LocaleTable::standard();
        let mut column = ColumnInfo::new("c", 0);
        column.observe("NULL", "NULL", &locales);
        column.observe("7", "NULL", &locales);
        assert!(column.nullable());
        assert_eq!(column.candidate_type(), CandidateType::Integer);
        assert_eq!(column.max_length(), 1);
    }

    #[test]
    fn booleans_stay_boolean() {
        let column = observe_all(&["true", "FALSE", "True"]);
        assert_eq!(column.candidate_type(), CandidateType::Boolean);
        assert!(!column.nullable());
    }

    #[test]
    fn committed_booleans_skip_numeric_rungs() {
        let column = observe_all(&["true", "5"]);
        assert_eq!(column.candidate_type(), CandidateType::String);
    }

    #[test]
    fn integers_widen_to_decimal_and_carry_digits() {
        let column = observe_all(&["12345", "-2", "1.25"]);
        assert_eq!(column.candidate_type(), CandidateType::Decimal);
        assert_eq!(column.decimal_digits(), (5, 2));
        assert_eq!(column.integer_range(), None);
    }

    #[test]
    fn late_text_value_widens_whole_column_to_string() {
        let column = observe_all(&["1", "2", "3", "n/a"]);
        assert_eq!(column.candidate_type(), CandidateType::String);
        assert_eq!(column.max_length(), 3);
    }

    #[test]
    fn dates_and_timestamps_share_a_column() {
        let column = observe_all(&["2024-01-02", "2024-01-03 10:00:00"]);
        assert_eq!(column.candidate_type(), CandidateType::Temporal);
        assert_eq!(column.temporal_kind(), Some(TemporalKind::Timestamp));
    }

    #[test]
    fn one_local_date_clears_the_iso_flag() {
        let column = observe_all(&["2024-01-02", "2024-01-03"]);
        assert!(column.has_iso_temporals());

        let column = observe_all(&["2024-01-02", "03.01.2024"]);
        assert_eq!(column.candidate_type(), CandidateType::String);
        let column = observe_all(&["01/02/2024", "2024-01-03"]);
        assert_eq!(column.candidate_type(), CandidateType::Temporal);
        assert!(!column.has_iso_temporals());
    }

    #[test]
    fn times_cannot_mix_with_dates() {
        let column = observe_all(&["2024-01-02", "10:30"]);
        assert_eq!(column.candidate_type(), CandidateType::String);
    }

    #[test]
    fn locale_is_pinned_once_a_separator_commits_it() {
        let column = observe_all(&["1,5", "2,25"]);
        assert_eq!(column.candidate_type(), CandidateType::Decimal);
        assert_eq!(column.locale_name(), Some("de_DE"));
        assert_eq!(column.decimal_digits(), (1, 2));

        // "3.5" only reads as a decimal under en_US, which the column can no longer use.
        let column = observe_all(&["1,5", "3.5"]);
        assert_eq!(column.candidate_type(), CandidateType::String);
    }

    #[test]
    fn plain_digits_do_not_pin_a_locale() {
        let column = observe_all(&["12", "1.000"]);
        assert_eq!(column.candidate_type(), CandidateType::Integer);
        assert_eq!(column.locale_name(), Some("de_DE"));
        assert_eq!(column.integer_range(), Some((12, 1000)));
    }

    #[test]
    fn max_length_counts_characters() {
        let column = observe_all(&["café", "ab"]);
        assert_eq!(column.max_length(), 4);
        assert_eq!(column.candidate_type(), CandidateType::String);
    }

    #[test]
    fn digit_count_handles_extremes() {
        assert_eq!(digit_count(0), 0);
        assert_eq!(digit_count(-999), 3);
        assert_eq!(digit_count(i128::MIN), 39);
    }
}
