//! Turning the model's raw text block into a clean field record.
//!
//! Parsing is line-oriented: every line with a separator becomes a
//! key/value pair, keys are upper-cased, and values that are really just
//! the prompt's `[value]` placeholder echoed back count as not extracted.
//! The output record always carries the complete key set of the category —
//! a field the model skipped is present with an empty value, never absent,
//! so completeness counting downstream is well-defined.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::catalog::{CategorySpec, NormalizeRule};

/// Field name → extracted value. Keys are upper-cased; values may be empty.
pub type FieldRecord = BTreeMap<String, String>;

/// Codes the drawings use as shorthand, expanded to canonical names.
const KNOWN_CODES: &[(&str, &str)] = &[("HLP", "HYD. OIL MINERAL")];

/// Tokens the model returns when a value is absent from the drawing.
const EMPTY_MARKERS: &[&str] = &[
    "N/A",
    "NA",
    "NONE",
    "NOT VISIBLE",
    "NOT AVAILABLE",
    "NOT SPECIFIED",
    "UNKNOWN",
    "-",
];

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\[\s*values?\s*\]").expect("static regex"))
}

fn plus_range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "-10°C +60°C" style: a negative lower bound, then a + upper bound.
    RE.get_or_init(|| {
        Regex::new(r"-\s*\d+(?:\.\d+)?[^+]*\+\s*(\d+(?:\.\d+)?)").expect("static regex")
    })
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Signed: a negative temperature is physically meaningful and must
    // survive normalization.
    RE.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("static regex"))
}

/// Split raw model output into key/value pairs on the first `:` per line.
///
/// Values that still contain a bracketed placeholder are blanked — the
/// model echoed the prompt format instead of answering.
pub fn parse_response(raw_text: &str) -> FieldRecord {
    let mut record = FieldRecord::new();
    for line in raw_text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_uppercase();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        let value = if placeholder_re().is_match(value) { "" } else { value };
        record.insert(key, value.to_string());
    }
    record
}

/// Parse and clean a raw extraction response for one category.
///
/// Every field in the category's spec is guaranteed a key in the result;
/// extra keys the model volunteered are kept as-is.
pub fn normalize(raw_text: &str, spec: &CategorySpec) -> FieldRecord {
    let mut record = parse_response(raw_text);

    for field in &spec.fields {
        let value = record.remove(&field.name).unwrap_or_default();
        let cleaned = clean_value(&value, field.unit.as_deref(), field.rule);
        record.insert(field.name.clone(), cleaned);
    }

    record
}

fn clean_value(value: &str, unit: Option<&str>, rule: Option<NormalizeRule>) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() || is_empty_marker(trimmed) {
        return String::new();
    }
    match rule {
        Some(NormalizeRule::CodeSubstitution) => substitute_code(trimmed),
        Some(NormalizeRule::RangeToMax) => reduce_range(trimmed, unit),
        None => trimmed.to_string(),
    }
}

/// A value that is nothing but a known empty-marker counts as not extracted.
fn is_empty_marker(value: &str) -> bool {
    let upper = value.to_uppercase();
    EMPTY_MARKERS.contains(&upper.as_str())
}

/// Expand an exact-match shorthand code to its canonical name.
fn substitute_code(value: &str) -> String {
    let upper = value.to_uppercase();
    for (code, canonical) in KNOWN_CODES {
        if upper == *code {
            return (*canonical).to_string();
        }
    }
    value.to_string()
}

/// Collapse a range expression to its upper bound with the unit re-applied.
///
/// Handles `"40 TO 50 DEG C"` and `"-10°C +60°C"` forms; an
/// already-scalar value is normalized to `"<number> <unit>"`, which makes
/// the reduction idempotent. Values with no digits at all pass through
/// untouched, and fields configured without a unit are left alone.
fn reduce_range(value: &str, unit: Option<&str>) -> String {
    let Some(unit) = unit else {
        return value.to_string();
    };
    let upper = value.to_uppercase();

    if let Some((_, rhs)) = upper.rsplit_once(" TO ") {
        if let Some(m) = number_re().find(rhs) {
            return format!("{} {}", m.as_str(), unit);
        }
    }

    if let Some(caps) = plus_range_re().captures(&upper) {
        return format!("{} {}", &caps[1], unit);
    }

    if let Some(m) = number_re().find(&upper) {
        return format!("{} {}", m.as_str(), unit);
    }

    value.to_string()
}
