// Cell parsing and basic statistics.
//
// Every raw cell goes through one of the `parse_*_cell` functions. They
// return `Ok(None)` for a blank cell and `Err` for text that cannot be read;
// the normalizer decides what an error turns into.
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use num_format::{Locale, ToFormattedString};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellError {
    pub kind: &'static str,
    pub text: String,
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot read {:?} as {}", self.text, self.kind)
    }
}

impl std::error::Error for CellError {}

fn cell_error(kind: &'static str, text: &str) -> CellError {
    CellError { kind, text: text.to_string() }
}

/// Trim a cell and treat empty text as missing.
fn non_blank(s: Option<&str>) -> Option<&str> {
    let s = s?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

static BOOL_TOKENS: Lazy<HashMap<&'static str, bool>> = Lazy::new(|| {
    [
        ("true", true),
        ("t", true),
        ("yes", true),
        ("y", true),
        ("1", true),
        ("1.0", true),
        ("false", false),
        ("f", false),
        ("no", false),
        ("n", false),
        ("0", false),
        ("0.0", false),
    ]
    .into_iter()
    .collect()
});

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Parse a numeric cell while being forgiving about formatting issues that
/// are common in CSV exports.
///
/// - Trims whitespace.
/// - Rejects values that contain alphabetic characters (this also rules out
///   `NaN` and `inf`).
/// - Strips thousands separators like `"1,234.50"` before parsing. A comma
///   that does not start a group of exactly three integer digits (`"12,50"`)
///   makes the cell unreadable.
pub fn parse_f64_cell(s: Option<&str>) -> Result<Option<f64>, CellError> {
    let Some(s) = non_blank(s) else { return Ok(None) };
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(cell_error("number", s));
    }
    let digits = strip_thousands(s).ok_or_else(|| cell_error("number", s))?;
    match digits.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(cell_error("number", s)),
    }
}

/// Drop `,` thousands separators, or `None` if the commas are not grouping
/// the integer part in threes.
fn strip_thousands(s: &str) -> Option<String> {
    if !s.contains(',') {
        return Some(s.to_string());
    }
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (s, None),
    };
    if frac_part.is_some_and(|f| f.contains(',')) {
        return None;
    }
    let unsigned = int_part.trim_start_matches(['-', '+']);
    let mut groups = unsigned.split(',');
    let lead = groups.next().unwrap_or_default();
    if lead.is_empty() || lead.len() > 3 || !lead.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !groups.all(|g| g.len() == 3 && g.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }
    Some(s.replace(',', ""))
}

/// Parse a tri-state flag. Blank is missing, never false.
pub fn parse_bool_cell(s: Option<&str>) -> Result<Option<bool>, CellError> {
    let Some(s) = non_blank(s) else { return Ok(None) };
    BOOL_TOKENS
        .get(s.to_ascii_lowercase().as_str())
        .copied()
        .map(Some)
        .ok_or_else(|| cell_error("boolean", s))
}

/// Parse a timestamp. Date-only values land on midnight; RFC 3339 values
/// are converted to UTC before dropping the offset.
pub fn parse_datetime_cell(s: Option<&str>) -> Result<Option<NaiveDateTime>, CellError> {
    let Some(s) = non_blank(s) else { return Ok(None) };
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d.and_hms_opt(0, 0, 0));
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Some(dt));
        }
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| Some(dt.naive_utc()))
        .map_err(|_| cell_error("date", s))
}

/// Whole days from `start` to `end`, floored (so -1.5 days is -2).
pub fn days_diff(start: NaiveDateTime, end: NaiveDateTime) -> i64 {
    let delta = end - start;
    let days = delta.num_days();
    if delta < Duration::days(days) {
        days - 1
    } else {
        days
    }
}

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(v: &[f64]) -> Option<f64> {
    if v.is_empty() {
        return None;
    }
    let sum: f64 = v.iter().copied().sum();
    Some(sum / v.len() as f64)
}

pub fn median(mut v: Vec<f64>) -> Option<f64> {
    // Takes the Vec by value so it can be sorted in place.
    if v.is_empty() {
        return None;
    }
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = v.len() / 2;
    if v.len() % 2 == 1 {
        Some(v[mid])
    } else {
        Some((v[mid - 1] + v[mid]) / 2.0)
    }
}

/// `part * 100 / whole`, or `None` when `whole` is zero.
pub fn percent(part: usize, whole: usize) -> Option<f64> {
    if whole == 0 {
        None
    } else {
        Some(part as f64 * 100.0 / whole as f64)
    }
}

/// Fixed decimals with locale thousands separators, e.g. `1,234,567.89`.
pub fn format_number(n: f64, decimals: usize) -> String {
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        res.push('.');
        res.push_str(frac);
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}
