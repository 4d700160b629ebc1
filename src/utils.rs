use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

/// Accepted close-date layouts, tried in order.
pub const CLOSE_DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// Sortable capture timestamp used in export file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const CURRENCY_SYMBOLS: [char; 4] = ['$', '€', '£', '¥'];

/// Outcome of reading a money cell.
#[derive(Debug, Clone, PartialEq)]
pub enum AmountCell {
    Absent,
    Value(f64),
    /// Non-empty cell that is not a number after cleaning; holds the raw text.
    Unparseable(String),
}

impl AmountCell {
    pub fn value(&self) -> Option<f64> {
        match self {
            AmountCell::Value(v) => Some(*v),
            _ => None,
        }
    }
}

/// Classify a raw cell as an amount.
///
/// Numbers are taken as-is. Strings lose currency symbols, thousands
/// separators and surrounding whitespace before parsing. Currency objects
/// (`{"amount": 12.5, "currency": "USD"}`) are unwrapped to their `amount`.
pub fn classify_amount(value: Option<&Value>) -> AmountCell {
    match value {
        None | Some(Value::Null) => AmountCell::Absent,
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) if v.is_finite() => AmountCell::Value(v),
            _ => AmountCell::Unparseable(n.to_string()),
        },
        Some(Value::String(s)) => classify_amount_str(s),
        Some(Value::Object(map)) => match map.get("amount") {
            Some(inner) => classify_amount(Some(inner)),
            None => AmountCell::Unparseable(Value::Object(map.clone()).to_string()),
        },
        Some(other) => AmountCell::Unparseable(other.to_string()),
    }
}

fn classify_amount_str(raw: &str) -> AmountCell {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return AmountCell::Absent;
    }

    let cleaned: String = trimmed
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace() && !CURRENCY_SYMBOLS.contains(c))
        .collect();

    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => AmountCell::Value(v),
        _ => AmountCell::Unparseable(raw.to_string()),
    }
}

/// Lenient amount read: anything missing or unparseable is 0.
pub fn amount_or_zero(value: Option<&Value>) -> f64 {
    classify_amount(value).value().unwrap_or(0.0)
}

/// Text content of a classification cell. Empty strings count as absent.
pub fn cell_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

pub fn parse_close_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    CLOSE_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Split a combined `"<quarter> <year>"` label into its parts.
pub fn split_fiscal_period(raw: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(raw) = raw else {
        return (None, None);
    };
    let mut tokens = raw.split_whitespace();
    let quarter = tokens.next().map(str::to_string);
    let year = tokens.next().map(str::to_string);
    (quarter, year)
}

/// Integer percentage from a probability cell (`40`, `"40"`, `"40%"`, `40.0`).
pub fn parse_probability(value: Option<&Value>) -> Option<u32> {
    let number = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if number.is_finite() && number >= 0.0 {
        Some(number.round() as u32)
    } else {
        None
    }
}

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}
