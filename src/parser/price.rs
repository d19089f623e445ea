use serde::Serialize;
use tracing::warn;

const CURRENCY_SYMBOLS: &[char] = &['€'];

/// Outcome of converting one `Avg_price` cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriceCell {
    /// Minor units (cents), digits concatenated as printed.
    Amount { cents: u64 },
    /// The table's "no data" marker.
    Unknown,
    Malformed { raw: String, cleaned: String },
}

impl PriceCell {
    pub fn amount(&self) -> Option<u64> {
        match self {
            PriceCell::Amount { cents } => Some(*cents),
            PriceCell::Unknown | PriceCell::Malformed { .. } => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, PriceCell::Malformed { .. })
    }
}

/// Convert a locale-formatted price ("1.234,56 €") to minor units.
///
/// `.` and `,` are grouping punctuation only, so the result is the digit
/// concatenation of the printed value: "12.345,00" becomes 1234500.
pub fn parse_price(raw: &str) -> PriceCell {
    let cleaned = clean_price(raw);
    if !cleaned.is_empty() && cleaned.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(cents) = cleaned.parse::<u64>() {
            return PriceCell::Amount { cents };
        }
    }

    warn!(
        "Cannot parse value \"{}\" as price (\"{}\" after clearing), treating as absent",
        raw, cleaned
    );
    PriceCell::Malformed {
        raw: raw.to_string(),
        cleaned,
    }
}

/// Convert a cell, honouring the unknown-price marker before parsing.
pub fn convert_cell(raw: &str, unknown_marker: &str) -> PriceCell {
    if raw.trim() == unknown_marker {
        PriceCell::Unknown
    } else {
        parse_price(raw)
    }
}

fn clean_price(raw: &str) -> String {
    let without_punct: String = raw.chars().filter(|c| *c != '.' && *c != ',').collect();
    let digits = without_punct
        .trim()
        .trim_end_matches(CURRENCY_SYMBOLS)
        .trim();

    if !digits.is_empty() && digits.bytes().all(|b| b == b'0') {
        "0".to_string()
    } else {
        digits.trim_start_matches('0').to_string()
    }
}

// ── Tests ──
