//! Lenient value parsing shared by ingestion, record coercion and LLM output handling.

use std::sync::LazyLock;

use regex::Regex;

static FRACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(-?\d+(?:\.\d+)?)\s*/\s*(\d+(?:\.\d+)?)$").expect("valid fraction regex")
});

/// Normalise a textual score to a raw number.
///
/// Accepts plain numbers, `"85/100"`, `"90%"`, and the qualitative tokens
/// `High`/`Strong` (90), `Medium`/`Moderate` (70), `Low`/`Weak` (30).
pub fn coerce_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    match s.to_ascii_lowercase().as_str() {
        "high" | "strong" => return Some(90.0),
        "medium" | "moderate" => return Some(70.0),
        "low" | "weak" => return Some(30.0),
        _ => {}
    }

    if let Some(caps) = FRACTION.captures(s) {
        let num: f64 = caps[1].parse().ok()?;
        let den: f64 = caps[2].parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num * 100.0 / den);
    }

    if let Some(pct) = s.strip_suffix('%') {
        return pct.trim().parse().ok();
    }

    parse_amount(s)
}

/// Parse a numeric column leniently: `"$1,200,000"`, `"120"`, `" 4.5 "`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '_' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a head-count column; ranges such as `"51-200"` take the upper bound.
pub fn parse_count(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let last = raw.rsplit('-').next().unwrap_or(raw);
    parse_amount(last)
        .filter(|v| *v >= 0.0)
        .map(|v| v.round() as u64)
}

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Split a comma/semicolon separated cell into trimmed, non-empty items.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
