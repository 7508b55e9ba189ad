//! Dimension extraction from free text
//!
//! Patterns are tried in order and the first match wins. A match is
//! normalized to the canonical form: components joined by a bare `x`,
//! followed by lowercase `cm` with no space (`90x55x30cm`).

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::types::Dimension;

const NUM: &str = r"(\d+(?:\.\d+)?)";
const SEP: &str = r"\s*[x×*]\s*";

fn cascade() -> &'static [Regex; 4] {
    static PATTERNS: OnceLock<[Regex; 4]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let build = |pattern: String| Regex::new(&format!("(?i){}", pattern)).unwrap();
        [
            // 90 x 55 x 30 cm
            build(format!(r"{NUM}{SEP}{NUM}{SEP}{NUM}\s*cm")),
            // 90 x 55 cm
            build(format!(r"{NUM}{SEP}{NUM}\s*cm")),
            // W 90 x D 55 x H 30 cm
            build(format!(
                r"W\s*:?\s*{NUM}{SEP}D\s*:?\s*{NUM}{SEP}H\s*:?\s*{NUM}\s*cm"
            )),
            // Length 120 x Width 60 x Height 75 cm
            build(format!(
                r"Length\s*:?\s*{NUM}{SEP}Width\s*:?\s*{NUM}{SEP}Height\s*:?\s*{NUM}\s*cm"
            )),
        ]
    })
}

/// Extract a canonical dimension string from arbitrary text.
pub fn extract(text: &str) -> Dimension {
    if text.trim().is_empty() {
        return Dimension::NotFound;
    }

    for pattern in cascade() {
        if let Some(caps) = pattern.captures(text) {
            let parts: Vec<&str> = caps
                .iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str())
                .collect();
            return Dimension::Found(format!("{}cm", parts.join("x")));
        }
    }

    Dimension::NotFound
}

/// Same as [`extract`] for a JSON field; anything but a string counts as empty
pub fn extract_value(value: Option<&Value>) -> Dimension {
    match value {
        Some(Value::String(s)) => extract(s),
        _ => Dimension::NotFound,
    }
}

/// True when the whole string is already in canonical form
pub fn is_canonical(value: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^\d+(?:\.\d+)?(?:x\d+(?:\.\d+)?){1,2}cm$").unwrap());
    re.is_match(value)
}

/// Raw `A x B cm` fragments found in text, as written on the page
pub fn candidates(text: &str, limit: usize) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)\d+(?:\.\d+)?\s*[x×*]\s*\d+(?:\.\d+)?\s*cm").unwrap());
    re.find_iter(text)
        .take(limit)
        .map(|m| m.as_str().to_string())
        .collect()
}
