//! Product record types shared by the fill and finish passes

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys that may hold a product name, in precedence order
pub const NAME_KEYS: &[&str] = &["Product Name", "name", "Name"];
/// Keys that may hold a dimension string, in precedence order
pub const DIMENSION_KEYS: &[&str] = &["Dimensions", "dimension", "Dimension"];
/// Keys that may hold a price, in precedence order
pub const PRICE_KEYS: &[&str] = &["Price", "price"];
/// Keys that may hold the product page URL, in precedence order
pub const URL_KEYS: &[&str] = &["Product URL", "ProductURL", "url"];

/// Key a newly found dimension is written to when no alias is present
pub const DEFAULT_DIMENSION_KEY: &str = "Dimensions";

/// Values upstream scrapers write when a dimension could not be found
const MISSING_SENTINELS: &[&str] = &["n/a", "not found"];

/// Written into batch files for a dimension that could not be found
pub const NOT_FOUND: &str = "N/A";

/// Result of a dimension lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dimension {
    /// Canonical form, e.g. `90x55x30cm`
    Found(String),
    NotFound,
}

impl Dimension {
    pub fn is_found(&self) -> bool {
        matches!(self, Dimension::Found(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Dimension::Found(s) => s,
            Dimension::NotFound => NOT_FOUND,
        }
    }

    /// Canonical string, or empty for a miss (catalog representation)
    pub fn into_catalog_value(self) -> String {
        match self {
            Dimension::Found(s) => s,
            Dimension::NotFound => String::new(),
        }
    }

    /// Keep the first hit, otherwise evaluate the next source
    pub fn or_else(self, next: impl FnOnce() -> Dimension) -> Dimension {
        match self {
            Dimension::Found(_) => self,
            Dimension::NotFound => next(),
        }
    }
}

/// True for empty values and the sentinels scrapers leave behind
pub fn is_missing(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || MISSING_SENTINELS
            .iter()
            .any(|s| trimmed.eq_ignore_ascii_case(s))
}

/// A scraped product record.
///
/// Keeps every upstream field in its original order so a batch file can be
/// written back without losing data; the logical fields are read through the
/// alias key lists above.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        // Map::insert keeps the position of an existing key
        self.0.insert(key.to_string(), value.into());
    }

    /// First alias whose value is a non-empty string, with its key
    pub fn first_text<'a>(&'a self, keys: &[&'static str]) -> Option<(&'static str, &'a str)> {
        keys.iter().find_map(|key| match self.0.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => Some((*key, s.as_str())),
            _ => None,
        })
    }

    pub fn name(&self) -> &str {
        self.first_text(NAME_KEYS).map(|(_, v)| v).unwrap_or("")
    }

    pub fn url(&self) -> &str {
        self.first_text(URL_KEYS).map(|(_, v)| v).unwrap_or("")
    }

    /// First dimension alias holding something other than an empty value or
    /// a sentinel
    pub fn present_dimension(&self) -> Option<(&'static str, &str)> {
        DIMENSION_KEYS.iter().find_map(|key| match self.0.get(*key) {
            Some(Value::String(s)) if !is_missing(s) => Some((*key, s.as_str())),
            _ => None,
        })
    }

    /// Price passed through as-is; null and empty strings fall through to
    /// the next alias
    pub fn price(&self) -> Value {
        PRICE_KEYS
            .iter()
            .find_map(|key| match self.0.get(*key) {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) if s.is_empty() => None,
                Some(v) => Some(v.clone()),
            })
            .unwrap_or_else(|| Value::String(String::new()))
    }
}

/// One row of the merged catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Dimension")]
    pub dimension: String,
    #[serde(rename = "Price")]
    pub price: Value,
    #[serde(rename = "Type")]
    pub product_type: String,
    #[serde(rename = "SubType")]
    pub sub_type: String,
    #[serde(rename = "Brand")]
    pub brand: String,
    #[serde(rename = "ProductURL")]
    pub product_url: String,
}

impl CatalogEntry {
    pub const CSV_HEADER: [&'static str; 8] = [
        "ID",
        "Name",
        "Dimension",
        "Price",
        "Type",
        "SubType",
        "Brand",
        "ProductURL",
    ];

    /// Price rendered for a CSV cell
    pub fn price_text(&self) -> String {
        match &self.price {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    pub fn csv_row(&self) -> [String; 8] {
        [
            self.id.clone(),
            self.name.clone(),
            self.dimension.clone(),
            self.price_text(),
            self.product_type.clone(),
            self.sub_type.clone(),
            self.brand.clone(),
            self.product_url.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_alias_precedence() {
        let r = record(json!({
            "Name": "third",
            "name": "second",
            "Product Name": "first",
        }));
        assert_eq!(r.name(), "first");

        let r = record(json!({ "Name": "third", "name": "" }));
        assert_eq!(r.name(), "third");
    }

    #[test]
    fn test_present_dimension_skips_sentinels() {
        let r = record(json!({
            "Dimensions": "N/A",
            "dimension": "",
            "Dimension": "90x55cm",
        }));
        assert_eq!(r.present_dimension(), Some(("Dimension", "90x55cm")));

        let r = record(json!({ "Dimensions": "not found" }));
        assert_eq!(r.present_dimension(), None);
    }

    #[test]
    fn test_non_string_values_are_ignored() {
        let r = record(json!({ "Dimensions": 42, "dimension": null }));
        assert_eq!(r.present_dimension(), None);
    }

    #[test]
    fn test_price_passthrough() {
        let r = record(json!({ "Price": null, "price": 1299 }));
        assert_eq!(r.price(), json!(1299));
        let r = record(json!({ "Price": "Rs. 4,990" }));
        assert_eq!(r.price(), json!("Rs. 4,990"));
        assert_eq!(record(json!({})).price(), json!(""));
    }

    #[test]
    fn test_set_keeps_field_order() {
        let mut r = record(json!({ "a": 1, "Dimensions": "", "b": 2 }));
        r.set("Dimensions", "10x20cm");
        let keys: Vec<&String> = r.fields().keys().collect();
        assert_eq!(keys, ["a", "Dimensions", "b"]);
    }

    #[test]
    fn test_is_missing() {
        assert!(is_missing(""));
        assert!(is_missing("  "));
        assert!(is_missing(" n/a "));
        assert!(is_missing("Not Found"));
        assert!(!is_missing("90x55cm"));
    }
}
