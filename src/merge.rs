//! Combine per-category batches into one catalog

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::batch::{self, write_json_atomic, Batch, BatchError};
use crate::config::CategoryTable;
use crate::dimensions::{extract, is_canonical};
use crate::types::{CatalogEntry, Record};

/// Invisible formatting characters scraped pages leave in text: zero-width
/// space, LRM/RLM, bidi embeddings and overrides, bidi isolates, BOM
const INVISIBLE_CHARS: &[char] = &[
    '\u{200B}', '\u{200E}', '\u{200F}', '\u{202A}', '\u{202B}', '\u{202C}', '\u{202D}',
    '\u{202E}', '\u{2066}', '\u{2067}', '\u{2068}', '\u{2069}', '\u{FEFF}',
];

/// Strip invisible formatting characters, then trim whitespace
pub fn clean_text(text: &str) -> String {
    text.chars()
        .filter(|c| !INVISIBLE_CHARS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Catalog form of a stored dimension value: canonical values are kept,
/// anything else is re-extracted; a miss becomes an empty string
pub fn catalog_dimension(raw: &str) -> String {
    let cleaned = clean_text(raw);
    if is_canonical(&cleaned) {
        return cleaned;
    }
    extract(&cleaned).into_catalog_value()
}

pub fn format_id(seq: usize) -> String {
    format!("I-{:04}", seq)
}

pub struct MergeOptions<'a> {
    pub brand: &'a str,
    pub categories: &'a CategoryTable,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub origin: String,
    pub kept: usize,
    pub dropped: usize,
}

#[derive(Debug, Default)]
pub struct Catalog {
    pub entries: Vec<CatalogEntry>,
    pub batches: Vec<BatchSummary>,
}

impl Catalog {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize(record: &Record, seq: usize, sub_type: &str, product_type: &str, brand: &str) -> Option<CatalogEntry> {
    let name = clean_text(record.name());
    if name.is_empty() {
        return None;
    }

    let raw_dimension = record.present_dimension().map(|(_, v)| v).unwrap_or("");

    Some(CatalogEntry {
        id: format_id(seq),
        name,
        dimension: catalog_dimension(raw_dimension),
        price: record.price(),
        product_type: product_type.to_string(),
        sub_type: sub_type.to_string(),
        brand: brand.to_string(),
        product_url: clean_text(record.url()),
    })
}

/// Merge batches in order. Identifiers are assigned from `I-0001` over the
/// records that survive cleaning, batch by batch, so the same input always
/// yields the same catalog.
pub fn merge(batches: &[Batch], options: &MergeOptions<'_>) -> Catalog {
    let mut catalog = Catalog::default();
    let mut seq = 1;

    for batch in batches {
        let sub_type = batch.origin.as_deref().unwrap_or("");
        let product_type = options.categories.category_for(sub_type);
        let mut summary = BatchSummary {
            origin: sub_type.to_string(),
            ..Default::default()
        };

        for record in &batch.records {
            match normalize(record, seq, sub_type, product_type, options.brand) {
                Some(entry) => {
                    catalog.entries.push(entry);
                    summary.kept += 1;
                    seq += 1;
                }
                None => summary.dropped += 1,
            }
        }

        catalog.batches.push(summary);
    }

    catalog
}

/// Load every batch file in `dir`. Unreadable files are reported and left
/// out of the merge.
pub fn load_batches(dir: &Path) -> Result<(Vec<Batch>, Vec<BatchError>)> {
    let files = batch::discover(dir)
        .with_context(|| format!("Failed to list batch files in {}", dir.display()))?;
    println!("Found {} files to combine from {}", files.len(), dir.display());

    let mut batches = Vec::new();
    let mut failures = Vec::new();
    for path in files {
        match Batch::load(&path) {
            Ok(b) => {
                println!(
                    "Processing: {} (subtype: {})",
                    path.display(),
                    b.origin.as_deref().unwrap_or("")
                );
                batches.push(b);
            }
            Err(e) => {
                warn!(error = %e, "skipping batch");
                println!("Error processing {}: {}", path.display(), e);
                failures.push(e);
            }
        }
    }
    Ok((batches, failures))
}

/// Load one ad-hoc file; its records get no subtype or type
pub fn load_single(path: &Path) -> Result<Batch> {
    let mut batch = Batch::load(path)?;
    batch.origin = None;
    Ok(batch)
}

/// Write `<base>.json` and `<base>.csv`. Failing to write either aborts.
pub fn save_catalog(catalog: &Catalog, base: &Path) -> Result<(PathBuf, PathBuf)> {
    if let Some(parent) = base.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }

    let json_path = base.with_extension("json");
    write_json_atomic(&json_path, &catalog.entries)
        .with_context(|| format!("Failed to write catalog: {}", json_path.display()))?;

    let csv_path = base.with_extension("csv");
    write_csv(catalog, &csv_path)
        .with_context(|| format!("Failed to write catalog: {}", csv_path.display()))?;

    Ok((json_path, csv_path))
}

fn write_csv(catalog: &Catalog, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CatalogEntry::CSV_HEADER)?;
    for entry in &catalog.entries {
        writer.write_record(entry.csv_row())?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn batch(origin: &str, values: Vec<Value>) -> Batch {
        Batch::from_value(Some(origin.to_string()), Value::Array(values)).unwrap()
    }

    fn sample_batches() -> Vec<Batch> {
        vec![
            batch(
                "dining_table",
                vec![
                    json!({ "Product Name": " EKEDALEN\u{200e} ", "Dimensions": "120 x 80 x 75 cm", "Price": "Rs. 19,990", "Product URL": "https://www.ikea.com/p/ekedalen/" }),
                    json!({ "Product Name": "\u{200f}\u{202a} ", "Dimensions": "90x90cm" }),
                    json!({ "name": "LISABO", "dimension": "140x78cm", "price": 14990 }),
                ],
            ),
            batch(
                "lamps",
                vec![json!({ "Name": "TÅGARP", "Dimension": "N/A", "url": "\u{feff}https://www.ikea.com/p/tagarp/" })],
            ),
        ]
    }

    fn merge_sample() -> Catalog {
        let categories = CategoryTable::default();
        let options = MergeOptions {
            brand: "IKEA",
            categories: &categories,
        };
        merge(&sample_batches(), &options)
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("\u{200e}  MALM bed \u{202c}\n"), "MALM bed");
        assert_eq!(clean_text("\u{200f}\u{202e}"), "");
        assert_eq!(clean_text("plain"), "plain");
    }

    #[test]
    fn test_catalog_dimension() {
        assert_eq!(catalog_dimension("90x55cm"), "90x55cm");
        assert_eq!(catalog_dimension("\u{200e}90x55cm "), "90x55cm");
        assert_eq!(catalog_dimension("90 x 55 cm"), "90x55cm");
        assert_eq!(catalog_dimension("N/A"), "");
        assert_eq!(catalog_dimension(""), "");
    }

    #[test]
    fn test_drops_empty_names_and_numbers_contiguously() {
        let catalog = merge_sample();
        let ids: Vec<&str> = catalog.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["I-0001", "I-0002", "I-0003"]);

        let names: Vec<&str> = catalog.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["EKEDALEN", "LISABO", "TÅGARP"]);

        assert_eq!(
            catalog.batches,
            vec![
                BatchSummary { origin: "dining_table".into(), kept: 2, dropped: 1 },
                BatchSummary { origin: "lamps".into(), kept: 1, dropped: 0 },
            ]
        );
    }

    #[test]
    fn test_entry_fields() {
        let catalog = merge_sample();
        let first = &catalog.entries[0];
        assert_eq!(first.dimension, "120x80x75cm");
        assert_eq!(first.price, json!("Rs. 19,990"));
        assert_eq!(first.product_type, "Table");
        assert_eq!(first.sub_type, "dining_table");
        assert_eq!(first.brand, "IKEA");
        assert_eq!(first.product_url, "https://www.ikea.com/p/ekedalen/");

        assert_eq!(catalog.entries[1].price, json!(14990));
        assert_eq!(catalog.entries[1].price_text(), "14990");

        let lamp = &catalog.entries[2];
        assert_eq!(lamp.dimension, "");
        assert_eq!(lamp.product_type, "");
        assert_eq!(lamp.sub_type, "lamps");
        assert_eq!(lamp.product_url, "https://www.ikea.com/p/tagarp/");
    }

    #[test]
    fn test_single_file_has_no_subtype() {
        let categories = CategoryTable::default();
        let options = MergeOptions {
            brand: "IKEA",
            categories: &categories,
        };
        let single = Batch::new(None, vec![serde_json::from_value(json!({ "Product Name": "POÄNG" })).unwrap()]);
        let catalog = merge(&[single], &options);
        assert_eq!(catalog.entries[0].sub_type, "");
        assert_eq!(catalog.entries[0].product_type, "");
        assert_eq!(catalog.entries[0].price, json!(""));
    }

    #[test]
    fn test_repeated_runs_are_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let first = save_catalog(&merge_sample(), &dir.path().join("run1")).unwrap();
        let second = save_catalog(&merge_sample(), &dir.path().join("run2")).unwrap();

        assert_eq!(fs::read(&first.0).unwrap(), fs::read(&second.0).unwrap());
        assert_eq!(fs::read(&first.1).unwrap(), fs::read(&second.1).unwrap());
    }

    #[test]
    fn test_output_formats() {
        let dir = tempfile::tempdir().unwrap();
        let (json_path, csv_path) = save_catalog(&merge_sample(), &dir.path().join("out/ikea_Jan")).unwrap();

        let entries: Vec<CatalogEntry> = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(entries.len(), 3);
        let raw: Value = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        let keys: Vec<&String> = raw[0].as_object().unwrap().keys().collect();
        assert_eq!(keys, CatalogEntry::CSV_HEADER);

        let csv_text = fs::read_to_string(&csv_path).unwrap();
        let lines: Vec<&str> = csv_text.lines().collect();
        assert_eq!(lines[0], "ID,Name,Dimension,Price,Type,SubType,Brand,ProductURL");
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("I-0001,EKEDALEN,120x80x75cm,\"Rs. 19,990\",Table,dining_table,IKEA,"));
    }

    #[test]
    fn test_load_batches_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bed.json"), r#"[{"name": "MALM"}]"#).unwrap();
        fs::write(dir.path().join("sofa.json"), "oops").unwrap();

        let (batches, failures) = load_batches(dir.path()).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].origin.as_deref(), Some("bed"));
        assert_eq!(failures.len(), 1);
    }

    #[test]
    fn test_identifiers_widen_past_9999() {
        assert_eq!(format_id(7), "I-0007");
        assert_eq!(format_id(12345), "I-12345");
    }
}
