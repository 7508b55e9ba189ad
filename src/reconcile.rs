//! Fill missing dimensions in batch files
//!
//! Cheap offline extraction runs first; product pages are only fetched for
//! records that are still missing afterwards, and only when the reconciler
//! was given a network extractor.

use std::fmt;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::batch::{self, Batch, BatchError};
use crate::dimensions::{extract, extract_value, is_canonical};
use crate::fetch::{NetworkExtractor, NetworkOutcome, PageSource};
use crate::types::{Dimension, Record, DEFAULT_DIMENSION_KEY, DIMENSION_KEYS};
use crate::utils::{osc8_link, truncate};

/// Counters for one or more reconciled batches
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileStats {
    pub scanned: usize,
    pub missing: usize,
    /// Recovered from the stored (unparsed) dimension text
    pub filled_extracted: usize,
    /// Recovered from the product name
    pub filled_from_name: usize,
    /// Recovered from the product page
    pub filled_network: usize,
    /// Product page could not be fetched
    pub network_failed: usize,
    /// Missing, and the network was off or the record had no URL
    pub skipped: usize,
}

impl ReconcileStats {
    pub fn filled(&self) -> usize {
        self.filled_extracted + self.filled_from_name + self.filled_network
    }

    pub fn still_missing(&self) -> usize {
        self.missing - self.filled()
    }

    pub fn success_rate(&self) -> f64 {
        if self.missing == 0 {
            0.0
        } else {
            100.0 * self.filled() as f64 / self.missing as f64
        }
    }
}

impl AddAssign for ReconcileStats {
    fn add_assign(&mut self, other: Self) {
        self.scanned += other.scanned;
        self.missing += other.missing;
        self.filled_extracted += other.filled_extracted;
        self.filled_from_name += other.filled_from_name;
        self.filled_network += other.filled_network;
        self.network_failed += other.network_failed;
        self.skipped += other.skipped;
    }
}

impl fmt::Display for ReconcileStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Records scanned: {}", self.scanned)?;
        writeln!(f, "Missing dimensions: {}", self.missing)?;
        writeln!(
            f,
            "Filled: {} (extracted {}, from name {}, scraped {})",
            self.filled(),
            self.filled_extracted,
            self.filled_from_name,
            self.filled_network
        )?;
        writeln!(f, "Still missing: {}", self.still_missing())?;
        write!(f, "Success rate: {:.1}%", self.success_rate())
    }
}

/// How a missing dimension was (or was not) resolved
#[derive(Debug, Clone, PartialEq, Eq)]
enum Fill {
    Extracted(String),
    FromName(String),
    Scraped(String),
    Failed,
    Missed,
    Skipped,
}

/// True unless the record already holds a canonical dimension
fn needs_fill(record: &Record) -> bool {
    !matches!(record.present_dimension(), Some((_, value)) if is_canonical(value))
}

/// Alias key holding the current value, so a fill replaces it in place
fn target_key(record: &Record) -> &'static str {
    record
        .present_dimension()
        .map(|(key, _)| key)
        .or_else(|| {
            DIMENSION_KEYS
                .iter()
                .copied()
                .find(|key| record.get(key).is_some())
        })
        .unwrap_or(DEFAULT_DIMENSION_KEY)
}

pub struct Reconciler<S> {
    network: Option<NetworkExtractor<S>>,
    from_name: bool,
    quiet: bool,
}

impl<S: PageSource> Reconciler<S> {
    /// Offline-only reconciler
    pub fn offline() -> Self {
        Self {
            network: None,
            from_name: false,
            quiet: true,
        }
    }

    /// Reconciler that falls back to fetching product pages
    pub fn with_network(network: NetworkExtractor<S>) -> Self {
        Self {
            network: Some(network),
            ..Self::offline()
        }
    }

    /// Also try the product name before going to the network
    pub fn from_name(mut self, enabled: bool) -> Self {
        self.from_name = enabled;
        self
    }

    /// Print one progress line per missing record
    pub fn verbose(mut self, enabled: bool) -> Self {
        self.quiet = !enabled;
        self
    }

    pub fn allows_network(&self) -> bool {
        self.network.is_some()
    }

    fn resolve(&self, record: &Record) -> Fill {
        let stored = DIMENSION_KEYS
            .iter()
            .map(|key| extract_value(record.get(key)))
            .find(Dimension::is_found);
        if let Some(Dimension::Found(d)) = stored {
            return Fill::Extracted(d);
        }

        if self.from_name {
            if let Dimension::Found(d) = extract(record.name()) {
                return Fill::FromName(d);
            }
        }

        let url = record.url();
        match &self.network {
            Some(network) if !url.is_empty() => match network.extract(url) {
                NetworkOutcome::Found(d) => Fill::Scraped(d),
                NetworkOutcome::Missed => Fill::Missed,
                NetworkOutcome::Failed => Fill::Failed,
            },
            _ => Fill::Skipped,
        }
    }

    /// Fill missing dimensions of `batch` in place. Records that stay
    /// missing keep their old value.
    pub fn reconcile(&self, batch: &mut Batch) -> ReconcileStats {
        let mut stats = ReconcileStats::default();

        for (idx, record) in batch.records.iter_mut().enumerate() {
            stats.scanned += 1;
            if !needs_fill(record) {
                continue;
            }
            stats.missing += 1;

            let fill = self.resolve(record);
            let (value, label) = match &fill {
                Fill::Extracted(d) => {
                    stats.filled_extracted += 1;
                    (Some(d), "EXTRACTED")
                }
                Fill::FromName(d) => {
                    stats.filled_from_name += 1;
                    (Some(d), "FROM NAME")
                }
                Fill::Scraped(d) => {
                    stats.filled_network += 1;
                    (Some(d), "SCRAPED")
                }
                Fill::Failed => {
                    stats.network_failed += 1;
                    (None, "ERROR")
                }
                Fill::Missed => (None, "FAILED"),
                Fill::Skipped => {
                    stats.skipped += 1;
                    (None, "SKIPPED")
                }
            };

            if !self.quiet {
                let name = truncate(record.name(), 30);
                let shown = if record.url().is_empty() {
                    name
                } else {
                    osc8_link(record.url(), &name)
                };
                println!(
                    "    [{}] {} [{}] {}",
                    idx,
                    shown,
                    label,
                    value.map(String::as_str).unwrap_or("")
                );
            }

            if let Some(d) = value {
                let key = target_key(record);
                record.set(key, d.as_str());
            }
        }

        stats
    }
}

/// Result of reconciling one batch file
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: Result<ReconcileStats, BatchError>,
}

/// Reconcile every batch file in `dir`, writing each back in place.
///
/// A file that cannot be read or parsed is reported and left untouched;
/// the remaining files are still processed.
pub fn fill_directory<S: PageSource>(
    dir: &Path,
    reconciler: &Reconciler<S>,
) -> std::io::Result<Vec<FileOutcome>> {
    let files = batch::discover(dir)?;
    let mut outcomes = Vec::with_capacity(files.len());

    for path in files {
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        println!("Scanning {}...", name);

        let result = fill_file(&path, reconciler);
        match &result {
            Ok(stats) if stats.missing == 0 => println!("  No missing dimensions found\n"),
            Ok(stats) => println!(
                "  Finished: filled {}/{} dimensions\n",
                stats.filled(),
                stats.missing
            ),
            Err(e) => {
                warn!(error = %e, "skipping batch");
                println!("  Error processing {}: {}\n", name, e);
            }
        }
        outcomes.push(FileOutcome { path, result });
    }

    Ok(outcomes)
}

fn fill_file<S: PageSource>(path: &Path, reconciler: &Reconciler<S>) -> Result<ReconcileStats, BatchError> {
    let mut batch = Batch::load(path)?;
    let stats = reconciler.reconcile(&mut batch);
    if stats.filled() > 0 {
        batch.save(path)?;
        info!(path = %path.display(), filled = stats.filled(), "batch written");
    }
    Ok(stats)
}

/// Sum of the per-file stats, skipping failed files
pub fn total_stats(outcomes: &[FileOutcome]) -> ReconcileStats {
    let mut total = ReconcileStats::default();
    for outcome in outcomes {
        if let Ok(stats) = &outcome.result {
            total += *stats;
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::tests::MockSource;
    use serde_json::{json, Value};
    use std::fs;
    use std::time::Duration;

    fn batch(values: Vec<Value>) -> Batch {
        Batch::from_value(Some("test".into()), Value::Array(values)).unwrap()
    }

    fn offline() -> Reconciler<MockSource> {
        Reconciler::offline()
    }

    #[test]
    fn test_offline_leaves_empty_dimensions() {
        let mut values: Vec<Value> = (0..7)
            .map(|i| json!({ "Product Name": format!("Item {}", i), "Dimensions": "40x40cm", "Price": i }))
            .collect();
        values.insert(2, json!({ "Product Name": "Empty A", "Dimensions": "" }));
        values.insert(5, json!({ "Product Name": "Empty B", "Dimensions": "N/A" }));
        values.push(json!({ "Product Name": "Empty C" }));
        let mut b = batch(values);
        let before = b.clone();

        let stats = offline().reconcile(&mut b);

        assert_eq!(stats.scanned, 10);
        assert_eq!(stats.missing, 3);
        assert_eq!(stats.filled(), 0);
        assert_eq!(stats.skipped, 3);
        assert_eq!(b, before);
    }

    #[test]
    fn test_recovers_unparsed_text_in_place() {
        let mut b = batch(vec![
            json!({ "Product Name": "Desk", "dimension": "Width: 120 x 60 cm approx", "url": "" }),
            json!({ "Product Name": "Shelf", "Dimensions": "80 x 30 x 180 cm" }),
        ]);
        let stats = offline().reconcile(&mut b);

        assert_eq!(stats.missing, 2);
        assert_eq!(stats.filled_extracted, 2);
        assert_eq!(b.records[0].get("dimension"), Some(&json!("120x60cm")));
        assert_eq!(b.records[0].get("Dimensions"), None);
        assert_eq!(b.records[1].get("Dimensions"), Some(&json!("80x30x180cm")));
    }

    #[test]
    fn test_canonical_values_untouched() {
        let mut b = batch(vec![json!({ "Product Name": "Bed 90x200 cm", "Dimension": "90x200cm" })]);
        let stats = offline().from_name(true).reconcile(&mut b);
        assert_eq!(stats.missing, 0);
        assert_eq!(stats.scanned, 1);
    }

    #[test]
    fn test_from_name_is_opt_in() {
        let values = vec![json!({ "Product Name": "MALM bed frame, 160x200 cm", "Dimensions": "N/A" })];

        let mut b = batch(values.clone());
        assert_eq!(offline().reconcile(&mut b).filled(), 0);

        let mut b = batch(values);
        let stats = offline().from_name(true).reconcile(&mut b);
        assert_eq!(stats.filled_from_name, 1);
        assert_eq!(b.records[0].get("Dimensions"), Some(&json!("160x200cm")));
    }

    #[test]
    fn test_network_fallback() {
        let source = MockSource::default().with_page(
            "https://shop.test/p/table",
            r#"<html><head><meta name="description" content="Table 140 x 80 x 75 cm"></head><body>Table</body></html>"#,
        );
        let reconciler = Reconciler::with_network(NetworkExtractor::new(source, Duration::ZERO));
        let mut b = batch(vec![
            json!({ "Product Name": "Table", "Product URL": "https://shop.test/p/table" }),
            json!({ "Product Name": "Gone", "Dimensions": "", "Product URL": "https://shop.test/p/gone" }),
            json!({ "Product Name": "No link", "Dimensions": "" }),
            json!({ "Product Name": "Known", "Dimensions": "10x10cm", "Product URL": "https://shop.test/p/known" }),
        ]);

        let stats = reconciler.reconcile(&mut b);

        assert_eq!(stats.missing, 3);
        assert_eq!(stats.filled_network, 1);
        assert_eq!(stats.network_failed, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(b.records[0].get("Dimensions"), Some(&json!("140x80x75cm")));
        assert_eq!(b.records[1].get("Dimensions"), Some(&json!("")));
        assert_eq!(b.records.len(), 4);
    }

    #[test]
    fn test_offline_hit_skips_network() {
        let reconciler = Reconciler::with_network(NetworkExtractor::new(MockSource::default(), Duration::ZERO));
        let mut b = batch(vec![json!({ "Dimensions": "size 50 x 50 cm", "url": "https://shop.test/p/x" })]);
        let stats = reconciler.reconcile(&mut b);
        assert_eq!(stats.filled_extracted, 1);
        assert!(reconciler.network.as_ref().unwrap().source().requests.borrow().is_empty());
    }

    #[test]
    fn test_fill_directory_continues_after_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a_broken.json"), "{ nope").unwrap();
        let good = dir.path().join("bed.json");
        fs::write(
            &good,
            r#"{"originalQuery": "bed", "products": [{"Product Name": "Bed", "Dimensions": "90 x 200 cm"}]}"#,
        )
        .unwrap();

        let outcomes = fill_directory(dir.path(), &offline()).unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].result.is_err());
        assert_eq!(fs::read_to_string(dir.path().join("a_broken.json")).unwrap(), "{ nope");

        let total = total_stats(&outcomes);
        assert_eq!(total.filled_extracted, 1);
        let rewritten: Value = serde_json::from_str(&fs::read_to_string(&good).unwrap()).unwrap();
        assert_eq!(rewritten["products"][0]["Dimensions"], "90x200cm");
        assert_eq!(rewritten["originalQuery"], "bed");
    }

    #[test]
    fn test_fill_directory_keeps_non_object_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bed.json");
        fs::write(
            &path,
            r#"{"originalQuery":"bed","products":[{"Product Name":"MALM","Dimensions":"90 x 200 cm"},"stray note",null,42]}"#,
        )
        .unwrap();

        let outcomes = fill_directory(dir.path(), &offline()).unwrap();
        assert_eq!(total_stats(&outcomes).filled_extracted, 1);

        let rewritten: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            rewritten["products"],
            json!([{ "Product Name": "MALM", "Dimensions": "90x200cm" }, "stray note", null, 42])
        );
    }

    #[test]
    fn test_stats_summary() {
        let mut total = ReconcileStats {
            scanned: 10,
            missing: 4,
            filled_extracted: 1,
            ..Default::default()
        };
        total += ReconcileStats {
            scanned: 5,
            missing: 1,
            filled_network: 1,
            ..Default::default()
        };
        assert_eq!(total.filled(), 2);
        assert_eq!(total.still_missing(), 3);
        assert!((total.success_rate() - 40.0).abs() < 1e-9);
        assert!(total.to_string().contains("Success rate: 40.0%"));
    }
}
