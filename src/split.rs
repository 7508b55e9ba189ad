//! Split a combined scraper output into one batch file per search query

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::batch::Batch;

const UNKNOWN_QUERY: &str = "unknown";

#[derive(Debug, Default, Deserialize)]
pub struct CombinedOutput {
    #[serde(default)]
    pub results: Vec<QueryResult>,
}

#[derive(Debug, Deserialize)]
pub struct QueryResult {
    #[serde(rename = "originalQuery")]
    pub original_query: Option<String>,
    #[serde(default)]
    pub products: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryGroup {
    pub query: String,
    pub products: Vec<Value>,
}

/// Group results by query, keeping the order queries were first seen in
pub fn split_results(combined: CombinedOutput) -> Vec<QueryGroup> {
    let mut groups: Vec<QueryGroup> = Vec::new();

    for result in combined.results {
        let query = result
            .original_query
            .unwrap_or_else(|| UNKNOWN_QUERY.to_string());
        match groups.iter_mut().find(|g| g.query == query) {
            Some(group) => group.products.extend(result.products),
            None => groups.push(QueryGroup {
                query,
                products: result.products,
            }),
        }
    }

    groups
}

/// File stem for a query: alphanumerics, spaces, `-` and `_`, trimmed
pub fn safe_file_stem(query: &str) -> String {
    query
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Write each group to `<out_dir>/<safe query>.json`
pub fn save_groups(groups: Vec<QueryGroup>, out_dir: &Path) -> Result<Vec<(PathBuf, usize)>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let mut saved = Vec::with_capacity(groups.len());
    let mut used = HashSet::new();
    for group in groups {
        let base = match safe_file_stem(&group.query) {
            s if s.is_empty() => UNKNOWN_QUERY.to_string(),
            s => s,
        };
        let mut stem = base.clone();
        let mut n = 2;
        while !used.insert(stem.clone()) {
            stem = format!("{}-{}", base, n);
            n += 1;
        }
        if stem != base {
            warn!(query = %group.query, file = %stem, "file name already used by another query");
        }
        let path = out_dir.join(format!("{}.json", stem));
        let count = group.products.len();
        Batch::for_query(&group.query, group.products).save(&path)?;
        println!("[OK] Created: {} ({} products)", path.display(), count);
        saved.push((path, count));
    }
    Ok(saved)
}

pub fn load_combined(path: &Path) -> Result<CombinedOutput> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}
