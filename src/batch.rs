//! Batch files: one JSON file of product records per category

use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::types::Record;

/// Why a batch file could not be used; the file is left untouched
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path}: expected a product list or an object with \"products\"")]
    Shape { path: PathBuf },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// How the records were laid out on disk, so they can be written back the
/// same way
#[derive(Debug, Clone, PartialEq)]
enum Layout {
    /// `[record, ...]`
    Bare,
    /// `{"originalQuery": ..., "products": [...]}`; the other keys are kept
    Wrapped(Map<String, Value>),
}

/// Records from one source file
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Origin label (the file stem), used as the product subtype
    pub origin: Option<String>,
    pub records: Vec<Record>,
    /// Non-object product entries with their original positions, written
    /// back untouched
    others: Vec<(usize, Value)>,
    layout: Layout,
}

impl Batch {
    pub fn new(origin: Option<String>, records: Vec<Record>) -> Self {
        Self {
            origin,
            records,
            others: Vec::new(),
            layout: Layout::Bare,
        }
    }

    /// Wrapped batch as produced by `split`
    pub fn for_query(query: &str, products: Vec<Value>) -> Self {
        let mut wrapper = Map::new();
        wrapper.insert("originalQuery".to_string(), Value::String(query.to_string()));
        wrapper.insert("products".to_string(), Value::Array(Vec::new()));
        let (records, others) = split_entries(products);
        Self {
            origin: Some(query.to_string()),
            records,
            others,
            layout: Layout::Wrapped(wrapper),
        }
    }

    pub fn from_value(origin: Option<String>, value: Value) -> Option<Self> {
        match value {
            Value::Array(items) => {
                let (records, others) = split_entries(items);
                Some(Self {
                    origin,
                    records,
                    others,
                    layout: Layout::Bare,
                })
            }
            Value::Object(mut map) => {
                // Leave the key in place so it is written back at the same position
                let products = match map.get_mut("products") {
                    Some(Value::Array(items)) => std::mem::take(items),
                    None => Vec::new(),
                    Some(_) => return None,
                };
                let (records, others) = split_entries(products);
                Some(Self {
                    origin,
                    records,
                    others,
                    layout: Layout::Wrapped(map),
                })
            }
            _ => None,
        }
    }

    pub fn load(path: &Path) -> Result<Self, BatchError> {
        let content = fs::read_to_string(path).map_err(|source| BatchError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&content).map_err(|source| BatchError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_value(origin_from_path(path), value).ok_or_else(|| BatchError::Shape {
            path: path.to_path_buf(),
        })
    }

    pub fn to_value(&self) -> Value {
        let mut records = self.records.iter().map(|r| Value::Object(r.fields().clone()));
        let mut others = self.others.iter().peekable();
        let mut entries = Vec::with_capacity(self.records.len() + self.others.len());
        loop {
            match others.next_if(|(pos, _)| *pos == entries.len()) {
                Some((_, other)) => entries.push(other.clone()),
                None => match records.next() {
                    Some(record) => entries.push(record),
                    None => break,
                },
            }
        }
        // Positions past the end of a shortened record list
        entries.extend(others.map(|(_, other)| other.clone()));

        match &self.layout {
            Layout::Bare => Value::Array(entries),
            Layout::Wrapped(wrapper) => {
                let mut map = wrapper.clone();
                map.insert("products".to_string(), Value::Array(entries));
                Value::Object(map)
            }
        }
    }

    /// Replace the file at `path` with this batch in one step
    pub fn save(&self, path: &Path) -> Result<(), BatchError> {
        write_json_atomic(path, &self.to_value()).map_err(|source| BatchError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Object entries become records; anything else is kept aside with its index
fn split_entries(items: Vec<Value>) -> (Vec<Record>, Vec<(usize, Value)>) {
    let mut records = Vec::new();
    let mut others = Vec::new();
    for (pos, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(map) => records.push(Record::new(map)),
            other => others.push((pos, other)),
        }
    }
    (records, others)
}

/// File stem of a batch file, e.g. `bed` for `split_output/bed.json`
pub fn origin_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
}

/// Batch files in `dir`, sorted by name; combined outputs are skipped
pub fn discover(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().map_or(false, |e| e == "json"))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| !n.contains("combined"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Pretty JSON with a trailing newline, written to a temp file and renamed
/// over the target
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let mut json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    json.push('\n');

    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, path)
}
