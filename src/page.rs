//! Product page sources and the order they are searched for dimensions

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::dimensions::extract;
use crate::types::Dimension;

/// Class-attribute keywords marking a measurement section
const SECTION_KEYWORDS: &[&str] = &["measure", "dimension", "size", "spec"];
/// Only the first few tagged sections are searched
const MAX_SECTIONS: usize = 5;
/// Structured-data keys searched, in order
const STRUCTURED_KEYS: &[&str] = &["dimensions", "size", "specs", "width", "height", "depth"];

#[derive(Debug, Error)]
pub enum StructuredDataError {
    #[error("structured data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("structured data is not an object")]
    NotAnObject,
}

/// The textual sources of a product page
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub body_text: String,
    pub meta_description: Option<String>,
    /// Text of elements whose class looks measurement-related, in document order
    pub sections: Vec<String>,
    /// Raw content of the first JSON-LD block
    pub structured_data: Option<String>,
}

fn selector(css: &str) -> Selector {
    // Only called with the literal selectors below
    Selector::parse(css).unwrap()
}

/// Join text nodes and collapse runs of whitespace
fn element_text(element: ElementRef<'_>) -> String {
    let text = element.text().collect::<Vec<_>>().join(" ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_measurement_class(class: &str) -> bool {
    let lower = class.to_lowercase();
    SECTION_KEYWORDS.iter().any(|k| lower.contains(k))
}

impl Page {
    pub fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);

        let body_text = document
            .select(&selector("body"))
            .next()
            .map(element_text)
            .unwrap_or_else(|| element_text(document.root_element()));

        let meta_description = document
            .select(&selector(r#"meta[name="description"]"#))
            .find_map(|el| el.value().attr("content"))
            .map(|s| s.to_string());

        let sections = document
            .select(&selector("[class]"))
            .filter(|el| el.value().attr("class").is_some_and(is_measurement_class))
            .map(element_text)
            .collect();

        let structured_data = document
            .select(&selector(r#"script[type="application/ld+json"]"#))
            .next()
            .map(|el| el.text().collect::<String>());

        Self {
            body_text,
            meta_description,
            sections,
            structured_data,
        }
    }

    /// Parse the structured-data block into an object
    pub fn structured_object(&self) -> Result<Option<serde_json::Map<String, Value>>, StructuredDataError> {
        let Some(raw) = &self.structured_data else {
            return Ok(None);
        };
        match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => Ok(Some(map)),
            _ => Err(StructuredDataError::NotAnObject),
        }
    }
}

fn from_body(page: &Page) -> Dimension {
    extract(&page.body_text)
}

fn from_meta(page: &Page) -> Dimension {
    page.meta_description
        .as_deref()
        .map(extract)
        .unwrap_or(Dimension::NotFound)
}

fn from_sections(page: &Page) -> Dimension {
    page.sections
        .iter()
        .take(MAX_SECTIONS)
        .map(|s| extract(s))
        .find(Dimension::is_found)
        .unwrap_or(Dimension::NotFound)
}

fn from_structured_data(page: &Page) -> Result<Dimension, StructuredDataError> {
    let Some(object) = page.structured_object()? else {
        return Ok(Dimension::NotFound);
    };

    for key in STRUCTURED_KEYS {
        let text = match object.get(*key) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        let found = extract(&text);
        if found.is_found() {
            return Ok(found);
        }
    }
    Ok(Dimension::NotFound)
}

/// Search the page sources in priority order: body text, meta description,
/// tagged sections, structured data. First hit wins.
pub fn locate_dimension(page: &Page) -> Dimension {
    from_body(page)
        .or_else(|| from_meta(page))
        .or_else(|| from_sections(page))
        .or_else(|| {
            from_structured_data(page).unwrap_or_else(|e| {
                debug!(error = %e, "skipping structured data");
                Dimension::NotFound
            })
        })
}
