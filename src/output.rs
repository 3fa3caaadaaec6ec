//! Data model shared by the two pipeline stages.
//!
//! [`ExtractedDocument`] is what the extractor produces; its only hand-off to
//! the structurer is the page-labelled string from
//! [`ExtractedDocument::to_page_labeled_text`]. [`MenuDocument`] describes the
//! shape the model is asked to return; the pipeline itself passes the parsed
//! `serde_json::Value` through untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// How a page's text was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Embedded PDF text layer.
    TextLayer,
    /// Optical character recognition of the rendered page.
    Ocr,
}

/// Text from one page. Pages that produced nothing are never represented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-indexed page number in the source PDF.
    pub page_number: usize,
    /// Trimmed, non-empty page text.
    pub text: String,
    pub method: ExtractionMethod,
}

/// Ordered page texts of one PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    /// Pages in source order.
    pub pages: Vec<PageText>,
    /// Page count of the source PDF, including pages that yielded nothing.
    pub source_pages: usize,
}

impl ExtractedDocument {
    /// Serialise as `Page {n}: {text}` lines joined by `\n`, in page order.
    pub fn to_page_labeled_text(&self) -> String {
        self.pages
            .iter()
            .map(|p| format!("Page {}: {}", p.page_number, p.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Number of pages whose text came from OCR.
    pub fn ocr_pages(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| p.method == ExtractionMethod::Ocr)
            .count()
    }

    /// Total characters of page text (excluding the `Page n:` labels).
    pub fn text_chars(&self) -> usize {
        self.pages.iter().map(|p| p.text.chars().count()).sum()
    }
}

impl fmt::Display for ExtractedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_page_labeled_text())
    }
}

/// The menu shape the model is prompted to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuDocument {
    pub menu_summary: String,
    #[serde(default)]
    pub products: Vec<Product>,
    /// Brand name (or `"unbranded"`) → percentage of the menu.
    #[serde(default)]
    pub brand_percentages: BTreeMap<String, f64>,
}

/// One menu item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Currency-prefixed, e.g. `"$13"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
}

impl MenuDocument {
    /// Typed view of a structurer result.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    /// Sum of all brand percentages; ideally 100.
    pub fn percentage_total(&self) -> f64 {
        self.brand_percentages.values().sum()
    }
}

/// Timing and volume figures for one conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    pub source_pages: usize,
    pub extracted_pages: usize,
    pub ocr_pages: usize,
    pub text_chars: usize,
    pub extraction_ms: u64,
    pub structuring_ms: u64,
    pub total_duration_ms: u64,
}

/// Result of a full PDF → menu JSON conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuOutput {
    /// The model's JSON, exactly as parsed.
    pub menu: Value,
    /// The extraction stage output that was structured.
    pub document: ExtractedDocument,
    pub stats: PipelineStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(n: usize, text: &str, method: ExtractionMethod) -> PageText {
        PageText {
            page_number: n,
            text: text.into(),
            method,
        }
    }

    #[test]
    fn page_labels_keep_source_numbers() {
        let doc = ExtractedDocument {
            pages: vec![
                page(1, "Beers", ExtractionMethod::TextLayer),
                page(3, "Wines\nRed $12", ExtractionMethod::TextLayer),
            ],
            source_pages: 3,
        };
        assert_eq!(doc.to_page_labeled_text(), "Page 1: Beers\nPage 3: Wines\nRed $12");
        assert_eq!(doc.to_string(), doc.to_page_labeled_text());
    }

    #[test]
    fn empty_document_serialises_to_empty_string() {
        let doc = ExtractedDocument {
            pages: vec![],
            source_pages: 2,
        };
        assert!(doc.is_empty());
        assert_eq!(doc.to_page_labeled_text(), "");
    }

    #[test]
    fn counts() {
        let doc = ExtractedDocument {
            pages: vec![
                page(1, "abc", ExtractionMethod::Ocr),
                page(2, "de", ExtractionMethod::TextLayer),
            ],
            source_pages: 2,
        };
        assert_eq!(doc.ocr_pages(), 1);
        assert_eq!(doc.text_chars(), 5);
    }

    #[test]
    fn typed_view_of_example_menu() {
        let value = json!({
            "menu_summary": "Beer menu with floral design",
            "products": [
                {"name": "Sierra Nevada Pale Ale", "description": "A crisp pale ale.", "price": "$13", "brand": "Sierra Nevada"},
                {"name": "House Draught Stout", "price": "$10"}
            ],
            "brand_percentages": {"Sierra Nevada": 20, "unbranded": 80}
        });
        let menu = MenuDocument::from_value(&value).unwrap();
        assert_eq!(menu.products.len(), 2);
        assert_eq!(menu.products[1].brand, None);
        assert_eq!(menu.percentage_total(), 100.0);

        // Round-trips without inventing absent optional fields.
        let back = serde_json::to_value(&menu.products[1]).unwrap();
        assert_eq!(back, json!({"name": "House Draught Stout", "price": "$10"}));
    }
}
