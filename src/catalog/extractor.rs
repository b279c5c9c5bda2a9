//! Turns a catalog page into canonical [`Record`]s.
//!
//! Every sub-extraction degrades to an empty or absent field when its markup is
//! missing; a page without entry containers is an empty snapshot.

use std::borrow::Cow;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::schema::{Detail, Record, Snapshot};

pub const DOWNLOAD_LINK_TITLE: &str = "Dokument anzeigen";

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("invalid {role} selector {selector:?}: {reason}")]
    InvalidSelector {
        role: &'static str,
        selector: String,
        reason: String,
    },
}

/// CSS selectors locating each part of a catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractionSelectors {
    #[serde(default = "default_entry")]
    pub entry: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_detail_container")]
    pub detail_container: String,
    #[serde(default = "default_detail_row")]
    pub detail_row: String,
    #[serde(default = "default_row_label")]
    pub row_label: String,
    #[serde(default = "default_row_value")]
    pub row_value: String,
    #[serde(default = "default_download_link")]
    pub download_link: String,
}

impl Default for ExtractionSelectors {
    fn default() -> Self {
        Self {
            entry: default_entry(),
            title: default_title(),
            detail_container: default_detail_container(),
            detail_row: default_detail_row(),
            row_label: default_row_label(),
            row_value: default_row_value(),
            download_link: default_download_link(),
        }
    }
}

fn default_entry() -> String {
    ".ovd_element".to_string()
}

fn default_title() -> String {
    ".toggler_titel .ovd_title".to_string()
}

fn default_detail_container() -> String {
    ".toggler_container".to_string()
}

fn default_detail_row() -> String {
    ".row".to_string()
}

fn default_row_label() -> String {
    "label".to_string()
}

fn default_row_value() -> String {
    "span".to_string()
}

fn default_download_link() -> String {
    format!("a[title=\"{DOWNLOAD_LINK_TITLE}\"]")
}

/// Compiled form of [`ExtractionSelectors`].
#[derive(Debug, Clone)]
pub struct Extractor {
    entry: Selector,
    title: Selector,
    detail_container: Selector,
    detail_row: Selector,
    row_label: Selector,
    row_value: Selector,
    download_link: Selector,
}

impl Extractor {
    pub fn new(selectors: &ExtractionSelectors) -> Result<Self, ExtractionError> {
        Ok(Self {
            entry: compile("entry", &selectors.entry)?,
            title: compile("title", &selectors.title)?,
            detail_container: compile("detail container", &selectors.detail_container)?,
            detail_row: compile("detail row", &selectors.detail_row)?,
            row_label: compile("row label", &selectors.row_label)?,
            row_value: compile("row value", &selectors.row_value)?,
            download_link: compile("download link", &selectors.download_link)?,
        })
    }

    /// Extracts from raw response bytes; invalid UTF-8 is decoded lossily.
    pub fn extract_bytes(&self, body: &[u8]) -> Result<Snapshot, ExtractionError> {
        self.extract(&decode_body(body))
    }

    pub fn extract(&self, html: &str) -> Result<Snapshot, ExtractionError> {
        let document = Html::parse_document(html);
        Ok(document
            .select(&self.entry)
            .map(|entry| self.extract_record(entry))
            .collect())
    }

    fn extract_record(&self, entry: ElementRef<'_>) -> Record {
        let first_title = entry.select(&self.title).next();
        let title = entry
            .select(&self.title)
            .map(|el| el.text().collect::<String>())
            .collect::<String>()
            .trim()
            .to_string();
        let subtitle = first_title
            .and_then(next_element_sibling)
            .map(element_text)
            .unwrap_or_default();

        let containers: Vec<ElementRef<'_>> = entry.select(&self.detail_container).collect();
        let description = containers
            .first()
            .and_then(|container| container.children().find_map(ElementRef::wrap))
            .map(element_text)
            .unwrap_or_default();

        let details = containers
            .iter()
            .flat_map(|container| container.select(&self.detail_row))
            .map(|row| self.extract_detail(row))
            .collect();

        let download_link = entry
            .select(&self.download_link)
            .next()
            .and_then(|anchor| anchor.value().attr("href"))
            .map(str::to_string);

        Record {
            title,
            subtitle,
            description,
            details,
            download_link,
        }
    }

    fn extract_detail(&self, row: ElementRef<'_>) -> Detail {
        let label = row
            .select(&self.row_label)
            .map(|el| el.text().collect::<String>())
            .collect::<String>()
            .trim()
            .to_string();
        let value = row
            .select(&self.row_value)
            .next()
            .map(|el| el.inner_html().trim().to_string())
            .unwrap_or_default();
        Detail { label, value }
    }
}

fn compile(role: &'static str, selector: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(selector).map_err(|err| ExtractionError::InvalidSelector {
        role,
        selector: selector.to_string(),
        reason: err.to_string(),
    })
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn next_element_sibling(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.next_siblings().find_map(ElementRef::wrap)
}

fn decode_body(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG_PAGE: &str = r#"
<html><body>
  <div class="ovd_element">
    <div class="toggler_titel">
      <h3 class="ovd_title"> Einwohner nach Stadtteilen </h3>
      <p>Jährliche Fortschreibung</p>
    </div>
    <div class="toggler_container">
      <p>Bevölkerungsstand zum 31.12.</p>
      <div class="row"><label>Format</label><span><b>CSV</b></span></div>
      <div class="row"><label>Lizenz</label><span><a href="/dl-de">dl-de/by-2-0</a></span></div>
      <a title="Dokument anzeigen" href="/daten/einwohner.csv">Download</a>
    </div>
  </div>
  <div class="ovd_element">
    <div class="toggler_titel"><h3 class="ovd_title">Wahlbezirke</h3></div>
  </div>
</body></html>
"#;

    fn extractor() -> Extractor {
        Extractor::new(&ExtractionSelectors::default()).expect("default selectors compile")
    }

    #[test]
    fn extracts_entries_in_document_order() {
        let snapshot = extractor().extract(CATALOG_PAGE).expect("extract");
        assert_eq!(snapshot.len(), 2);

        let first = &snapshot[0];
        assert_eq!(first.title, "Einwohner nach Stadtteilen");
        assert_eq!(first.subtitle, "Jährliche Fortschreibung");
        assert_eq!(first.description, "Bevölkerungsstand zum 31.12.");
        assert_eq!(
            first.details,
            vec![
                Detail::new("Format", "<b>CSV</b>"),
                Detail::new("Lizenz", "<a href=\"/dl-de\">dl-de/by-2-0</a>"),
            ]
        );
        assert_eq!(
            first.download_link.as_deref(),
            Some("/daten/einwohner.csv")
        );

        assert_eq!(snapshot[1], Record::titled("Wahlbezirke"));
    }

    #[test]
    fn page_without_entries_is_an_empty_snapshot() {
        let snapshot = extractor()
            .extract("<html><body><p>Keine Daten</p></body></html>")
            .expect("extract");
        assert!(snapshot.is_empty());
    }

    #[test]
    fn missing_parts_degrade_to_empty_fields() {
        let page = r#"<div class="ovd_element">
            <div class="toggler_container">
              <div class="row"><label>Stand</label></div>
            </div>
            <a title="Dokument anzeigen">kein Ziel</a>
        </div>"#;
        let snapshot = extractor().extract(page).expect("extract");
        assert_eq!(snapshot.len(), 1);
        let record = &snapshot[0];
        assert_eq!(record.title, "");
        assert_eq!(record.subtitle, "");
        assert_eq!(record.description, "Stand");
        assert_eq!(record.details, vec![Detail::new("Stand", "")]);
        assert_eq!(record.download_link, None);
    }

    #[test]
    fn duplicate_entries_are_kept() {
        let entry = r#"<div class="ovd_element"><div class="toggler_titel"><span class="ovd_title">X</span></div></div>"#;
        let page = format!("<body>{entry}{entry}</body>");
        let snapshot = extractor().extract(&page).expect("extract");
        assert_eq!(snapshot, vec![Record::titled("X"), Record::titled("X")]);
    }

    #[test]
    fn blank_body_is_an_empty_snapshot() {
        assert!(extractor().extract("").expect("extract").is_empty());
        assert!(extractor().extract_bytes(b"  \n").expect("extract").is_empty());
    }

    #[test]
    fn invalid_selector_is_reported_with_role() {
        let selectors = ExtractionSelectors {
            entry: "div[".to_string(),
            ..ExtractionSelectors::default()
        };
        let err = Extractor::new(&selectors).expect_err("selector must not compile");
        assert!(err.to_string().contains("entry"));
    }
}
