//! PartPageExtractor - 部品ページの抽出ルール（scraper / CSS セレクタ）
//!
//! ページ構造:
//! - `span.part-number` があれば部品ページ（なければ wrong page）
//! - `#part-details` 内の `<div><b>Key:</b> value</div>` → details
//! - `table.specs` の各行 `<td>key</td><td>value</td>` → specs
//! - `/pdf` で始まる href → データシート

use scraper::{ElementRef, Html, Selector};

use crate::domain::{ExtractError, ExtractedPage, FieldMap};
use crate::ports::MarkupExtractor;

/// CSS selectors driving the extraction.
#[derive(Debug, Clone)]
pub struct PartPageRules {
    pub identity: String,
    pub details_block: String,
    pub details_key: String,
    pub specs_row: String,
    pub specs_cell: String,
    pub attachment_prefix: String,
}

impl Default for PartPageRules {
    fn default() -> Self {
        Self {
            identity: "span.part-number".to_string(),
            details_block: "#part-details > div".to_string(),
            details_key: "b".to_string(),
            specs_row: "table.specs tr".to_string(),
            specs_cell: "td".to_string(),
            attachment_prefix: "/pdf".to_string(),
        }
    }
}

pub struct PartPageExtractor {
    identity: Selector,
    details_block: Selector,
    details_key: Selector,
    specs_row: Selector,
    specs_cell: Selector,
    href: Selector,
    attachment_prefix: String,
}

fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Markup(format!("bad selector {css:?}: {e}")))
}

impl PartPageExtractor {
    pub fn from_rules(rules: &PartPageRules) -> Result<Self, ExtractError> {
        Ok(Self {
            identity: selector(&rules.identity)?,
            details_block: selector(&rules.details_block)?,
            details_key: selector(&rules.details_key)?,
            specs_row: selector(&rules.specs_row)?,
            specs_cell: selector(&rules.specs_cell)?,
            href: selector("[href]")?,
            attachment_prefix: rules.attachment_prefix.clone(),
        })
    }

    fn details(&self, doc: &Html) -> FieldMap {
        let mut details = FieldMap::new();
        for block in doc.select(&self.details_block) {
            let Some(key_el) = block.select(&self.details_key).next() else {
                continue;
            };
            let raw_key = key_el.text().collect::<String>();
            let raw_key = raw_key.trim();
            let key = raw_key.strip_suffix(':').unwrap_or(raw_key).trim();
            if key.is_empty() {
                continue;
            }

            // 値は div 直下のテキストだけ（<b> の中身は含めない）
            let value = join_clean(
                block
                    .children()
                    .filter_map(|child| child.value().as_text().map(|t| &**t)),
            );
            details.insert(key.to_string(), value);
        }
        details
    }

    fn specs(&self, doc: &Html) -> FieldMap {
        let mut specs = FieldMap::new();
        for row in doc.select(&self.specs_row) {
            let mut cells = row.select(&self.specs_cell);
            let (Some(key_cell), Some(value_cell)) = (cells.next(), cells.next()) else {
                continue;
            };
            let key = cell_text(key_cell);
            if key.is_empty() {
                continue;
            }
            specs.insert(key, cell_text(value_cell));
        }
        specs
    }

    fn attachment(&self, doc: &Html) -> Option<String> {
        doc.select(&self.href)
            .filter_map(|el| el.value().attr("href"))
            .filter(|href| href.starts_with(&self.attachment_prefix))
            .last()
            .map(str::to_string)
    }
}

impl MarkupExtractor for PartPageExtractor {
    fn extract(&self, markup: &str) -> Result<ExtractedPage, ExtractError> {
        let doc = Html::parse_document(markup);

        if doc.select(&self.identity).next().is_none() {
            return Err(ExtractError::WrongPage);
        }

        Ok(ExtractedPage {
            details: self.details(&doc),
            specs: self.specs(&doc),
            attachment_url: self.attachment(&doc),
        })
    }
}

/// Strip layout whitespace; drop empties and "Show more"-style toggles.
fn clean(raw: &str) -> Option<String> {
    let s = raw.replace(['\n', '\t'], "");
    let s = s.trim();
    if s.is_empty() || s.to_lowercase().starts_with("show") {
        return None;
    }
    Some(s.to_string())
}

fn join_clean<'a>(pieces: impl Iterator<Item = &'a str>) -> String {
    pieces.filter_map(clean).collect::<Vec<_>>().join(" ")
}

fn cell_text(cell: ElementRef<'_>) -> String {
    join_clean(cell.text())
}
