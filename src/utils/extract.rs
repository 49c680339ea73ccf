use encoding_rs::UTF_8;
use serde::Serialize;
use std::borrow::Cow;
use thiserror::Error;
use tracing::{debug, info};

use crate::utils::document_intelligence::DocumentPage;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("line {line} on page {page} has no content")]
    MissingLineContent { page: usize, line: usize },
}

/// Text of a whole document, serialized as `{"Content": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedContent {
    #[serde(rename = "Content")]
    pub content: String,
}

/// Concatenates recognized lines into one string.
///
/// Lines of a page are joined with `\n` and every page is followed by a `\n`,
/// pages kept in the order the backend returned them. A leading byte-order mark
/// on a page is dropped.
pub fn extract_content(pages: &[DocumentPage]) -> Result<ExtractedContent, ExtractionError> {
    info!("Extracting content from the analysis result.");

    let mut content = String::new();
    for (index, page) in pages.iter().enumerate() {
        let page_number = index + 1;
        info!("Processing page {}", page_number);

        let lines = page
            .lines
            .iter()
            .enumerate()
            .map(|(line_index, line)| {
                line.content
                    .as_deref()
                    .ok_or(ExtractionError::MissingLineContent {
                        page: page_number,
                        line: line_index + 1,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let joined = lines.join("\n");
        let page_text = strip_bom(&joined);
        debug!("Extracted content from page {}: {:?}", page_number, page_text);

        content.push_str(&page_text);
        content.push('\n');
    }

    info!("Content extraction completed.");
    Ok(ExtractedContent { content })
}

/// Re-decodes `text` as UTF-8 with BOM sniffing, dropping a leading U+FEFF.
fn strip_bom(text: &str) -> Cow<'_, str> {
    let (decoded, _had_errors) = UTF_8.decode_with_bom_removal(text.as_bytes());
    decoded
}
