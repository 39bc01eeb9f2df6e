use std::fmt;

use serde::Serialize;

/// Coarse classification of a fetched document.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Json,
    Html,
    Text,
    Csv,
    Unknown,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContentKind::Json => "json",
            ContentKind::Html => "html",
            ContentKind::Text => "text",
            ContentKind::Csv => "csv",
            ContentKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Classifies by declared content type, falling back to sniffing the body
/// when the header is missing or unrecognized.
pub fn detect_content_type(declared: Option<&str>, body: &str) -> ContentKind {
    if let Some(header) = declared {
        let header = header.to_lowercase();
        if header.contains("application/json") {
            return ContentKind::Json;
        }
        if header.contains("text/html") {
            return ContentKind::Html;
        }
        if header.contains("text/plain") {
            return ContentKind::Text;
        }
        if header.contains("text/csv") {
            return ContentKind::Csv;
        }
    }
    sniff(body)
}

fn sniff(body: &str) -> ContentKind {
    let trimmed = body.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        ContentKind::Json
    } else if trimmed.starts_with('<') {
        ContentKind::Html
    } else {
        ContentKind::Unknown
    }
}
