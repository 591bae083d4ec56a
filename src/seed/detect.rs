//! Format detection for seed files.

use std::path::Path;

use super::SeedFormat;

/// By extension first, then by the first non-blank character of `text`.
#[must_use]
pub fn detect_format(path: Option<&Path>, text: &str) -> SeedFormat {
    if let Some(ext) = path.and_then(Path::extension).and_then(|s| s.to_str()) {
        match ext.to_ascii_lowercase().as_str() {
            "json" => return SeedFormat::Json,
            "jsonl" | "ndjson" => return SeedFormat::Ndjson,
            "csv" => return SeedFormat::Csv,
            _ => {}
        }
    }
    match text.trim_start().chars().next() {
        Some('[') => SeedFormat::Json,
        Some('{') => SeedFormat::Ndjson,
        _ => SeedFormat::Csv,
    }
}
