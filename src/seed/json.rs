use crate::errors::DbError;
use bson::{Bson, Document};

fn to_document(value: serde_json::Value) -> Result<Document, String> {
    match Bson::try_from(value).map_err(|e| e.to_string())? {
        Bson::Document(d) => Ok(d),
        other => Err(format!("expected an object, found {:?}", other.element_type())),
    }
}

/// A JSON array of objects; text that is not an array is read as NDJSON.
///
/// # Errors
/// Malformed JSON or non-object elements, naming the element or line.
pub fn parse_json(text: &str) -> Result<Vec<Document>, DbError> {
    if !text.trim_start().starts_with('[') {
        return parse_ndjson(text);
    }
    let values: Vec<serde_json::Value> = serde_json::from_str(text)?;
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| to_document(v).map_err(|e| DbError::Seed(format!("element {}: {e}", i + 1))))
        .collect()
}

/// One object per line; blank lines are skipped.
///
/// # Errors
/// Malformed lines, naming the 1-based line number.
pub fn parse_ndjson(text: &str) -> Result<Vec<Document>, DbError> {
    let mut docs = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: serde_json::Value =
            serde_json::from_str(line).map_err(|e| DbError::Seed(format!("line {}: {e}", i + 1)))?;
        docs.push(to_document(value).map_err(|e| DbError::Seed(format!("line {}: {e}", i + 1)))?);
    }
    Ok(docs)
}
