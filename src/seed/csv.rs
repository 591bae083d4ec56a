use crate::errors::DbError;
use bson::{Bson, Document};

/// Integer, float, `true`/`false`, else string.
#[must_use]
pub fn field_to_bson(field: &str) -> Bson {
    if let Ok(i) = field.parse::<i64>() {
        return i32::try_from(i).map_or(Bson::Int64(i), Bson::Int32);
    }
    if let Ok(f) = field.parse::<f64>()
        && f.is_finite()
    {
        return Bson::Double(f);
    }
    match field.to_ascii_lowercase().as_str() {
        "true" => Bson::Boolean(true),
        "false" => Bson::Boolean(false),
        _ => Bson::String(field.to_string()),
    }
}

/// Header row names the fields; empty cells are left out of the document.
///
/// # Errors
/// A missing header row, or a malformed record (naming its row).
pub fn parse_csv(text: &str) -> Result<Vec<Document>, DbError> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).trim(csv::Trim::All).from_reader(text.as_bytes());
    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    if headers.iter().all(String::is_empty) {
        return Err(DbError::Seed("csv seed requires a header row".into()));
    }
    let mut docs = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        // row 1 is the header
        let rec = rec.map_err(|e| DbError::Seed(format!("row {}: {e}", i + 2)))?;
        let mut d = Document::new();
        for (col, field) in rec.iter().enumerate() {
            if field.is_empty() {
                continue;
            }
            let key = headers.get(col).cloned().unwrap_or_else(|| format!("field_{col}"));
            d.insert(key, field_to_bson(field));
        }
        docs.push(d);
    }
    Ok(docs)
}
