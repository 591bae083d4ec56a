use crate::errors::DbError;
use bson::{Bson, Document};

use super::types::{CmpOp, Filter};

/// Name and key pattern of one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub keys: Vec<(String, i32)>,
}

impl IndexSpec {
    /// Validates a key pattern and derives the server-style name (`author_1_published_year_1`).
    ///
    /// # Errors
    /// Empty patterns and directions other than 1 / -1 are rejected.
    pub fn from_keys(keys: &Document) -> Result<Self, DbError> {
        if keys.is_empty() {
            return Err(DbError::query("index keys cannot be empty"));
        }
        let mut parsed = Vec::with_capacity(keys.len());
        for (field, dir) in keys {
            let d = match dir {
                Bson::Int32(1) | Bson::Int64(1) => 1,
                Bson::Int32(-1) | Bson::Int64(-1) => -1,
                Bson::Double(f) if *f == 1.0 => 1,
                Bson::Double(f) if *f == -1.0 => -1,
                other => {
                    return Err(DbError::query(format!(
                        "unsupported index direction for field '{field}': {other}"
                    )));
                }
            };
            parsed.push((field.clone(), d));
        }
        let name = parsed.iter().map(|(f, d)| format!("{f}_{d}")).collect::<Vec<_>>().join("_");
        Ok(Self { name, keys: parsed })
    }

    #[must_use]
    pub fn key_document(&self) -> Document {
        let mut d = Document::new();
        for (f, dir) in &self.keys {
            d.insert(f.clone(), *dir);
        }
        d
    }
}

/// The access path explain reports for a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan {
    CollScan,
    IxScan { index: IndexSpec, bounds: Vec<(String, Bson)> },
}

/// Registered indexes of one collection. Always holds `_id_`.
#[derive(Debug, Clone)]
pub struct IndexCatalog {
    indexes: Vec<IndexSpec>,
}

impl Default for IndexCatalog {
    fn default() -> Self {
        Self { indexes: vec![IndexSpec { name: "_id_".into(), keys: vec![("_id".into(), 1)] }] }
    }
}

impl IndexCatalog {
    /// Registers an index; creating the same key pattern again returns the existing name.
    ///
    /// # Errors
    /// Invalid key patterns, or a name clash with a different key pattern.
    pub fn create(&mut self, keys: &Document) -> Result<String, DbError> {
        let spec = IndexSpec::from_keys(keys)?;
        if let Some(existing) = self.indexes.iter().find(|i| i.name == spec.name) {
            if existing.keys != spec.keys {
                return Err(DbError::query(format!(
                    "an existing index has the same name as the requested index but different keys: {}",
                    spec.name
                )));
            }
            log::debug!("index {} already exists", spec.name);
            return Ok(existing.name.clone());
        }
        let name = spec.name.clone();
        self.indexes.push(spec);
        Ok(name)
    }

    #[must_use]
    pub fn list(&self) -> &[IndexSpec] {
        &self.indexes
    }

    /// Picks the index whose leading keys are covered by the most top-level
    /// equality conditions; falls back to a collection scan.
    #[must_use]
    pub fn plan(&self, filter: &Filter) -> QueryPlan {
        let eqs = equality_conditions(filter);
        let mut best: Option<(&IndexSpec, Vec<(String, Bson)>)> = None;
        for idx in &self.indexes {
            let mut bounds = Vec::new();
            for (field, _) in &idx.keys {
                match eqs.iter().find(|(p, _)| p == field) {
                    Some((p, v)) => bounds.push((p.clone(), v.clone())),
                    None => break,
                }
            }
            if !bounds.is_empty() && best.as_ref().is_none_or(|(_, b)| bounds.len() > b.len()) {
                best = Some((idx, bounds));
            }
        }
        match best {
            Some((index, bounds)) => QueryPlan::IxScan { index: index.clone(), bounds },
            None => QueryPlan::CollScan,
        }
    }
}

fn equality_conditions(filter: &Filter) -> Vec<(String, Bson)> {
    match filter {
        Filter::Cmp { path, op: CmpOp::Eq, value } => vec![(path.clone(), value.clone())],
        Filter::And(fs) => fs.iter().flat_map(equality_conditions).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse_filter;
    use bson::doc;

    #[test]
    fn names_follow_key_pattern() {
        let s = IndexSpec::from_keys(&doc! {"author": 1, "published_year": 1}).unwrap();
        assert_eq!(s.name, "author_1_published_year_1");
        let s = IndexSpec::from_keys(&doc! {"price": -1}).unwrap();
        assert_eq!(s.name, "price_-1");
        assert!(IndexSpec::from_keys(&doc! {"price": "hashed"}).is_err());
        assert!(IndexSpec::from_keys(&doc! {}).is_err());
    }

    #[test]
    fn create_is_idempotent() {
        let mut cat = IndexCatalog::default();
        let a = cat.create(&doc! {"title": 1}).unwrap();
        let b = cat.create(&doc! {"title": 1}).unwrap();
        assert_eq!(a, b);
        assert_eq!(cat.list().len(), 2);
    }

    #[test]
    fn plan_prefers_longest_prefix() {
        let mut cat = IndexCatalog::default();
        cat.create(&doc! {"author": 1}).unwrap();
        cat.create(&doc! {"author": 1, "published_year": 1}).unwrap();
        let f = parse_filter(&doc! {"author": "x", "published_year": 1999}).unwrap();
        match cat.plan(&f) {
            QueryPlan::IxScan { index, bounds } => {
                assert_eq!(index.name, "author_1_published_year_1");
                assert_eq!(bounds.len(), 2);
            }
            QueryPlan::CollScan => panic!("expected index scan"),
        }
        let f = parse_filter(&doc! {"published_year": 1999}).unwrap();
        assert_eq!(cat.plan(&f), QueryPlan::CollScan);
    }
}
