use crate::errors::DbError;
use bson::{Bson, Document};

use super::eval::{as_f64, as_i64};
use super::types::UpdateDoc;

/// Applies `$set`, `$inc` and `$unset` in that order. Returns whether the
/// document changed.
///
/// # Errors
/// Fails on empty path segments, on writes to `_id`, when a path crosses a
/// non-document value, or when `$inc` targets a non-numeric field. The
/// document may be partially modified when an error is returned; callers
/// apply updates to a copy.
pub fn apply_update(doc: &mut Document, upd: &UpdateDoc) -> Result<bool, DbError> {
    let mut changed = false;
    for (path, value) in &upd.set {
        let (segs, last) = split_path(path)?;
        let parent = ensure_parent(doc, &segs)?;
        let old = parent.insert(last, value.clone());
        changed |= old.as_ref() != Some(value);
    }
    for (path, by) in &upd.inc {
        let (segs, last) = split_path(path)?;
        let parent = ensure_parent(doc, &segs)?;
        let next = add_numbers(parent.get(last), by)
            .ok_or_else(|| DbError::query(format!("cannot apply $inc to non-numeric field '{path}'")))?;
        let old = parent.insert(last, next.clone());
        changed |= old.as_ref() != Some(&next);
    }
    for path in &upd.unset {
        let (segs, last) = split_path(path)?;
        if let Some(parent) = existing_parent(doc, &segs) {
            changed |= parent.remove(last).is_some();
        }
    }
    Ok(changed)
}

fn split_path(path: &str) -> Result<(Vec<&str>, &str), DbError> {
    if path == "_id" || path.starts_with("_id.") {
        return Err(DbError::query("performing an update on the path '_id' would modify the immutable field '_id'"));
    }
    let mut segs: Vec<&str> = path.split('.').collect();
    if segs.iter().any(|s| s.is_empty()) {
        return Err(DbError::query(format!("empty field name in path '{path}'")));
    }
    let last = segs.pop().unwrap_or_default();
    Ok((segs, last))
}

fn ensure_parent<'a>(root: &'a mut Document, segs: &[&str]) -> Result<&'a mut Document, DbError> {
    let mut cur = root;
    for seg in segs {
        if !cur.contains_key(*seg) {
            cur.insert(*seg, Document::new());
        }
        match cur.get_mut(*seg) {
            Some(Bson::Document(d)) => cur = d,
            _ => {
                return Err(DbError::query(format!(
                    "cannot create field in non-document element '{seg}'"
                )));
            }
        }
    }
    Ok(cur)
}

fn existing_parent<'a>(root: &'a mut Document, segs: &[&str]) -> Option<&'a mut Document> {
    let mut cur = root;
    for seg in segs {
        match cur.get_mut(*seg) {
            Some(Bson::Document(d)) => cur = d,
            _ => return None,
        }
    }
    Some(cur)
}

// Integer increments stay integral; anything involving a double becomes a double.
#[allow(clippy::cast_precision_loss)]
fn add_numbers(current: Option<&Bson>, by: &Bson) -> Option<Bson> {
    let Some(cur) = current else {
        return Some(by.clone());
    };
    match (cur, by) {
        (Bson::Int32(a), Bson::Int32(b)) => Some(
            a.checked_add(*b).map_or_else(|| Bson::Int64(i64::from(*a) + i64::from(*b)), Bson::Int32),
        ),
        _ => {
            if let (Some(a), Some(b)) = (as_i64(cur), as_i64(by)) {
                return Some(
                    a.checked_add(b).map_or_else(|| Bson::Double(a as f64 + b as f64), Bson::Int64),
                );
            }
            Some(Bson::Double(as_f64(cur)? + as_f64(by)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn upd(set: Vec<(&str, Bson)>, inc: Vec<(&str, Bson)>, unset: Vec<&str>) -> UpdateDoc {
        UpdateDoc {
            set: set.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            inc: inc.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            unset: unset.into_iter().map(str::to_string).collect(),
        }
    }

    #[test]
    fn set_inc_unset() {
        let mut d = doc! {"price": 10.0, "stock": {"count": 3}, "tmp": 1};
        let u = upd(
            vec![("price", Bson::Double(25.99))],
            vec![("stock.count", Bson::Int32(2))],
            vec!["tmp"],
        );
        assert!(apply_update(&mut d, &u).unwrap());
        assert_eq!(d.get_f64("price").unwrap(), 25.99);
        assert_eq!(d.get_document("stock").unwrap().get_i32("count").unwrap(), 5);
        assert!(d.get("tmp").is_none());
    }

    #[test]
    fn setting_same_value_is_not_a_modification() {
        let mut d = doc! {"price": 25.99};
        let u = upd(vec![("price", Bson::Double(25.99))], vec![], vec![]);
        assert!(!apply_update(&mut d, &u).unwrap());
    }

    #[test]
    fn set_creates_intermediate_documents() {
        let mut d = doc! {};
        let u = upd(vec![("meta.tags.primary", Bson::String("x".into()))], vec![], vec![]);
        assert!(apply_update(&mut d, &u).unwrap());
        assert_eq!(
            d.get_document("meta").unwrap().get_document("tags").unwrap().get_str("primary").unwrap(),
            "x"
        );
    }

    #[test]
    fn inc_rejects_non_numeric_and_id_is_immutable() {
        let mut d = doc! {"title": "x"};
        let u = upd(vec![], vec![("title", Bson::Int32(1))], vec![]);
        assert!(apply_update(&mut d, &u).is_err());
        let u = upd(vec![("_id", Bson::Int32(1))], vec![], vec![]);
        assert!(apply_update(&mut d, &u).is_err());
    }

    #[test]
    fn unset_missing_path_is_noop() {
        let mut d = doc! {"a": 1};
        let u = upd(vec![], vec![], vec!["b.c"]);
        assert!(!apply_update(&mut d, &u).unwrap());
        assert!(d.get("b").is_none());
    }
}
