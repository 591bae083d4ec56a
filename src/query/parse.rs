use crate::errors::DbError;
use bson::{Bson, Document};

use super::types::{
    CmpOp, Filter, MAX_IN_SET, MAX_SORT_FIELDS, MAX_UPDATE_FIELDS, Order, Projection, SortSpec,
    UpdateDoc,
};
#[cfg(feature = "regex")]
use super::types::Pattern;

/// Parses a query document (`{ field: value, field: { $op: value }, $or: [...] }`).
///
/// # Errors
/// Returns `DbError::Query` for unknown operators or operands of the wrong shape.
pub fn parse_filter(doc: &Document) -> Result<Filter, DbError> {
    let mut clauses = Vec::with_capacity(doc.len());
    for (key, value) in doc {
        clauses.push(parse_clause(key, value)?);
    }
    Ok(match clauses.len() {
        0 => Filter::True,
        1 => clauses.remove(0),
        _ => Filter::And(clauses),
    })
}

fn parse_clause(key: &str, value: &Bson) -> Result<Filter, DbError> {
    match key {
        "$and" => Ok(Filter::And(parse_filter_list(key, value)?)),
        "$or" => Ok(Filter::Or(parse_filter_list(key, value)?)),
        "$nor" => Ok(Filter::Nor(parse_filter_list(key, value)?)),
        k if k.starts_with('$') => Err(DbError::query(format!("unknown top level operator: {k}"))),
        path => match value {
            Bson::Document(ops) if ops.keys().next().is_some_and(|k| k.starts_with('$')) => {
                parse_field_ops(path, ops)
            }
            other => Ok(Filter::Cmp { path: path.to_string(), op: CmpOp::Eq, value: other.clone() }),
        },
    }
}

fn parse_filter_list(op: &str, value: &Bson) -> Result<Vec<Filter>, DbError> {
    let Bson::Array(items) = value else {
        return Err(DbError::query(format!("{op} must be an array")));
    };
    if items.is_empty() {
        return Err(DbError::query(format!("{op} must be a nonempty array")));
    }
    items
        .iter()
        .map(|item| match item {
            Bson::Document(d) => parse_filter(d),
            _ => Err(DbError::query(format!("{op} entries need to be full objects"))),
        })
        .collect()
}

fn parse_field_ops(path: &str, ops: &Document) -> Result<Filter, DbError> {
    let mut out = Vec::with_capacity(ops.len());
    for (op, value) in ops {
        let cmp = |op: CmpOp| Filter::Cmp { path: path.to_string(), op, value: value.clone() };
        let f = match op.as_str() {
            "$eq" => cmp(CmpOp::Eq),
            "$ne" => cmp(CmpOp::Ne),
            "$gt" => cmp(CmpOp::Gt),
            "$gte" => cmp(CmpOp::Gte),
            "$lt" => cmp(CmpOp::Lt),
            "$lte" => cmp(CmpOp::Lte),
            "$in" => Filter::In { path: path.to_string(), values: set_operand(op, value)? },
            "$nin" => Filter::Nin { path: path.to_string(), values: set_operand(op, value)? },
            "$exists" => Filter::Exists { path: path.to_string(), exists: truthy(value) },
            "$not" => match value {
                Bson::Document(inner) if !inner.is_empty() => {
                    Filter::Not(Box::new(parse_field_ops(path, inner)?))
                }
                _ => return Err(DbError::query("$not needs a regex or a document")),
            },
            #[cfg(feature = "regex")]
            "$regex" => {
                let Bson::String(pattern) = value else {
                    return Err(DbError::query("$regex has to be a string"));
                };
                let case_insensitive =
                    matches!(ops.get("$options"), Some(Bson::String(o)) if o.contains('i'));
                let pattern = Pattern::new(pattern, case_insensitive)
                    .map_err(|e| DbError::query(format!("invalid regular expression for '{path}': {e}")))?;
                Filter::Regex { path: path.to_string(), pattern }
            }
            #[cfg(feature = "regex")]
            "$options" if ops.contains_key("$regex") => continue,
            other => return Err(DbError::query(format!("unknown operator: {other}"))),
        };
        out.push(f);
    }
    Ok(match out.len() {
        1 => out.remove(0),
        _ => Filter::And(out),
    })
}

fn set_operand(op: &str, value: &Bson) -> Result<Vec<Bson>, DbError> {
    match value {
        Bson::Array(vals) if vals.len() > MAX_IN_SET => Err(DbError::query(format!(
            "{op} accepts at most {MAX_IN_SET} values, got {}",
            vals.len()
        ))),
        Bson::Array(vals) => Ok(vals.clone()),
        _ => Err(DbError::query(format!("{op} needs an array"))),
    }
}

pub(crate) fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        Bson::Double(f) => *f != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

/// Parses an update document made of `$set`, `$inc` and `$unset`.
///
/// # Errors
/// Replacement-style documents (no operators) and unsupported operators are rejected.
pub fn parse_update(doc: &Document) -> Result<UpdateDoc, DbError> {
    if doc.is_empty() {
        return Err(DbError::query("update document must not be empty"));
    }
    let mut out = UpdateDoc::default();
    for (op, value) in doc {
        if !op.starts_with('$') {
            return Err(DbError::query("update document requires atomic operators"));
        }
        let width = match value {
            Bson::Document(fields) => fields.len(),
            Bson::Array(fields) => fields.len(),
            _ => 0,
        };
        if width > MAX_UPDATE_FIELDS {
            return Err(DbError::query(format!(
                "{op} touches {width} fields, more than the {MAX_UPDATE_FIELDS} allowed"
            )));
        }
        match (op.as_str(), value) {
            ("$set", Bson::Document(fields)) => {
                for (k, v) in fields.iter() {
                    out.set.push((k.clone(), v.clone()));
                }
            }
            ("$inc", Bson::Document(fields)) => {
                for (k, v) in fields.iter() {
                    if !matches!(v, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) {
                        return Err(DbError::query(format!(
                            "cannot increment with non-numeric argument: {{{k}: {v}}}"
                        )));
                    }
                    out.inc.push((k.clone(), v.clone()));
                }
            }
            ("$unset", Bson::Document(fields)) => {
                out.unset.extend(fields.keys().cloned());
            }
            ("$unset", Bson::Array(fields)) => {
                for f in fields.iter() {
                    match f {
                        Bson::String(s) => out.unset.push(s.clone()),
                        _ => return Err(DbError::query("$unset array entries must be strings")),
                    }
                }
            }
            ("$set" | "$inc" | "$unset", _) => {
                return Err(DbError::query(format!("modifiers for {op} must be an object")));
            }
            _ => return Err(DbError::query(format!("unsupported update operator: {op}"))),
        }
    }
    Ok(out)
}

/// Parses `{ field: 1 | -1, ... }`.
///
/// # Errors
/// Any direction other than 1 or -1 is rejected.
pub fn parse_sort(doc: &Document) -> Result<Vec<SortSpec>, DbError> {
    if doc.len() > MAX_SORT_FIELDS {
        return Err(DbError::query(format!("too many sort keys: {}", doc.len())));
    }
    doc.iter()
        .map(|(field, dir)| {
            let order = match dir {
                Bson::Int32(1) | Bson::Int64(1) => Order::Asc,
                Bson::Int32(-1) | Bson::Int64(-1) => Order::Desc,
                Bson::Double(d) if *d == 1.0 => Order::Asc,
                Bson::Double(d) if *d == -1.0 => Order::Desc,
                _ => {
                    return Err(DbError::query(
                        "$sort key ordering must be 1 (for ascending) or -1 (for descending)",
                    ));
                }
            };
            Ok(SortSpec { field: field.clone(), order })
        })
        .collect()
}

/// Parses an inclusion or exclusion projection.
///
/// # Errors
/// Mixing inclusion and exclusion on fields other than `_id` is rejected.
pub fn parse_projection(doc: &Document) -> Result<Projection, DbError> {
    let mut include = Vec::new();
    let mut exclude = Vec::new();
    let mut keep_id = true;
    for (field, value) in doc {
        if !matches!(value, Bson::Boolean(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) {
            return Err(DbError::query(format!("unsupported projection value for field {field}")));
        }
        let on = truthy(value);
        if field == "_id" {
            keep_id = on;
        } else if on {
            include.push(field.clone());
        } else {
            exclude.push(field.clone());
        }
    }
    if include.is_empty() {
        if !keep_id {
            exclude.push("_id".to_string());
        }
        return Ok(Projection::Exclude(exclude));
    }
    if let Some(ex) = exclude.first() {
        return Err(DbError::query(format!(
            "cannot do exclusion on field {ex} in inclusion projection"
        )));
    }
    Ok(Projection::Include { fields: include, keep_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn implicit_equality_and_operator_docs() {
        let f = parse_filter(&doc! {"genre": "Science Fiction"}).unwrap();
        assert!(matches!(f, Filter::Cmp { ref path, op: CmpOp::Eq, .. } if path == "genre"));

        let f = parse_filter(&doc! {"in_stock": true, "published_year": {"$gt": 2010}}).unwrap();
        let Filter::And(parts) = f else { panic!("expected And") };
        assert_eq!(parts.len(), 2);
        assert!(matches!(parts[1], Filter::Cmp { op: CmpOp::Gt, .. }));
    }

    #[test]
    fn empty_filter_is_true() {
        assert_eq!(parse_filter(&doc! {}).unwrap(), Filter::True);
    }

    #[test]
    fn unknown_operators_are_rejected() {
        assert!(parse_filter(&doc! {"a": {"$near": 1}}).is_err());
        assert!(parse_filter(&doc! {"$where": "1"}).is_err());
        assert!(parse_filter(&doc! {"$or": []}).is_err());
    }

    #[test]
    fn update_requires_operators() {
        assert!(parse_update(&doc! {"price": 1}).is_err());
        assert!(parse_update(&doc! {"$inc": {"price": "x"}}).is_err());
        let u = parse_update(&doc! {"$set": {"price": 25.99}, "$unset": {"tmp": ""}}).unwrap();
        assert_eq!(u.set.len(), 1);
        assert_eq!(u.unset, vec!["tmp".to_string()]);
    }

    #[test]
    fn sort_directions() {
        let s = parse_sort(&doc! {"price": -1, "title": 1.0}).unwrap();
        assert_eq!(s[0].order, Order::Desc);
        assert_eq!(s[1].order, Order::Asc);
        assert!(parse_sort(&doc! {"price": 2}).is_err());
    }

    #[test]
    fn projection_modes() {
        let p = parse_projection(&doc! {"title": 1, "author": 1, "price": 1, "_id": 0}).unwrap();
        assert_eq!(
            p,
            Projection::Include {
                fields: vec!["title".into(), "author".into(), "price".into()],
                keep_id: false
            }
        );
        let p = parse_projection(&doc! {"pages": 0}).unwrap();
        assert_eq!(p, Projection::Exclude(vec!["pages".into()]));
        assert!(parse_projection(&doc! {"title": 1, "pages": 0}).is_err());
    }
}
