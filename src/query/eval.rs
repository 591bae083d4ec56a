use bson::{Bson, Document};
use std::cmp::Ordering;

use super::types::{CmpOp, Filter, MAX_PATH_DEPTH, MAX_SORT_FIELDS, Order, Projection, SortSpec};

pub fn eval_filter(doc: &Document, filter: &Filter) -> bool {
    match filter {
        Filter::True => true,
        Filter::And(fs) => fs.iter().all(|f| eval_filter(doc, f)),
        Filter::Or(fs) => fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Nor(fs) => !fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Not(f) => !eval_filter(doc, f),
        Filter::Exists { path, exists } => get_path(doc, path).is_some() == *exists,
        Filter::In { path, values } => is_in_set(get_path(doc, path), values),
        Filter::Nin { path, values } => !is_in_set(get_path(doc, path), values),
        Filter::Cmp { path, op, value } => {
            let found = get_path(doc, path);
            match op {
                CmpOp::Eq => matches_eq(found, value),
                CmpOp::Ne => !matches_eq(found, value),
                CmpOp::Gt => matches_ord(found, value, |o| o == Ordering::Greater),
                CmpOp::Gte => matches_ord(found, value, |o| o != Ordering::Less),
                CmpOp::Lt => matches_ord(found, value, |o| o == Ordering::Less),
                CmpOp::Lte => matches_ord(found, value, |o| o != Ordering::Greater),
            }
        }
        #[cfg(feature = "regex")]
        Filter::Regex { path, pattern } => candidates(get_path(doc, path))
            .any(|v| matches!(v, Bson::String(s) if pattern.is_match(s))),
    }
}

// A field holding an array matches when the array itself or any element does.
fn candidates<'a>(found: Option<&'a Bson>) -> impl Iterator<Item = &'a Bson> {
    let elems: &'a [Bson] = match found {
        Some(Bson::Array(items)) => items.as_slice(),
        _ => &[],
    };
    found.into_iter().chain(elems.iter())
}

fn matches_eq(found: Option<&Bson>, value: &Bson) -> bool {
    match found {
        None => matches!(value, Bson::Null),
        Some(_) => candidates(found).any(|v| values_equal(v, value)),
    }
}

fn matches_ord(found: Option<&Bson>, value: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    candidates(found).any(|v| compare_same_bracket(v, value).is_some_and(&accept))
}

fn is_in_set(found: Option<&Bson>, set: &[Bson]) -> bool {
    set.iter().any(|x| matches_eq(found, x))
}

pub(crate) fn as_f64(v: &Bson) -> Option<f64> {
    match v {
        Bson::Int32(i) => Some(f64::from(*i)),
        #[allow(clippy::cast_precision_loss)]
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        Bson::Decimal128(d) => d.to_string().parse::<f64>().ok(),
        _ => None,
    }
}

pub(crate) fn as_i64(v: &Bson) -> Option<i64> {
    match v {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        _ => None,
    }
}

fn is_number(v: &Bson) -> bool {
    matches!(v, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_))
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    if is_number(a) && is_number(b) {
        return compare_numbers(a, b) == Ordering::Equal;
    }
    a == b
}

fn compare_numbers(a: &Bson, b: &Bson) -> Ordering {
    if let (Some(x), Some(y)) = (as_i64(a), as_i64(b)) {
        return x.cmp(&y);
    }
    let x = as_f64(a).unwrap_or(f64::NAN);
    let y = as_f64(b).unwrap_or(f64::NAN);
    x.total_cmp(&y)
}

// Range operators only match values of the same type bracket.
fn compare_same_bracket(a: &Bson, b: &Bson) -> Option<Ordering> {
    if type_rank(a) != type_rank(b) {
        return None;
    }
    match (a, b) {
        (Bson::Array(_), _) | (Bson::Document(_), _) => None,
        _ => Some(compare_bson(a, b)),
    }
}

pub fn compare_docs(a: &Document, b: &Document, sort: &[SortSpec]) -> Ordering {
    for s in sort.iter().take(MAX_SORT_FIELDS) {
        let va = get_path(a, &s.field).unwrap_or(&Bson::Null);
        let vb = get_path(b, &s.field).unwrap_or(&Bson::Null);
        let ord = compare_bson(va, vb);
        if ord != Ordering::Equal {
            return if matches!(s.order, Order::Asc) { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    if path.is_empty() || path.len() > 1024 {
        return None;
    }
    let mut cur = doc;
    let mut parts = path.split('.').enumerate().peekable();
    while let Some((depth, part)) = parts.next() {
        if depth >= MAX_PATH_DEPTH {
            return None;
        }
        let v = cur.get(part)?;
        if parts.peek().is_none() {
            return Some(v);
        }
        match v {
            Bson::Document(d) => cur = d,
            _ => return None,
        }
    }
    None
}

/// Total order over BSON values, numbers compared by value across types.
pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    use bson::Bson as T;
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        _ if is_number(a) => compare_numbers(a, b),
        (T::String(x), T::String(y)) => x.cmp(y),
        (T::Symbol(x), T::Symbol(y)) => x.cmp(y),
        (T::Boolean(x), T::Boolean(y)) => x.cmp(y),
        (T::DateTime(x), T::DateTime(y)) => x.cmp(y),
        (T::ObjectId(x), T::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (T::Timestamp(x), T::Timestamp(y)) => (x.time, x.increment).cmp(&(y.time, y.increment)),
        (T::Array(x), T::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let o = compare_bson(l, r);
                if o != Ordering::Equal {
                    return o;
                }
            }
            x.len().cmp(&y.len())
        }
        (T::Document(x), T::Document(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y.iter()) {
                let o = lk.cmp(rk).then_with(|| compare_bson(lv, rv));
                if o != Ordering::Equal {
                    return o;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => Ordering::Equal,
    }
}

fn type_rank(v: &Bson) -> u8 {
    use bson::Bson as T;
    match v {
        T::MinKey => 0,
        T::Null | T::Undefined => 1,
        T::Int32(_) | T::Int64(_) | T::Double(_) | T::Decimal128(_) => 2,
        T::String(_) | T::Symbol(_) => 3,
        T::Document(_) => 4,
        T::Array(_) => 5,
        T::Binary(_) => 6,
        T::ObjectId(_) => 7,
        T::Boolean(_) => 8,
        T::DateTime(_) => 9,
        T::Timestamp(_) => 10,
        T::RegularExpression(_) => 11,
        T::DbPointer(_) => 12,
        T::JavaScriptCode(_) => 13,
        T::JavaScriptCodeWithScope(_) => 14,
        T::MaxKey => 255,
    }
}

/// Applies a projection to top-level fields.
pub fn project(doc: &Document, projection: &Projection) -> Document {
    match projection {
        Projection::Include { fields, keep_id } => {
            let mut out = Document::new();
            for (k, v) in doc {
                let wanted = if k == "_id" { *keep_id } else { fields.iter().any(|f| f == k) };
                if wanted {
                    out.insert(k.clone(), v.clone());
                }
            }
            out
        }
        Projection::Exclude(fields) => {
            let mut out = doc.clone();
            for f in fields {
                out.remove(f);
            }
            out
        }
    }
}
