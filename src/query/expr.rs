use crate::errors::DbError;
use bson::{Bson, Document};

use super::eval::{as_f64, as_i64, get_path};

/// Evaluates an aggregation expression against one document.
///
/// Field paths (`"$price"`) resolve to the field value or null when missing;
/// operator documents (`{ $divide: [a, b] }`) are applied; other documents
/// and arrays are evaluated element-wise; everything else is a literal.
///
/// # Errors
/// Unknown operators, wrong arities, non-numeric arithmetic operands and
/// division by zero.
pub fn eval_expr(expr: &Bson, doc: &Document) -> Result<Bson, DbError> {
    match expr {
        Bson::String(s) if s.starts_with("$$") => {
            Err(DbError::query(format!("variables are not supported: {s}")))
        }
        Bson::String(s) if s.starts_with('$') => {
            Ok(get_path(doc, &s[1..]).cloned().unwrap_or(Bson::Null))
        }
        Bson::Document(d) => match d.iter().next() {
            Some((op, arg)) if op.starts_with('$') => {
                if d.len() > 1 {
                    return Err(DbError::query(format!(
                        "an expression specification must contain exactly one field, found {}",
                        d.len()
                    )));
                }
                apply_operator(op, arg, doc)
            }
            _ => {
                let mut out = Document::new();
                for (k, v) in d {
                    out.insert(k.clone(), eval_expr(v, doc)?);
                }
                Ok(Bson::Document(out))
            }
        },
        Bson::Array(items) => {
            items.iter().map(|i| eval_expr(i, doc)).collect::<Result<Vec<_>, _>>().map(Bson::Array)
        }
        other => Ok(other.clone()),
    }
}

fn apply_operator(op: &str, arg: &Bson, doc: &Document) -> Result<Bson, DbError> {
    if op == "$literal" {
        return Ok(arg.clone());
    }
    let args = match arg {
        Bson::Array(items) => items.iter().map(|i| eval_expr(i, doc)).collect::<Result<Vec<_>, _>>()?,
        single => vec![eval_expr(single, doc)?],
    };
    match op {
        "$add" => fold_numbers(op, &args, i64::checked_add, |a, b| a + b),
        "$multiply" => fold_numbers(op, &args, i64::checked_mul, |a, b| a * b),
        "$subtract" => {
            let [a, b] = arity::<2>(op, args)?;
            fold_numbers(op, &[a, b], i64::checked_sub, |a, b| a - b)
        }
        "$divide" => {
            let [a, b] = arity::<2>(op, args)?;
            if a.as_null().is_some() || b.as_null().is_some() {
                return Ok(Bson::Null);
            }
            let (x, y) = (number(op, &a)?, number(op, &b)?);
            if y == 0.0 {
                return Err(DbError::query("can't $divide by zero"));
            }
            Ok(Bson::Double(x / y))
        }
        "$mod" => {
            let [a, b] = arity::<2>(op, args)?;
            if a.as_null().is_some() || b.as_null().is_some() {
                return Ok(Bson::Null);
            }
            if let (Some(x), Some(y)) = (as_i64(&a), as_i64(&b)) {
                if y == 0 {
                    return Err(DbError::query("can't $mod by zero"));
                }
                // i64::MIN % -1 overflows; the remainder is 0
                return Ok(Bson::Int64(x.checked_rem(y).unwrap_or(0)));
            }
            let (x, y) = (number(op, &a)?, number(op, &b)?);
            if y == 0.0 {
                return Err(DbError::query("can't $mod by zero"));
            }
            Ok(Bson::Double(x % y))
        }
        "$floor" | "$ceil" => {
            let [a] = arity::<1>(op, args)?;
            match a {
                Bson::Null => Ok(Bson::Null),
                Bson::Int32(_) | Bson::Int64(_) => Ok(a),
                other => {
                    let x = number(op, &other)?;
                    Ok(Bson::Double(if op == "$floor" { x.floor() } else { x.ceil() }))
                }
            }
        }
        _ => Err(DbError::query(format!("unrecognized expression '{op}'"))),
    }
}

fn arity<const N: usize>(op: &str, args: Vec<Bson>) -> Result<[Bson; N], DbError> {
    let got = args.len();
    args.try_into().map_err(|_| {
        DbError::query(format!("expression {op} takes exactly {N} arguments, {got} were passed in"))
    })
}

fn number(op: &str, v: &Bson) -> Result<f64, DbError> {
    as_f64(v).ok_or_else(|| {
        DbError::query(format!("{op} only supports numeric types, not {:?}", v.element_type()))
    })
}

// Integers stay integral until overflow or a double operand shows up.
fn fold_numbers(
    op: &str,
    args: &[Bson],
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Bson, DbError> {
    if args.iter().any(|a| matches!(a, Bson::Null | Bson::Undefined)) {
        return Ok(Bson::Null);
    }
    let Some((first, rest)) = args.split_first() else {
        return Err(DbError::query(format!("{op} needs at least one argument")));
    };
    let mut int_acc = as_i64(first);
    let mut float_acc = number(op, first)?;
    for a in rest {
        let x = number(op, a)?;
        int_acc = match (int_acc, as_i64(a)) {
            (Some(acc), Some(i)) => int_op(acc, i),
            _ => None,
        };
        float_acc = float_op(float_acc, x);
    }
    Ok(match int_acc {
        Some(i) => i32::try_from(i).map_or(Bson::Int64(i), Bson::Int32),
        None => Bson::Double(float_acc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn decade_expression() {
        let d = doc! {"published_year": 2016};
        let e = Bson::Document(
            doc! {"$multiply": [ { "$floor": { "$divide": ["$published_year", 10] } }, 10 ]},
        );
        let v = eval_expr(&e, &d).unwrap();
        assert_eq!(as_f64(&v), Some(2010.0));
    }

    #[test]
    fn missing_field_propagates_null() {
        let d = doc! {};
        let e = Bson::Document(doc! {"$divide": ["$published_year", 10]});
        assert_eq!(eval_expr(&e, &d).unwrap(), Bson::Null);
    }

    #[test]
    fn integer_arithmetic_stays_integral() {
        let d = doc! {"a": 4, "b": 3};
        let e = Bson::Document(doc! {"$add": ["$a", "$b", 1]});
        assert_eq!(eval_expr(&e, &d).unwrap(), Bson::Int32(8));
        let e = Bson::Document(doc! {"$subtract": ["$a", 0.5]});
        assert_eq!(eval_expr(&e, &d).unwrap(), Bson::Double(3.5));
    }

    #[test]
    fn mod_of_most_negative_by_minus_one_is_zero() {
        let d = doc! {"x": i64::MIN};
        let e = Bson::Document(doc! {"$mod": ["$x", -1]});
        assert_eq!(eval_expr(&e, &d).unwrap(), Bson::Int64(0));
        let e = Bson::Document(doc! {"$mod": ["$x", 7]});
        assert_eq!(eval_expr(&e, &d).unwrap(), Bson::Int64(i64::MIN % 7));
    }

    #[test]
    fn errors() {
        let d = doc! {"a": 1};
        assert!(eval_expr(&Bson::Document(doc! {"$divide": ["$a", 0]}), &d).is_err());
        assert!(eval_expr(&Bson::Document(doc! {"$pow": ["$a", 2]}), &d).is_err());
        assert!(eval_expr(&Bson::Document(doc! {"$subtract": ["$a"]}), &d).is_err());
        assert!(eval_expr(&Bson::Document(doc! {"$add": ["$a", "x"]}), &d).is_err());
    }
}
