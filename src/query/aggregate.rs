use crate::errors::DbError;
use bson::{Bson, Document};

use super::eval::{as_f64, as_i64, compare_bson, compare_docs, eval_filter};
use super::expr::eval_expr;
use super::parse::{parse_filter, parse_sort, truthy};
use super::types::{Filter, SortSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accumulator {
    Sum,
    Avg,
    Min,
    Max,
    First,
    Last,
    Push,
}

impl Accumulator {
    fn parse(name: &str) -> Result<Self, DbError> {
        Ok(match name {
            "$sum" => Self::Sum,
            "$avg" => Self::Avg,
            "$min" => Self::Min,
            "$max" => Self::Max,
            "$first" => Self::First,
            "$last" => Self::Last,
            "$push" => Self::Push,
            other => return Err(DbError::query(format!("unknown group operator '{other}'"))),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectField {
    Include,
    Exclude,
    Computed(Bson),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    Group { id: Bson, fields: Vec<(String, Accumulator, Bson)> },
    Sort(Vec<SortSpec>),
    Skip(usize),
    Limit(usize),
    Project(Vec<(String, ProjectField)>),
    Count(String),
}

/// Parses pipeline stage documents (`{ $group: {...} }`, `{ $sort: {...} }`, ...).
///
/// # Errors
/// Each stage document must hold exactly one known stage with a well-formed body.
pub fn parse_pipeline(pipeline: &[Document]) -> Result<Vec<Stage>, DbError> {
    pipeline.iter().map(parse_stage).collect()
}

fn parse_stage(stage: &Document) -> Result<Stage, DbError> {
    let mut it = stage.iter();
    let (Some((name, body)), None) = (it.next(), it.next()) else {
        return Err(DbError::query(
            "a pipeline stage specification object must contain exactly one field",
        ));
    };
    match (name.as_str(), body) {
        ("$match", Bson::Document(d)) => Ok(Stage::Match(parse_filter(d)?)),
        ("$group", Bson::Document(d)) => parse_group(d),
        ("$sort", Bson::Document(d)) => {
            let spec = parse_sort(d)?;
            if spec.is_empty() {
                return Err(DbError::query("$sort stage must have at least one sort key"));
            }
            Ok(Stage::Sort(spec))
        }
        ("$limit", n) => match count_arg(n) {
            Some(v) if v > 0 => Ok(Stage::Limit(v)),
            _ => Err(DbError::query("the limit must be positive")),
        },
        ("$skip", n) => count_arg(n)
            .map(Stage::Skip)
            .ok_or_else(|| DbError::query("invalid argument to $skip stage")),
        ("$project", Bson::Document(d)) => parse_project(d),
        ("$count", Bson::String(field)) => {
            if field.is_empty() || field.starts_with('$') || field.contains('.') {
                return Err(DbError::query("the count field must be a non-empty string without '$' or '.'"));
            }
            Ok(Stage::Count(field.clone()))
        }
        ("$match" | "$group" | "$sort" | "$project" | "$count", _) => {
            Err(DbError::query(format!("the {name} stage has an invalid specification")))
        }
        (other, _) => Err(DbError::query(format!("unrecognized pipeline stage name: '{other}'"))),
    }
}

fn count_arg(n: &Bson) -> Option<usize> {
    let v = match n {
        #[allow(clippy::cast_possible_truncation)]
        Bson::Double(f) if f.fract() == 0.0 && *f >= 0.0 => *f as i64,
        other => as_i64(other)?,
    };
    usize::try_from(v).ok()
}

fn parse_group(spec: &Document) -> Result<Stage, DbError> {
    let id = spec
        .get("_id")
        .cloned()
        .ok_or_else(|| DbError::query("a group specification must include an _id"))?;
    let mut fields = Vec::new();
    for (name, acc) in spec {
        if name == "_id" {
            continue;
        }
        let Bson::Document(acc) = acc else {
            return Err(DbError::query(format!("the field '{name}' must be an accumulator object")));
        };
        let mut it = acc.iter();
        let (Some((op, arg)), None) = (it.next(), it.next()) else {
            return Err(DbError::query(format!(
                "the field '{name}' must specify one accumulator"
            )));
        };
        fields.push((name.clone(), Accumulator::parse(op)?, arg.clone()));
    }
    Ok(Stage::Group { id, fields })
}

fn parse_project(spec: &Document) -> Result<Stage, DbError> {
    if spec.is_empty() {
        return Err(DbError::query("$project requires at least one output field"));
    }
    let fields = spec
        .iter()
        .map(|(name, v)| {
            let f = match v {
                Bson::Boolean(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => {
                    if truthy(v) { ProjectField::Include } else { ProjectField::Exclude }
                }
                other => ProjectField::Computed(other.clone()),
            };
            (name.clone(), f)
        })
        .collect::<Vec<_>>();
    let inclusive = fields
        .iter()
        .any(|(n, f)| n != "_id" && !matches!(f, ProjectField::Exclude));
    if inclusive
        && let Some((n, _)) =
            fields.iter().find(|(n, f)| n != "_id" && matches!(f, ProjectField::Exclude))
    {
        return Err(DbError::query(format!(
            "invalid $project: cannot use exclusion of '{n}' in inclusion projection"
        )));
    }
    Ok(Stage::Project(fields))
}

/// Runs parsed stages over `docs` in order.
///
/// # Errors
/// Expression evaluation errors inside `$group` or `$project`.
pub fn run_pipeline(mut docs: Vec<Document>, stages: &[Stage]) -> Result<Vec<Document>, DbError> {
    for stage in stages {
        docs = match stage {
            Stage::Match(f) => docs.into_iter().filter(|d| eval_filter(d, f)).collect(),
            Stage::Group { id, fields } => group(&docs, id, fields)?,
            Stage::Sort(spec) => {
                docs.sort_by(|a, b| compare_docs(a, b, spec));
                docs
            }
            Stage::Skip(n) => docs.into_iter().skip(*n).collect(),
            Stage::Limit(n) => {
                docs.truncate(*n);
                docs
            }
            Stage::Project(fields) => {
                docs.iter().map(|d| project_stage(d, fields)).collect::<Result<_, _>>()?
            }
            Stage::Count(field) => {
                if docs.is_empty() {
                    Vec::new()
                } else {
                    let n = i64::try_from(docs.len()).unwrap_or(i64::MAX);
                    let mut out = Document::new();
                    out.insert(field.clone(), i32::try_from(n).map_or(Bson::Int64(n), Bson::Int32));
                    vec![out]
                }
            }
        };
    }
    Ok(docs)
}

#[derive(Debug)]
enum AccState {
    Sum { ints: Option<i64>, total: f64 },
    Avg { total: f64, count: u64 },
    Pick(Option<Bson>),
    Push(Vec<Bson>),
}

impl AccState {
    fn new(acc: Accumulator) -> Self {
        match acc {
            Accumulator::Sum => Self::Sum { ints: Some(0), total: 0.0 },
            Accumulator::Avg => Self::Avg { total: 0.0, count: 0 },
            Accumulator::Min | Accumulator::Max | Accumulator::First | Accumulator::Last => {
                Self::Pick(None)
            }
            Accumulator::Push => Self::Push(Vec::new()),
        }
    }

    fn feed(&mut self, acc: Accumulator, v: Bson) {
        match self {
            Self::Sum { ints, total } => {
                // $sum ignores non-numeric values
                let Some(x) = as_f64(&v) else { return };
                *total += x;
                *ints = match (*ints, as_i64(&v)) {
                    (Some(a), Some(b)) => a.checked_add(b),
                    _ => None,
                };
            }
            Self::Avg { total, count } => {
                if let Some(x) = as_f64(&v) {
                    *total += x;
                    *count += 1;
                }
            }
            Self::Pick(cur) => {
                let ignorable = matches!(v, Bson::Null | Bson::Undefined);
                let replace = match (acc, cur.as_ref()) {
                    (Accumulator::First, Some(_)) => false,
                    (Accumulator::First | Accumulator::Last, _) => true,
                    (_, _) if ignorable => false,
                    (_, None) => true,
                    (Accumulator::Min, Some(c)) => compare_bson(&v, c).is_lt(),
                    (_, Some(c)) => compare_bson(&v, c).is_gt(),
                };
                if replace {
                    *cur = Some(v);
                }
            }
            Self::Push(items) => items.push(v),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(self) -> Bson {
        match self {
            Self::Sum { ints: Some(i), .. } => i32::try_from(i).map_or(Bson::Int64(i), Bson::Int32),
            Self::Sum { total, .. } => Bson::Double(total),
            Self::Avg { count: 0, .. } => Bson::Null,
            Self::Avg { total, count } => Bson::Double(total / count as f64),
            Self::Pick(v) => v.unwrap_or(Bson::Null),
            Self::Push(items) => Bson::Array(items),
        }
    }
}

// Groups come out in first-seen order; numerically equal keys share a group.
fn group(
    docs: &[Document],
    id: &Bson,
    fields: &[(String, Accumulator, Bson)],
) -> Result<Vec<Document>, DbError> {
    let mut groups: Vec<(Bson, Vec<AccState>)> = Vec::new();
    for d in docs {
        let key = eval_expr(id, d)?;
        let idx = match groups.iter().position(|(k, _)| compare_bson(k, &key).is_eq()) {
            Some(i) => i,
            None => {
                groups.push((key, fields.iter().map(|(_, acc, _)| AccState::new(*acc)).collect()));
                groups.len() - 1
            }
        };
        for ((_, acc, expr), state) in fields.iter().zip(groups[idx].1.iter_mut()) {
            state.feed(*acc, eval_expr(expr, d)?);
        }
    }
    Ok(groups
        .into_iter()
        .map(|(key, states)| {
            let mut out = Document::new();
            out.insert("_id", key);
            for ((name, _, _), state) in fields.iter().zip(states) {
                out.insert(name.clone(), state.finish());
            }
            out
        })
        .collect())
}

fn project_stage(doc: &Document, fields: &[(String, ProjectField)]) -> Result<Document, DbError> {
    let inclusive = fields
        .iter()
        .any(|(n, f)| n != "_id" && !matches!(f, ProjectField::Exclude));
    if !inclusive {
        let mut out = doc.clone();
        for (n, _) in fields {
            out.remove(n);
        }
        return Ok(out);
    }
    let mut out = Document::new();
    let id_excluded = fields.iter().any(|(n, f)| n == "_id" && matches!(f, ProjectField::Exclude));
    if !id_excluded && let Some(id) = doc.get("_id") {
        out.insert("_id", id.clone());
    }
    for (name, f) in fields {
        match f {
            ProjectField::Include => {
                if let Some(v) = doc.get(name) {
                    out.insert(name.clone(), v.clone());
                }
            }
            ProjectField::Computed(expr) => {
                out.insert(name.clone(), eval_expr(expr, doc)?);
            }
            ProjectField::Exclude => {}
        }
    }
    Ok(out)
}
