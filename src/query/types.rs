use bson::Bson;
use serde::{Deserialize, Serialize};

// Safety limits to prevent resource abuse
pub(crate) const MAX_PATH_DEPTH: usize = 32;
pub(crate) const MAX_IN_SET: usize = 1000;
pub(crate) const MAX_SORT_FIELDS: usize = 32;
pub(crate) const MAX_UPDATE_FIELDS: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    True,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Not(Box<Filter>),
    Exists { path: String, exists: bool },
    In { path: String, values: Vec<Bson> },
    Nin { path: String, values: Vec<Bson> },
    Cmp { path: String, op: CmpOp, value: Bson },
    #[cfg(feature = "regex")]
    Regex { path: String, pattern: Pattern },
}

/// A `$regex` operand compiled once at parse time.
#[cfg(feature = "regex")]
#[derive(Debug, Clone)]
pub struct Pattern {
    re: regex::Regex,
    case_insensitive: bool,
}

#[cfg(feature = "regex")]
impl Pattern {
    /// # Errors
    /// Patterns the regex engine cannot compile.
    pub fn new(source: &str, case_insensitive: bool) -> Result<Self, regex::Error> {
        let re = regex::RegexBuilder::new(source).case_insensitive(case_insensitive).build()?;
        Ok(Self { re, case_insensitive })
    }

    #[must_use]
    pub fn is_match(&self, s: &str) -> bool {
        self.re.is_match(s)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.re.as_str()
    }
}

#[cfg(feature = "regex")]
impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str() && self.case_insensitive == other.case_insensitive
    }
}

/// Which fields a find or `$project` hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Include { fields: Vec<String>, keep_id: bool },
    Exclude(Vec<String>),
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct UpdateDoc {
    pub set: Vec<(String, Bson)>,
    pub inc: Vec<(String, Bson)>,
    pub unset: Vec<String>,
}

impl UpdateDoc {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.inc.is_empty() && self.unset.is_empty()
    }
}
