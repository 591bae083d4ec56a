//! Evaluation of request descriptions (filters, updates, projections, sorts,
//! aggregation pipelines) against in-process documents.

mod aggregate;
mod eval;
mod expr;
mod index;
mod parse;
mod types;
mod update;

pub use aggregate::{Accumulator, ProjectField, Stage, parse_pipeline, run_pipeline};
pub use eval::{compare_bson, compare_docs, eval_filter, get_path, project};
pub use expr::eval_expr;
pub use index::{IndexCatalog, IndexSpec, QueryPlan};
pub use parse::{parse_filter, parse_projection, parse_sort, parse_update};
pub use types::{CmpOp, Filter, Order, Projection, SortSpec, UpdateDoc};
#[cfg(feature = "regex")]
pub use types::Pattern;
pub use update::apply_update;
