use crate::errors::DbError;
use crate::runner::Outcome;
use bson::{Bson, Document};
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Labelled blocks, one document per line.
    #[default]
    Human,
    /// One NDJSON record per step.
    Json,
}

impl FromStr for OutputMode {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "text" => Ok(Self::Human),
            "json" | "ndjson" => Ok(Self::Json),
            other => Err(DbError::Config(format!("unknown output mode '{other}' (expected human or json)"))),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Human => "human",
            Self::Json => "json",
        })
    }
}

/// Relaxed extended JSON for a document.
#[must_use]
pub fn doc_to_json(doc: &Document) -> serde_json::Value {
    Bson::Document(doc.clone()).into_relaxed_extjson()
}

/// Writes step results to `out` in the chosen mode.
pub struct Reporter<W: Write> {
    out: W,
    mode: OutputMode,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, mode: OutputMode) -> Self {
        Self { out, mode }
    }

    #[must_use]
    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// # Errors
    /// Write or serialization failures.
    pub fn report(&mut self, step: usize, label: &str, outcome: &Outcome) -> Result<(), DbError> {
        match self.mode {
            OutputMode::Json => {
                let record = serde_json::json!({
                    "step": step,
                    "label": label,
                    "kind": outcome.kind(),
                    "result": outcome.to_json(),
                });
                writeln!(self.out, "{record}")?;
            }
            OutputMode::Human => {
                writeln!(self.out)?;
                writeln!(self.out, "{label}:")?;
                match outcome {
                    Outcome::Documents(docs) => {
                        if docs.is_empty() {
                            writeln!(self.out, "(no documents)")?;
                        }
                        for d in docs {
                            writeln!(self.out, "{}", doc_to_json(d))?;
                        }
                    }
                    Outcome::Updated(r) => writeln!(self.out, "matched={} modified={}", r.matched, r.modified)?,
                    Outcome::Deleted(r) => writeln!(self.out, "deleted={}", r.deleted)?,
                    Outcome::IndexCreated(name) => writeln!(self.out, "{name}")?,
                    Outcome::Explained(plan) => {
                        writeln!(self.out, "{}", serde_json::to_string_pretty(&doc_to_json(plan))?)?;
                    }
                }
            }
        }
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DeleteReport;
    use bson::doc;

    #[test]
    fn human_mode_labels_each_block() {
        let mut r = Reporter::new(Vec::new(), OutputMode::Human);
        r.report(1, "Science Fiction books", &Outcome::Documents(vec![doc! {"title": "Dune", "price": 9.5}]))
            .unwrap();
        r.report(5, "Delete Old Book", &Outcome::Deleted(DeleteReport { deleted: 1 })).unwrap();
        let text = String::from_utf8(r.into_inner()).unwrap();
        assert_eq!(
            text,
            "\nScience Fiction books:\n{\"title\":\"Dune\",\"price\":9.5}\n\nDelete Old Book:\ndeleted=1\n"
        );
    }

    #[test]
    fn json_mode_writes_one_record_per_step() {
        let mut r = Reporter::new(Vec::new(), OutputMode::Json);
        r.report(14, "Index on title", &Outcome::IndexCreated("title_1".into())).unwrap();
        let text = String::from_utf8(r.into_inner()).unwrap();
        let v: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(v["step"], 14);
        assert_eq!(v["kind"], "index");
        assert_eq!(v["result"], "title_1");
    }

    #[test]
    fn parses_mode_names() {
        assert_eq!("JSON".parse::<OutputMode>().unwrap(), OutputMode::Json);
        assert!("xml".parse::<OutputMode>().is_err());
    }
}
