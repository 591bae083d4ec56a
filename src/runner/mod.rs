//! Sequential execution of the bookstore steps.

mod steps;

pub use steps::{Outcome, QueryStep, Request, bookstore_steps};

use crate::errors::DbError;
use crate::logger::AUDIT_TARGET;
use crate::output::Reporter;
use crate::store::BookStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub steps_completed: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

fn millis(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Runs steps one after another, each awaited before the next.
#[derive(Debug, Clone)]
pub struct QueryRunner {
    steps: Vec<QueryStep>,
}

impl Default for QueryRunner {
    fn default() -> Self {
        Self::new(bookstore_steps())
    }
}

impl QueryRunner {
    #[must_use]
    pub fn new(steps: Vec<QueryStep>) -> Self {
        Self { steps }
    }

    #[must_use]
    pub fn steps(&self) -> &[QueryStep] {
        &self.steps
    }

    /// Stops at the first failing step. The store stays open.
    ///
    /// # Errors
    /// [`DbError::StepFailed`] naming the step that failed to run or report.
    pub async fn run_all<S: BookStore, W: Write>(
        &self,
        store: &S,
        reporter: &mut Reporter<W>,
    ) -> Result<RunSummary, DbError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        for (i, step) in self.steps.iter().enumerate() {
            let n = i + 1;
            let t = Instant::now();
            let fail = |e: DbError| DbError::StepFailed { step: n, label: step.label.clone(), source: Box::new(e) };
            let outcome = step.request.dispatch(store).await.map_err(fail)?;
            log::info!("step {n} ({}) finished in {} ms", step.label, millis(t));
            if step.request.is_mutation() {
                log::info!(target: AUDIT_TARGET, "{} on {}: {}", step.label, store.namespace(), outcome.to_json());
            }
            reporter.report(n, &step.label, &outcome).map_err(fail)?;
        }
        Ok(RunSummary { steps_completed: self.steps.len(), started_at, elapsed_ms: millis(clock) })
    }

    /// Runs every step, then closes the store on every path.
    ///
    /// # Errors
    /// The step error if one occurred, else a close error. A close failure
    /// after a step failure is logged only.
    pub async fn run_and_close<S: BookStore, W: Write>(
        &self,
        store: S,
        reporter: &mut Reporter<W>,
    ) -> Result<RunSummary, DbError> {
        let result = self.run_all(&store, reporter).await;
        let closed = store.close().await;
        match (result, closed) {
            (Ok(summary), Ok(())) => {
                log::info!("completed {} steps in {} ms", summary.steps_completed, summary.elapsed_ms);
                Ok(summary)
            }
            (Ok(_), Err(e)) | (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                log::warn!("closing after failure also failed: {close_err}");
                Err(e)
            }
        }
    }
}

/// Runs the bookstore sequence against `store` and releases it.
///
/// # Errors
/// See [`QueryRunner::run_and_close`].
pub async fn run_queries<S: BookStore, W: Write>(store: S, reporter: &mut Reporter<W>) -> Result<RunSummary, DbError> {
    QueryRunner::default().run_and_close(store, reporter).await
}
