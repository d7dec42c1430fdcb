//! Run result hand-off: the record passed on to whatever stores or reports it.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::termination::RunStatus;
use crate::driver::RunOutcome;

/// Serialized summary of a finished run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunReport {
    pub problem_id: String,
    pub status: RunStatus,
    /// Winning or best-effort candidate source.
    pub source: String,
    pub fitness: f64,
    /// Generation in which the reported candidate was produced.
    pub found_in_generation: u32,
    /// Last generation that was evaluated.
    pub generations: u32,
    pub evaluations: usize,
    pub cache_hits: usize,
    pub substitutions: usize,
    pub started_at: String,
    pub finished_at: String,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new(
        problem_id: &str,
        outcome: &RunOutcome,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
        Self {
            problem_id: problem_id.to_string(),
            status: outcome.status,
            source: outcome.best.source.clone(),
            fitness: outcome.best_fitness(),
            found_in_generation: outcome.best.generation,
            generations: outcome.generations,
            evaluations: outcome.evaluations,
            cache_hits: outcome.cache_hits,
            substitutions: outcome.substitutions,
            started_at: started_at.to_rfc3339(),
            finished_at: finished_at.to_rfc3339(),
            duration_ms,
        }
    }
}

/// Atomically write the report as pretty JSON with a trailing newline.
pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let mut buf = serde_json::to_string_pretty(report).context("serialize run report")?;
    buf.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
