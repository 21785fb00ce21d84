//! Per-run correlation state
//!
//! A [`RunContext`] is created once at stage start and passed to every
//! checkpoint. Nothing about a run lives in globals.

use crate::logging::LogLabels;
use blobseal_core::StageKind;
use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

/// Correlation state of one stage invocation
#[derive(Debug, Clone)]
pub struct RunContext {
    process_id: String,
    stage: StageKind,
    work_file: String,
    started_at: DateTime<Local>,
    started: Instant,
    run_date: String,
}

impl RunContext {
    pub fn new(
        stage: StageKind,
        process_id: impl Into<String>,
        work_file: impl Into<String>,
        started_at: DateTime<Local>,
    ) -> Self {
        Self {
            process_id: process_id.into(),
            stage,
            work_file: work_file.into(),
            run_date: started_at.format("%Y%m%d").to_string(),
            started_at,
            started: Instant::now(),
        }
    }

    /// A fresh process id: UUID v4 as 32 lowercase hex characters
    pub fn generate_process_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    pub fn stage(&self) -> StageKind {
        self.stage
    }

    /// Stage identity as it appears in the `name` label
    pub fn stage_name(&self) -> &'static str {
        self.stage.stage_name()
    }

    pub fn work_file(&self) -> &str {
        &self.work_file
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Local start date as `YYYYMMDD`, fixed for the whole run
    pub fn run_date(&self) -> &str {
        &self.run_date
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whole seconds since start, rounded
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed().as_secs_f64().round() as u64
    }

    /// Labels carried by every log event of this run
    pub fn labels(&self) -> LogLabels {
        LogLabels::new(&self.process_id, self.stage_name(), &self.work_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 15, 23, 59, 58).unwrap()
    }

    #[test]
    fn test_run_date_is_fixed_at_start() {
        let ctx = RunContext::new(StageKind::Encrypt, "abc123", "orders", start());
        assert_eq!(ctx.run_date(), "20240315");
        assert_eq!(ctx.started_at(), start());
    }

    #[test]
    fn test_generate_process_id() {
        let a = RunContext::generate_process_id();
        let b = RunContext::generate_process_id();

        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_labels() {
        let ctx = RunContext::new(StageKind::Decrypt, "abc123", "orders", start());
        let labels = ctx.labels();

        assert_eq!(labels.process_id, "abc123");
        assert_eq!(labels.name, "desencriptar");
        assert_eq!(labels.work_file, "orders");
        assert_eq!(labels.enroute, "yes");
    }
}
