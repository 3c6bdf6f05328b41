//! # Sync Run State Machine
//!
//! Lifecycle of one synchronization attempt with validated transitions.
//!
//! ## Overview
//!
//! A [`SyncRun`] is created per run, driven to a terminal phase and then
//! discarded. It carries the counters reported to subscribers and produces
//! the final [`SyncReport`].
//!
//! ## State Machine
//!
//! ```text
//! Idle → Analyzing → Diffing → Transferring → Finalizing → Completed
//!                       │                          ↑      → CompletedWithErrors
//!                       └──── (empty queue) ───────┘
//!
//! any non-terminal phase ─────────────────────────────────→ Aborted
//! ```

use crate::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Unique identifier for a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncRunId(Uuid);

impl SyncRunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SyncRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Analyzing,
    Diffing,
    Transferring,
    Finalizing,
    Completed,
    CompletedWithErrors,
    Aborted,
}

impl SyncPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncPhase::Completed | SyncPhase::CompletedWithErrors | SyncPhase::Aborted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Analyzing => "analyzing",
            SyncPhase::Diffing => "diffing",
            SyncPhase::Transferring => "transferring",
            SyncPhase::Finalizing => "finalizing",
            SyncPhase::Completed => "completed",
            SyncPhase::CompletedWithErrors => "completed_with_errors",
            SyncPhase::Aborted => "aborted",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    NothingToSync,
    Completed,
    CompletedWithErrors,
    Aborted,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::NothingToSync => "nothing_to_sync",
            SyncOutcome::Completed => "completed",
            SyncOutcome::CompletedWithErrors => "completed_with_errors",
            SyncOutcome::Aborted => "aborted",
        }
    }
}

/// Counters for the running queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    /// Work items finished, successful or not.
    pub completed: u64,
    pub total: u64,
    pub errors: u64,
    pub message: String,
}

impl SyncProgress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.completed as f64 / self.total as f64) * 100.0).min(100.0) as u8
    }
}

/// One work item that failed without aborting the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub content_hash: String,
    pub filename: String,
    pub direction: String,
    pub message: String,
}

/// Summary returned to the caller when a run ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: SyncRunId,
    pub outcome: SyncOutcome,
    pub completed: u64,
    pub total: u64,
    pub errors: u64,
    pub failures: Vec<ItemFailure>,
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        matches!(
            self.outcome,
            SyncOutcome::NothingToSync | SyncOutcome::Completed
        )
    }
}

#[derive(Debug, Clone)]
pub struct SyncRun {
    pub id: SyncRunId,
    pub phase: SyncPhase,
    pub progress: SyncProgress,
    pub failures: Vec<ItemFailure>,
    /// Reason for an aborted run.
    pub abort_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    clock: Instant,
    finished_after: Option<Duration>,
}

impl SyncRun {
    pub fn new() -> Self {
        Self {
            id: SyncRunId::new(),
            phase: SyncPhase::Idle,
            progress: SyncProgress::default(),
            failures: Vec::new(),
            abort_reason: None,
            started_at: Utc::now(),
            clock: Instant::now(),
            finished_after: None,
        }
    }

    /// Move to the next phase.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidStateTransition`] for any move the state
    /// machine does not allow.
    pub fn advance(&mut self, to: SyncPhase, message: impl Into<String>) -> Result<()> {
        self.validate_transition(to)?;
        self.phase = to;
        self.progress.message = message.into();
        if to.is_terminal() {
            self.finished_after = Some(self.clock.elapsed());
        }
        Ok(())
    }

    /// Set the queue length once diffing is done.
    pub fn set_total(&mut self, total: u64) {
        self.progress.total = total;
    }

    pub fn record_success(&mut self, message: impl Into<String>) {
        self.progress.completed += 1;
        self.progress.message = message.into();
    }

    pub fn record_failure(&mut self, failure: ItemFailure) {
        self.progress.completed += 1;
        self.progress.errors += 1;
        self.progress.message = format!("Failed: {}", failure.filename);
        self.failures.push(failure);
    }

    /// Leave Finalizing for the matching completed phase.
    pub fn complete(&mut self) -> Result<()> {
        let (to, message) = if self.progress.errors > 0 {
            (
                SyncPhase::CompletedWithErrors,
                format!(
                    "Synchronization completed with {} errors",
                    self.progress.errors
                ),
            )
        } else if self.progress.total == 0 {
            (SyncPhase::Completed, "Nothing to synchronize".to_string())
        } else {
            (SyncPhase::Completed, "Synchronization completed".to_string())
        };
        self.advance(to, message)
    }

    /// Abort from any non-terminal phase.
    pub fn abort(&mut self, reason: &SyncError) -> Result<()> {
        let reason = reason.to_string();
        self.advance(
            SyncPhase::Aborted,
            format!("Synchronization failed: {}", reason),
        )?;
        self.abort_reason = Some(reason);
        Ok(())
    }

    pub fn outcome(&self) -> Option<SyncOutcome> {
        match self.phase {
            SyncPhase::Completed if self.progress.total == 0 => Some(SyncOutcome::NothingToSync),
            SyncPhase::Completed => Some(SyncOutcome::Completed),
            SyncPhase::CompletedWithErrors => Some(SyncOutcome::CompletedWithErrors),
            SyncPhase::Aborted => Some(SyncOutcome::Aborted),
            _ => None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.finished_after.unwrap_or_else(|| self.clock.elapsed())
    }

    /// Build the report for a finished run.
    ///
    /// # Errors
    ///
    /// Fails if the run has not reached a terminal phase.
    pub fn report(&self) -> Result<SyncReport> {
        let outcome = self
            .outcome()
            .ok_or_else(|| SyncError::InvalidStateTransition {
                from: self.phase.to_string(),
                to: "report".to_string(),
                reason: "Run has not finished".to_string(),
            })?;

        Ok(SyncReport {
            run_id: self.id,
            outcome,
            completed: self.progress.completed,
            total: self.progress.total,
            errors: self.progress.errors,
            failures: self.failures.clone(),
            message: self.progress.message.clone(),
            started_at: self.started_at,
            duration_ms: self.elapsed().as_millis() as u64,
        })
    }

    fn validate_transition(&self, to: SyncPhase) -> Result<()> {
        let valid = match (self.phase, to) {
            (from, SyncPhase::Aborted) => !from.is_terminal(),
            (SyncPhase::Idle, SyncPhase::Analyzing) => true,
            (SyncPhase::Analyzing, SyncPhase::Diffing) => true,
            (SyncPhase::Diffing, SyncPhase::Transferring) => true,
            // An empty queue skips straight to finalizing.
            (SyncPhase::Diffing, SyncPhase::Finalizing) => self.progress.total == 0,
            (SyncPhase::Transferring, SyncPhase::Finalizing) => true,
            (SyncPhase::Finalizing, SyncPhase::Completed) => true,
            (SyncPhase::Finalizing, SyncPhase::CompletedWithErrors) => true,
            _ => false,
        };

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.phase.to_string(),
                to: to.to_string(),
                reason: format!("Cannot transition from {} to {}", self.phase, to),
            });
        }

        Ok(())
    }
}

impl Default for SyncRun {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(name: &str) -> ItemFailure {
        ItemFailure {
            content_hash: "ab".repeat(32),
            filename: name.to_string(),
            direction: "download".to_string(),
            message: "hash mismatch".to_string(),
        }
    }

    fn run_to_transferring(total: u64) -> SyncRun {
        let mut run = SyncRun::new();
        run.advance(SyncPhase::Analyzing, "Analyzing").unwrap();
        run.advance(SyncPhase::Diffing, "Diffing").unwrap();
        run.set_total(total);
        run.advance(SyncPhase::Transferring, "Transferring").unwrap();
        run
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(SyncRunId::new(), SyncRunId::new());
    }

    #[test]
    fn test_happy_path() {
        let mut run = run_to_transferring(2);
        run.record_success("Uploaded a.mp3");
        run.record_success("Downloaded c.mp3");
        run.advance(SyncPhase::Finalizing, "Refreshing library").unwrap();
        run.complete().unwrap();

        assert_eq!(run.phase, SyncPhase::Completed);
        let report = run.report().unwrap();
        assert_eq!(report.outcome, SyncOutcome::Completed);
        assert_eq!(report.message, "Synchronization completed");
        assert_eq!(report.completed, 2);
        assert!(report.is_success());
    }

    #[test]
    fn test_item_failures_complete_with_errors() {
        let mut run = run_to_transferring(3);
        run.record_success("ok");
        run.record_failure(failure("bad.mp3"));
        run.record_failure(failure("worse.mp3"));
        assert_eq!(run.progress.percent(), 100);

        run.advance(SyncPhase::Finalizing, "Refreshing library").unwrap();
        run.complete().unwrap();

        let report = run.report().unwrap();
        assert_eq!(report.outcome, SyncOutcome::CompletedWithErrors);
        assert_eq!(report.errors, 2);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.message, "Synchronization completed with 2 errors");
    }

    #[test]
    fn test_empty_queue_skips_transferring() {
        let mut run = SyncRun::new();
        run.advance(SyncPhase::Analyzing, "").unwrap();
        run.advance(SyncPhase::Diffing, "").unwrap();
        run.advance(SyncPhase::Finalizing, "").unwrap();
        run.complete().unwrap();

        let report = run.report().unwrap();
        assert_eq!(report.outcome, SyncOutcome::NothingToSync);
        assert_eq!(report.message, "Nothing to synchronize");
    }

    #[test]
    fn test_non_empty_queue_cannot_skip_transferring() {
        let mut run = SyncRun::new();
        run.advance(SyncPhase::Analyzing, "").unwrap();
        run.advance(SyncPhase::Diffing, "").unwrap();
        run.set_total(1);
        assert!(matches!(
            run.advance(SyncPhase::Finalizing, ""),
            Err(SyncError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_abort_from_analyzing() {
        let mut run = SyncRun::new();
        run.advance(SyncPhase::Analyzing, "").unwrap();
        run.abort(&SyncError::Network("connection refused".into()))
            .unwrap();

        let report = run.report().unwrap();
        assert_eq!(report.outcome, SyncOutcome::Aborted);
        assert_eq!(
            report.message,
            "Synchronization failed: Network error: connection refused"
        );
        assert!(!report.is_success());
    }

    #[test]
    fn test_terminal_phases_are_final() {
        let mut run = run_to_transferring(0);
        run.abort(&SyncError::Cancelled).unwrap();

        assert!(run.abort(&SyncError::Cancelled).is_err());
        assert!(run.advance(SyncPhase::Analyzing, "").is_err());
    }

    #[test]
    fn test_skipping_phases_is_rejected() {
        let mut run = SyncRun::new();
        assert!(run.advance(SyncPhase::Transferring, "").is_err());
        assert!(run.report().is_err());
        assert_eq!(run.phase, SyncPhase::Idle);
    }
}
