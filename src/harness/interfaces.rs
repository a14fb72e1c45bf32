//! Harness I/O boundary interfaces
//!
//! This module defines trait-based abstractions for the operations that touch
//! the outside world:
//! - Subprocess execution (list-mode queries, test runs, unit tests, lint)
//! - Test discovery and test execution
//! - Supervised service lifecycle
//! - HTTP contract verification
//! - Reporting
//!
//! The coordinator only talks to these traits, so every phase can be driven by
//! scripted fakes in tests. Default implementations live next to the logic
//! they wrap (`SystemRunner`, `ListModeDiscovery`, `SubprocessExecutor`,
//! `ServiceSupervisor`, `HttpContractVerifier`, `ConsoleReporter`).

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::executor::{CrashKind, ExecutionOutcome, ExecutionRequest};
use super::process::{CommandSpec, ProcessOutput};
use super::reporter::{PhaseResult, SuiteSummary, TestRecord};
use super::verifier::{VerificationReport, VerificationStage};

/// Errors raised by the harness.
///
/// The first group mirrors the outcome taxonomy so a non-passing test can be
/// logged as an error value; the rest are infrastructure failures.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("test discovery unavailable for {binary}: {reason}")]
    DiscoveryUnavailable { binary: PathBuf, reason: String },

    #[error("service failed to start: {0}")]
    ServiceStart(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("crashed ({0})")]
    Crashed(CrashKind),

    #[error("ran to completion without a completion marker")]
    Incomplete,

    #[error("exited with code {0}")]
    ExitFailure(i32),

    #[error("{stage} stage failed: {detail}")]
    ContractViolation { stage: VerificationStage, detail: String },

    #[error("test could not be launched: {0}")]
    Launch(String),

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("executable not found at {0}")]
    MissingExecutable(PathBuf),

    #[error("failed to write report: {0}")]
    Report(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

// ============================================================================
// Command Runner Interface
// ============================================================================

/// Run a command to completion under a wall-clock deadline.
///
/// Implementations must never block past `spec.deadline`: a child still alive
/// at the deadline is killed and reported with `timed_out = true`.
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> HarnessResult<ProcessOutput>;
}

// ============================================================================
// Test Discovery Interface
// ============================================================================

/// Ask an executable for the tests it embeds.
pub trait TestDiscovery {
    /// Invoke `binary` in list mode. Any failure degrades to an empty list.
    fn list_tests(&self, binary: &Path) -> Vec<String>;
}

// ============================================================================
// Test Executor Interface
// ============================================================================

/// Run one named test in isolation and classify it.
///
/// Classification is total: every request yields exactly one outcome.
pub trait TestExecutor {
    fn execute(&self, request: &ExecutionRequest) -> ExecutionOutcome;
}

// ============================================================================
// Service Lifecycle Interface
// ============================================================================

/// Start/stop control over one dependent service instance.
pub trait ServiceControl {
    /// Launch a fresh instance and wait until it is healthy.
    fn start(&mut self) -> HarnessResult<()>;

    /// Terminate the instance if one is running. Idempotent.
    fn stop(&mut self);

    /// Process id of the running instance, if any.
    fn pid(&self) -> Option<u32>;
}

// ============================================================================
// Contract Verifier Interface
// ============================================================================

/// Exercise the service's HTTP contract directly.
pub trait ContractVerifier {
    fn verify(&self) -> VerificationReport;
}

// ============================================================================
// Reporter Interface
// ============================================================================

/// Receives progress events from the coordinator.
///
/// Implement this trait to customize output (console, JSON, TAP, ...).
pub trait SuiteReporter {
    /// Called when the run starts, before any phase.
    fn on_run_start(&mut self) {}

    /// Called when a phase begins; `title` is the human heading.
    fn on_phase_start(&mut self, title: &str);

    /// Free-form progress line inside the current phase.
    fn on_note(&mut self, message: &str);

    /// Non-fatal problem inside the current phase.
    fn on_warning(&mut self, message: &str);

    /// Called before a test is launched.
    fn on_test_start(&mut self, request: &ExecutionRequest);

    /// Called once per test with its classification.
    fn on_test_complete(&mut self, record: &TestRecord);

    /// Called when a whole-phase check (lint, unit tests, verification,
    /// service start) has a verdict.
    fn on_phase_result(&mut self, result: &PhaseResult);

    /// Called once at the end with the aggregate.
    fn on_run_complete(&mut self, summary: &SuiteSummary);
}
