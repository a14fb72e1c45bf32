//! Single-test execution and outcome classification
//!
//! A test run is a child process: the client binary launched with
//! `--run-test <name>`, wrapped in an external wall-clock enforcer. The raw
//! result (combined output, exit value, or a harness-side timeout) is folded
//! into exactly one [`ExecutionOutcome`].
//!
//! ## Classification order
//!
//! 1. Output containing a completion marker is `Passed`, whatever the exit
//!    code. Some completion paths in the client exit nonzero after writing
//!    their verdict during teardown.
//! 2. The timeout sentinel (124) is `Timeout`.
//! 3. Signal-style exits decode through [`CRASH_TABLE`] into `Crashed`.
//! 4. A clean exit without a marker is `Incomplete`.
//! 5. Anything else is `ExitCode(code)`.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::config::{NetworkOverlay, RunnerConfig};

use super::catalog;
use super::interfaces::{CommandRunner, HarnessError, TestExecutor};
use super::process::CommandSpec;

/// Any of these in the combined output means the test confirmed its assertions.
pub const COMPLETION_MARKERS: [&str; 3] = ["TEST COMPLETED:", "TEST VALIDATION PASSED:", "TEST PASSED:"];

/// Exit code `timeout(1)` uses when the budget ran out.
pub const TIMEOUT_SENTINEL: i32 = 124;

/// Flag selecting the test to run.
pub const RUN_TEST_FLAG: &str = "--run-test";
/// Flag disabling rendering.
pub const HEADLESS_FLAG: &str = "--headless";
/// Flag scaling in-test animation delays.
pub const TIMING_SCALE_FLAG: &str = "--timing-speed-scale";

// ============================================================================
// Request
// ============================================================================

/// Whether the client renders a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Headless,
    Visible,
}

impl Visibility {
    pub fn label(self) -> &'static str {
        match self {
            Visibility::Headless => "headless",
            Visibility::Visible => "visible",
        }
    }
}

/// One test invocation as requested by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub name: String,
    /// 1-based position within its batch
    pub ordinal: usize,
    /// Size of the batch
    pub total: usize,
    /// Caller's wall-clock budget (integration tests override it)
    pub budget: Duration,
    /// Caller's visibility (integration tests override it)
    pub visibility: Visibility,
    /// Extra environment for the child
    pub env: Vec<(String, String)>,
}

impl ExecutionRequest {
    pub fn new(name: impl Into<String>, ordinal: usize, total: usize, budget: Duration, visibility: Visibility) -> Self {
        Self {
            name: name.into(),
            ordinal,
            total,
            budget,
            visibility,
            env: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Effective parameters after name-based overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub budget: Duration,
    pub visibility: Visibility,
    /// Variables set for this run
    pub env: Vec<(String, String)>,
    /// Variables stripped so they cannot leak from the parent
    pub env_removals: Vec<String>,
}

impl ExecutionPlan {
    /// Apply the integration and server-failure rules to a request.
    pub fn for_request(
        request: &ExecutionRequest,
        integration_timeout: Duration,
        failure_path_timeout: Duration,
        overlay: &NetworkOverlay,
    ) -> Self {
        let (mut budget, visibility) = if catalog::is_integration_name(&request.name) {
            (integration_timeout, Visibility::Visible)
        } else {
            (request.budget, request.visibility)
        };

        let mut env = request.env.clone();
        let mut env_removals = Vec::new();
        if catalog::is_server_failure_name(&request.name) {
            budget = failure_path_timeout;
            env.extend(overlay.vars().iter().map(|(k, v)| (k.to_string(), v.to_string())));
        } else {
            env_removals.extend(NetworkOverlay::var_names().iter().map(|k| k.to_string()));
        }

        Self {
            budget,
            visibility,
            env,
            env_removals,
        }
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Fault signal decoded from an exit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashKind {
    SigSegv,
    SigAbrt,
    SigFpe,
    SigKill,
    SigBus,
    /// Any other signal, by number
    Signal(i32),
}

impl CrashKind {
    /// Stable machine label, e.g. `crash_sigsegv`.
    pub fn label(self) -> String {
        match self {
            CrashKind::SigSegv => "crash_sigsegv".to_string(),
            CrashKind::SigAbrt => "crash_sigabrt".to_string(),
            CrashKind::SigFpe => "crash_sigfpe".to_string(),
            CrashKind::SigKill => "crash_sigkill".to_string(),
            CrashKind::SigBus => "crash_sigbus".to_string(),
            CrashKind::Signal(n) => format!("crash_signal_{n}"),
        }
    }
}

impl fmt::Display for CrashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrashKind::SigSegv => write!(f, "Segmentation fault (SIGSEGV)"),
            CrashKind::SigAbrt => write!(f, "Aborted (SIGABRT)"),
            CrashKind::SigFpe => write!(f, "Floating point exception (SIGFPE)"),
            CrashKind::SigKill => write!(f, "Killed (SIGKILL)"),
            CrashKind::SigBus => write!(f, "Bus error (SIGBUS)"),
            CrashKind::Signal(n) => write!(f, "Signal {n}"),
        }
    }
}

/// Exit values with a named crash kind.
///
/// Both forms appear in practice: `128 + n` from a shell or `timeout(1)`
/// relaying the child's death, and `-n` when the child itself was signalled.
pub const CRASH_TABLE: &[(i32, CrashKind)] = &[
    (139, CrashKind::SigSegv),
    (-11, CrashKind::SigSegv),
    (134, CrashKind::SigAbrt),
    (-6, CrashKind::SigAbrt),
    (136, CrashKind::SigFpe),
    (-8, CrashKind::SigFpe),
    (137, CrashKind::SigKill),
    (-9, CrashKind::SigKill),
    (138, CrashKind::SigBus),
    (-10, CrashKind::SigBus),
];

/// Map an exit value to a crash kind, if it denotes one.
pub fn decode_crash(exit_code: i32) -> Option<CrashKind> {
    CRASH_TABLE
        .iter()
        .find(|(code, _)| *code == exit_code)
        .map(|(_, kind)| *kind)
        .or_else(|| (exit_code < 0).then(|| CrashKind::Signal(exit_code.saturating_neg())))
}

/// Classification of one test run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// A completion marker was printed; `exit_code` is kept for reporting
    Passed { exit_code: i32 },
    Timeout,
    Crashed(CrashKind),
    /// Clean exit without confirming its assertions
    Incomplete,
    /// Nonzero exit that is neither a timeout nor a crash
    ExitCode(i32),
    /// The test could not be launched
    Failed(String),
}

impl ExecutionOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, ExecutionOutcome::Passed { .. })
    }

    /// Stable machine label used in reports.
    pub fn label(&self) -> String {
        match self {
            ExecutionOutcome::Passed { .. } => "passed".to_string(),
            ExecutionOutcome::Timeout => "timeout".to_string(),
            ExecutionOutcome::Crashed(kind) => kind.label(),
            ExecutionOutcome::Incomplete => "incomplete".to_string(),
            ExecutionOutcome::ExitCode(code) => format!("exit_code_{code}"),
            ExecutionOutcome::Failed(_) => "error".to_string(),
        }
    }

    /// The matching error, or `None` for a pass.
    pub fn to_error(&self, budget: Duration) -> Option<HarnessError> {
        match self {
            ExecutionOutcome::Passed { .. } => None,
            ExecutionOutcome::Timeout => Some(HarnessError::Timeout(budget)),
            ExecutionOutcome::Crashed(kind) => Some(HarnessError::Crashed(*kind)),
            ExecutionOutcome::Incomplete => Some(HarnessError::Incomplete),
            ExecutionOutcome::ExitCode(code) => Some(HarnessError::ExitFailure(*code)),
            ExecutionOutcome::Failed(reason) => Some(HarnessError::Launch(reason.clone())),
        }
    }
}

/// Whether the output carries any completion marker.
pub fn has_completion_marker(output: &str) -> bool {
    COMPLETION_MARKERS.iter().any(|marker| output.contains(marker))
}

/// Fold output and exit value into an outcome. Total over all inputs.
pub fn classify(output: &str, exit_code: i32) -> ExecutionOutcome {
    if has_completion_marker(output) {
        return ExecutionOutcome::Passed { exit_code };
    }
    if exit_code == TIMEOUT_SENTINEL {
        return ExecutionOutcome::Timeout;
    }
    if let Some(kind) = decode_crash(exit_code) {
        return ExecutionOutcome::Crashed(kind);
    }
    if exit_code == 0 {
        return ExecutionOutcome::Incomplete;
    }
    ExecutionOutcome::ExitCode(exit_code)
}

// ============================================================================
// Subprocess executor
// ============================================================================

/// Runs tests through a [`CommandRunner`] using the paths and budgets from a
/// [`RunnerConfig`].
pub struct SubprocessExecutor<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a RunnerConfig,
}

impl<'a> SubprocessExecutor<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a RunnerConfig) -> Self {
        Self { runner, config }
    }

    pub fn plan(&self, request: &ExecutionRequest) -> ExecutionPlan {
        ExecutionPlan::for_request(
            request,
            self.config.integration_timeout,
            self.config.failure_path_timeout,
            &self.config.network_overlay,
        )
    }

    /// Build the child invocation for a request.
    pub fn command_for(&self, request: &ExecutionRequest, plan: &ExecutionPlan) -> CommandSpec {
        let client = self.config.resolve_program(&self.config.client_executable);
        let mut test_args = vec![RUN_TEST_FLAG.to_string(), request.name.clone()];
        if plan.visibility == Visibility::Headless {
            test_args.push(HEADLESS_FLAG.to_string());
        }
        test_args.push(TIMING_SCALE_FLAG.to_string());
        test_args.push(self.config.timing_speed_scale.to_string());

        let mut spec = match &self.config.timeout_launcher {
            Some(launcher) => CommandSpec::new(launcher.clone(), plan.budget.saturating_add(self.config.launcher_grace))
                .arg(format_seconds(plan.budget))
                .arg(client.display().to_string()),
            None => CommandSpec::new(client, plan.budget),
        };
        spec = spec.args(test_args).current_dir(&self.config.working_dir);

        for key in &plan.env_removals {
            spec = spec.env_remove(key.clone());
        }
        for (key, value) in &plan.env {
            spec = spec.env(key.clone(), value.clone());
        }
        spec
    }
}

impl TestExecutor for SubprocessExecutor<'_> {
    #[tracing::instrument(skip_all, fields(test = %request.name))]
    fn execute(&self, request: &ExecutionRequest) -> ExecutionOutcome {
        let plan = self.plan(request);
        let spec = self.command_for(request, &plan);

        let outcome = match self.runner.run(&spec) {
            Err(e) => ExecutionOutcome::Failed(e.to_string()),
            // The harness guard fired before the child returned; output is not trusted.
            Ok(output) if output.timed_out => ExecutionOutcome::Timeout,
            Ok(output) => classify(&output.combined(), output.exit_code),
        };

        if let Some(err) = outcome.to_error(plan.budget) {
            tracing::debug!(label = %outcome.label(), "{err}");
        }
        outcome
    }
}

/// Whole seconds when exact, otherwise fractional, as `timeout(1)` accepts.
fn format_seconds(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        duration.as_secs().to_string()
    } else {
        format!("{:.3}", duration.as_secs_f64())
    }
}
