//! Suite coordination
//!
//! [`SuiteCoordinator`] walks the phases in a fixed order:
//!
//! 1. lint of the test sources (warning only unless strict)
//! 2. discovery of client, integration and server tests
//! 3. server unit tests (`--run-tests`)
//! 4. endpoint verification under a fresh server
//! 5. client tests, headless, under one shared server
//! 6. integration tests, which bring their own server
//! 7. optionally the client tests again, visible
//!
//! Phases can be switched off but never reordered. Whole-phase checks count
//! at most one failed unit each; per-test phases count one unit per test.

use std::fmt;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::{RunnerConfig, SERVER_PID_VAR};

use super::catalog::TestCategory;
use super::discovery::{ListModeDiscovery, categorize_tests};
use super::executor::{ExecutionPlan, ExecutionRequest, SubprocessExecutor, Visibility};
use super::interfaces::{
    CommandRunner, ContractVerifier, HarnessError, HarnessResult, ServiceControl, SuiteReporter, TestDiscovery,
    TestExecutor,
};
use super::process::{CommandSpec, ProcessOutput, SystemRunner};
use super::reporter::{ConsoleReporter, PhaseResult, SuiteSummary, SuiteTally, TestRecord};
use super::supervisor::{ServiceGuard, ServiceSupervisor};
use super::verifier::{HttpContractVerifier, VerificationReport};

/// Flag that makes the server run its embedded unit tests.
pub const RUN_TESTS_FLAG: &str = "--run-tests";

/// The server's unit-test summary line when nothing failed.
pub const UNIT_PASS_MARKER: &str = "0 failed";

/// Lines of output shown under a failed unit-test run.
pub const UNIT_TAIL_LINES: usize = 20;

/// Stages of a suite run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Lint,
    Discovery,
    ServerUnit,
    Endpoint,
    ClientBatch,
    Integration,
    VisiblePass,
}

impl Phase {
    pub const ORDER: [Phase; 7] = [
        Phase::Lint,
        Phase::Discovery,
        Phase::ServerUnit,
        Phase::Endpoint,
        Phase::ClientBatch,
        Phase::Integration,
        Phase::VisiblePass,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Phase::Lint => "Test Linter",
            Phase::Discovery => "Test Discovery",
            Phase::ServerUnit => "Server Unit Tests",
            Phase::Endpoint => "Battle Endpoint Verification",
            Phase::ClientBatch => "Client Tests (Headless)",
            Phase::Integration => "Integration Tests",
            Phase::VisiblePass => "Client Tests (Visible)",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Tests found by discovery, already filtered through the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredSuite {
    pub client: Vec<String>,
    pub integration: Vec<String>,
    /// Server unit-test names; only queried when the unit phase is enabled
    pub server: Vec<String>,
}

/// Whether the output reports zero failures.
///
/// `10 failed` must not count, so the marker has to start at a number boundary.
pub fn reports_zero_failures(output: &str) -> bool {
    output.match_indices(UNIT_PASS_MARKER).any(|(at, _)| {
        !output[..at]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_digit())
    })
}

/// Last `n` lines of `text`.
pub fn tail_lines(text: &str, n: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].iter().map(|l| l.to_string()).collect()
}

/// Verdict for a `--run-tests` invocation.
pub fn judge_unit_run(output: &ProcessOutput, timeout: Duration) -> PhaseResult {
    let combined = output.combined();
    if output.timed_out {
        return PhaseResult::fail(Phase::ServerUnit, format!("Server tests timed out after {}s", timeout.as_secs()))
            .with_diagnostics(tail_lines(&combined, UNIT_TAIL_LINES));
    }
    if output.exit_code == 0 && reports_zero_failures(&combined) {
        PhaseResult::pass(Phase::ServerUnit, "All server tests passed")
    } else {
        PhaseResult::fail(Phase::ServerUnit, "Some server tests failed")
            .with_diagnostics(tail_lines(&combined, UNIT_TAIL_LINES))
    }
}

// ============================================================================
// Run log
// ============================================================================

/// Accumulated results of one run.
#[derive(Debug, Default)]
struct RunLog {
    tally: SuiteTally,
    phases: Vec<PhaseResult>,
    tests: Vec<TestRecord>,
}

impl RunLog {
    fn finish_phase(&mut self, reporter: &mut dyn SuiteReporter, result: PhaseResult) {
        reporter.on_phase_result(&result);
        if !result.passed {
            self.tally.record_failure();
        }
        self.phases.push(result);
    }

    fn into_summary(self, elapsed: Duration) -> SuiteSummary {
        SuiteSummary::new(self.tally, elapsed, self.phases, self.tests)
    }
}

/// One per-test batch.
struct Batch<'a> {
    tests: &'a [String],
    category: TestCategory,
    visibility: Visibility,
    env: Vec<(String, String)>,
}

fn run_batch(
    executor: &dyn TestExecutor,
    config: &RunnerConfig,
    reporter: &mut dyn SuiteReporter,
    log: &mut RunLog,
    batch: Batch<'_>,
) {
    let total = batch.tests.len();
    for (index, name) in batch.tests.iter().enumerate() {
        let mut request = ExecutionRequest::new(name, index + 1, total, config.default_timeout, batch.visibility);
        for (key, value) in &batch.env {
            request = request.with_env(key.clone(), value.clone());
        }
        let plan = ExecutionPlan::for_request(
            &request,
            config.integration_timeout,
            config.failure_path_timeout,
            &config.network_overlay,
        );

        reporter.on_test_start(&request);
        let started = Instant::now();
        let outcome = executor.execute(&request);
        let record = TestRecord::new(
            &request,
            batch.category,
            plan.visibility,
            outcome,
            plan.budget,
            started.elapsed(),
        );

        log.tally.record_outcome(&record.outcome);
        reporter.on_test_complete(&record);
        log.tests.push(record);

        if index + 1 < total && !config.inter_test_delay.is_zero() {
            thread::sleep(config.inter_test_delay);
        }
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Sequences the phases and owns every collaborator for one run.
pub struct SuiteCoordinator {
    config: RunnerConfig,
    runner: Box<dyn CommandRunner>,
    service: Box<dyn ServiceControl>,
    verifier: Box<dyn ContractVerifier>,
    reporter: Box<dyn SuiteReporter>,
}

impl SuiteCoordinator {
    /// Coordinator wired to real processes, HTTP and the console.
    pub fn new(config: RunnerConfig) -> Self {
        let service = Box::new(ServiceSupervisor::from_config(&config));
        let verifier = Box::new(HttpContractVerifier::from_config(&config));
        let reporter = Box::new(ConsoleReporter::new(config.color));
        Self {
            config,
            runner: Box::new(SystemRunner),
            service,
            verifier,
            reporter,
        }
    }

    pub fn with_runner(mut self, runner: Box<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_service(mut self, service: Box<dyn ServiceControl>) -> Self {
        self.service = service;
        self
    }

    pub fn with_verifier(mut self, verifier: Box<dyn ContractVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_reporter(mut self, reporter: Box<dyn SuiteReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    fn client_path(&self) -> PathBuf {
        self.config.resolve_program(&self.config.client_executable)
    }

    fn server_path(&self) -> PathBuf {
        self.config.resolve_program(&self.config.server_executable)
    }

    /// Fail fast when the client binary has not been built.
    fn require_client(&self) -> HarnessResult<()> {
        let client = self.client_path();
        if client.exists() {
            Ok(())
        } else {
            Err(HarnessError::MissingExecutable(client))
        }
    }

    /// Run every enabled phase and return the aggregate.
    #[tracing::instrument(skip_all, fields(client = %self.config.client_executable.display()))]
    pub fn run(&mut self) -> HarnessResult<SuiteSummary> {
        let started = Instant::now();
        let mut log = RunLog::default();
        self.reporter.on_run_start();

        if self.config.phases.lint {
            self.run_lint(&mut log);
        }

        self.require_client()?;
        let suite = self.discover();

        if self.config.phases.server_unit && !suite.server.is_empty() {
            self.run_server_unit(&mut log);
        }
        if self.config.phases.endpoint {
            self.run_endpoint(&mut log);
        }
        if !suite.client.is_empty() {
            self.run_client_batch(&mut log, &suite.client, Phase::ClientBatch, Visibility::Headless);
        }
        if !suite.integration.is_empty() {
            self.run_integration(&mut log, &suite.integration);
        }
        if self.config.phases.visible_pass && !suite.client.is_empty() {
            self.run_client_batch(&mut log, &suite.client, Phase::VisiblePass, Visibility::Visible);
        }

        let summary = log.into_summary(started.elapsed());
        self.finish(&summary)?;
        Ok(summary)
    }

    /// Endpoint verification on its own.
    pub fn verify(&mut self) -> HarnessResult<SuiteSummary> {
        let started = Instant::now();
        let mut log = RunLog::default();
        self.run_endpoint(&mut log);
        let summary = log.into_summary(started.elapsed());
        self.finish(&summary)?;
        Ok(summary)
    }

    /// Run one named test, optionally under a supervised server.
    pub fn run_single(&mut self, name: &str, visibility: Visibility, with_server: bool) -> HarnessResult<SuiteSummary> {
        let started = Instant::now();
        let mut log = RunLog::default();
        self.require_client()?;

        let tests = [name.to_string()];
        let category = if super::catalog::is_integration_name(name) {
            TestCategory::Integration
        } else {
            TestCategory::Client
        };
        let executor = SubprocessExecutor::new(self.runner.as_ref(), &self.config);

        if with_server {
            let guard = ServiceGuard::acquire(self.service.as_mut())?;
            let env = guard
                .pid()
                .map(|pid| vec![(SERVER_PID_VAR.to_string(), pid.to_string())])
                .unwrap_or_default();
            let batch = Batch {
                tests: &tests,
                category,
                visibility,
                env,
            };
            run_batch(&executor, &self.config, self.reporter.as_mut(), &mut log, batch);
        } else {
            let batch = Batch {
                tests: &tests,
                category,
                visibility,
                env: Vec::new(),
            };
            run_batch(&executor, &self.config, self.reporter.as_mut(), &mut log, batch);
        }

        let summary = log.into_summary(started.elapsed());
        self.finish(&summary)?;
        Ok(summary)
    }

    fn finish(&mut self, summary: &SuiteSummary) -> HarnessResult<()> {
        self.reporter.on_run_complete(summary);
        if let Some(path) = &self.config.report_json {
            summary.write_json(path)?;
            tracing::info!(path = %path.display(), "wrote JSON summary");
        }
        Ok(())
    }

    // ========================================================================
    // Phases
    // ========================================================================

    #[tracing::instrument(skip_all)]
    fn run_lint(&mut self, log: &mut RunLog) {
        let Some(lint) = self.config.lint.clone() else {
            return;
        };
        self.reporter.on_phase_start(Phase::Lint.title());

        if let Some(script) = &lint.script {
            if !self.config.working_dir.join(script).exists() {
                self.reporter.on_warning("Lint script not found, skipping");
                return;
            }
        }

        let spec = CommandSpec::new(lint.program.clone(), self.config.lint_timeout)
            .args(lint.args.clone())
            .current_dir(&self.config.working_dir);
        let problem = match self.runner.run(&spec) {
            Ok(output) if output.success() => None,
            Ok(output) if output.timed_out => Some(format!(
                "Test linter timed out after {}s",
                self.config.lint_timeout.as_secs()
            )),
            Ok(_) => Some("Test linter found violations".to_string()),
            Err(e) => Some(e.to_string()),
        };

        match problem {
            None => log.finish_phase(
                self.reporter.as_mut(),
                PhaseResult::pass(Phase::Lint, "No lint violations"),
            ),
            Some(problem) if self.config.strict_lint => {
                log.finish_phase(self.reporter.as_mut(), PhaseResult::fail(Phase::Lint, problem))
            }
            Some(problem) => self.reporter.on_warning(&format!("{problem} (continuing anyway)")),
        }
    }

    /// List and categorize the tests of both binaries.
    #[tracing::instrument(skip_all)]
    pub fn discover(&mut self) -> DiscoveredSuite {
        self.reporter.on_phase_start(Phase::Discovery.title());
        let discovery = ListModeDiscovery::new(
            self.runner.as_ref(),
            self.config.working_dir.clone(),
            self.config.discovery_timeout,
        );

        let categorized = categorize_tests(&discovery.list_tests(&self.client_path()));

        let server = if self.config.phases.server_unit {
            let server_path = self.server_path();
            if server_path.exists() {
                discovery.list_tests(&server_path)
            } else {
                self.reporter
                    .on_warning(&format!("Server executable not found at {}", server_path.display()));
                Vec::new()
            }
        } else {
            Vec::new()
        };

        self.reporter
            .on_note(&format!("Found {} client tests", categorized.client.len()));
        self.reporter
            .on_note(&format!("Found {} integration tests", categorized.integration.len()));
        if !server.is_empty() {
            self.reporter.on_note(&format!("Found {} server tests", server.len()));
        }

        DiscoveredSuite {
            client: categorized.client,
            integration: categorized.integration,
            server,
        }
    }

    #[tracing::instrument(skip_all)]
    fn run_server_unit(&mut self, log: &mut RunLog) {
        self.reporter.on_phase_start(Phase::ServerUnit.title());
        self.reporter.on_note("Running server unit tests...");

        let spec = CommandSpec::new(self.server_path(), self.config.unit_test_timeout)
            .arg(RUN_TESTS_FLAG)
            .current_dir(&self.config.working_dir);
        let result = match self.runner.run(&spec) {
            Ok(output) => judge_unit_run(&output, self.config.unit_test_timeout),
            Err(e) => PhaseResult::fail(Phase::ServerUnit, e.to_string()),
        };
        log.finish_phase(self.reporter.as_mut(), result);
    }

    #[tracing::instrument(skip_all)]
    fn run_endpoint(&mut self, log: &mut RunLog) {
        self.reporter.on_phase_start(Phase::Endpoint.title());
        self.reporter
            .on_note(&format!("Testing server on port {}", self.config.server_port));

        let result = match ServiceGuard::acquire(self.service.as_mut()) {
            Ok(_guard) => {
                let report = self.verifier.verify();
                note_stages(self.reporter.as_mut(), &report);
                if report.success() {
                    PhaseResult::pass(Phase::Endpoint, report.reason())
                } else {
                    PhaseResult::fail(Phase::Endpoint, report.reason())
                }
            }
            Err(e) => PhaseResult::fail(
                Phase::Endpoint,
                format!("Could not start server for endpoint verification: {e}"),
            ),
        };
        log.finish_phase(self.reporter.as_mut(), result);
    }

    #[tracing::instrument(skip_all, fields(phase = %phase, tests = tests.len()))]
    fn run_client_batch(&mut self, log: &mut RunLog, tests: &[String], phase: Phase, visibility: Visibility) {
        self.reporter.on_phase_start(phase.title());
        self.reporter
            .on_note(&format!("Found {} client tests to run", tests.len()));
        self.reporter.on_note(&format!(
            "Timeout per test: {}s",
            self.config.default_timeout.as_secs()
        ));

        let executor = SubprocessExecutor::new(self.runner.as_ref(), &self.config);
        let guard = match ServiceGuard::acquire(self.service.as_mut()) {
            Ok(guard) => guard,
            Err(e) => {
                let result = PhaseResult::fail(phase, format!("Failed to start server, skipping client tests: {e}"))
                    .with_diagnostics(tests.iter().map(|t| format!("not run: {t}")).collect());
                log.finish_phase(self.reporter.as_mut(), result);
                return;
            }
        };

        let env = guard
            .pid()
            .map(|pid| vec![(SERVER_PID_VAR.to_string(), pid.to_string())])
            .unwrap_or_default();
        let batch = Batch {
            tests,
            category: TestCategory::Client,
            visibility,
            env,
        };
        run_batch(&executor, &self.config, self.reporter.as_mut(), log, batch);
        drop(guard);
    }

    #[tracing::instrument(skip_all, fields(tests = tests.len()))]
    fn run_integration(&mut self, log: &mut RunLog, tests: &[String]) {
        self.reporter.on_phase_start(Phase::Integration.title());
        self.reporter
            .on_note(&format!("Found {} integration tests to run", tests.len()));
        self.reporter
            .on_note("Integration tests start their own server and run in visible mode");

        let executor = SubprocessExecutor::new(self.runner.as_ref(), &self.config);
        let batch = Batch {
            tests,
            category: TestCategory::Integration,
            visibility: Visibility::Visible,
            env: Vec::new(),
        };
        run_batch(&executor, &self.config, self.reporter.as_mut(), log, batch);
    }
}

fn note_stages(reporter: &mut dyn SuiteReporter, report: &VerificationReport) {
    for stage in &report.stages {
        let mark = if stage.passed { "ok" } else { "FAILED" };
        reporter.on_note(&format!("[{}] {mark}: {}", stage.stage, stage.detail));
    }
}
