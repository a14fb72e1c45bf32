//! Tally, per-test records and console output
//!
//! ## SuiteReporter
//!
//! The coordinator pushes progress events through the [`SuiteReporter`] trait.
//! [`ConsoleReporter`] renders them for a terminal; tests plug in a recorder.
//! Counting is not the reporter's job: the coordinator owns the
//! [`SuiteTally`] and hands the final [`SuiteSummary`] over at the end.

use std::fmt::Display;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use serde::Serialize;

use crate::version::HARNESS_VERSION;

use super::catalog::TestCategory;
use super::coordinator::Phase;
use super::executor::{ExecutionOutcome, ExecutionRequest, Visibility};
use super::interfaces::{HarnessError, HarnessResult, SuiteReporter};

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const RESET: &str = "\x1b[0m";

// ============================================================================
// Tally
// ============================================================================

/// Running pass/fail counts. Counts only ever grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SuiteTally {
    passed: usize,
    failed: usize,
}

impl SuiteTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pass(&mut self) {
        self.passed += 1;
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    /// One unit for one per-test outcome.
    pub fn record_outcome(&mut self, outcome: &ExecutionOutcome) {
        if outcome.is_passed() {
            self.record_pass();
        } else {
            self.record_failure();
        }
    }

    pub fn passed(&self) -> usize {
        self.passed
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

// ============================================================================
// Records
// ============================================================================

/// Classification of one executed test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestRecord {
    pub name: String,
    pub category: TestCategory,
    pub visibility: Visibility,
    pub outcome: ExecutionOutcome,
    /// Stable label such as `passed`, `timeout` or `crash_sigsegv`
    pub label: String,
    pub budget_ms: u64,
    pub duration_ms: u64,
    pub ordinal: usize,
    pub total: usize,
}

impl TestRecord {
    pub fn new(
        request: &ExecutionRequest,
        category: TestCategory,
        visibility: Visibility,
        outcome: ExecutionOutcome,
        budget: Duration,
        elapsed: Duration,
    ) -> Self {
        Self {
            name: request.name.clone(),
            category,
            visibility,
            label: outcome.label(),
            outcome,
            budget_ms: millis(budget),
            duration_ms: millis(elapsed),
            ordinal: request.ordinal,
            total: request.total,
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome.is_passed()
    }

    /// Human explanation of the outcome.
    pub fn describe(&self) -> String {
        match &self.outcome {
            ExecutionOutcome::Passed { exit_code: 0 } => "Test completed successfully".to_string(),
            ExecutionOutcome::Passed { exit_code } => {
                format!("Test completed successfully (despite exit code {exit_code})")
            }
            ExecutionOutcome::Timeout => {
                format!("Test exceeded {}s timeout", Duration::from_millis(self.budget_ms).as_secs_f64())
            }
            ExecutionOutcome::Crashed(kind) => kind.to_string(),
            ExecutionOutcome::Incomplete => "Test ran but didn't complete properly".to_string(),
            ExecutionOutcome::ExitCode(code) => format!("Test failed with exit code {code}"),
            ExecutionOutcome::Failed(reason) => reason.clone(),
        }
    }

    fn verdict(&self) -> &'static str {
        match self.outcome {
            ExecutionOutcome::Passed { .. } => "PASSED",
            ExecutionOutcome::Timeout => "TIMEOUT",
            ExecutionOutcome::Crashed(_) => "CRASHED",
            ExecutionOutcome::Incomplete => "INCOMPLETE",
            ExecutionOutcome::ExitCode(_) => "FAILED",
            ExecutionOutcome::Failed(_) => "ERROR",
        }
    }
}

/// Result of a whole-phase check (lint, unit tests, endpoint verification,
/// service start). Each failing one is a single failed unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseResult {
    pub phase: Phase,
    pub passed: bool,
    pub detail: String,
    /// Extra output shown under a failure, e.g. the tail of a unit-test run
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

impl PhaseResult {
    pub fn pass(phase: Phase, detail: impl Into<String>) -> Self {
        Self {
            phase,
            passed: true,
            detail: detail.into(),
            diagnostics: Vec::new(),
        }
    }

    pub fn fail(phase: Phase, detail: impl Into<String>) -> Self {
        Self {
            phase,
            passed: false,
            detail: detail.into(),
            diagnostics: Vec::new(),
        }
    }

    pub fn with_diagnostics(mut self, lines: Vec<String>) -> Self {
        self.diagnostics = lines;
        self
    }
}

/// Everything the run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SuiteSummary {
    /// Harness version that produced the report
    pub version: String,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
    pub duration_ms: u64,
    pub phases: Vec<PhaseResult>,
    pub tests: Vec<TestRecord>,
}

impl SuiteSummary {
    pub fn new(tally: SuiteTally, duration: Duration, phases: Vec<PhaseResult>, tests: Vec<TestRecord>) -> Self {
        Self {
            version: HARNESS_VERSION.to_string(),
            passed: tally.passed(),
            failed: tally.failed(),
            total: tally.total(),
            duration_ms: millis(duration),
            phases,
            tests,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn to_json(&self) -> HarnessResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| HarnessError::Report(e.to_string()))
    }

    pub fn write_json(&self, path: &Path) -> HarnessResult<()> {
        let json = self.to_json()?;
        std::fs::write(path, json + "\n").map_err(|e| HarnessError::Report(format!("{}: {e}", path.display())))
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Rendering
// ============================================================================

fn paint(color: bool, code: &str, text: impl Display) -> String {
    if color {
        format!("{code}{text}{RESET}")
    } else {
        text.to_string()
    }
}

/// Final aggregate block.
pub fn render_summary(summary: &SuiteSummary, color: bool) -> String {
    let mut out = String::new();
    out.push_str(&paint(color, BLUE, "Test Summary"));
    out.push('\n');
    out.push_str(&paint(color, BLUE, "=".repeat(15)));
    out.push('\n');
    out.push_str(&format!("Total: {}\n", summary.total));
    out.push_str(&format!("  {}\n", paint(color, GREEN, format!("Passed: {}", summary.passed))));
    out.push_str(&format!("  {}\n", paint(color, RED, format!("Failed: {}", summary.failed))));

    let failed_phases: Vec<&PhaseResult> = summary.phases.iter().filter(|p| !p.passed).collect();
    let failed_tests: Vec<&TestRecord> = summary.tests.iter().filter(|t| !t.passed()).collect();
    if !failed_phases.is_empty() || !failed_tests.is_empty() {
        out.push('\n');
        out.push_str("Failures:\n");
        for phase in failed_phases {
            out.push_str(&format!("  {} - {}\n", phase.phase.title(), phase.detail));
        }
        for test in failed_tests {
            out.push_str(&format!("  {} ({}, {})\n", test.name, test.label, test.visibility.label()));
        }
    }

    out.push('\n');
    if summary.is_success() {
        out.push_str(&paint(color, GREEN, "All tests passed!"));
    } else {
        out.push_str(&paint(color, RED, "Some tests failed. Check the output above for details."));
    }
    out.push('\n');
    out
}

// ============================================================================
// Console reporter
// ============================================================================

/// Terminal reporter. Writes to stdout unless given another sink.
pub struct ConsoleReporter<W: Write = io::Stdout> {
    out: W,
    color: bool,
}

impl ConsoleReporter {
    pub fn new(color: bool) -> Self {
        Self::with_writer(io::stdout(), color)
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn with_writer(out: W, color: bool) -> Self {
        Self { out, color }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: impl Display) {
        // Console output is best effort; a closed pipe must not fail the run.
        let _ = writeln!(self.out, "{text}");
    }

    fn paint(&self, code: &str, text: impl Display) -> String {
        paint(self.color, code, text)
    }
}

impl<W: Write> SuiteReporter for ConsoleReporter<W> {
    fn on_run_start(&mut self) {
        let title = self.paint(BLUE, "My Name Chef - Test Suite Runner");
        let rule = self.paint(BLUE, "=".repeat(35));
        self.line(title);
        self.line(rule);
        self.line("");
    }

    fn on_phase_start(&mut self, title: &str) {
        let heading = self.paint(BLUE, title);
        self.line(heading);
    }

    fn on_note(&mut self, message: &str) {
        self.line(format!("  {message}"));
    }

    fn on_warning(&mut self, message: &str) {
        let text = self.paint(YELLOW, format!("Warning: {message}"));
        self.line(text);
    }

    fn on_test_start(&mut self, request: &ExecutionRequest) {
        let name = self.paint(YELLOW, &request.name);
        self.line(format!("[{}/{}] Running test: {name}", request.ordinal, request.total));
    }

    fn on_test_complete(&mut self, record: &TestRecord) {
        let code = if record.passed() { GREEN } else { RED };
        let verdict = self.paint(code, record.verdict());
        self.line(format!("  {verdict} - {}", record.describe()));
    }

    fn on_phase_result(&mut self, result: &PhaseResult) {
        let verdict = if result.passed {
            self.paint(GREEN, "PASSED")
        } else {
            self.paint(RED, "FAILED")
        };
        self.line(format!("  {verdict} - {}", result.detail));
        if !result.diagnostics.is_empty() {
            self.line("  Output:");
            for line in &result.diagnostics {
                self.line(format!("    {line}"));
            }
        }
        self.line("");
    }

    fn on_run_complete(&mut self, summary: &SuiteSummary) {
        let rendered = render_summary(summary, self.color);
        let _ = write!(self.out, "\n{rendered}");
        let _ = self.out.flush();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::harness::executor::CrashKind;

    fn record(name: &str, outcome: ExecutionOutcome) -> TestRecord {
        let request = ExecutionRequest::new(name, 1, 2, Duration::from_secs(30), Visibility::Headless);
        TestRecord::new(
            &request,
            TestCategory::Client,
            Visibility::Headless,
            outcome,
            Duration::from_secs(30),
            Duration::from_millis(1250),
        )
    }

    #[test]
    fn test_tally_counts_outcomes() {
        let mut tally = SuiteTally::new();
        tally.record_outcome(&ExecutionOutcome::Passed { exit_code: 1 });
        tally.record_outcome(&ExecutionOutcome::Timeout);
        tally.record_outcome(&ExecutionOutcome::Incomplete);
        tally.record_failure();
        assert_eq!(tally.passed(), 1);
        assert_eq!(tally.failed(), 3);
        assert_eq!(tally.total(), 4);
        assert!(!tally.is_success());
    }

    #[test]
    fn test_empty_tally_is_success() {
        assert!(SuiteTally::new().is_success());
        assert!(SuiteSummary::default().is_success());
    }

    #[test]
    fn test_record_descriptions() {
        assert_eq!(
            record("a", ExecutionOutcome::Passed { exit_code: 1 }).describe(),
            "Test completed successfully (despite exit code 1)"
        );
        assert_eq!(record("a", ExecutionOutcome::Timeout).describe(), "Test exceeded 30s timeout");
        assert_eq!(
            record("a", ExecutionOutcome::Crashed(CrashKind::SigSegv)).describe(),
            "Segmentation fault (SIGSEGV)"
        );
        assert_eq!(record("a", ExecutionOutcome::ExitCode(2)).label, "exit_code_2");
    }

    #[test]
    fn test_summary_json_has_labels() {
        let mut tally = SuiteTally::new();
        tally.record_failure();
        let summary = SuiteSummary::new(
            tally,
            Duration::from_secs(2),
            Vec::new(),
            vec![record("goto_battle", ExecutionOutcome::Crashed(CrashKind::SigSegv))],
        );
        let value: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();
        assert_eq!(value["failed"], 1);
        assert_eq!(value["tests"][0]["label"], "crash_sigsegv");
        assert_eq!(value["tests"][0]["outcome"]["kind"], "crashed");
        assert_eq!(value["tests"][0]["category"], "client");
    }

    #[test]
    fn test_write_json_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        SuiteSummary::default().write_json(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"failed\": 0"));
    }

    #[test]
    fn test_console_lines_without_color() {
        let mut reporter = ConsoleReporter::with_writer(Vec::new(), false);
        let request = ExecutionRequest::new("goto_battle", 3, 7, Duration::from_secs(30), Visibility::Headless);
        reporter.on_test_start(&request);
        reporter.on_test_complete(&record("goto_battle", ExecutionOutcome::Incomplete));
        let text = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(
            text,
            "[3/7] Running test: goto_battle\n  INCOMPLETE - Test ran but didn't complete properly\n"
        );
    }

    #[test]
    fn test_phase_result_prints_diagnostics() {
        let mut reporter = ConsoleReporter::with_writer(Vec::new(), false);
        let result = PhaseResult::fail(Phase::ServerUnit, "Some server tests failed")
            .with_diagnostics(vec!["1 passed, 1 failed".to_string()]);
        reporter.on_phase_result(&result);
        let text = String::from_utf8(reporter.into_inner()).unwrap();
        assert!(text.starts_with("  FAILED - Some server tests failed\n  Output:\n    1 passed, 1 failed\n"));
    }

    #[test]
    fn test_render_summary_snapshot() {
        let mut tally = SuiteTally::new();
        tally.record_pass();
        tally.record_failure();
        tally.record_failure();
        let summary = SuiteSummary::new(
            tally,
            Duration::from_secs(4),
            vec![PhaseResult::fail(Phase::Endpoint, "shape stage failed: 'events' is not an array")],
            vec![
                record("validate_main_menu", ExecutionOutcome::Passed { exit_code: 0 }),
                record("goto_battle", ExecutionOutcome::Timeout),
            ],
        );
        insta::assert_snapshot!(render_summary(&summary, false), @r"
        Test Summary
        ===============
        Total: 3
          Passed: 1
          Failed: 2

        Failures:
          Battle Endpoint Verification - shape stage failed: 'events' is not an array
          goto_battle (timeout, headless)

        Some tests failed. Check the output above for details.
        ");
    }
}
