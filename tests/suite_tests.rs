//! End-to-end suite runs with fake client and server binaries
//!
//! The client and server are shell scripts in a temp dir. The server script
//! answers `--list-tests` and `--run-tests`, and otherwise just stays alive;
//! HTTP is served by an in-process stub on the configured port.

#![cfg(unix)]

mod common;

use std::path::Path;
use std::time::Duration;

use chef_harness::config::{PhaseSelection, RunnerConfig};
use chef_harness::harness::{ConsoleReporter, HarnessError, SuiteCoordinator, Visibility};
use common::{StubRequest, StubResponse, StubServer, battle_json, unused_port, write_script};

const CLIENT: &str = r#"
if [ "$1" = "--list-tests" ]; then
  printf 'goto_battle\nvalidate_main_menu\nvalidate_dish_system\nvalidate_shop_purchase\nvalidate_server_opponent_match\nlegacy_removed_test\n'
  exit 0
fi
case "$2" in
  goto_battle)
    if [ -n "$TEST_SERVER_PID" ]; then echo "TEST PASSED: goto_battle"; exit 0; fi
    echo "no server pid"; exit 1 ;;
  validate_main_menu) echo "TEST COMPLETED: validate_main_menu"; exit 1 ;;
  validate_dish_system) echo "started"; kill -SEGV $$ ;;
  validate_shop_purchase) exec sleep 5 ;;
  validate_server_opponent_match)
    if [ -z "$TEST_SERVER_PID" ]; then echo "TEST VALIDATION PASSED: opponent"; exit 0; fi
    exit 2 ;;
esac
exit 7
"#;

const SERVER: &str = r#"
if [ "$1" = "--list-tests" ]; then printf 'test_damage\ntest_checksum\n'; exit 0; fi
if [ "$1" = "--run-tests" ]; then echo "2 passed, 0 failed"; exit 0; fi
exec sleep 30
"#;

fn battle_route(req: &StubRequest) -> StubResponse {
    match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/health") => StubResponse::json(200, r#"{"status":"ok"}"#),
        ("POST", "/battle") if req.body.contains(r#""team":[]"#) => {
            StubResponse::json(400, r#"{"error":"team must not be empty"}"#)
        }
        ("POST", "/battle") => StubResponse::json(200, battle_json()),
        _ => StubResponse::json(404, r#"{"error":"not found"}"#),
    }
}

fn config_in(dir: &Path, port: u16) -> RunnerConfig {
    let client = write_script(dir, "my_name_chef", CLIENT);
    let server = write_script(dir, "battle_server", SERVER);
    RunnerConfig::for_tests()
        .with_working_dir(dir)
        .with_client_executable(client)
        .with_server_executable(server)
        .with_server_port(port)
        .with_default_timeout(Duration::from_secs(1))
        .with_lint(None)
}

fn quiet(config: RunnerConfig) -> SuiteCoordinator {
    SuiteCoordinator::new(config).with_reporter(Box::new(ConsoleReporter::with_writer(Vec::new(), false)))
}

#[test]
fn test_full_suite_classifies_every_test() {
    let dir = tempfile::tempdir().unwrap();
    let stub = StubServer::start(battle_route);
    let report_path = dir.path().join("summary.json");
    let mut config = config_in(dir.path(), stub.port);
    config.report_json = Some(report_path.clone());

    let summary = quiet(config).run().unwrap();

    let labels: Vec<(&str, &str)> = summary
        .tests
        .iter()
        .map(|t| (t.name.as_str(), t.label.as_str()))
        .collect();
    assert_eq!(
        labels,
        vec![
            ("goto_battle", "passed"),
            ("validate_main_menu", "passed"),
            ("validate_dish_system", "crash_sigsegv"),
            ("validate_shop_purchase", "timeout"),
            ("validate_server_opponent_match", "passed"),
        ]
    );
    assert!(summary.phases.iter().all(|p| p.passed), "{:?}", summary.phases);
    assert_eq!(summary.passed, 3);
    assert_eq!(summary.failed, 2);
    assert!(!summary.is_success());

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(json["failed"], 2);
    assert_eq!(json["tests"][3]["label"], "timeout");
}

#[test]
fn test_all_phases_disabled_and_no_tests_is_clean() {
    let dir = tempfile::tempdir().unwrap();
    let client = write_script(dir.path(), "client", "exit 0");
    let config = RunnerConfig::for_tests()
        .with_working_dir(dir.path())
        .with_client_executable(client)
        .with_lint(None)
        .with_phases(PhaseSelection {
            lint: false,
            server_unit: false,
            endpoint: false,
            visible_pass: false,
        });

    let summary = quiet(config).run().unwrap();
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.total, 0);
    assert!(summary.is_success());
}

#[test]
fn test_failing_unit_tests_count_once() {
    let dir = tempfile::tempdir().unwrap();
    let client = write_script(dir.path(), "client", "exit 0");
    let server = write_script(
        dir.path(),
        "server",
        "if [ \"$1\" = \"--list-tests\" ]; then echo test_damage; exit 0; fi\necho '3 passed, 10 failed'\nexit 1",
    );
    let config = RunnerConfig::for_tests()
        .with_working_dir(dir.path())
        .with_client_executable(client)
        .with_server_executable(server)
        .with_lint(None)
        .with_phases(PhaseSelection {
            endpoint: false,
            ..PhaseSelection::default()
        });

    let summary = quiet(config).run().unwrap();
    assert_eq!(summary.failed, 1);
    let unit = &summary.phases[0];
    assert!(!unit.passed);
    assert_eq!(unit.diagnostics, vec!["3 passed, 10 failed"]);
}

#[test]
fn test_server_that_never_answers_fails_endpoint_and_batch() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path(), unused_port());
    config.health.attempts = 3;
    config.phases.server_unit = false;

    let summary = quiet(config).run().unwrap();
    // endpoint start failure + client batch start failure; integration still runs
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.passed, 1);
    assert_eq!(summary.tests.len(), 1);
    assert_eq!(summary.tests[0].visibility, Visibility::Visible);
}

#[test]
fn test_missing_client_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunnerConfig::for_tests()
        .with_working_dir(dir.path())
        .with_client_executable(dir.path().join("not_built"))
        .with_lint(None);
    assert!(matches!(quiet(config).run(), Err(HarnessError::MissingExecutable(_))));
}

#[test]
fn test_run_single_without_server() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), unused_port());
    let summary = quiet(config).run_single("goto_battle", Visibility::Headless, false).unwrap();
    // goto_battle insists on a server pid
    assert_eq!(summary.tests[0].label, "exit_code_1");
}

#[test]
fn test_client_ignoring_launcher_sigterm_still_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let client = write_script(dir.path(), "client", "trap '' TERM\nsleep 8\necho \"TEST PASSED: late\"");
    let mut config = RunnerConfig::for_tests()
        .with_working_dir(dir.path())
        .with_client_executable(client)
        .with_default_timeout(Duration::from_secs(1))
        .with_timeout_launcher(Some("timeout".into()))
        .with_lint(None);
    config.launcher_grace = Duration::from_millis(500);

    let started = std::time::Instant::now();
    let summary = quiet(config).run_single("validate_main_menu", Visibility::Headless, false).unwrap();
    assert_eq!(summary.tests[0].label, "timeout");
    assert!(started.elapsed() < Duration::from_secs(5), "{:?}", started.elapsed());
}
