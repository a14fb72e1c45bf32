//! CLI command implementations
//!
//! All command functions return `CliResult<ExitCode>` instead of calling
//! `process::exit`. Error handling and exits happen in the top-level `run()`.

use std::time::Duration;

use crate::config::RunnerConfig;
use crate::harness::{HarnessError, SuiteCoordinator, SuiteSummary, Visibility};

use super::{CliError, CliResult, ExitCode, GlobalArgs, RunArgs};

/// Fold command-line options over the defaults.
pub fn build_config(global: &GlobalArgs, run: &RunArgs) -> RunnerConfig {
    let mut config = RunnerConfig::new();

    if let Some(dir) = &global.dir {
        config = config.with_working_dir(dir);
    }
    if let Some(client) = &global.client_exe {
        config = config.with_client_executable(client);
    }
    if let Some(server) = &global.server_exe {
        config = config.with_server_executable(server);
    }
    if let Some(port) = global.port {
        config = config.with_server_port(port);
    }
    if let Some(seconds) = run.timeout {
        config = config.with_default_timeout(Duration::from_secs(seconds));
    }
    config = config.with_color(!global.no_color);
    config.report_json = global.report_json.clone();

    config.phases.visible_pass = run.visible;
    config.phases.lint = !run.skip_lint;
    config.phases.server_unit = !(run.no_server || run.client_only);
    config.phases.endpoint = !(run.no_endpoint || run.client_only);
    config.strict_lint = run.strict_lint;
    config
}

fn harness_error(err: HarnessError) -> CliError {
    match err {
        HarnessError::MissingExecutable(path) => CliError::failure(format!(
            "Error: Executable not found at {}\nPlease build the project first with: xmake",
            path.display()
        )),
        other => CliError::failure(format!("Error: {other}")),
    }
}

fn exit_for(summary: &SuiteSummary) -> ExitCode {
    if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Run every enabled phase.
pub fn run_suite(config: RunnerConfig) -> CliResult<ExitCode> {
    let summary = SuiteCoordinator::new(config).run().map_err(harness_error)?;
    Ok(exit_for(&summary))
}

/// Print what discovery finds, without running anything.
pub fn list_tests(config: RunnerConfig) -> CliResult<ExitCode> {
    let mut coordinator = SuiteCoordinator::new(config);
    let suite = coordinator.discover();

    for (heading, names) in [
        ("client", &suite.client),
        ("integration", &suite.integration),
        ("server", &suite.server),
    ] {
        println!();
        println!("{heading} ({})", names.len());
        for name in names {
            println!("  {name}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Endpoint verification under a freshly started server.
pub fn verify_endpoint(config: RunnerConfig) -> CliResult<ExitCode> {
    let summary = SuiteCoordinator::new(config).verify().map_err(harness_error)?;
    Ok(exit_for(&summary))
}

/// Run one test through the executor.
pub fn run_single_test(config: RunnerConfig, name: &str, visible: bool, with_server: bool) -> CliResult<ExitCode> {
    if name.trim().is_empty() {
        return Err(CliError::failure("Error: run-test requires a test name"));
    }
    let visibility = if visible {
        Visibility::Visible
    } else {
        Visibility::Headless
    };
    let summary = SuiteCoordinator::new(config)
        .run_single(name, visibility, with_server)
        .map_err(harness_error)?;
    Ok(exit_for(&summary))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_defaults_pass_through() {
        let config = build_config(&GlobalArgs::default(), &RunArgs::default());
        assert_eq!(config.default_timeout, Duration::from_secs(30));
        assert!(config.phases.lint && config.phases.server_unit && config.phases.endpoint);
        assert!(!config.phases.visible_pass);
        assert!(config.color);
        assert!(config.report_json.is_none());
    }

    #[test]
    fn test_client_only_disables_server_phases() {
        let run = RunArgs {
            client_only: true,
            ..Default::default()
        };
        let config = build_config(&GlobalArgs::default(), &run);
        assert!(!config.phases.server_unit);
        assert!(!config.phases.endpoint);
        assert!(config.phases.lint);
    }

    #[test]
    fn test_flags_map_to_config() {
        let global = GlobalArgs {
            client_exe: Some(PathBuf::from("bin/client")),
            port: Some(9000),
            no_color: true,
            report_json: Some(PathBuf::from("summary.json")),
            ..Default::default()
        };
        let run = RunArgs {
            visible: true,
            timeout: Some(12),
            no_server: true,
            skip_lint: true,
            ..Default::default()
        };
        let config = build_config(&global, &run);
        assert_eq!(config.client_executable, PathBuf::from("bin/client"));
        assert_eq!(config.server_port, 9000);
        assert_eq!(config.default_timeout, Duration::from_secs(12));
        assert!(config.phases.visible_pass);
        assert!(!config.phases.server_unit);
        assert!(config.phases.endpoint);
        assert!(!config.phases.lint);
        assert!(!config.color);
        assert_eq!(config.report_json, Some(PathBuf::from("summary.json")));
    }

    #[test]
    fn test_missing_executable_message() {
        let err = harness_error(HarnessError::MissingExecutable(PathBuf::from("./output/my_name_chef.exe")));
        assert_eq!(err.exit_code, ExitCode::FAILURE);
        assert!(err.message.starts_with("Error: Executable not found at ./output/my_name_chef.exe"));
    }

    #[test]
    fn test_exit_code_follows_failures() {
        assert_eq!(exit_for(&SuiteSummary::default()), ExitCode::SUCCESS);
        let failed = SuiteSummary {
            failed: 1,
            ..Default::default()
        };
        assert_eq!(exit_for(&failed), ExitCode::FAILURE);
    }
}
