//! CLI module for the test harness
//!
//! ## Commands
//!
//! - `run` - Full suite (default when no subcommand is given)
//! - `list` - Print the discovered tests of both binaries
//! - `verify` - Battle endpoint verification only
//! - `run-test <NAME>` - Run a single client test
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;

use std::fmt;
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};

use crate::version::HARNESS_VERSION;

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Test suite runner for the My Name Chef client and battle server
#[derive(Parser, Debug)]
#[command(name = "chef-harness")]
#[command(version = HARNESS_VERSION)]
#[command(about = "Test suite runner for the My Name Chef client and battle server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Suite options used when no subcommand is given
    #[command(flatten)]
    pub run: RunArgs,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Paths and output options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Game client executable
    #[arg(long = "client-exe", value_name = "PATH", global = true)]
    pub client_exe: Option<PathBuf>,

    /// Battle server executable
    #[arg(long = "server-exe", value_name = "PATH", global = true)]
    pub server_exe: Option<PathBuf>,

    /// Working directory for every child process
    #[arg(long = "dir", value_name = "DIR", global = true)]
    pub dir: Option<PathBuf>,

    /// Port for the supervised battle server
    #[arg(long, value_name = "PORT", global = true)]
    pub port: Option<u16>,

    /// Disable ANSI colors
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Also write the summary as JSON to this file
    #[arg(long = "report-json", value_name = "PATH", global = true)]
    pub report_json: Option<PathBuf>,
}

/// Options for a full suite run.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Run the client tests again in visible mode after the headless pass
    #[arg(short = 'v', long)]
    pub visible: bool,

    /// Timeout per test in seconds
    #[arg(short = 't', long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Skip server unit tests
    #[arg(long = "no-server")]
    pub no_server: bool,

    /// Skip battle endpoint verification
    #[arg(long = "no-endpoint")]
    pub no_endpoint: bool,

    /// Skip server unit tests and endpoint verification
    #[arg(long = "client-only")]
    pub client_only: bool,

    /// Skip the test linter
    #[arg(long = "skip-lint")]
    pub skip_lint: bool,

    /// Count lint violations as a failure
    #[arg(long = "strict-lint", conflicts_with = "skip_lint")]
    pub strict_lint: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full suite
    Run(RunArgs),

    /// List discovered client, integration and server tests
    List,

    /// Verify the battle endpoint against a freshly started server
    Verify,

    /// Run one client test and print its classification
    RunTest {
        /// Test name as reported by `--list-tests`
        #[arg(value_name = "NAME")]
        name: String,
        /// Render the game window
        #[arg(long)]
        visible: bool,
        /// Start a battle server for the duration of the test
        #[arg(long = "with-server")]
        with_server: bool,
    },
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Execute the CLI command and return result.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Some(Command::Run(args)) => commands::run_suite(commands::build_config(&cli.global, &args)),
        Some(Command::List) => commands::list_tests(commands::build_config(&cli.global, &RunArgs::default())),
        Some(Command::Verify) => commands::verify_endpoint(commands::build_config(&cli.global, &RunArgs::default())),
        Some(Command::RunTest {
            name,
            visible,
            with_server,
        }) => commands::run_single_test(
            commands::build_config(&cli.global, &RunArgs::default()),
            &name,
            visible,
            with_server,
        ),
        None => commands::run_suite(commands::build_config(&cli.global, &cli.run)),
    }
}

// ============================================================================
// Tests
// ============================================================================
