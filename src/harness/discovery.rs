//! Test discovery via list mode
//!
//! Both binaries print one test name per line when launched with
//! `--list-tests`. Discovery never aborts the run: a missing binary, a launch
//! error, a timeout or a nonzero exit all mean "no tests available".

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::catalog::{self, TestCategory};
use super::interfaces::{CommandRunner, HarnessError, TestDiscovery};
use super::process::CommandSpec;

/// Flag that puts a binary into list mode.
pub const LIST_TESTS_FLAG: &str = "--list-tests";

/// Queries executables through a [`CommandRunner`].
pub struct ListModeDiscovery<'a> {
    runner: &'a dyn CommandRunner,
    working_dir: PathBuf,
    timeout: Duration,
}

impl<'a> ListModeDiscovery<'a> {
    pub fn new(runner: &'a dyn CommandRunner, working_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            runner,
            working_dir: working_dir.into(),
            timeout,
        }
    }

    fn try_list(&self, binary: &Path) -> Result<Vec<String>, HarnessError> {
        let spec = CommandSpec::new(binary, self.timeout)
            .arg(LIST_TESTS_FLAG)
            .current_dir(&self.working_dir);
        let output = self.runner.run(&spec)?;

        if output.timed_out || output.exit_code != 0 {
            return Err(HarnessError::DiscoveryUnavailable {
                binary: binary.to_path_buf(),
                reason: if output.timed_out {
                    format!("no answer within {:?}", self.timeout)
                } else {
                    format!("exit code {}", output.exit_code)
                },
            });
        }

        Ok(parse_listing(&output.stdout))
    }
}

impl TestDiscovery for ListModeDiscovery<'_> {
    fn list_tests(&self, binary: &Path) -> Vec<String> {
        match self.try_list(binary) {
            Ok(tests) => {
                tracing::debug!(binary = %binary.display(), count = tests.len(), "discovered tests");
                tests
            }
            Err(e) => {
                tracing::warn!("{e}");
                Vec::new()
            }
        }
    }
}

/// One name per non-blank line, trimmed, in output order.
pub fn parse_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Discovered client-binary tests split into the two batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategorizedTests {
    pub client: Vec<String>,
    pub integration: Vec<String>,
}

impl CategorizedTests {
    pub fn is_empty(&self) -> bool {
        self.client.is_empty() && self.integration.is_empty()
    }

    pub fn tests_in(&self, category: TestCategory) -> &[String] {
        match category {
            TestCategory::Client => &self.client,
            TestCategory::Integration => &self.integration,
            TestCategory::Unit => &[],
        }
    }
}

/// Keep only catalogued names, preserving discovery order.
///
/// Names the binary does not report are never run, and names it reports that
/// the catalog does not know are ignored.
pub fn categorize_tests(discovered: &[String]) -> CategorizedTests {
    let mut result = CategorizedTests::default();
    for name in discovered {
        match catalog::categorize(name) {
            Some(TestCategory::Client) if !result.client.contains(name) => result.client.push(name.clone()),
            Some(TestCategory::Integration) if !result.integration.contains(name) => {
                result.integration.push(name.clone())
            }
            _ => {}
        }
    }
    result
}
