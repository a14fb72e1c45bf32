//! Battle server contract verification
//!
//! Talks to the server over HTTP without the client in the loop. Four stages
//! run in order and the first failure stops the check:
//!
//! 1. `GET /health` answers
//! 2. `POST /battle` with a small valid team returns JSON
//! 3. that JSON has the required fields with the right shapes
//! 4. `POST /battle` with an empty team is rejected with 400 and an `error`

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::config::RunnerConfig;

use super::interfaces::{ContractVerifier, HarnessError};

/// Fields every battle response must carry.
pub const REQUIRED_FIELDS: [&str; 5] = ["seed", "opponentId", "outcomes", "events", "checksum"];

/// Verification stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStage {
    Health,
    Contract,
    Shape,
    ErrorHandling,
}

impl fmt::Display for VerificationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VerificationStage::Health => "health",
            VerificationStage::Contract => "contract",
            VerificationStage::Shape => "shape",
            VerificationStage::ErrorHandling => "error-handling",
        };
        f.write_str(name)
    }
}

/// Result of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: VerificationStage,
    pub passed: bool,
    pub detail: String,
}

/// Outcome of a verification run. Stages after the first failure are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub stages: Vec<StageReport>,
}

impl VerificationReport {
    pub fn success(&self) -> bool {
        self.stages.len() == STAGE_COUNT && self.stages.iter().all(|s| s.passed)
    }

    pub fn stage(&self, stage: VerificationStage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// The first failing stage, if any.
    pub fn failure(&self) -> Option<&StageReport> {
        self.stages.iter().find(|s| !s.passed)
    }

    /// One-line reason suitable for the console summary.
    pub fn reason(&self) -> String {
        match self.failure() {
            Some(failed) => format!("{} stage failed: {}", failed.stage, failed.detail),
            None if self.success() => "All endpoint verification tests passed".to_string(),
            None => "verification did not run".to_string(),
        }
    }

    pub fn to_error(&self) -> Option<HarnessError> {
        self.failure().map(|failed| HarnessError::ContractViolation {
            stage: failed.stage,
            detail: failed.detail.clone(),
        })
    }

    fn record(&mut self, stage: VerificationStage, result: Result<String, String>) -> bool {
        let passed = result.is_ok();
        let detail = result.unwrap_or_else(|e| e);
        self.stages.push(StageReport { stage, passed, detail });
        passed
    }
}

const STAGE_COUNT: usize = 4;

// ============================================================================
// Payloads
// ============================================================================

/// One dish in a submitted team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSlot {
    pub dish_type: String,
    pub slot: u32,
    pub level: u32,
}

/// Body of `POST /battle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BattleRequest {
    pub team: Vec<TeamSlot>,
}

impl BattleRequest {
    /// A small team every server build accepts.
    pub fn sample() -> Self {
        let team = ["Potato", "Burger", "Pizza"]
            .iter()
            .enumerate()
            .map(|(slot, dish)| TeamSlot {
                dish_type: dish.to_string(),
                slot: slot as u32,
                level: 1,
            })
            .collect();
        Self { team }
    }

    /// Structurally valid JSON the server must reject.
    pub fn empty() -> Self {
        Self { team: Vec::new() }
    }
}

/// Headline values pulled out of a valid battle response.
#[derive(Debug, Clone, PartialEq)]
pub struct BattleSummary {
    pub seed: Value,
    pub opponent_id: Value,
    pub outcome_count: usize,
    pub event_count: usize,
    pub checksum: String,
}

impl fmt::Display for BattleSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seed={} opponent={} outcomes={} events={} checksum={}",
            self.seed, self.opponent_id, self.outcome_count, self.event_count, self.checksum
        )
    }
}

/// Check a battle response against the contract.
pub fn validate_battle_response(response: &Value) -> Result<BattleSummary, String> {
    let Some(object) = response.as_object() else {
        return Err("response is not a JSON object".to_string());
    };

    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| !object.contains_key(*field))
        .collect();
    if !missing.is_empty() {
        return Err(format!("missing required fields: {}", missing.join(", ")));
    }

    let Some(outcomes) = object["outcomes"].as_array() else {
        return Err("'outcomes' is not an array".to_string());
    };
    let Some(events) = object["events"].as_array() else {
        return Err("'events' is not an array".to_string());
    };
    let checksum = match object["checksum"].as_str() {
        Some(s) if !s.is_empty() && s != "null" => s.to_string(),
        _ => return Err("'checksum' is missing or empty".to_string()),
    };

    Ok(BattleSummary {
        seed: object["seed"].clone(),
        opponent_id: object["opponentId"].clone(),
        outcome_count: outcomes.len(),
        event_count: events.len(),
        checksum,
    })
}

/// Check the rejection of an invalid team.
pub fn validate_error_response(status: u16, body: &str) -> Result<String, String> {
    if status != 400 {
        return Err(format!("expected HTTP 400 for invalid team, got {status}"));
    }
    let parsed: Value =
        serde_json::from_str(body).map_err(|e| format!("error response is not valid JSON: {e}"))?;
    if parsed.get("error").is_none() {
        return Err("error response missing 'error' field".to_string());
    }
    Ok("HTTP 400 for invalid team".to_string())
}

// ============================================================================
// HTTP verifier
// ============================================================================

/// Per-stage request budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifierTimeouts {
    pub health: Duration,
    pub contract: Duration,
    pub error_handling: Duration,
}

impl Default for VerifierTimeouts {
    fn default() -> Self {
        Self {
            health: Duration::from_secs(5),
            contract: Duration::from_secs(30),
            error_handling: Duration::from_secs(10),
        }
    }
}

/// Verifies a running server with blocking HTTP calls.
pub struct HttpContractVerifier {
    base_url: String,
    timeouts: VerifierTimeouts,
}

impl HttpContractVerifier {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeouts: VerifierTimeouts::default(),
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(config.service_url())
    }

    pub fn with_timeouts(mut self, timeouts: VerifierTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    fn agent(timeout: Duration) -> ureq::Agent {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        ureq::Agent::new_with_config(config)
    }

    fn post_battle(&self, body: &BattleRequest, timeout: Duration) -> Result<(u16, String), String> {
        let bytes = serde_json::to_vec(body).map_err(|e| format!("failed to serialize request: {e}"))?;
        let mut response = Self::agent(timeout)
            .post(&format!("{}/battle", self.base_url))
            .header("Content-Type", "application/json")
            .send(&bytes[..])
            .map_err(|e| format!("request failed: {e}"))?;
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| format!("failed to read response: {e}"))?;
        Ok((status, text))
    }

    fn check_health(&self) -> Result<String, String> {
        let url = format!("{}/health", self.base_url);
        let mut response = Self::agent(self.timeouts.health)
            .get(&url)
            .call()
            .map_err(|e| format!("server not responding on {url}: {e}"))?;
        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string().unwrap_or_default();
        if status == 200 {
            Ok(format!("health check passed: {}", body.trim()))
        } else {
            Err(format!("health endpoint returned HTTP {status}"))
        }
    }

    fn call_battle(&self) -> Result<Value, String> {
        let (status, text) = self.post_battle(&BattleRequest::sample(), self.timeouts.contract)?;
        if !(200..300).contains(&status) {
            return Err(format!("HTTP {status} - {}", text.trim()));
        }
        serde_json::from_str(&text).map_err(|e| format!("response is not valid JSON: {e}"))
    }

    fn check_error_handling(&self) -> Result<String, String> {
        let (status, text) = self.post_battle(&BattleRequest::empty(), self.timeouts.error_handling)?;
        validate_error_response(status, &text)
    }
}

impl ContractVerifier for HttpContractVerifier {
    #[tracing::instrument(skip_all, fields(base_url = %self.base_url))]
    fn verify(&self) -> VerificationReport {
        let mut report = VerificationReport::default();

        if !report.record(VerificationStage::Health, self.check_health()) {
            return report;
        }

        let response = match self.call_battle() {
            Ok(value) => {
                report.record(VerificationStage::Contract, Ok("received valid JSON response".to_string()));
                value
            }
            Err(e) => {
                report.record(VerificationStage::Contract, Err(e));
                return report;
            }
        };

        let shape = validate_battle_response(&response).map(|summary| summary.to_string());
        if !report.record(VerificationStage::Shape, shape) {
            return report;
        }

        report.record(VerificationStage::ErrorHandling, self.check_error_handling());
        if let Some(err) = report.to_error() {
            tracing::debug!("{err}");
        }
        report
    }
}
