//! Endpoint verification against an HTTP stub

mod common;

use chef_harness::harness::interfaces::ContractVerifier;
use chef_harness::harness::{HttpContractVerifier, VerificationStage};
use common::{StubRequest, StubResponse, StubServer, battle_json};

fn is_empty_team(req: &StubRequest) -> bool {
    serde_json::from_str::<serde_json::Value>(&req.body)
        .ok()
        .and_then(|v| v["team"].as_array().map(|t| t.is_empty()))
        .unwrap_or(false)
}

/// Well-behaved server with one route overridden.
fn server_with(battle: fn(&StubRequest) -> StubResponse) -> StubServer {
    StubServer::start(move |req| match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/health") => StubResponse::json(200, r#"{"status":"ok"}"#),
        ("POST", "/battle") => battle(req),
        _ => StubResponse::json(404, r#"{"error":"not found"}"#),
    })
}

fn conforming_battle(req: &StubRequest) -> StubResponse {
    if is_empty_team(req) {
        StubResponse::json(400, r#"{"error":"team must not be empty"}"#)
    } else {
        StubResponse::json(200, battle_json())
    }
}

fn verifier_for(stub: &StubServer) -> HttpContractVerifier {
    HttpContractVerifier::new(format!("http://127.0.0.1:{}", stub.port))
}

#[test]
fn test_conforming_server_passes_all_stages() {
    let stub = server_with(conforming_battle);
    let report = verifier_for(&stub).verify();
    assert!(report.success(), "{}", report.reason());
    assert_eq!(report.stages.len(), 4);
    let shape = report.stage(VerificationStage::Shape).unwrap();
    assert!(shape.detail.contains("checksum=9f2c"), "{}", shape.detail);
}

#[test]
fn test_sample_team_is_sent() {
    let stub = server_with(|req| {
        if is_empty_team(req) {
            return StubResponse::json(400, r#"{"error":"empty"}"#);
        }
        let body: serde_json::Value = serde_json::from_str(&req.body).unwrap_or_default();
        if body["team"][0]["dishType"] == "Potato" && body["team"][2]["slot"] == 2 {
            StubResponse::json(200, battle_json())
        } else {
            StubResponse::json(422, r#"{"error":"unexpected payload"}"#)
        }
    });
    assert!(verifier_for(&stub).verify().success());
}

#[test]
fn test_unhealthy_server_stops_at_health() {
    let stub = StubServer::start(|_| StubResponse::json(500, r#"{"error":"down"}"#));
    let report = verifier_for(&stub).verify();
    assert!(!report.success());
    assert_eq!(report.stages.len(), 1);
    assert_eq!(report.failure().unwrap().stage, VerificationStage::Health);
}

#[test]
fn test_unreachable_server_fails_health() {
    let verifier = HttpContractVerifier::new(format!("http://127.0.0.1:{}", common::unused_port()));
    let report = verifier.verify();
    assert_eq!(report.failure().unwrap().stage, VerificationStage::Health);
}

#[test]
fn test_server_error_on_battle_fails_contract() {
    let stub = server_with(|_| StubResponse::json(500, r#"{"error":"boom"}"#));
    let report = verifier_for(&stub).verify();
    let failure = report.failure().unwrap();
    assert_eq!(failure.stage, VerificationStage::Contract);
    assert!(failure.detail.contains("HTTP 500"), "{}", failure.detail);
}

#[test]
fn test_non_json_battle_fails_contract() {
    let stub = server_with(|_| StubResponse::json(200, "<html>hello</html>"));
    let report = verifier_for(&stub).verify();
    assert_eq!(report.failure().unwrap().stage, VerificationStage::Contract);
}

#[test]
fn test_missing_checksum_fails_shape() {
    let stub = server_with(|req| {
        if is_empty_team(req) {
            StubResponse::json(400, r#"{"error":"empty"}"#)
        } else {
            StubResponse::json(200, r#"{"seed":1,"opponentId":"x","outcomes":[],"events":[]}"#)
        }
    });
    let report = verifier_for(&stub).verify();
    let failure = report.failure().unwrap();
    assert_eq!(failure.stage, VerificationStage::Shape);
    assert!(failure.detail.contains("checksum"));
    // Error handling never ran.
    assert!(report.stage(VerificationStage::ErrorHandling).is_none());
}

#[test]
fn test_accepting_empty_team_fails_error_handling() {
    let stub = server_with(|_| StubResponse::json(200, battle_json()));
    let report = verifier_for(&stub).verify();
    let failure = report.failure().unwrap();
    assert_eq!(failure.stage, VerificationStage::ErrorHandling);
    assert!(failure.detail.contains("got 200"), "{}", failure.detail);
    assert_eq!(report.reason(), format!("error-handling stage failed: {}", failure.detail));
}

#[test]
fn test_rejection_without_error_field_fails_error_handling() {
    let stub = server_with(|req| {
        if is_empty_team(req) {
            StubResponse::json(400, r#"{"message":"bad"}"#)
        } else {
            StubResponse::json(200, battle_json())
        }
    });
    let report = verifier_for(&stub).verify();
    assert_eq!(report.failure().unwrap().stage, VerificationStage::ErrorHandling);
}
