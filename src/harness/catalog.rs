//! Static test catalog
//!
//! The client binary reports every test it embeds, including legacy ones that
//! no longer belong in the suite. These lists decide which discovered names
//! run, and in which batch.

use serde::Serialize;

/// Tests that share one supervised battle server for the whole batch.
pub const CLIENT_TESTS: &[&str] = &[
    "validate_set_bonus_american_2_piece",
    "validate_set_bonus_american_4_piece",
    "validate_set_bonus_american_6_piece",
    "validate_set_bonus_no_synergy",
    "validate_main_menu",
    "validate_dish_system",
    "validate_debug_dish_creation",
    "validate_debug_dish_onserve_flavor_stats",
    "validate_debug_dish_onserve_target_scopes",
    "validate_debug_dish_onserve_combat_mods",
    "validate_debug_dish_onstartbattle",
    "validate_debug_dish_oncoursestart",
    "validate_debug_dish_onbitetaken",
    "validate_debug_dish_ondishfinished",
    "validate_debug_dish_oncoursecomplete",
    "validate_trigger_system",
    "validate_effect_system",
    "play_navigates_to_shop",
    "goto_battle",
    "validate_shop_navigation",
    "validate_shop_functionality",
    "validate_reroll_cost",
    "validate_dish_merging",
    "validate_shop_purchase",
    "validate_shop_purchase_no_gold",
    "validate_shop_purchase_insufficient_funds",
    "validate_shop_purchase_full_inventory",
    "validate_shop_purchase_exact_gold",
    "validate_shop_purchase_nonexistent_item",
    "validate_shop_purchase_wrong_screen",
    "validate_seeded_rng_determinism",
    "validate_seeded_rng_helper_methods",
    "validate_combat_system",
    "validate_battle_results",
    "validate_survivor_carryover_single",
    "validate_survivor_carryover_positions",
    "validate_survivor_carryover_multiple",
    "validate_survivor_carryover_battle_completion",
    "validate_survivor_carryover_simultaneous_defeat",
    "validate_ui_navigation",
    "validate_full_game_flow",
    "validate_server_failure_during_shop",
    "validate_server_failure_during_battle",
    "validate_code_hash",
    "validate_code_hash_mismatch_rejection",
];

/// Tests that launch their own battle server internally.
pub const INTEGRATION_TESTS: &[&str] = &["validate_server_battle_integration", "validate_server_opponent_match"];

/// Prefix every integration-class name carries.
pub const INTEGRATION_PREFIX: &str = "validate_server_";

/// One of these must also appear for a prefixed name to be integration-class.
pub const INTEGRATION_KEYWORDS: &[&str] = &["integration", "opponent_match", "checksum"];

/// Names containing this exercise the client's server-outage handling.
pub const SERVER_FAILURE_MARKER: &str = "server_failure";

/// Which batch a test belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCategory {
    /// Server-side unit tests, run in one `--run-tests` invocation
    Unit,
    /// Client tests sharing a supervised server
    Client,
    /// Client tests that supervise their own server and always run visible
    Integration,
}

impl TestCategory {
    pub fn label(self) -> &'static str {
        match self {
            TestCategory::Unit => "unit",
            TestCategory::Client => "client",
            TestCategory::Integration => "integration",
        }
    }
}

/// Prefix plus keyword rule for integration-class names.
pub fn is_integration_name(name: &str) -> bool {
    name.starts_with(INTEGRATION_PREFIX) && INTEGRATION_KEYWORDS.iter().any(|k| name.contains(k))
}

/// Whether the name exercises the server-outage path.
pub fn is_server_failure_name(name: &str) -> bool {
    name.contains(SERVER_FAILURE_MARKER)
}

/// Classify a client-binary test name, or `None` if it is not in the suite.
pub fn categorize(name: &str) -> Option<TestCategory> {
    if is_integration_name(name) && INTEGRATION_TESTS.contains(&name) {
        Some(TestCategory::Integration)
    } else if CLIENT_TESTS.contains(&name) {
        Some(TestCategory::Client)
    } else {
        None
    }
}
