// ⚙️ Engine Configuration - Thresholds as data
// Loadable from a JSON file so ops can tune without a rebuild.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// ENGINE CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Appears in the CSV export note column
    #[serde(default = "default_program_name")]
    pub program_name: String,

    /// Single event at or above this triggers an advisory anomaly flag
    #[serde(default = "default_large_amount")]
    pub large_amount_threshold_cents: i64,

    /// Refund ratio (refunds/gross, percent) above this triggers a flag
    #[serde(default = "default_refund_ratio")]
    pub refund_ratio_threshold_pct: f64,

    /// Lifetime net revenue tier for the +20 trust bonus
    #[serde(default = "default_net_tier")]
    pub trust_net_revenue_tier_cents: i64,

    /// Partners scored below this have their payout minimum raised
    #[serde(default = "default_trust_floor")]
    pub low_trust_floor: u8,

    /// Multiplier applied to minimum_payout_cents below the floor
    #[serde(default = "default_minimum_multiplier")]
    pub low_trust_minimum_multiplier: i64,
}

fn default_program_name() -> String {
    "Partner Program".to_string()
}

fn default_large_amount() -> i64 {
    100_000 // $1,000.00
}

fn default_refund_ratio() -> f64 {
    20.0
}

fn default_net_tier() -> i64 {
    1_000_000 // $10,000.00 lifetime
}

fn default_trust_floor() -> u8 {
    40
}

fn default_minimum_multiplier() -> i64 {
    2
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            program_name: default_program_name(),
            large_amount_threshold_cents: default_large_amount(),
            refund_ratio_threshold_pct: default_refund_ratio(),
            trust_net_revenue_tier_cents: default_net_tier(),
            low_trust_floor: default_trust_floor(),
            low_trust_minimum_multiplier: default_minimum_multiplier(),
        }
    }
}

impl EngineConfig {
    /// Load config from a JSON file. Missing fields take defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: EngineConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;
        Ok(config)
    }
}

// ============================================================================
// TESTS
// ============================================================================
