// 🔍 Anomaly Detector & Trust Scorer - Advisory only, never blocking
//
// Flags annotate events and ledger entries for the monthly report; trust
// scores tune payout minimums. Neither EVER authorizes a payment or
// aborts processing - the human reading the report decides.

use crate::config::EngineConfig;
use crate::events::RevenueEvent;
use crate::ledger::LedgerEntry;
use serde::{Deserialize, Serialize};

// ============================================================================
// ANOMALY FLAG
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyFlag {
    /// Event id or partner id the flag is about
    pub subject: String,

    /// Which heuristic fired
    pub rule: String,

    pub severity: AnomalySeverity,

    pub note: String,
}

// ============================================================================
// ANOMALY DETECTOR
// ============================================================================

pub struct AnomalyDetector {
    /// Single event at or above this is flagged
    large_amount_threshold_cents: i64,

    /// Refund ratio (percent of gross) above this is flagged
    refund_ratio_threshold_pct: f64,
}

impl AnomalyDetector {
    pub fn new() -> Self {
        AnomalyDetector {
            large_amount_threshold_cents: 100_000,
            refund_ratio_threshold_pct: 20.0,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        AnomalyDetector {
            large_amount_threshold_cents: config.large_amount_threshold_cents,
            refund_ratio_threshold_pct: config.refund_ratio_threshold_pct,
        }
    }

    /// Flag a single suspiciously large event.
    pub fn flag_event(&self, event: &RevenueEvent) -> Option<AnomalyFlag> {
        if event.amount_cents.abs() >= self.large_amount_threshold_cents {
            return Some(AnomalyFlag {
                subject: event.event_id.to_string(),
                rule: "large_single_event".to_string(),
                severity: AnomalySeverity::Warning,
                note: format!(
                    "event of {} cents for partner {} exceeds threshold {}",
                    event.amount_cents, event.partner_id, self.large_amount_threshold_cents
                ),
            });
        }
        None
    }

    /// Flag a ledger entry whose refund ratio is out of band.
    pub fn flag_entry(&self, entry: &LedgerEntry) -> Option<AnomalyFlag> {
        if entry.gross_revenue_cents <= 0 {
            return None;
        }
        let ratio_pct =
            entry.refunds_cents as f64 / entry.gross_revenue_cents as f64 * 100.0;
        if ratio_pct > self.refund_ratio_threshold_pct {
            return Some(AnomalyFlag {
                subject: entry.partner_id.clone(),
                rule: "high_refund_ratio".to_string(),
                severity: AnomalySeverity::Warning,
                note: format!(
                    "refund ratio {:.1}% for partner {} in {} exceeds {:.1}%",
                    ratio_pct, entry.partner_id, entry.period, self.refund_ratio_threshold_pct
                ),
            });
        }
        None
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TRUST SCORER
// ============================================================================

/// Inputs the engine assembles from history before scoring.
#[derive(Debug, Clone, Default)]
pub struct PartnerStats {
    pub lifetime_net_revenue_cents: i64,
    pub successful_payouts: u32,

    /// Lifetime refunds / lifetime gross, in percent
    pub refund_ratio_pct: f64,

    pub tenure_days: i64,
}

pub struct TrustScorer {
    /// Lifetime net revenue needed for the +20 bonus
    net_revenue_tier_cents: i64,
}

impl TrustScorer {
    pub fn new() -> Self {
        TrustScorer {
            net_revenue_tier_cents: 1_000_000,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        TrustScorer {
            net_revenue_tier_cents: config.trust_net_revenue_tier_cents,
        }
    }

    /// Base 50, +20 lifetime net over tier, +15 any prior successful
    /// payout, +10 refund ratio under 5%, +5 tenure over 30 days.
    /// Capped at 100. Reporting and threshold tuning only.
    pub fn score(&self, stats: &PartnerStats) -> u8 {
        let mut score: u32 = 50;

        if stats.lifetime_net_revenue_cents > self.net_revenue_tier_cents {
            score += 20;
        }
        if stats.successful_payouts >= 1 {
            score += 15;
        }
        if stats.refund_ratio_pct < 5.0 {
            score += 10;
        }
        if stats.tenure_days > 30 {
            score += 5;
        }

        score.min(100) as u8
    }
}

impl Default for TrustScorer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::ledger::Period;
    use chrono::{TimeZone, Utc};

    fn create_test_event(amount: i64) -> RevenueEvent {
        RevenueEvent::new(
            "p1",
            "table_rake",
            amount,
            "USD",
            EventKind::RakeShare,
            "ref",
            Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap(),
        )
    }

    fn create_test_entry(gross: i64, refunds: i64) -> LedgerEntry {
        LedgerEntry {
            partner_id: "p1".to_string(),
            period: Period::new(2025, 1).unwrap(),
            gross_revenue_cents: gross,
            refunds_cents: refunds,
            net_revenue_cents: gross - refunds,
            partner_cut_cents: 0,
            platform_cut_cents: gross - refunds,
            eligible: false,
        }
    }

    #[test]
    fn test_large_event_flagged() {
        let detector = AnomalyDetector::new();

        assert!(detector.flag_event(&create_test_event(100_000)).is_some());
        assert!(detector.flag_event(&create_test_event(-150_000)).is_some());
        assert!(detector.flag_event(&create_test_event(99_999)).is_none());
    }

    #[test]
    fn test_refund_ratio_flagged() {
        let detector = AnomalyDetector::new();

        // 25% refund ratio > 20% threshold
        let flag = detector.flag_entry(&create_test_entry(10_000, 2_500)).unwrap();
        assert_eq!(flag.rule, "high_refund_ratio");
        assert_eq!(flag.severity, AnomalySeverity::Warning);

        // 10% is fine
        assert!(detector.flag_entry(&create_test_entry(10_000, 1_000)).is_none());
        // Zero gross never divides
        assert!(detector.flag_entry(&create_test_entry(0, 500)).is_none());
    }

    #[test]
    fn test_trust_score_terms() {
        let scorer = TrustScorer::new();

        // Fresh partner: base 50, refund ratio 0 < 5% gives +10
        let fresh = PartnerStats::default();
        assert_eq!(scorer.score(&fresh), 60);

        // Everything maxed: 50 + 20 + 15 + 10 + 5 = 100
        let veteran = PartnerStats {
            lifetime_net_revenue_cents: 2_000_000,
            successful_payouts: 12,
            refund_ratio_pct: 1.0,
            tenure_days: 400,
        };
        assert_eq!(scorer.score(&veteran), 100);

        // High refunds, no history
        let risky = PartnerStats {
            lifetime_net_revenue_cents: 0,
            successful_payouts: 0,
            refund_ratio_pct: 30.0,
            tenure_days: 10,
        };
        assert_eq!(scorer.score(&risky), 50);
    }

    #[test]
    fn test_trust_score_capped() {
        let scorer = TrustScorer {
            net_revenue_tier_cents: 0,
        };
        let stats = PartnerStats {
            lifetime_net_revenue_cents: 1,
            successful_payouts: 1,
            refund_ratio_pct: 0.0,
            tenure_days: 100,
        };
        assert_eq!(scorer.score(&stats), 100);
    }
}
