// 📒 Ledger Aggregator - Fold events into per-partner period figures
//
// Core arithmetic of the whole system:
//   net = gross - refunds
//   partner_cut = half_up_round(net * share / 100)
//   platform_cut = net - partner_cut          (conservation, exact)
//   eligible = partner_cut >= effective minimum
//
// All in integer cents - no floats touch money. Deterministic and
// idempotent: the same event set always produces byte-identical entries
// (BTreeMap keeps partner order stable), which audit reproducibility
// depends on.

use crate::config::EngineConfig;
use crate::entities::PartnerRegistry;
use crate::errors::{LedgerError, LedgerResult};
use crate::events::RevenueEvent;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// BILLING PERIOD
// ============================================================================

/// One calendar month, the billing granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> LedgerResult<Self> {
        // Bounded so date_range() always lands inside chrono's calendar
        if !(1970..=9999).contains(&year) {
            return Err(LedgerError::Validation(format!(
                "year must be 1970-9999, got {}",
                year
            )));
        }
        if !(1..=12).contains(&month) {
            return Err(LedgerError::Validation(format!(
                "month must be 1-12, got {}",
                month
            )));
        }
        Ok(Period { year, month })
    }

    /// Parse "YYYY-MM".
    pub fn parse(s: &str) -> LedgerResult<Self> {
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() != 2 {
            return Err(LedgerError::Validation(format!(
                "period must be YYYY-MM, got {}",
                s
            )));
        }
        let year: i32 = parts[0]
            .parse()
            .map_err(|_| LedgerError::Validation(format!("bad year in period: {}", s)))?;
        let month: u32 = parts[1]
            .parse()
            .map_err(|_| LedgerError::Validation(format!("bad month in period: {}", s)))?;
        Period::new(year, month)
    }

    /// Half-open UTC range [start of month, start of next month).
    pub fn date_range(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc
            .with_ymd_and_hms(self.year, self.month, 1, 0, 0, 0)
            .unwrap();
        let (next_year, next_month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        let end = Utc.with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0).unwrap();
        (start, end)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let (start, end) = self.date_range();
        at >= start && at < end
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

// ============================================================================
// LEDGER ENTRY
// ============================================================================

/// Derived per-(partner, period) figures. Never hand-edited - always
/// recomputed from the event set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub partner_id: String,
    pub period: Period,
    pub gross_revenue_cents: i64,
    pub refunds_cents: i64,
    pub net_revenue_cents: i64,
    pub partner_cut_cents: i64,
    pub platform_cut_cents: i64,
    pub eligible: bool,
}

impl LedgerEntry {
    /// Conservation invariant, checked in tests and debug assertions.
    pub fn conserves(&self) -> bool {
        self.partner_cut_cents + self.platform_cut_cents == self.net_revenue_cents
            && self.net_revenue_cents == self.gross_revenue_cents - self.refunds_cents
    }
}

/// Round net * pct / 100 to the nearest cent, half away from zero.
/// Integer-only so repeated runs cannot drift.
pub fn half_up_share(net_cents: i64, share_percent: u8) -> i64 {
    let pct = share_percent as i64;
    if net_cents >= 0 {
        (net_cents * pct + 50) / 100
    } else {
        -((-net_cents * pct + 50) / 100)
    }
}

// ============================================================================
// AGGREGATION WARNING
// ============================================================================

/// Non-fatal issues observed during aggregation. An event stream naming a
/// partner the registry does not know is flagged and skipped, never an
/// aggregation failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationWarning {
    pub partner_id: String,
    pub message: String,
}

// ============================================================================
// LEDGER AGGREGATOR
// ============================================================================

pub struct LedgerAggregator {
    /// Partners scored below this have their minimum raised
    low_trust_floor: u8,

    /// Multiplier for the raised minimum
    low_trust_minimum_multiplier: i64,
}

impl LedgerAggregator {
    pub fn new() -> Self {
        LedgerAggregator {
            low_trust_floor: 40,
            low_trust_minimum_multiplier: 2,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        LedgerAggregator {
            low_trust_floor: config.low_trust_floor,
            low_trust_minimum_multiplier: config.low_trust_minimum_multiplier,
        }
    }

    /// Fold a period's events into per-partner entries.
    ///
    /// Gross sums non-refund amounts; refunds sum abs(amount) of refund
    /// events regardless of the sign the source supplied. Events outside
    /// the period or for unknown partners are skipped (the latter with a
    /// warning).
    pub fn aggregate(
        &self,
        period: Period,
        events: &[RevenueEvent],
        registry: &PartnerRegistry,
    ) -> (BTreeMap<String, LedgerEntry>, Vec<AggregationWarning>) {
        let mut gross: BTreeMap<String, i64> = BTreeMap::new();
        let mut refunds: BTreeMap<String, i64> = BTreeMap::new();
        let mut warnings: Vec<AggregationWarning> = Vec::new();
        let mut warned: Vec<String> = Vec::new();

        for event in events {
            if !period.contains(event.occurred_at) {
                continue;
            }
            if !registry.contains(&event.partner_id) {
                if !warned.contains(&event.partner_id) {
                    warned.push(event.partner_id.clone());
                    warnings.push(AggregationWarning {
                        partner_id: event.partner_id.clone(),
                        message: format!(
                            "events reference unknown partner {}; excluded from ledger",
                            event.partner_id
                        ),
                    });
                }
                continue;
            }

            if event.kind.is_refund() {
                *refunds.entry(event.partner_id.clone()).or_insert(0) +=
                    event.amount_cents.abs();
            } else {
                *gross.entry(event.partner_id.clone()).or_insert(0) += event.amount_cents;
            }
        }

        let mut entries = BTreeMap::new();
        let partner_ids: Vec<String> = gross
            .keys()
            .chain(refunds.keys())
            .cloned()
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();

        for partner_id in partner_ids {
            // Registry membership was checked per event
            let partner = match registry.find(&partner_id) {
                Some(p) => p,
                None => continue,
            };

            let gross_cents = *gross.get(&partner_id).unwrap_or(&0);
            let refund_cents = *refunds.get(&partner_id).unwrap_or(&0);
            let net_cents = gross_cents - refund_cents;
            let partner_cut = half_up_share(net_cents, partner.revenue_share_percent);
            let platform_cut = net_cents - partner_cut;

            let minimum = self.effective_minimum(partner.minimum_payout_cents, partner.trust_score);
            let eligible = partner_cut >= minimum;

            entries.insert(
                partner_id.clone(),
                LedgerEntry {
                    partner_id,
                    period,
                    gross_revenue_cents: gross_cents,
                    refunds_cents: refund_cents,
                    net_revenue_cents: net_cents,
                    partner_cut_cents: partner_cut,
                    platform_cut_cents: platform_cut,
                    eligible,
                },
            );
        }

        (entries, warnings)
    }

    /// Low-trust partners accumulate toward a raised threshold instead of
    /// receiving small frequent payouts. Advisory scoring never blocks a
    /// payout outright.
    fn effective_minimum(&self, minimum_payout_cents: i64, trust_score: u8) -> i64 {
        if trust_score < self.low_trust_floor {
            minimum_payout_cents * self.low_trust_minimum_multiplier
        } else {
            minimum_payout_cents
        }
    }
}

impl Default for LedgerAggregator {
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
    use crate::entities::Partner;
    use crate::events::EventKind;
    use chrono::TimeZone;

    fn jan() -> Period {
        Period::new(2025, 1).unwrap()
    }

    fn create_test_registry() -> PartnerRegistry {
        let registry = PartnerRegistry::new();
        registry
            .register(Partner::new(
                "p1",
                "Partner One",
                "p1@example.com",
                35,
                2500,
                "USD",
            ))
            .unwrap();
        registry
    }

    fn create_test_event(partner: &str, amount: i64, kind: EventKind) -> RevenueEvent {
        RevenueEvent::new(
            partner,
            "table_rake",
            amount,
            "USD",
            kind,
            "ref",
            Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_worked_example() {
        // P1: 35% share, $25.00 minimum. Events +45075, +32520, -5000 refund.
        let registry = create_test_registry();
        let events = vec![
            create_test_event("p1", 45075, EventKind::RakeShare),
            create_test_event("p1", 32520, EventKind::SubscriptionShare),
            create_test_event("p1", -5000, EventKind::Refund),
        ];

        let aggregator = LedgerAggregator::new();
        let (entries, warnings) = aggregator.aggregate(jan(), &events, &registry);

        assert!(warnings.is_empty());
        let entry = &entries["p1"];
        assert_eq!(entry.gross_revenue_cents, 77595);
        assert_eq!(entry.refunds_cents, 5000);
        assert_eq!(entry.net_revenue_cents, 72595);
        assert_eq!(entry.partner_cut_cents, 25408);
        assert_eq!(entry.platform_cut_cents, 47187);
        assert!(entry.eligible);
        assert!(entry.conserves());
    }

    #[test]
    fn test_idempotent_aggregation() {
        let registry = create_test_registry();
        let events = vec![
            create_test_event("p1", 45075, EventKind::RakeShare),
            create_test_event("p1", -5000, EventKind::Refund),
        ];

        let aggregator = LedgerAggregator::new();
        let (first, _) = aggregator.aggregate(jan(), &events, &registry);
        let (second, _) = aggregator.aggregate(jan(), &events, &registry);

        assert_eq!(first, second);
        // Byte-identical when serialized (BTreeMap ordering)
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_conservation_over_many_inputs() {
        let registry = create_test_registry();
        let aggregator = LedgerAggregator::new();

        for amount in [1, 7, 99, 101, 12345, 999_999] {
            for share in [0u8, 1, 33, 35, 50, 99, 100] {
                registry
                    .update("p1", |p| p.revenue_share_percent = share)
                    .unwrap();
                let events = vec![create_test_event("p1", amount, EventKind::RakeShare)];
                let (entries, _) = aggregator.aggregate(jan(), &events, &registry);
                let entry = &entries["p1"];
                assert!(entry.conserves(), "conservation broke: {:?}", entry);
            }
        }
    }

    #[test]
    fn test_eligibility_boundary() {
        // minimum 2500, share 100% so partner_cut == net
        let registry = PartnerRegistry::new();
        registry
            .register(Partner::new("p1", "P1", "p1@example.com", 100, 2500, "USD"))
            .unwrap();
        let aggregator = LedgerAggregator::new();

        let (entries, _) = aggregator.aggregate(
            jan(),
            &[create_test_event("p1", 2500, EventKind::RakeShare)],
            &registry,
        );
        assert!(entries["p1"].eligible, "cut == minimum must be eligible");

        let (entries, _) = aggregator.aggregate(
            jan(),
            &[create_test_event("p1", 2499, EventKind::RakeShare)],
            &registry,
        );
        assert!(!entries["p1"].eligible, "one cent under must not be eligible");
    }

    #[test]
    fn test_unknown_partner_warns_but_does_not_fail() {
        let registry = create_test_registry();
        let events = vec![
            create_test_event("p1", 10000, EventKind::RakeShare),
            create_test_event("ghost", 5000, EventKind::RakeShare),
            create_test_event("ghost", 7000, EventKind::RakeShare),
        ];

        let aggregator = LedgerAggregator::new();
        let (entries, warnings) = aggregator.aggregate(jan(), &events, &registry);

        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("p1"));
        // One warning per unknown partner, not per event
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].partner_id, "ghost");
    }

    #[test]
    fn test_events_outside_period_excluded() {
        let registry = create_test_registry();
        let mut event = create_test_event("p1", 10000, EventKind::RakeShare);
        event.occurred_at = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();

        let aggregator = LedgerAggregator::new();
        let (entries, _) = aggregator.aggregate(jan(), &[event], &registry);
        assert!(entries.is_empty());
    }

    #[test]
    fn test_low_trust_raises_minimum() {
        let registry = create_test_registry();
        registry.update("p1", |p| p.trust_score = 30).unwrap();

        // cut = 3000 with 100% share; minimum 2500 doubles to 5000
        registry
            .update("p1", |p| p.revenue_share_percent = 100)
            .unwrap();
        let aggregator = LedgerAggregator::new();
        let (entries, _) = aggregator.aggregate(
            jan(),
            &[create_test_event("p1", 3000, EventKind::RakeShare)],
            &registry,
        );
        assert!(!entries["p1"].eligible);

        registry.update("p1", |p| p.trust_score = 80).unwrap();
        let (entries, _) = aggregator.aggregate(
            jan(),
            &[create_test_event("p1", 3000, EventKind::RakeShare)],
            &registry,
        );
        assert!(entries["p1"].eligible);
    }

    #[test]
    fn test_half_up_rounding() {
        // 72595 * 35% = 25408.25 -> 25408
        assert_eq!(half_up_share(72595, 35), 25408);
        // 150 * 35% = 52.5 -> 53 (half rounds up)
        assert_eq!(half_up_share(150, 35), 53);
        // negative net rounds away from zero symmetrically
        assert_eq!(half_up_share(-150, 35), -53);
        assert_eq!(half_up_share(0, 35), 0);
        assert_eq!(half_up_share(100, 0), 0);
        assert_eq!(half_up_share(100, 100), 100);
    }

    #[test]
    fn test_period_parse_and_range() {
        let p = Period::parse("2025-12").unwrap();
        assert_eq!(p.to_string(), "2025-12");

        let (start, end) = p.date_range();
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());

        assert!(Period::parse("2025-13").is_err());
        assert!(Period::parse("january").is_err());
    }

    #[test]
    fn test_year_out_of_range_rejected() {
        // Far-future or pre-epoch years are validation errors, not panics
        assert!(matches!(
            Period::new(300000, 1),
            Err(LedgerError::Validation(_))
        ));
        assert!(Period::new(1969, 12).is_err());
        assert!(Period::parse("300000-01").is_err());

        // Bounds themselves are fine and produce real ranges
        Period::new(1970, 1).unwrap().date_range();
        Period::new(9999, 12).unwrap().date_range();
    }
}
