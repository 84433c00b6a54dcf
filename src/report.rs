// 📊 Monthly Report - Period summary for the humans who approve payouts
//
// Aggregated totals, per-partner lines annotated with trust scores, and
// any anomaly flags raised during aggregation. Margin percentage is the
// only float here and it is display-only - source-of-truth money stays
// in integer cents.

use crate::anomaly::AnomalyFlag;
use crate::entities::PartnerRegistry;
use crate::export::format_cents;
use crate::ledger::{LedgerEntry, Period};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ============================================================================
// EXCHANGE RATES (display only)
// ============================================================================

/// Externally supplied rates, keyed by ISO code, expressed as display
/// units per one unit of the ledger currency. Injected by the caller,
/// never fetched, never persisted.
#[derive(Debug, Clone, Default)]
pub struct ExchangeRates {
    rates: HashMap<String, f64>,
}

impl ExchangeRates {
    pub fn new(rates: HashMap<String, f64>) -> Self {
        ExchangeRates { rates }
    }

    /// Convert cents to display units of `code`. None if no rate was
    /// supplied for that code.
    pub fn convert_cents(&self, cents: i64, code: &str) -> Option<f64> {
        self.rates.get(code).map(|rate| cents as f64 / 100.0 * rate)
    }
}

// ============================================================================
// REPORT LINES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerReportLine {
    pub partner_id: String,
    pub partner_name: String,
    pub gross_revenue_cents: i64,
    pub refunds_cents: i64,
    pub net_revenue_cents: i64,
    pub partner_cut_cents: i64,
    pub eligible: bool,
    pub trust_score: u8,
}

// ============================================================================
// MONTHLY REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyReport {
    pub period: Period,
    pub gross_revenue_cents: i64,
    pub refunds_cents: i64,
    pub net_revenue_cents: i64,

    /// Sum of partner cuts over ELIGIBLE entries (what a batch would pay)
    pub partner_payouts_cents: i64,

    /// Platform cuts plus ineligible partner cuts that stay put this period
    pub platform_revenue_cents: i64,

    /// Display only
    pub platform_margin_pct: f64,

    pub partner_lines: Vec<PartnerReportLine>,
    pub anomaly_flags: Vec<AnomalyFlag>,
}

impl MonthlyReport {
    /// Build a report from aggregated entries. Trust scores come off the
    /// registry (as last updated by the engine's scorer).
    pub fn generate(
        period: Period,
        entries: &BTreeMap<String, LedgerEntry>,
        registry: &PartnerRegistry,
        anomaly_flags: Vec<AnomalyFlag>,
    ) -> Self {
        let gross: i64 = entries.values().map(|e| e.gross_revenue_cents).sum();
        let refunds: i64 = entries.values().map(|e| e.refunds_cents).sum();
        let net: i64 = entries.values().map(|e| e.net_revenue_cents).sum();
        let partner_payouts: i64 = entries
            .values()
            .filter(|e| e.eligible)
            .map(|e| e.partner_cut_cents)
            .sum();
        let platform_revenue = net - partner_payouts;

        let platform_margin_pct = if net != 0 {
            platform_revenue as f64 / net as f64 * 100.0
        } else {
            0.0
        };

        let partner_lines = entries
            .values()
            .map(|e| {
                let (name, trust) = registry
                    .find(&e.partner_id)
                    .map(|p| (p.name, p.trust_score))
                    .unwrap_or_else(|| ("<unknown>".to_string(), 0));
                PartnerReportLine {
                    partner_id: e.partner_id.clone(),
                    partner_name: name,
                    gross_revenue_cents: e.gross_revenue_cents,
                    refunds_cents: e.refunds_cents,
                    net_revenue_cents: e.net_revenue_cents,
                    partner_cut_cents: e.partner_cut_cents,
                    eligible: e.eligible,
                    trust_score: trust,
                }
            })
            .collect();

        MonthlyReport {
            period,
            gross_revenue_cents: gross,
            refunds_cents: refunds,
            net_revenue_cents: net,
            partner_payouts_cents: partner_payouts,
            platform_revenue_cents: platform_revenue,
            platform_margin_pct,
            partner_lines,
            anomaly_flags,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Report {}: gross ${}, refunds ${}, net ${}, payouts ${}, platform ${} ({:.1}% margin), {} flags",
            self.period,
            format_cents(self.gross_revenue_cents),
            format_cents(self.refunds_cents),
            format_cents(self.net_revenue_cents),
            format_cents(self.partner_payouts_cents),
            format_cents(self.platform_revenue_cents),
            self.platform_margin_pct,
            self.anomaly_flags.len()
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
