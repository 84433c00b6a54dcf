// 🤝 Partner Entity - Stable identity for a revenue-share counterparty
//
// Partner name/email/share terms are VALUES (can change); partner_id is
// IDENTITY (never changes). Historical ledger entries keyed by partner_id
// stay valid across renames and contract changes.

use crate::errors::{LedgerError, LedgerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

// ============================================================================
// PARTNER STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartnerStatus {
    /// Signed up, not yet cleared for payouts
    Pending,

    /// Earning and payable
    Active,

    /// Payouts withheld (compliance hold, contract dispute)
    Suspended,
}

impl PartnerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartnerStatus::Pending => "pending",
            PartnerStatus::Active => "active",
            PartnerStatus::Suspended => "suspended",
        }
    }
}

// ============================================================================
// PARTNER ENTITY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partner {
    /// Stable identity - NEVER changes
    pub partner_id: String,

    /// Display name (can change)
    pub name: String,

    /// Where the payment processor sends money
    pub payout_email: String,

    /// Contractual share of net revenue, whole percent 0-100
    pub revenue_share_percent: u8,

    /// Payouts below this threshold roll over (minor units)
    pub minimum_payout_cents: i64,

    /// ISO 4217 code
    pub currency: String,

    pub status: PartnerStatus,

    /// Advisory 0-100 reliability score (see anomaly.rs), reporting only
    pub trust_score: u8,

    /// When the partnership started - backs the tenure term of the score
    pub joined_at: DateTime<Utc>,
}

impl Partner {
    pub fn new(
        partner_id: &str,
        name: &str,
        payout_email: &str,
        revenue_share_percent: u8,
        minimum_payout_cents: i64,
        currency: &str,
    ) -> Self {
        Partner {
            partner_id: partner_id.to_string(),
            name: name.to_string(),
            payout_email: payout_email.to_string(),
            revenue_share_percent,
            minimum_payout_cents,
            currency: currency.to_string(),
            status: PartnerStatus::Active,
            trust_score: 50,
            joined_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.partner_id.trim().is_empty() {
            return Err(LedgerError::Validation(
                "partner_id must not be empty".to_string(),
            ));
        }
        if self.revenue_share_percent > 100 {
            return Err(LedgerError::Validation(format!(
                "revenue_share_percent must be 0-100, got {}",
                self.revenue_share_percent
            )));
        }
        if self.minimum_payout_cents < 0 {
            return Err(LedgerError::Validation(
                "minimum_payout_cents must not be negative".to_string(),
            ));
        }
        if !self.payout_email.contains('@') {
            return Err(LedgerError::Validation(format!(
                "payout_email looks invalid: {}",
                self.payout_email
            )));
        }
        Ok(())
    }

    /// Tenure in whole days as of `now`.
    pub fn tenure_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.joined_at).num_days()
    }
}

// ============================================================================
// PARTNER REGISTRY
// ============================================================================

/// Registry of all known partners, shared across engine components.
pub struct PartnerRegistry {
    partners: Arc<RwLock<Vec<Partner>>>,
}

impl PartnerRegistry {
    pub fn new() -> Self {
        PartnerRegistry {
            partners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register a new partner. Duplicate partner_id is a validation error.
    pub fn register(&self, partner: Partner) -> LedgerResult<()> {
        partner.validate()?;

        let mut partners = self.partners.write().unwrap();
        if partners.iter().any(|p| p.partner_id == partner.partner_id) {
            return Err(LedgerError::Validation(format!(
                "partner already registered: {}",
                partner.partner_id
            )));
        }
        partners.push(partner);
        Ok(())
    }

    pub fn find(&self, partner_id: &str) -> Option<Partner> {
        let partners = self.partners.read().unwrap();
        partners.iter().find(|p| p.partner_id == partner_id).cloned()
    }

    pub fn contains(&self, partner_id: &str) -> bool {
        self.find(partner_id).is_some()
    }

    /// Apply an update to an existing partner. The update is validated
    /// before it is committed - a rejected update leaves the partner
    /// untouched.
    pub fn update<F>(&self, partner_id: &str, update_fn: F) -> LedgerResult<()>
    where
        F: FnOnce(&mut Partner),
    {
        let mut partners = self.partners.write().unwrap();
        let partner = partners
            .iter_mut()
            .find(|p| p.partner_id == partner_id)
            .ok_or_else(|| LedgerError::PartnerNotFound(partner_id.to_string()))?;

        let mut updated = partner.clone();
        update_fn(&mut updated);
        updated.validate()?;
        *partner = updated;
        Ok(())
    }

    pub fn all_partners(&self) -> Vec<Partner> {
        self.partners.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.partners.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Restore a previously persisted partner set (see db.rs).
    pub fn restore(&self, stored: Vec<Partner>) {
        let mut partners = self.partners.write().unwrap();
        *partners = stored;
    }
}

impl Default for PartnerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
