// 📥 Revenue Events - Append-only store of everything partners earned
//
// A RevenueEvent is immutable once appended. Refunds are NEW events
// with kind=Refund, never mutations of the original - the event log is
// the source of truth that every ledger figure is recomputed from.

use crate::errors::{LedgerError, LedgerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

// ============================================================================
// EVENT KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Share of table rake
    RakeShare,

    /// Share of subscription revenue
    SubscriptionShare,

    /// Share of content sales
    ContentShare,

    /// Refund against previously recognized revenue
    Refund,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RakeShare => "rake_share",
            EventKind::SubscriptionShare => "subscription_share",
            EventKind::ContentShare => "content_share",
            EventKind::Refund => "refund",
        }
    }

    pub fn parse(s: &str) -> LedgerResult<Self> {
        match s {
            "rake_share" => Ok(EventKind::RakeShare),
            "subscription_share" => Ok(EventKind::SubscriptionShare),
            "content_share" => Ok(EventKind::ContentShare),
            "refund" => Ok(EventKind::Refund),
            other => Err(LedgerError::Validation(format!(
                "unknown event kind: {}",
                other
            ))),
        }
    }

    pub fn is_refund(&self) -> bool {
        matches!(self, EventKind::Refund)
    }
}

// ============================================================================
// REVENUE EVENT
// ============================================================================

/// A single revenue or refund event attributed to a partner.
///
/// Identity: event_id (UUID, never changes).
/// Ordering: seq, assigned by the store under its write lock so that
/// aggregation over the same event set is deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueEvent {
    pub event_id: Uuid,
    pub partner_id: String,

    /// Where the revenue came from (e.g. "table_rake", "store")
    pub source: String,

    /// Signed minor units (cents). Refunds carry the refunded amount,
    /// sign is normalized away during aggregation.
    pub amount_cents: i64,

    /// ISO 4217 code (USD, EUR, ...)
    pub currency: String,

    pub kind: EventKind,

    /// External correlation id (order id, hand id, invoice number)
    pub reference_id: String,

    pub occurred_at: DateTime<Utc>,

    /// Store-assigned sequence number (0 until appended)
    #[serde(default)]
    pub seq: u64,
}

impl RevenueEvent {
    pub fn new(
        partner_id: &str,
        source: &str,
        amount_cents: i64,
        currency: &str,
        kind: EventKind,
        reference_id: &str,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        RevenueEvent {
            event_id: Uuid::new_v4(),
            partner_id: partner_id.to_string(),
            source: source.to_string(),
            amount_cents,
            currency: currency.to_string(),
            kind,
            reference_id: reference_id.to_string(),
            occurred_at,
            seq: 0,
        }
    }

    /// Basic field validation. Partner existence is checked by the engine
    /// against the registry, not here.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.amount_cents == 0 {
            return Err(LedgerError::Validation(
                "amount_cents must be non-zero".to_string(),
            ));
        }
        if self.partner_id.trim().is_empty() {
            return Err(LedgerError::Validation(
                "partner_id must not be empty".to_string(),
            ));
        }
        if self.currency.trim().is_empty() {
            return Err(LedgerError::Validation(
                "currency must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// EVENT STORE
// ============================================================================

/// Append-only event store.
///
/// Appends for different partners may interleave freely; the single write
/// lock assigns a total order (seq) so same-partner events are strictly
/// ordered and aggregation is reproducible. No mutation handle ever
/// escapes - queries clone.
pub struct EventStore {
    events: Arc<RwLock<Vec<RevenueEvent>>>,
}

impl EventStore {
    pub fn new() -> Self {
        EventStore {
            events: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Append a validated event, assigning its sequence number.
    /// Returns the event id.
    pub fn append(&self, mut event: RevenueEvent) -> LedgerResult<Uuid> {
        event.validate()?;

        let mut events = self.events.write().unwrap();
        event.seq = events.len() as u64 + 1;
        let id = event.event_id;
        events.push(event);
        Ok(id)
    }

    /// Query events in [from, to), optionally restricted to one partner.
    /// Returned in seq order (append order).
    pub fn query(
        &self,
        partner_id: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<RevenueEvent> {
        let events = self.events.read().unwrap();
        events
            .iter()
            .filter(|e| e.occurred_at >= from && e.occurred_at < to)
            .filter(|e| partner_id.map_or(true, |p| e.partner_id == p))
            .cloned()
            .collect()
    }

    /// All events, in append order.
    pub fn all_events(&self) -> Vec<RevenueEvent> {
        self.events.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Restore a previously persisted event set (see db.rs). Seq numbers
    /// are kept as stored.
    pub fn restore(&self, stored: Vec<RevenueEvent>) {
        let mut events = self.events.write().unwrap();
        *events = stored;
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
