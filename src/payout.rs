// 💸 Payout Batch - Proposed payments and the approval state machine
//
// A batch is born awaiting approval, NEVER approved. Approval is a
// distinct, owner-only, separately-audited step; export only follows
// approval. The machine:
//
//   draft -> awaiting_approval -> approved -> exported
//   draft | awaiting_approval  -> cancelled
//
// exported and cancelled are terminal. Anything else is
// InvalidTransitionError - a race loser gets the error, never a silent
// overwrite.

use crate::access::Role;
use crate::errors::{LedgerError, LedgerResult};
use crate::ledger::{LedgerEntry, Period};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ============================================================================
// BATCH STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Draft,
    AwaitingApproval,
    Approved,
    Exported,
    Cancelled,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Draft => "draft",
            BatchStatus::AwaitingApproval => "awaiting_approval",
            BatchStatus::Approved => "approved",
            BatchStatus::Exported => "exported",
            BatchStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Exported | BatchStatus::Cancelled)
    }

    /// A non-cancelled batch blocks new batches for its period.
    pub fn is_active(&self) -> bool {
        !matches!(self, BatchStatus::Cancelled)
    }
}

// ============================================================================
// PAYOUT BATCH
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutBatch {
    pub batch_id: Uuid,
    pub period: Period,

    /// Eligible entries only, keyed by partner id (stable order)
    pub line_items: BTreeMap<String, LedgerEntry>,

    /// Sum of partner cuts over the line items
    pub total_payout_cents: i64,

    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,

    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,

    pub cancelled_by: Option<String>,
    pub cancel_reason: Option<String>,

    pub exported_at: Option<DateTime<Utc>>,

    /// Cached CSV bytes so re-export is a pure lookup
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub export_artifact: Option<Vec<u8>>,
}

impl PayoutBatch {
    pub fn line_item_count(&self) -> usize {
        self.line_items.len()
    }
}

// ============================================================================
// BATCH BUILDER
// ============================================================================

pub struct PayoutBatchBuilder;

impl PayoutBatchBuilder {
    /// Assemble a batch from aggregated entries. Ineligible entries are
    /// left out; their cut rolls into the next period's aggregation by
    /// simply never being paid here.
    ///
    /// The duplicate-batch invariant (one active batch per period) is
    /// enforced by the engine under its batch-map lock, not here - the
    /// builder is a pure function.
    pub fn build(period: Period, entries: &BTreeMap<String, LedgerEntry>) -> PayoutBatch {
        let line_items: BTreeMap<String, LedgerEntry> = entries
            .iter()
            .filter(|(_, e)| e.eligible)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let total_payout_cents = line_items.values().map(|e| e.partner_cut_cents).sum();

        PayoutBatch {
            batch_id: Uuid::new_v4(),
            period,
            line_items,
            total_payout_cents,
            status: BatchStatus::AwaitingApproval,
            created_at: Utc::now(),
            approved_by: None,
            approved_at: None,
            cancelled_by: None,
            cancel_reason: None,
            exported_at: None,
            export_artifact: None,
        }
    }
}

// ============================================================================
// APPROVAL GATE
// ============================================================================

/// The human-in-the-loop gate. All status changes go through here; callers
/// hold the batch exclusively (engine locks the batch map), so the status
/// check and the write are one atomic step and double-approve races
/// resolve to InvalidTransitionError for the loser.
pub struct ApprovalGate;

impl ApprovalGate {
    /// awaiting_approval --approve(owner)--> approved
    ///
    /// Owner-only by design: approval authority is deliberately narrower
    /// than the permission matrix alone would allow.
    pub fn approve(batch: &mut PayoutBatch, actor_role: Role, actor: &str) -> LedgerResult<()> {
        if actor_role != Role::Owner {
            return Err(LedgerError::ForbiddenOperation {
                actor: actor.to_string(),
                operation: "approve_payout_batch".to_string(),
            });
        }
        if batch.status != BatchStatus::AwaitingApproval {
            return Err(LedgerError::InvalidTransition {
                from: batch.status.as_str().to_string(),
                attempted: "approve".to_string(),
            });
        }

        batch.status = BatchStatus::Approved;
        batch.approved_by = Some(actor.to_string());
        batch.approved_at = Some(Utc::now());
        Ok(())
    }

    /// draft | awaiting_approval --cancel(actor, reason)--> cancelled
    pub fn cancel(batch: &mut PayoutBatch, actor: &str, reason: &str) -> LedgerResult<()> {
        if !matches!(
            batch.status,
            BatchStatus::Draft | BatchStatus::AwaitingApproval
        ) {
            return Err(LedgerError::InvalidTransition {
                from: batch.status.as_str().to_string(),
                attempted: "cancel".to_string(),
            });
        }

        batch.status = BatchStatus::Cancelled;
        batch.cancelled_by = Some(actor.to_string());
        batch.cancel_reason = Some(reason.to_string());
        Ok(())
    }

    /// approved --export--> exported, recording the artifact for
    /// idempotent re-export.
    pub fn mark_exported(batch: &mut PayoutBatch, artifact: Vec<u8>) -> LedgerResult<()> {
        if batch.status != BatchStatus::Approved {
            return Err(LedgerError::InvalidTransition {
                from: batch.status.as_str().to_string(),
                attempted: "export".to_string(),
            });
        }

        batch.status = BatchStatus::Exported;
        batch.exported_at = Some(Utc::now());
        batch.export_artifact = Some(artifact);
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
