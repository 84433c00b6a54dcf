// 🚨 Error Taxonomy - Every failure mode the engine can surface
// Mutating operations also append a failure AuditRecord carrying
// the Display form of these errors, so rejections are auditable.

use std::fmt;

// ============================================================================
// LEDGER ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// Malformed event/partner input - caller must fix and retry
    Validation(String),

    /// Forbidden operation or insufficient role - never retried
    ForbiddenOperation { actor: String, operation: String },

    /// Partner lookup failed (fatal at export/approval, warning at aggregation)
    PartnerNotFound(String),

    /// A non-cancelled batch already exists for the period
    DuplicateBatch { period: String, existing_batch_id: String },

    /// Batch state machine violation
    InvalidTransition { from: String, attempted: String },

    /// Batch id not found
    BatchNotFound(String),

    /// Hash chain verification failure - fatal, mutations halt
    AuditIntegrity { index: u64, reason: String },

    /// Engine refused a mutating call while an integrity halt is active
    Halted,
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Validation(msg) => write!(f, "validation error: {}", msg),
            LedgerError::ForbiddenOperation { actor, operation } => {
                write!(f, "forbidden operation '{}' for actor '{}'", operation, actor)
            }
            LedgerError::PartnerNotFound(id) => write!(f, "partner not found: {}", id),
            LedgerError::DuplicateBatch { period, existing_batch_id } => write!(
                f,
                "active batch {} already exists for period {}",
                existing_batch_id, period
            ),
            LedgerError::InvalidTransition { from, attempted } => {
                write!(f, "invalid transition: {} -> {}", from, attempted)
            }
            LedgerError::BatchNotFound(id) => write!(f, "batch not found: {}", id),
            LedgerError::AuditIntegrity { index, reason } => {
                write!(f, "audit chain broken at record {}: {}", index, reason)
            }
            LedgerError::Halted => {
                write!(f, "engine halted pending audit integrity investigation")
            }
        }
    }
}

impl std::error::Error for LedgerError {}

pub type LedgerResult<T> = Result<T, LedgerError>;

// ============================================================================
// TESTS
// ============================================================================
