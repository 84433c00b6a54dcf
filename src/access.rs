// 🔐 Access Controller - Role/permission matrix with a hard forbidden set
//
// Two layers of defense:
// 1. A fixed forbidden set (send_payment, execute_payout, transfer_funds)
//    rejected for EVERY role, including owner, before the matrix is
//    consulted. Those operations do not exist in the engine's capability
//    set - this check makes the absence explicit and testable.
// 2. A closed permission matrix per role. Unknown operation names fail.

use crate::errors::{LedgerError, LedgerResult};
use serde::{Deserialize, Serialize};

// ============================================================================
// OPERATION NAMES
// ============================================================================

pub mod operations {
    pub const PROCESS_REVENUE: &str = "process_revenue";
    pub const PREPARE_PAYOUTS: &str = "prepare_payouts";
    pub const APPROVE_PAYOUT_BATCH: &str = "approve_payout_batch";
    pub const CANCEL_PAYOUT_BATCH: &str = "cancel_payout_batch";
    pub const EXPORT_PAYOUT_CSV: &str = "export_payout_csv";
    pub const GENERATE_REPORT: &str = "generate_report";
    pub const READ_AUDIT_TRAIL: &str = "read_audit_trail";
    pub const READ_OWN_LEDGER: &str = "read_own_ledger";
    pub const REGISTER_PARTNER: &str = "register_partner";
}

/// Operations the engine refuses to perform for anyone. Money movement
/// happens in an external system, after a human approved and exported.
pub const FORBIDDEN_OPERATIONS: [&str; 3] =
    ["send_payment", "execute_payout", "transfer_funds"];

/// Closed set of operations the engine knows about.
const KNOWN_OPERATIONS: [&str; 9] = [
    operations::PROCESS_REVENUE,
    operations::PREPARE_PAYOUTS,
    operations::APPROVE_PAYOUT_BATCH,
    operations::CANCEL_PAYOUT_BATCH,
    operations::EXPORT_PAYOUT_CSV,
    operations::GENERATE_REPORT,
    operations::READ_AUDIT_TRAIL,
    operations::READ_OWN_LEDGER,
    operations::REGISTER_PARTNER,
];

// ============================================================================
// ROLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full control, including approvals
    Owner,

    /// Day-to-day operations, no approval authority
    Dev,

    /// Read-only on their own ledger entries
    Partner,

    /// No permissions
    Public,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Dev => "dev",
            Role::Partner => "partner",
            Role::Public => "public",
        }
    }

    pub fn parse(s: &str) -> LedgerResult<Self> {
        match s {
            "owner" => Ok(Role::Owner),
            "dev" => Ok(Role::Dev),
            "partner" => Ok(Role::Partner),
            "public" => Ok(Role::Public),
            other => Err(LedgerError::Validation(format!("unknown role: {}", other))),
        }
    }
}

// ============================================================================
// ACCESS CONTROLLER
// ============================================================================

pub struct AccessController;

impl AccessController {
    pub fn new() -> Self {
        AccessController
    }

    /// Authorize `role` to run `operation`, by name.
    ///
    /// The forbidden set is checked FIRST so that even owner - or a bug
    /// that widens a role's permissions - can never reach a money-moving
    /// operation through this engine.
    pub fn authorize(&self, role: Role, operation: &str) -> LedgerResult<()> {
        if FORBIDDEN_OPERATIONS.contains(&operation) {
            return Err(LedgerError::ForbiddenOperation {
                actor: role.as_str().to_string(),
                operation: operation.to_string(),
            });
        }

        if !KNOWN_OPERATIONS.contains(&operation) {
            // Closed set: an operation we don't know is an operation
            // we don't run.
            return Err(LedgerError::ForbiddenOperation {
                actor: role.as_str().to_string(),
                operation: operation.to_string(),
            });
        }

        let allowed = match role {
            Role::Owner => true,
            Role::Dev => matches!(
                operation,
                operations::PROCESS_REVENUE
                    | operations::PREPARE_PAYOUTS
                    | operations::GENERATE_REPORT
            ),
            Role::Partner => operation == operations::READ_OWN_LEDGER,
            Role::Public => false,
        };

        if allowed {
            Ok(())
        } else {
            Err(LedgerError::ForbiddenOperation {
                actor: role.as_str().to_string(),
                operation: operation.to_string(),
            })
        }
    }

    /// Convenience: true if authorized.
    pub fn is_authorized(&self, role: Role, operation: &str) -> bool {
        self.authorize(role, operation).is_ok()
    }
}

impl Default for AccessController {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
