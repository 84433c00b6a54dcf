// 🔗 Audit Log - Hash-chained, append-only record of every mutating call
//
// Every record commits to its predecessor:
//   hash = sha256(seq || prev_hash || payload_hash || actor || operation || outcome)
// rooted at a fixed genesis hash. Any gap or rewrite breaks the chain at
// that index and verification reports it. Failed operations get records
// too - rejected attempts are part of the story, and the outcome is
// inside the hash so a stored failure cannot be rewritten into a
// success without breaking the chain.

use crate::errors::{LedgerError, LedgerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Arc, RwLock};

// ============================================================================
// OUTCOME
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    /// Stable form fed into the chain hash.
    fn chain_repr(&self) -> String {
        match self {
            Outcome::Success => "success".to_string(),
            Outcome::Failure(reason) => format!("failure:{}", reason),
        }
    }
}

// ============================================================================
// AUDIT RECORD
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Position in the chain, starting at 1
    pub seq: u64,

    pub timestamp: DateTime<Utc>,

    /// Who asked (role or user label supplied by the caller)
    pub actor: String,

    /// Operation name (see access::operations)
    pub operation: String,

    pub outcome: Outcome,

    /// sha256 of the operation payload (JSON), hex
    pub payload_hash: String,

    /// Hash of the previous record (genesis hash for seq 1), hex
    pub prev_hash: String,

    /// Chain hash of this record, hex
    pub hash: String,
}

impl AuditRecord {
    /// Recompute this record's chain hash from its fields.
    pub fn compute_hash(&self) -> String {
        chain_hash(
            self.seq,
            &self.prev_hash,
            &self.payload_hash,
            &self.actor,
            &self.operation,
            &self.outcome,
        )
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn chain_hash(
    seq: u64,
    prev_hash: &str,
    payload_hash: &str,
    actor: &str,
    operation: &str,
    outcome: &Outcome,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seq.to_string());
    hasher.update(prev_hash);
    hasher.update(payload_hash);
    hasher.update(actor);
    hasher.update(operation);
    hasher.update(outcome.chain_repr());
    format!("{:x}", hasher.finalize())
}

/// Root of every chain. Fixed so that two logs over the same operations
/// produce the same hashes.
pub fn genesis_hash() -> String {
    sha256_hex(b"revenue-ledger-genesis")
}

// ============================================================================
// FILTER
// ============================================================================

/// Optional filter for audit trail reads. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub actor: Option<String>,
    pub operation: Option<String>,
    pub failures_only: bool,
}

impl AuditFilter {
    fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(actor) = &self.actor {
            if &record.actor != actor {
                return false;
            }
        }
        if let Some(operation) = &self.operation {
            if &record.operation != operation {
                return false;
            }
        }
        if self.failures_only && record.outcome.is_success() {
            return false;
        }
        true
    }
}

// ============================================================================
// AUDIT LOG
// ============================================================================

pub struct AuditLog {
    records: Arc<RwLock<Vec<AuditRecord>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        AuditLog {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Append one record for a mutating operation. The payload is hashed
    /// in its serde_json form; seq and chain linkage are assigned under
    /// the write lock.
    pub fn append(
        &self,
        actor: &str,
        operation: &str,
        outcome: Outcome,
        payload: &serde_json::Value,
    ) -> AuditRecord {
        let payload_hash = sha256_hex(payload.to_string().as_bytes());

        let mut records = self.records.write().unwrap();
        let seq = records.len() as u64 + 1;
        let prev_hash = records
            .last()
            .map(|r| r.hash.clone())
            .unwrap_or_else(genesis_hash);

        let hash = chain_hash(seq, &prev_hash, &payload_hash, actor, operation, &outcome);

        let record = AuditRecord {
            seq,
            timestamp: Utc::now(),
            actor: actor.to_string(),
            operation: operation.to_string(),
            outcome,
            payload_hash,
            prev_hash,
            hash,
        };
        records.push(record.clone());
        record
    }

    /// Walk the chain and verify every link. Returns the index of the
    /// first broken record on failure.
    pub fn verify(&self) -> LedgerResult<()> {
        let records = self.records.read().unwrap();
        Self::verify_records(&records)
    }

    /// Chain verification over an arbitrary record slice (used after
    /// loading from persistence).
    pub fn verify_records(records: &[AuditRecord]) -> LedgerResult<()> {
        let mut expected_prev = genesis_hash();

        for (i, record) in records.iter().enumerate() {
            let expected_seq = i as u64 + 1;
            if record.seq != expected_seq {
                return Err(LedgerError::AuditIntegrity {
                    index: expected_seq,
                    reason: format!("sequence gap: expected {}, found {}", expected_seq, record.seq),
                });
            }
            if record.prev_hash != expected_prev {
                return Err(LedgerError::AuditIntegrity {
                    index: record.seq,
                    reason: "prev_hash does not match predecessor".to_string(),
                });
            }
            if record.hash != record.compute_hash() {
                return Err(LedgerError::AuditIntegrity {
                    index: record.seq,
                    reason: "record hash does not match contents".to_string(),
                });
            }
            expected_prev = record.hash.clone();
        }
        Ok(())
    }

    /// Read-only retrieval, oldest first.
    pub fn records(&self, filter: &AuditFilter) -> Vec<AuditRecord> {
        let records = self.records.read().unwrap();
        records.iter().filter(|r| filter.matches(r)).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Restore a previously persisted chain (see db.rs). The caller should
    /// run verify() afterwards.
    pub fn restore(&self, stored: Vec<AuditRecord>) {
        let mut records = self.records.write().unwrap();
        *records = stored;
    }
}

impl Default for AuditLog {
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

    fn append_n(log: &AuditLog, n: usize) {
        for i in 0..n {
            log.append(
                "owner",
                "process_revenue",
                Outcome::Success,
                &serde_json::json!({ "event": i }),
            );
        }
    }

    #[test]
    fn test_chain_links_to_genesis() {
        let log = AuditLog::new();
        append_n(&log, 3);

        let records = log.records(&AuditFilter::default());
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].prev_hash, genesis_hash());
        assert_eq!(records[1].prev_hash, records[0].hash);
        assert_eq!(records[2].prev_hash, records[1].hash);

        assert!(log.verify().is_ok());
    }

    #[test]
    fn test_tampered_payload_detected_at_index() {
        let log = AuditLog::new();
        append_n(&log, 5);

        let mut records = log.records(&AuditFilter::default());
        // Tamper with record 3's payload hash
        records[2].payload_hash = sha256_hex(b"rewritten history");

        let result = AuditLog::verify_records(&records);
        match result {
            Err(LedgerError::AuditIntegrity { index, .. }) => assert_eq!(index, 3),
            other => panic!("expected integrity error, got {:?}", other),
        }
    }

    #[test]
    fn test_dropped_record_detected() {
        let log = AuditLog::new();
        append_n(&log, 4);

        let mut records = log.records(&AuditFilter::default());
        records.remove(1);

        let result = AuditLog::verify_records(&records);
        assert!(matches!(
            result,
            Err(LedgerError::AuditIntegrity { index: 2, .. })
        ));
    }

    #[test]
    fn test_rewritten_outcome_detected() {
        let log = AuditLog::new();
        log.append(
            "bob",
            "approve_payout_batch",
            Outcome::Failure("forbidden operation".to_string()),
            &serde_json::json!({ "batch_id": "b1" }),
        );
        log.append("alice", "approve_payout_batch", Outcome::Success, &serde_json::json!({}));

        let mut records = log.records(&AuditFilter::default());
        // Rewriting the rejection into a success must break the chain
        records[0].outcome = Outcome::Success;

        let result = AuditLog::verify_records(&records);
        assert!(matches!(
            result,
            Err(LedgerError::AuditIntegrity { index: 1, .. })
        ));
    }

    #[test]
    fn test_failure_records_are_chained_too() {
        let log = AuditLog::new();
        log.append(
            "dev",
            "approve_payout_batch",
            Outcome::Failure("forbidden operation".to_string()),
            &serde_json::json!({ "batch_id": "b1" }),
        );
        log.append("owner", "approve_payout_batch", Outcome::Success, &serde_json::json!({}));

        assert!(log.verify().is_ok());

        let failures = log.records(&AuditFilter {
            failures_only: true,
            ..Default::default()
        });
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].actor, "dev");
    }

    #[test]
    fn test_filter_by_actor_and_operation() {
        let log = AuditLog::new();
        append_n(&log, 2);
        log.append("dev", "prepare_payouts", Outcome::Success, &serde_json::json!({}));

        let dev_only = log.records(&AuditFilter {
            actor: Some("dev".to_string()),
            ..Default::default()
        });
        assert_eq!(dev_only.len(), 1);
        assert_eq!(dev_only[0].operation, "prepare_payouts");
    }
}
