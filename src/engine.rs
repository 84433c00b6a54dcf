// 🏦 Ledger Engine - Authorize, operate, audit
//
// The one place the components meet. Every mutating operation runs the
// same discipline: refuse while halted, authorize the actor, do the
// work, append exactly one audit record (success OR failure - rejected
// attempts are auditable too).
//
// Explicitly constructed with its dependencies - no global state, so
// tests and callers can run any number of isolated engines.

use crate::access::{operations, AccessController, Role};
use crate::anomaly::{AnomalyDetector, AnomalyFlag, PartnerStats, TrustScorer};
use crate::audit::{AuditFilter, AuditLog, AuditRecord, Outcome};
use crate::config::EngineConfig;
use crate::entities::{Partner, PartnerRegistry};
use crate::errors::{LedgerError, LedgerResult};
use crate::events::{EventStore, RevenueEvent};
use crate::export::CsvExporter;
use crate::ledger::{LedgerAggregator, LedgerEntry, Period};
use crate::payout::{ApprovalGate, BatchStatus, PayoutBatch, PayoutBatchBuilder};
use crate::report::MonthlyReport;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

// ============================================================================
// ACTOR
// ============================================================================

/// Who is asking. The name goes into audit records; the role drives
/// authorization. For partner-role actors the name is the partner id.
#[derive(Debug, Clone)]
pub struct Actor {
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(name: &str, role: Role) -> Self {
        Actor {
            name: name.to_string(),
            role,
        }
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct Engine {
    config: EngineConfig,
    store: EventStore,
    registry: PartnerRegistry,
    audit: AuditLog,
    access: AccessController,
    aggregator: LedgerAggregator,
    detector: AnomalyDetector,
    scorer: TrustScorer,

    /// All batches ever built. The write lock spans the existence check
    /// and the insert, which is the per-period mutual exclusion that
    /// keeps the one-active-batch invariant race-free. Per-batch
    /// transitions take the same lock, so status checks are
    /// compare-and-swap equivalent.
    batches: RwLock<Vec<PayoutBatch>>,

    /// Set when audit verification fails; mutations refuse until cleared
    halted: AtomicBool,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let aggregator = LedgerAggregator::from_config(&config);
        let detector = AnomalyDetector::from_config(&config);
        let scorer = TrustScorer::from_config(&config);
        Engine {
            config,
            store: EventStore::new(),
            registry: PartnerRegistry::new(),
            audit: AuditLog::new(),
            access: AccessController::new(),
            aggregator,
            detector,
            scorer,
            batches: RwLock::new(Vec::new()),
            halted: AtomicBool::new(false),
        }
    }

    /// Construct with pre-populated components (restored from db.rs
    /// snapshots, or seeded fixtures in tests).
    pub fn with_components(
        config: EngineConfig,
        store: EventStore,
        registry: PartnerRegistry,
        audit: AuditLog,
    ) -> Self {
        let aggregator = LedgerAggregator::from_config(&config);
        let detector = AnomalyDetector::from_config(&config);
        let scorer = TrustScorer::from_config(&config);
        Engine {
            config,
            store,
            registry,
            audit,
            access: AccessController::new(),
            aggregator,
            detector,
            scorer,
            batches: RwLock::new(Vec::new()),
            halted: AtomicBool::new(false),
        }
    }

    // ========================================================================
    // MUTATION GUARD
    // ========================================================================

    /// Shared discipline for every mutating operation: halt check,
    /// authorization, work, then exactly one audit record either way.
    fn audited<T, F>(
        &self,
        actor: &Actor,
        operation: &str,
        payload: serde_json::Value,
        work: F,
    ) -> LedgerResult<T>
    where
        F: FnOnce() -> LedgerResult<T>,
    {
        if self.halted.load(Ordering::SeqCst) {
            // A broken chain means the log can no longer be trusted;
            // appending to it would be theater. Refuse outright.
            return Err(LedgerError::Halted);
        }

        let result = self
            .access
            .authorize(actor.role, operation)
            .and_then(|_| work());

        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(e) => Outcome::Failure(e.to_string()),
        };
        self.audit.append(&actor.name, operation, outcome, &payload);

        result
    }

    // ========================================================================
    // PARTNER MANAGEMENT
    // ========================================================================

    pub fn register_partner(&self, actor: &Actor, partner: Partner) -> LedgerResult<()> {
        let payload = serde_json::json!({
            "partner_id": partner.partner_id,
            "revenue_share_percent": partner.revenue_share_percent,
            "minimum_payout_cents": partner.minimum_payout_cents,
        });
        self.audited(actor, operations::REGISTER_PARTNER, payload, || {
            self.registry.register(partner)
        })
    }

    // ========================================================================
    // REVENUE INGESTION
    // ========================================================================

    /// Append one revenue/refund event. Unknown partners are a
    /// ValidationError at ingestion (unlike aggregation, where stray ids
    /// degrade to warnings). Advisory flags are derived later from the
    /// stored event set (see anomaly_flags), so a rejected event can
    /// never leave one behind.
    pub fn process_revenue_event(
        &self,
        actor: &Actor,
        event: RevenueEvent,
    ) -> LedgerResult<Uuid> {
        let payload = serde_json::json!({
            "event_id": event.event_id,
            "partner_id": event.partner_id,
            "amount_cents": event.amount_cents,
            "kind": event.kind.as_str(),
            "reference_id": event.reference_id,
        });
        self.audited(actor, operations::PROCESS_REVENUE, payload, || {
            if !self.registry.contains(&event.partner_id) {
                return Err(LedgerError::Validation(format!(
                    "unknown partner: {}",
                    event.partner_id
                )));
            }

            self.store.append(event)
        })
    }

    // ========================================================================
    // AGGREGATION & BATCH BUILD
    // ========================================================================

    /// Aggregate a period and assemble its payout batch, awaiting
    /// approval. At most one active batch per period: the existence
    /// check and the insert happen under one write lock.
    pub fn prepare_monthly_payouts(
        &self,
        actor: &Actor,
        period: Period,
    ) -> LedgerResult<PayoutBatch> {
        let payload = serde_json::json!({ "period": period.to_string() });
        self.audited(actor, operations::PREPARE_PAYOUTS, payload, || {
            let mut batches = self.batches.write().unwrap();

            if let Some(existing) = batches
                .iter()
                .find(|b| b.period == period && b.status.is_active())
            {
                return Err(LedgerError::DuplicateBatch {
                    period: period.to_string(),
                    existing_batch_id: existing.batch_id.to_string(),
                });
            }

            let (entries, _) = self.aggregate_period(period);
            let batch = PayoutBatchBuilder::build(period, &entries);
            batches.push(batch.clone());
            Ok(batch)
        })
    }

    /// Recompute a period's entries and advisory flags from the event
    /// set. Idempotent: flags are rebuilt per call from stored events,
    /// never accumulated, so repeated aggregation over an unchanged
    /// event set yields identical output.
    fn aggregate_period(
        &self,
        period: Period,
    ) -> (
        std::collections::BTreeMap<String, LedgerEntry>,
        Vec<AnomalyFlag>,
    ) {
        let (start, end) = period.date_range();
        let events = self.store.query(None, start, end);
        let (entries, warnings) = self.aggregator.aggregate(period, &events, &self.registry);

        let mut flags = Vec::new();
        for event in &events {
            if let Some(flag) = self.detector.flag_event(event) {
                flags.push(flag);
            }
        }
        for warning in warnings {
            flags.push(AnomalyFlag {
                subject: warning.partner_id.clone(),
                rule: "unknown_partner".to_string(),
                severity: crate::anomaly::AnomalySeverity::Info,
                note: warning.message,
            });
        }
        for entry in entries.values() {
            if let Some(flag) = self.detector.flag_entry(entry) {
                flags.push(flag);
            }
        }

        (entries, flags)
    }

    // ========================================================================
    // APPROVAL WORKFLOW
    // ========================================================================

    pub fn approve_payout_batch(
        &self,
        actor: &Actor,
        batch_id: Uuid,
    ) -> LedgerResult<PayoutBatch> {
        let payload = serde_json::json!({ "batch_id": batch_id });
        self.audited(actor, operations::APPROVE_PAYOUT_BATCH, payload, || {
            let mut batches = self.batches.write().unwrap();
            let batch = Self::find_batch_mut(&mut batches, batch_id)?;
            ApprovalGate::approve(batch, actor.role, &actor.name)?;
            Ok(batch.clone())
        })
    }

    pub fn cancel_payout_batch(
        &self,
        actor: &Actor,
        batch_id: Uuid,
        reason: &str,
    ) -> LedgerResult<PayoutBatch> {
        let payload = serde_json::json!({ "batch_id": batch_id, "reason": reason });
        self.audited(actor, operations::CANCEL_PAYOUT_BATCH, payload, || {
            let mut batches = self.batches.write().unwrap();
            let batch = Self::find_batch_mut(&mut batches, batch_id)?;
            ApprovalGate::cancel(batch, &actor.name, reason)?;
            Ok(batch.clone())
        })
    }

    /// Render the approved batch to CSV and mark it exported. Idempotent:
    /// an already-exported batch returns the cached artifact unchanged.
    pub fn export_payout_csv(&self, actor: &Actor, batch_id: Uuid) -> LedgerResult<Vec<u8>> {
        let payload = serde_json::json!({ "batch_id": batch_id });
        self.audited(actor, operations::EXPORT_PAYOUT_CSV, payload, || {
            let mut batches = self.batches.write().unwrap();
            let batch = Self::find_batch_mut(&mut batches, batch_id)?;

            if batch.status == BatchStatus::Exported {
                if let Some(artifact) = &batch.export_artifact {
                    return Ok(artifact.clone());
                }
            }

            let artifact = CsvExporter::export(batch, &self.registry, &self.config.program_name)?;
            ApprovalGate::mark_exported(batch, artifact.clone())?;
            Ok(artifact)
        })
    }

    fn find_batch_mut(batches: &mut [PayoutBatch], batch_id: Uuid) -> LedgerResult<&mut PayoutBatch> {
        batches
            .iter_mut()
            .find(|b| b.batch_id == batch_id)
            .ok_or_else(|| LedgerError::BatchNotFound(batch_id.to_string()))
    }

    // ========================================================================
    // REPORTS & READS (non-mutating, no audit record)
    // ========================================================================

    pub fn generate_monthly_report(
        &self,
        actor: &Actor,
        period: Period,
    ) -> LedgerResult<MonthlyReport> {
        self.access
            .authorize(actor.role, operations::GENERATE_REPORT)?;

        self.refresh_trust_scores();
        let (entries, flags) = self.aggregate_period(period);

        Ok(MonthlyReport::generate(period, &entries, &self.registry, flags))
    }

    /// A partner reads their own ledger entry; owner can read anyone's.
    pub fn read_ledger_entry(
        &self,
        actor: &Actor,
        partner_id: &str,
        period: Period,
    ) -> LedgerResult<Option<LedgerEntry>> {
        self.access
            .authorize(actor.role, operations::READ_OWN_LEDGER)?;

        if actor.role == Role::Partner && actor.name != partner_id {
            return Err(LedgerError::ForbiddenOperation {
                actor: actor.name.clone(),
                operation: operations::READ_OWN_LEDGER.to_string(),
            });
        }

        let (entries, _) = self.aggregate_period(period);
        Ok(entries.get(partner_id).cloned())
    }

    pub fn get_audit_trail(
        &self,
        actor: &Actor,
        filter: &AuditFilter,
    ) -> LedgerResult<Vec<AuditRecord>> {
        self.access
            .authorize(actor.role, operations::READ_AUDIT_TRAIL)?;
        Ok(self.audit.records(filter))
    }

    pub fn get_batch(&self, batch_id: Uuid) -> Option<PayoutBatch> {
        let batches = self.batches.read().unwrap();
        batches.iter().find(|b| b.batch_id == batch_id).cloned()
    }

    pub fn active_batch_for_period(&self, period: Period) -> Option<PayoutBatch> {
        let batches = self.batches.read().unwrap();
        batches
            .iter()
            .find(|b| b.period == period && b.status.is_active())
            .cloned()
    }

    /// Advisory flags for a period, derived from the stored event set.
    pub fn anomaly_flags(&self, period: Period) -> Vec<AnomalyFlag> {
        self.aggregate_period(period).1
    }

    // ========================================================================
    // TRUST SCORING
    // ========================================================================

    /// Recompute every partner's advisory trust score from lifetime
    /// history. Scores tune payout minimums and annotate reports; they
    /// never authorize anything.
    pub fn refresh_trust_scores(&self) {
        let now = Utc::now();
        let events = self.store.all_events();
        let exported: Vec<PayoutBatch> = {
            let batches = self.batches.read().unwrap();
            batches
                .iter()
                .filter(|b| b.status == BatchStatus::Exported)
                .cloned()
                .collect()
        };

        for partner in self.registry.all_partners() {
            let mut gross: i64 = 0;
            let mut refunds: i64 = 0;
            for event in events.iter().filter(|e| e.partner_id == partner.partner_id) {
                if event.kind.is_refund() {
                    refunds += event.amount_cents.abs();
                } else {
                    gross += event.amount_cents;
                }
            }
            let refund_ratio_pct = if gross > 0 {
                refunds as f64 / gross as f64 * 100.0
            } else {
                0.0
            };
            let successful_payouts = exported
                .iter()
                .filter(|b| b.line_items.contains_key(&partner.partner_id))
                .count() as u32;

            let stats = PartnerStats {
                lifetime_net_revenue_cents: gross - refunds,
                successful_payouts,
                refund_ratio_pct,
                tenure_days: partner.tenure_days(now),
            };
            let score = self.scorer.score(&stats);
            // partner_id came from the registry moments ago
            let _ = self.registry.update(&partner.partner_id, |p| p.trust_score = score);
        }
    }

    // ========================================================================
    // INTEGRITY
    // ========================================================================

    /// Walk the audit chain. A failure halts every subsequent mutating
    /// operation until resume_after_investigation() is called.
    pub fn verify_audit_integrity(&self) -> LedgerResult<()> {
        match self.audit.verify() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.halted.store(true, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Clear the halt after a human has investigated and restored the log.
    pub fn resume_after_investigation(&self, actor: &Actor) -> LedgerResult<()> {
        if actor.role != Role::Owner {
            return Err(LedgerError::ForbiddenOperation {
                actor: actor.name.clone(),
                operation: "resume_after_investigation".to_string(),
            });
        }
        self.halted.store(false, Ordering::SeqCst);
        Ok(())
    }

    // ========================================================================
    // COMPONENT ACCESS (persistence, tests)
    // ========================================================================

    pub fn event_store(&self) -> &EventStore {
        &self.store
    }

    pub fn partner_registry(&self) -> &PartnerRegistry {
        &self.registry
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn all_batches(&self) -> Vec<PayoutBatch> {
        self.batches.read().unwrap().clone()
    }

    /// Restore persisted batches (see db.rs).
    pub fn restore_batches(&self, stored: Vec<PayoutBatch>) {
        let mut batches = self.batches.write().unwrap();
        *batches = stored;
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use chrono::TimeZone;

    fn owner() -> Actor {
        Actor::new("alice", Role::Owner)
    }

    fn dev() -> Actor {
        Actor::new("bob", Role::Dev)
    }

    fn jan() -> Period {
        Period::new(2025, 1).unwrap()
    }

    fn create_test_engine() -> Engine {
        let engine = Engine::new(EngineConfig::default());
        engine
            .register_partner(
                &owner(),
                Partner::new("p1", "Partner One", "one@example.com", 35, 2500, "USD"),
            )
            .unwrap();
        engine
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

    fn ingest_worked_example(engine: &Engine) {
        for (amount, kind) in [
            (45075, EventKind::RakeShare),
            (32520, EventKind::SubscriptionShare),
            (-5000, EventKind::Refund),
        ] {
            engine
                .process_revenue_event(&dev(), create_test_event("p1", amount, kind))
                .unwrap();
        }
    }

    #[test]
    fn test_full_workflow() {
        let engine = create_test_engine();
        ingest_worked_example(&engine);

        let batch = engine.prepare_monthly_payouts(&dev(), jan()).unwrap();
        assert_eq!(batch.status, BatchStatus::AwaitingApproval);
        assert_eq!(batch.total_payout_cents, 25408);

        let approved = engine.approve_payout_batch(&owner(), batch.batch_id).unwrap();
        assert_eq!(approved.status, BatchStatus::Approved);
        assert_eq!(approved.approved_by.as_deref(), Some("alice"));

        let csv = engine.export_payout_csv(&owner(), batch.batch_id).unwrap();
        let text = String::from_utf8(csv.clone()).unwrap();
        assert!(text.starts_with("Receiver Email,Amount,Currency,Note"));
        assert!(text.contains("one@example.com,254.08,USD,"));

        // Idempotent re-export returns the same bytes
        let again = engine.export_payout_csv(&owner(), batch.batch_id).unwrap();
        assert_eq!(csv, again);

        // Chain holds after the whole workflow
        assert!(engine.verify_audit_integrity().is_ok());
    }

    #[test]
    fn test_export_requires_prior_approval() {
        let engine = create_test_engine();
        ingest_worked_example(&engine);
        let batch = engine.prepare_monthly_payouts(&dev(), jan()).unwrap();

        let result = engine.export_payout_csv(&owner(), batch.batch_id);
        assert!(matches!(result, Err(LedgerError::InvalidTransition { .. })));

        // Cancelled can never be exported either
        engine
            .cancel_payout_batch(&owner(), batch.batch_id, "bad numbers")
            .unwrap();
        let result = engine.export_payout_csv(&owner(), batch.batch_id);
        assert!(matches!(result, Err(LedgerError::InvalidTransition { .. })));
    }

    #[test]
    fn test_dev_cannot_approve() {
        let engine = create_test_engine();
        ingest_worked_example(&engine);
        let batch = engine.prepare_monthly_payouts(&dev(), jan()).unwrap();

        let result = engine.approve_payout_batch(&dev(), batch.batch_id);
        assert!(matches!(result, Err(LedgerError::ForbiddenOperation { .. })));

        // The rejected attempt is itself audited
        let failures = engine
            .get_audit_trail(
                &owner(),
                &AuditFilter {
                    failures_only: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(failures
            .iter()
            .any(|r| r.actor == "bob" && r.operation == "approve_payout_batch"));
    }

    #[test]
    fn test_duplicate_batch_guard() {
        let engine = create_test_engine();
        ingest_worked_example(&engine);

        let first = engine.prepare_monthly_payouts(&dev(), jan()).unwrap();
        let second = engine.prepare_monthly_payouts(&dev(), jan());
        assert!(matches!(second, Err(LedgerError::DuplicateBatch { .. })));

        // Cancelling frees the period
        engine
            .cancel_payout_batch(&owner(), first.batch_id, "redo")
            .unwrap();
        let third = engine.prepare_monthly_payouts(&dev(), jan());
        assert!(third.is_ok());
    }

    #[test]
    fn test_unknown_partner_event_rejected_and_audited() {
        let engine = create_test_engine();
        let result = engine
            .process_revenue_event(&dev(), create_test_event("ghost", 1000, EventKind::RakeShare));
        assert!(matches!(result, Err(LedgerError::Validation(_))));

        let failures = engine
            .get_audit_trail(
                &owner(),
                &AuditFilter {
                    failures_only: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].operation, "process_revenue");
    }

    #[test]
    fn test_tampered_audit_halts_mutations() {
        let engine = create_test_engine();
        ingest_worked_example(&engine);

        // Tamper: rewrite one record's payload hash in a restored copy
        let mut records = engine.audit_log().records(&AuditFilter::default());
        records[1].payload_hash = "0".repeat(64);
        engine.audit_log().restore(records);

        let verify = engine.verify_audit_integrity();
        assert!(matches!(
            verify,
            Err(LedgerError::AuditIntegrity { index: 2, .. })
        ));
        assert!(engine.is_halted());

        let result = engine
            .process_revenue_event(&dev(), create_test_event("p1", 1000, EventKind::RakeShare));
        assert!(matches!(result, Err(LedgerError::Halted)));

        // Only owner resumes
        assert!(engine.resume_after_investigation(&dev()).is_err());
        engine.resume_after_investigation(&owner()).unwrap();
        assert!(!engine.is_halted());
    }

    #[test]
    fn test_partner_reads_own_ledger_only() {
        let engine = create_test_engine();
        engine
            .register_partner(
                &owner(),
                Partner::new("p2", "Partner Two", "two@example.com", 20, 1000, "USD"),
            )
            .unwrap();
        ingest_worked_example(&engine);

        let p1 = Actor::new("p1", Role::Partner);
        let entry = engine.read_ledger_entry(&p1, "p1", jan()).unwrap().unwrap();
        assert_eq!(entry.partner_cut_cents, 25408);

        let peeking = engine.read_ledger_entry(&p1, "p2", jan());
        assert!(matches!(peeking, Err(LedgerError::ForbiddenOperation { .. })));
    }

    #[test]
    fn test_report_and_trust_annotation() {
        let engine = create_test_engine();
        ingest_worked_example(&engine);

        let report = engine.generate_monthly_report(&dev(), jan()).unwrap();
        assert_eq!(report.gross_revenue_cents, 77595);
        assert_eq!(report.refunds_cents, 5000);
        assert_eq!(report.net_revenue_cents, 72595);
        assert_eq!(report.partner_payouts_cents, 25408);
        assert_eq!(report.platform_revenue_cents, 47187);

        // Fresh partner, low refund ratio (6.4% > 5% so no bonus there):
        // base 50 only
        let line = &report.partner_lines[0];
        assert_eq!(line.partner_id, "p1");
        assert_eq!(line.trust_score, 50);
    }

    #[test]
    fn test_trust_score_rises_after_successful_payout() {
        let engine = create_test_engine();
        ingest_worked_example(&engine);

        let batch = engine.prepare_monthly_payouts(&dev(), jan()).unwrap();
        engine.approve_payout_batch(&owner(), batch.batch_id).unwrap();
        engine.export_payout_csv(&owner(), batch.batch_id).unwrap();

        engine.refresh_trust_scores();
        let partner = engine.partner_registry().find("p1").unwrap();
        // base 50 + 15 for the exported payout (refund ratio 6.4% loses
        // the +10, tenure is 0 days)
        assert_eq!(partner.trust_score, 65);
    }

    #[test]
    fn test_public_role_gets_nothing() {
        let engine = create_test_engine();
        let public = Actor::new("anon", Role::Public);

        let result = engine
            .process_revenue_event(&public, create_test_event("p1", 1000, EventKind::RakeShare));
        assert!(matches!(result, Err(LedgerError::ForbiddenOperation { .. })));

        let result = engine.get_audit_trail(&public, &AuditFilter::default());
        assert!(matches!(result, Err(LedgerError::ForbiddenOperation { .. })));
    }

    #[test]
    fn test_report_flags_stable_across_calls() {
        let engine = create_test_engine();
        ingest_worked_example(&engine);
        // Large enough to trip the advisory large-amount rule
        engine
            .process_revenue_event(&dev(), create_test_event("p1", 150_000, EventKind::RakeShare))
            .unwrap();

        let first = engine.generate_monthly_report(&dev(), jan()).unwrap();
        let second = engine.generate_monthly_report(&dev(), jan()).unwrap();
        let third = engine.generate_monthly_report(&dev(), jan()).unwrap();

        assert_eq!(first.anomaly_flags.len(), 1);
        assert_eq!(second.anomaly_flags.len(), 1);
        assert_eq!(third.anomaly_flags.len(), 1);
        assert_eq!(first.anomaly_flags[0].rule, "large_single_event");

        // Same story through the direct accessor
        assert_eq!(engine.anomaly_flags(jan()).len(), 1);
        assert_eq!(engine.anomaly_flags(jan()).len(), 1);
    }

    #[test]
    fn test_rejected_event_leaves_no_flag() {
        let engine = create_test_engine();

        // Large amount but invalid (empty currency): the append fails,
        // so no advisory flag may survive it
        let mut event = create_test_event("p1", 500_000, EventKind::RakeShare);
        event.currency = String::new();
        let rejected_id = event.event_id;

        let result = engine.process_revenue_event(&dev(), event);
        assert!(matches!(result, Err(LedgerError::Validation(_))));
        assert!(engine.event_store().is_empty());

        let flags = engine.anomaly_flags(jan());
        assert!(flags.is_empty());
        assert!(!flags.iter().any(|f| f.subject == rejected_id.to_string()));
    }

    #[test]
    fn test_snapshot_round_trip_through_sqlite() {
        use crate::db;
        use rusqlite::Connection;

        let engine = create_test_engine();
        ingest_worked_example(&engine);
        let batch = engine.prepare_monthly_payouts(&dev(), jan()).unwrap();

        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        db::insert_partners(&conn, &engine.partner_registry().all_partners()).unwrap();
        db::insert_events(&conn, &engine.event_store().all_events()).unwrap();
        db::insert_audit_records(&conn, &engine.audit_log().records(&Default::default()))
            .unwrap();
        db::insert_batches(&conn, &engine.all_batches()).unwrap();

        // Rebuild a second engine from the snapshot
        let store = EventStore::new();
        store.restore(db::load_events(&conn).unwrap());
        let registry = PartnerRegistry::new();
        registry.restore(db::load_partners(&conn).unwrap());
        let audit = AuditLog::new();
        audit.restore(db::load_audit_records(&conn).unwrap());

        let restored = Engine::with_components(EngineConfig::default(), store, registry, audit);
        restored.restore_batches(db::load_batches(&conn).unwrap());

        assert!(restored.verify_audit_integrity().is_ok());
        assert_eq!(restored.event_store().len(), 3);

        // The restored engine sees the same active batch and refuses a
        // duplicate build
        let existing = restored.active_batch_for_period(jan()).unwrap();
        assert_eq!(existing.batch_id, batch.batch_id);
        let duplicate = restored.prepare_monthly_payouts(&dev(), jan());
        assert!(matches!(duplicate, Err(LedgerError::DuplicateBatch { .. })));
    }

    #[test]
    fn test_every_mutation_leaves_one_audit_record() {
        let engine = create_test_engine();
        // register_partner already appended 1
        assert_eq!(engine.audit_log().len(), 1);

        ingest_worked_example(&engine);
        assert_eq!(engine.audit_log().len(), 4);

        let batch = engine.prepare_monthly_payouts(&dev(), jan()).unwrap();
        engine.approve_payout_batch(&owner(), batch.batch_id).unwrap();
        engine.export_payout_csv(&owner(), batch.batch_id).unwrap();
        assert_eq!(engine.audit_log().len(), 7);

        // Reads leave no records
        engine.generate_monthly_report(&dev(), jan()).unwrap();
        engine.get_audit_trail(&owner(), &AuditFilter::default()).unwrap();
        assert_eq!(engine.audit_log().len(), 7);
    }
}
