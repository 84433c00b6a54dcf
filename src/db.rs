// 🗄️ Persistence - SQLite snapshots of the ledger's state
//
// The engine runs in memory; this layer saves and restores it. WAL mode
// for crash recovery. Events and audit records are append-only tables
// with unique ids, so re-saving an overlapping set is idempotent.
// Batches are small and few - stored as JSON documents with the fields
// we index on pulled into columns.

use crate::audit::AuditRecord;
use crate::entities::Partner;
use crate::events::RevenueEvent;
use crate::payout::PayoutBatch;
use anyhow::{Context, Result};
use rusqlite::{params, Connection};

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS partners (
            partner_id TEXT PRIMARY KEY,
            partner_json TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS revenue_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            partner_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            occurred_at TEXT NOT NULL,
            event_json TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_records (
            seq INTEGER PRIMARY KEY,
            actor TEXT NOT NULL,
            operation TEXT NOT NULL,
            record_json TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payout_batches (
            batch_id TEXT PRIMARY KEY,
            period TEXT NOT NULL,
            status TEXT NOT NULL,
            batch_json TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_partner ON revenue_events(partner_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_occurred ON revenue_events(occurred_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_batches_period ON payout_batches(period)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// PARTNERS
// ============================================================================

pub fn insert_partners(conn: &Connection, partners: &[Partner]) -> Result<usize> {
    let mut inserted = 0;
    for partner in partners {
        let json = serde_json::to_string(partner).context("Failed to serialize partner")?;
        conn.execute(
            "INSERT OR REPLACE INTO partners (partner_id, partner_json) VALUES (?1, ?2)",
            params![partner.partner_id, json],
        )?;
        inserted += 1;
    }
    Ok(inserted)
}

pub fn load_partners(conn: &Connection) -> Result<Vec<Partner>> {
    let mut stmt = conn.prepare("SELECT partner_json FROM partners ORDER BY partner_id")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut partners = Vec::new();
    for row in rows {
        let json = row?;
        let partner: Partner =
            serde_json::from_str(&json).context("Failed to deserialize partner")?;
        partners.push(partner);
    }
    Ok(partners)
}

// ============================================================================
// REVENUE EVENTS
// ============================================================================

/// Insert events, skipping any already stored (unique event_id).
/// Returns (inserted, duplicates).
pub fn insert_events(conn: &Connection, events: &[RevenueEvent]) -> Result<(usize, usize)> {
    let mut inserted = 0;
    let mut duplicates = 0;

    for event in events {
        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO revenue_events
             (event_id, partner_id, seq, occurred_at, event_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.event_id.to_string(),
                event.partner_id,
                event.seq as i64,
                event.occurred_at.to_rfc3339(),
                json
            ],
        )?;
        if changed == 0 {
            duplicates += 1;
        } else {
            inserted += 1;
        }
    }
    Ok((inserted, duplicates))
}

/// Load all events in seq order, ready for EventStore::restore.
pub fn load_events(conn: &Connection) -> Result<Vec<RevenueEvent>> {
    let mut stmt = conn.prepare("SELECT event_json FROM revenue_events ORDER BY seq")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut events = Vec::new();
    for row in rows {
        let json = row?;
        let event: RevenueEvent =
            serde_json::from_str(&json).context("Failed to deserialize event")?;
        events.push(event);
    }
    Ok(events)
}

pub fn verify_event_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM revenue_events", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// AUDIT RECORDS
// ============================================================================

/// Append audit records (unique seq). The chain structure lives in the
/// records themselves - callers verify after loading.
pub fn insert_audit_records(conn: &Connection, records: &[AuditRecord]) -> Result<usize> {
    let mut inserted = 0;
    for record in records {
        let json = serde_json::to_string(record).context("Failed to serialize audit record")?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO audit_records (seq, actor, operation, record_json)
             VALUES (?1, ?2, ?3, ?4)",
            params![record.seq as i64, record.actor, record.operation, json],
        )?;
        inserted += changed;
    }
    Ok(inserted)
}

pub fn load_audit_records(conn: &Connection) -> Result<Vec<AuditRecord>> {
    let mut stmt = conn.prepare("SELECT record_json FROM audit_records ORDER BY seq")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut records = Vec::new();
    for row in rows {
        let json = row?;
        let record: AuditRecord =
            serde_json::from_str(&json).context("Failed to deserialize audit record")?;
        records.push(record);
    }
    Ok(records)
}

// ============================================================================
// PAYOUT BATCHES
// ============================================================================

/// Upsert batches - status transitions rewrite the stored document.
pub fn insert_batches(conn: &Connection, batches: &[PayoutBatch]) -> Result<usize> {
    let mut written = 0;
    for batch in batches {
        let json = serde_json::to_string(batch).context("Failed to serialize batch")?;
        conn.execute(
            "INSERT OR REPLACE INTO payout_batches (batch_id, period, status, batch_json)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                batch.batch_id.to_string(),
                batch.period.to_string(),
                batch.status.as_str(),
                json
            ],
        )?;
        written += 1;
    }
    Ok(written)
}

pub fn load_batches(conn: &Connection) -> Result<Vec<PayoutBatch>> {
    let mut stmt =
        conn.prepare("SELECT batch_json FROM payout_batches ORDER BY created_at, batch_id")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut batches = Vec::new();
    for row in rows {
        let json = row?;
        let batch: PayoutBatch =
            serde_json::from_str(&json).context("Failed to deserialize batch")?;
        batches.push(batch);
    }
    Ok(batches)
}

// ============================================================================
// TESTS
// ============================================================================
