// Demo binary: walk the full payout workflow against a SQLite database.
// The engine only ever PREPARES payments - the exported CSV goes to an
// external processor by hand.

use anyhow::Result;
use chrono::{Datelike, Duration, Utc};
use revenue_ledger::db;
use revenue_ledger::{
    Actor, Engine, EngineConfig, EventKind, Partner, Period, RevenueEvent, Role,
};
use rusqlite::Connection;
use std::env;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let db_path = args
        .get(1)
        .cloned()
        .unwrap_or_else(|| "revenue-ledger.db".to_string());

    println!("🏦 Partner Revenue Ledger v{}", revenue_ledger::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let engine = Engine::new(EngineConfig::default());
    let owner = Actor::new("alice", Role::Owner);
    let dev = Actor::new("ingest-worker", Role::Dev);

    // 1. Seed partners
    println!("\n🤝 Registering partners...");
    let mut p1 = Partner::new(
        "p1",
        "Night Owl Gaming",
        "payouts@nightowl.example",
        35,
        2500,
        "USD",
    );
    p1.joined_at = Utc::now() - Duration::days(120);
    engine.register_partner(&owner, p1)?;
    engine.register_partner(
        &owner,
        Partner::new(
            "p2",
            "Casual Corner",
            "money@casualcorner.example",
            20,
            5000,
            "USD",
        ),
    )?;
    println!("✓ {} partners registered", engine.partner_registry().len());

    // 2. Ingest a month of revenue
    println!("\n📥 Ingesting revenue events...");
    let now = Utc::now();
    let events = [
        ("p1", 45075, EventKind::RakeShare, "hand-88121"),
        ("p1", 32520, EventKind::SubscriptionShare, "sub-2025-01"),
        ("p1", -5000, EventKind::Refund, "sub-2025-01"),
        ("p2", 12000, EventKind::ContentShare, "pack-007"),
    ];
    for (partner, amount, kind, reference) in events {
        engine.process_revenue_event(
            &dev,
            RevenueEvent::new(partner, "acey-app", amount, "USD", kind, reference, now),
        )?;
    }
    println!("✓ {} events appended", engine.event_store().len());

    // 3. Aggregate and build the batch
    let period = Period::new(now.year(), now.month())?;
    println!("\n📒 Preparing payouts for {}...", period);
    let batch = engine.prepare_monthly_payouts(&dev, period)?;
    println!(
        "✓ Batch {} awaiting approval: {} line items, total ${}.{:02}",
        batch.batch_id,
        batch.line_item_count(),
        batch.total_payout_cents / 100,
        batch.total_payout_cents % 100
    );

    // 4. Human approval, then export
    println!("\n✋ Owner approving batch...");
    engine.approve_payout_batch(&owner, batch.batch_id)?;
    let csv = engine.export_payout_csv(&owner, batch.batch_id)?;
    println!("✓ CSV prepared ({} bytes) - NOT executed, hand to processor:", csv.len());
    println!("{}", String::from_utf8_lossy(&csv));

    // 5. Report + audit integrity
    let report = engine.generate_monthly_report(&dev, period)?;
    println!("📊 {}", report.summary());

    engine.verify_audit_integrity()?;
    println!("🔗 Audit chain verified ({} records)", engine.audit_log().len());

    // 6. Persist the snapshot
    println!("\n💾 Saving snapshot to {}...", db_path);
    let conn = Connection::open(&db_path)?;
    db::setup_database(&conn)?;
    db::insert_partners(&conn, &engine.partner_registry().all_partners())?;
    let (inserted, duplicates) = db::insert_events(&conn, &engine.event_store().all_events())?;
    db::insert_audit_records(&conn, &engine.audit_log().records(&Default::default()))?;
    db::insert_batches(&conn, &engine.all_batches())?;
    println!(
        "✓ Snapshot saved ({} new events, {} already present)",
        inserted, duplicates
    );

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Workflow complete");

    Ok(())
}
