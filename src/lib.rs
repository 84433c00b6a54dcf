// Partner Revenue Ledger - Core Library
// Exposes all modules for use by transports and tests.
//
// The engine prepares payouts; it never executes them. Money movement
// is out of scope by construction (see access::FORBIDDEN_OPERATIONS).

pub mod access;
pub mod anomaly;
pub mod audit;
pub mod config;
pub mod db;
pub mod engine;
pub mod entities;
pub mod errors;
pub mod events;
pub mod export;
pub mod ledger;
pub mod payout;
pub mod report;

// Re-export commonly used types
pub use access::{AccessController, Role, FORBIDDEN_OPERATIONS};
pub use anomaly::{AnomalyDetector, AnomalyFlag, AnomalySeverity, PartnerStats, TrustScorer};
pub use audit::{AuditFilter, AuditLog, AuditRecord, Outcome};
pub use config::EngineConfig;
pub use engine::{Actor, Engine};
pub use entities::{Partner, PartnerRegistry, PartnerStatus};
pub use errors::{LedgerError, LedgerResult};
pub use events::{EventKind, EventStore, RevenueEvent};
pub use export::CsvExporter;
pub use ledger::{AggregationWarning, LedgerAggregator, LedgerEntry, Period};
pub use payout::{ApprovalGate, BatchStatus, PayoutBatch, PayoutBatchBuilder};
pub use report::{ExchangeRates, MonthlyReport, PartnerReportLine};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
