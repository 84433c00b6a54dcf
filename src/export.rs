// 📤 CSV Exporter - Payment-processor-compatible rendering
//
// The only bit-exact wire artifact in the system:
//   Receiver Email,Amount,Currency,Note
// one row per eligible line item, amounts as exactly two decimals.
// Export is a pure function of the batch - the caller persists the bytes
// and a human hands them to the payment processor. Nothing here moves
// money.

use crate::entities::PartnerRegistry;
use crate::errors::{LedgerError, LedgerResult};
use crate::payout::{BatchStatus, PayoutBatch};

// ============================================================================
// FORMATTING
// ============================================================================

/// Render integer cents as "12.34". Line items only ever carry positive
/// cuts, but negatives render sanely for reports.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

// ============================================================================
// CSV EXPORTER
// ============================================================================

pub struct CsvExporter;

impl CsvExporter {
    /// Render an APPROVED batch to CSV bytes.
    ///
    /// The status guard lives in the ApprovalGate transition; this check
    /// is the exporter refusing to be called out of order rather than a
    /// second authorization layer. A line item whose partner has vanished
    /// from the registry is fatal here - we cannot pay an address we
    /// don't have.
    pub fn export(
        batch: &PayoutBatch,
        registry: &PartnerRegistry,
        program_name: &str,
    ) -> LedgerResult<Vec<u8>> {
        if batch.status != BatchStatus::Approved {
            return Err(LedgerError::InvalidTransition {
                from: batch.status.as_str().to_string(),
                attempted: "export".to_string(),
            });
        }

        let note = format!("{} Monthly Payout {}", program_name, batch.period);

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(["Receiver Email", "Amount", "Currency", "Note"])
            .map_err(|e| LedgerError::Validation(format!("csv write failed: {}", e)))?;

        // BTreeMap iteration keeps row order stable across exports
        for (partner_id, entry) in &batch.line_items {
            let partner = registry
                .find(partner_id)
                .ok_or_else(|| LedgerError::PartnerNotFound(partner_id.clone()))?;

            let amount = format_cents(entry.partner_cut_cents);
            writer
                .write_record([
                    partner.payout_email.as_str(),
                    amount.as_str(),
                    partner.currency.as_str(),
                    note.as_str(),
                ])
                .map_err(|e| LedgerError::Validation(format!("csv write failed: {}", e)))?;
        }

        writer
            .into_inner()
            .map_err(|e| LedgerError::Validation(format!("csv flush failed: {}", e)))
    }
}

// ============================================================================
// TESTS
// ============================================================================
