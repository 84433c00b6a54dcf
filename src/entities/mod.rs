// Entity Models - counterparties the engine pays
//
// Each entity has:
// - Stable identity that NEVER changes
// - Values (name, terms) that can change without breaking history
// - Registry for lookups shared across engine components

pub mod partner;

pub use partner::{Partner, PartnerRegistry, PartnerStatus};
