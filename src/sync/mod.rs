/// Ledger Synchronization Layer
///
/// Owns the authoritative liquidity graph and keeps it consistent with the
/// backing ledger:
///
/// - `source` draws the read-side boundary: snapshot and per-pair level
///   queries plus the change-event feed, behind an async trait
/// - `service` is the synchronizer state machine: debounced batching of
///   offer-change events, incremental patch vs. full rebuild gated on
///   sequence continuity, and single-writer publication of graph snapshots
pub mod service;
pub mod source;

pub use service::{GraphHandle, LedgerSynchronizer};
pub use source::{LedgerEvent, LedgerSource, OfferRow, SourceError};
