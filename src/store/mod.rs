//! File-backed persistence: the dedup ledger, the daily push marker, the
//! response cache, and ledger exports.
//!
//! Every read failure here degrades to "no data" and every write failure is
//! logged; nothing in this module is fatal to a cycle.

pub mod cache;
pub mod export;
pub mod ledger;
pub mod marker;

pub use cache::ResponseCache;
pub use export::export_ledger;
pub use ledger::{DEFAULT_MAX_ENTRIES, Ledger, LedgerStats};
pub use marker::DailyMarker;
