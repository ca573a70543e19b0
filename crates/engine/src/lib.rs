//! The appointment resourcing and payment settlement engine.
//!
//! Leaf-first: the availability index and slot candidate generator feed the
//! resource matcher; the lifecycle manager owns creation/cancellation; the
//! reposition queue drives replacement search; the settlement machine and
//! invoice finalizer drive the financial ledger. All persistent mutations go
//! through single transactions keyed by id; correctness relies on database
//! isolation plus the unique constraints, not in-process locking.

pub mod availability;
pub mod candidates;
pub mod error;
pub mod invoicing;
pub mod lifecycle;
pub mod matcher;
pub mod reposition;
pub mod settlement;
pub mod stubs;

pub use error::EngineError;
pub use invoicing::InvoiceFinalizer;
pub use lifecycle::LifecycleManager;
pub use matcher::ResourceMatcher;
pub use reposition::RepositionService;
pub use settlement::SettlementService;
