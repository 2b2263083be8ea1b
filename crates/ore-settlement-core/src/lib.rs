//! Settlement and payment engine for mineral lot purchasing.
//!
//! Lots of coltan, cassiterite and wolframite are settled individually from
//! weight, assay and price inputs ([`settlement`]), using fees resolved from
//! the category's global schedule or a per-lot override ([`fees`]). Settled
//! lots and outstanding advances are then combined into a supplier
//! [`payments::Payment`] through a preview/commit workflow.

pub mod access;
pub mod error;
pub mod fees;
pub mod lifecycle;
pub mod lots;
pub mod settlement;
pub mod types;

#[cfg(feature = "payments")]
pub mod payments;

#[cfg(feature = "payments")]
pub mod state;

#[cfg(feature = "payments")]
pub mod store;

pub use error::OreSettlementError;
pub use types::*;

/// Standard result type for all ore-settlement operations
pub type OreSettlementResult<T> = Result<T, OreSettlementError>;
