pub mod advance;
pub mod aggregator;
pub mod coordinator;
pub mod payment;

pub use advance::{validate_advance, AdvanceMethod, AdvancePayment};
pub use aggregator::{
    aggregate, eligible_candidates, AggregateResult, CategorySubtotal, PaymentCandidates,
    PaymentSelection,
};
pub use coordinator::{CommitRequest, PaymentCoordinator};
pub use payment::{Payment, PaymentLine};
