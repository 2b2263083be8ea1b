//! Storage collaborators consumed by the aggregation and commit paths.
//!
//! Implementations own persistence. The engine only relies on the
//! contracts documented on each method; [`crate::state::LedgerState`] is the
//! in-memory implementation.

use crate::fees::FeeSchedule;
use crate::lots::MineralLot;
use crate::payments::{AdvancePayment, Payment};
use crate::types::*;
use crate::OreSettlementResult;

pub trait LotRepository {
    fn fetch_lot(&self, category: MineralCategory, id: &str) -> Option<MineralLot>;

    /// Unpaid and invoiced lots of one category belonging to `supplier_id`.
    fn eligible_lots(&self, supplier_id: &str, category: MineralCategory) -> Vec<MineralLot>;
}

pub trait AdvanceRepository {
    fn fetch_advance(&self, id: &str) -> Option<AdvancePayment>;

    fn unpaid_advances(&self, supplier_id: &str) -> Vec<AdvancePayment>;
}

pub trait FeeScheduleRepository {
    fn current_schedule(&self, category: MineralCategory) -> Option<FeeSchedule>;
}

pub trait PaymentRepository {
    /// Persist `payment` and mark every lot it includes `paid` and every
    /// advance it includes `Paid`, as one atomic unit.
    ///
    /// The write is conditional: if any included record is no longer
    /// eligible when the write happens, nothing is stored and a
    /// consistency error is returned.
    fn create_payment(&mut self, payment: Payment) -> OreSettlementResult<Payment>;

    fn fetch_payment(&self, id: &str) -> Option<Payment>;

    fn list_payments(&self, supplier_id: &str) -> Vec<Payment>;
}
