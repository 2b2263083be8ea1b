use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::access::CapabilitySet;
use crate::fees::FeeSchedule;
use crate::lifecycle::{lot_is_eligible, AdvanceStatus};
use crate::lots::MineralLot;
use crate::payments::{AdvancePayment, Payment};
use crate::settlement::resettle_lot;
use crate::state::{reduce, LedgerAction};
use crate::store::{AdvanceRepository, FeeScheduleRepository, LotRepository, PaymentRepository};
use crate::types::*;
use crate::OreSettlementResult;

/// Lots, advances, payments and fee schedules held in memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerState {
    #[serde(default)]
    pub lots: BTreeMap<MineralCategory, BTreeMap<LotId, MineralLot>>,
    #[serde(default)]
    pub advances: BTreeMap<AdvanceId, AdvancePayment>,
    #[serde(default)]
    pub payments: Vec<Payment>,
    #[serde(default)]
    pub schedules: BTreeMap<MineralCategory, FeeSchedule>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lot(&self, category: MineralCategory, id: &str) -> Option<&MineralLot> {
        self.lots.get(&category).and_then(|lots| lots.get(id))
    }

    pub fn advance(&self, id: &str) -> Option<&AdvancePayment> {
        self.advances.get(id)
    }

    /// Re-derive the settlement of every open lot from its inputs and the
    /// current schedules. Ledgers deserialized from outside go through this
    /// before use, so a stored settlement is never taken on trust.
    pub fn resettle(&mut self) -> OreSettlementResult<()> {
        for (category, lots) in self.lots.iter_mut() {
            let schedule = self.schedules.get(category);
            for lot in lots.values_mut() {
                resettle_lot(lot, schedule)?;
            }
        }
        Ok(())
    }

    /// Apply an action on behalf of a caller holding `capabilities`.
    pub fn dispatch(
        &mut self,
        action: LedgerAction,
        capabilities: &CapabilitySet,
    ) -> OreSettlementResult<()> {
        if let Some(required) = action.required_capability() {
            capabilities.require(required)?;
        }
        let next = reduce(self, action)?;
        *self = next;
        Ok(())
    }
}

impl LotRepository for LedgerState {
    fn fetch_lot(&self, category: MineralCategory, id: &str) -> Option<MineralLot> {
        self.lot(category, id).cloned()
    }

    fn eligible_lots(&self, supplier_id: &str, category: MineralCategory) -> Vec<MineralLot> {
        self.lots
            .get(&category)
            .map(|lots| {
                lots.values()
                    .filter(|l| l.supplier_id == supplier_id && lot_is_eligible(l))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl AdvanceRepository for LedgerState {
    fn fetch_advance(&self, id: &str) -> Option<AdvancePayment> {
        self.advance(id).cloned()
    }

    fn unpaid_advances(&self, supplier_id: &str) -> Vec<AdvancePayment> {
        self.advances
            .values()
            .filter(|a| a.supplier_id == supplier_id && a.status == AdvanceStatus::Unpaid)
            .cloned()
            .collect()
    }
}

impl FeeScheduleRepository for LedgerState {
    fn current_schedule(&self, category: MineralCategory) -> Option<FeeSchedule> {
        self.schedules.get(&category).cloned()
    }
}

impl PaymentRepository for LedgerState {
    fn create_payment(&mut self, payment: Payment) -> OreSettlementResult<Payment> {
        let next = reduce(
            self,
            LedgerAction::PaymentCommitted {
                payment: payment.clone(),
            },
        )?;
        *self = next;
        Ok(payment)
    }

    fn fetch_payment(&self, id: &str) -> Option<Payment> {
        self.payments.iter().find(|p| p.id == id).cloned()
    }

    fn list_payments(&self, supplier_id: &str) -> Vec<Payment> {
        self.payments
            .iter()
            .filter(|p| p.supplier_id == supplier_id)
            .cloned()
            .collect()
    }
}
