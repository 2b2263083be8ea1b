use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access::Capability;
use crate::fees::{validate_schedule, FeeSchedule};
use crate::lifecycle::{
    lot_is_eligible, settle_advance, settle_finance, transition_finance, transition_stock,
    AdvanceStatus, FinanceStatus, StockStatus,
};
use crate::lots::{validate_lot, LotEdit, MineralLot};
use crate::payments::{validate_advance, AdvancePayment, Payment};
use crate::settlement::{refresh_settlement, resettle_lot};
use crate::state::LedgerState;
use crate::types::*;
use crate::{OreSettlementError, OreSettlementResult};

/// Everything that can happen to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerAction {
    /// Lots fetched from storage; inserted or replaced by id.
    LotsLoaded { lots: Vec<MineralLot> },
    AdvancesLoaded { advances: Vec<AdvancePayment> },
    /// A new version of a category's global fee schedule.
    ScheduleUpdated { schedule: FeeSchedule },
    LotEdited {
        category: MineralCategory,
        lot_id: LotId,
        edit: LotEdit,
        at: DateTime<Utc>,
    },
    StockStatusChanged {
        category: MineralCategory,
        lot_id: LotId,
        to: StockStatus,
        at: DateTime<Utc>,
    },
    FinanceStatusChanged {
        category: MineralCategory,
        lot_id: LotId,
        to: FinanceStatus,
        at: DateTime<Utc>,
    },
    PaymentCommitted { payment: Payment },
}

impl LedgerAction {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerAction::LotsLoaded { .. } => "lots_loaded",
            LedgerAction::AdvancesLoaded { .. } => "advances_loaded",
            LedgerAction::ScheduleUpdated { .. } => "schedule_updated",
            LedgerAction::LotEdited { .. } => "lot_edited",
            LedgerAction::StockStatusChanged { .. } => "stock_status_changed",
            LedgerAction::FinanceStatusChanged { .. } => "finance_status_changed",
            LedgerAction::PaymentCommitted { .. } => "payment_committed",
        }
    }

    /// Capability a caller needs to dispatch this action. Storage fetch
    /// results need none.
    pub fn required_capability(&self) -> Option<Capability> {
        match self {
            LedgerAction::LotsLoaded { .. } | LedgerAction::AdvancesLoaded { .. } => None,
            LedgerAction::ScheduleUpdated { .. } => Some(Capability::Financial),
            LedgerAction::LotEdited { edit, .. } => Some(edit.required_capability()),
            LedgerAction::StockStatusChanged { .. } => Some(Capability::Stock),
            LedgerAction::FinanceStatusChanged { .. } => Some(Capability::Financial),
            LedgerAction::PaymentCommitted { .. } => Some(Capability::Payments),
        }
    }
}

fn lot_mut<'a>(
    state: &'a mut LedgerState,
    category: MineralCategory,
    lot_id: &str,
) -> OreSettlementResult<&'a mut MineralLot> {
    state
        .lots
        .get_mut(&category)
        .and_then(|lots| lots.get_mut(lot_id))
        .ok_or_else(|| OreSettlementError::NotFound {
            kind: format!("{category} lot"),
            id: lot_id.to_string(),
        })
}

/// Compute the state that follows `action`. Pure: `state` is never
/// modified, and on error no partial state escapes.
pub fn reduce(state: &LedgerState, action: LedgerAction) -> OreSettlementResult<LedgerState> {
    tracing::debug!(action = action.name(), "reducing ledger action");
    let mut next = state.clone();

    match action {
        LedgerAction::LotsLoaded { lots } => {
            // Stored settlements of open lots are never trusted; they are
            // derived again from the lot's inputs and the current schedule.
            for mut lot in lots {
                validate_lot(&lot)?;
                let category = lot.category();
                resettle_lot(&mut lot, next.schedules.get(&category))?;
                next.lots
                    .entry(category)
                    .or_default()
                    .insert(lot.id.clone(), lot);
            }
        }
        LedgerAction::AdvancesLoaded { advances } => {
            for advance in advances {
                validate_advance(&advance)?;
                if let Some(existing) = next.advances.get(&advance.id) {
                    if existing.status == AdvanceStatus::Paid && *existing != advance {
                        return Err(OreSettlementError::validation(
                            "advances",
                            format!("Advance {} is paid and can no longer change", advance.id),
                        ));
                    }
                }
                next.advances.insert(advance.id.clone(), advance);
            }
        }
        LedgerAction::ScheduleUpdated { schedule } => {
            validate_schedule(&schedule)?;
            if let Some(current) = next.schedules.get(&schedule.category) {
                if schedule.version <= current.version {
                    return Err(OreSettlementError::validation(
                        "version",
                        format!(
                            "Schedule version {} is not newer than current version {}",
                            schedule.version, current.version
                        ),
                    ));
                }
            }
            // Open lots follow the new schedule; paid and exported lots keep
            // their frozen settlement.
            if let Some(lots) = next.lots.get_mut(&schedule.category) {
                for lot in lots.values_mut() {
                    if !lot.finance_status.is_terminal() {
                        refresh_settlement(lot, Some(&schedule))?;
                    }
                }
            }
            next.schedules.insert(schedule.category, schedule);
        }
        LedgerAction::LotEdited {
            category,
            lot_id,
            edit,
            at,
        } => {
            let schedule = next.schedules.get(&category).cloned();
            let lot = lot_mut(&mut next, category, &lot_id)?;
            edit.apply(lot, at)?;
            validate_lot(lot)?;
            if !lot.finance_status.is_terminal() {
                refresh_settlement(lot, schedule.as_ref())?;
            }
        }
        LedgerAction::StockStatusChanged {
            category,
            lot_id,
            to,
            at,
        } => {
            let lot = lot_mut(&mut next, category, &lot_id)?;
            lot.stock_status = transition_stock(lot.stock_status, to)?;
            lot.updated_at = at;
        }
        LedgerAction::FinanceStatusChanged {
            category,
            lot_id,
            to,
            at,
        } => {
            let lot = lot_mut(&mut next, category, &lot_id)?;
            if to == FinanceStatus::Invoiced && lot.settlement.is_none() {
                return Err(OreSettlementError::validation(
                    "finance_status",
                    format!("Lot {lot_id} cannot be invoiced before it is settled"),
                ));
            }
            lot.finance_status = transition_finance(lot.finance_status, to)?;
            lot.updated_at = at;
        }
        LedgerAction::PaymentCommitted { payment } => apply_commit(&mut next, payment)?,
    }

    Ok(next)
}

/// Conditional write of a payment: every included record must still be
/// eligible, otherwise the whole commit fails.
fn apply_commit(next: &mut LedgerState, payment: Payment) -> OreSettlementResult<()> {
    if next.payments.iter().any(|p| p.id == payment.id) {
        return Err(OreSettlementError::validation(
            "payment.id",
            format!("Payment {} already exists", payment.id),
        ));
    }
    if payment.lines.is_empty() {
        return Err(OreSettlementError::validation(
            "payment.lines",
            "A payment must include at least one lot",
        ));
    }

    let mut stale_ids = Vec::new();
    for (category, id) in payment.included_lots() {
        match next.lot(category, id) {
            Some(lot) if lot.supplier_id != payment.supplier_id => {
                return Err(OreSettlementError::validation(
                    "payment.lot_ids",
                    format!("Lot {id} does not belong to supplier {}", payment.supplier_id),
                ));
            }
            Some(lot) if lot_is_eligible(lot) => {}
            _ => stale_ids.push(id.clone()),
        }
    }
    for id in &payment.advance_ids {
        match next.advance(id) {
            Some(a) if a.supplier_id != payment.supplier_id => {
                return Err(OreSettlementError::validation(
                    "payment.advance_ids",
                    format!("Advance {id} does not belong to supplier {}", payment.supplier_id),
                ));
            }
            Some(a) if a.status == AdvanceStatus::Unpaid => {}
            _ => stale_ids.push(id.clone()),
        }
    }
    if !stale_ids.is_empty() {
        return Err(OreSettlementError::Consistency { stale_ids });
    }

    let included: Vec<(MineralCategory, LotId)> = payment
        .included_lots()
        .map(|(category, id)| (category, id.clone()))
        .collect();
    for (category, id) in included {
        let lot = lot_mut(next, category, &id)?;
        lot.finance_status = settle_finance(lot.finance_status)?;
        lot.updated_at = payment.created_at;
    }
    for id in &payment.advance_ids {
        let advance = next
            .advances
            .get_mut(id)
            .ok_or_else(|| OreSettlementError::NotFound {
                kind: "advance".into(),
                id: id.clone(),
            })?;
        advance.status = settle_advance(advance.status)?;
    }
    next.payments.push(payment);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
