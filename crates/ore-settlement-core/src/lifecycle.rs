use serde::{Deserialize, Serialize};
use std::fmt;

use crate::lots::MineralLot;
use crate::{OreSettlementError, OreSettlementResult};

// ---------------------------------------------------------------------------
// Status types
// ---------------------------------------------------------------------------

/// Physical state of a lot in the warehouse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    #[default]
    InStock,
    Withdrawn,
    Resampled,
}

/// Financial state of a lot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinanceStatus {
    #[default]
    Unpaid,
    Invoiced,
    Paid,
    Exported,
}

/// State of a cash advance made to a supplier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdvanceStatus {
    #[default]
    Unpaid,
    Paid,
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StockStatus::InStock => "in_stock",
            StockStatus::Withdrawn => "withdrawn",
            StockStatus::Resampled => "resampled",
        })
    }
}

impl fmt::Display for FinanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FinanceStatus::Unpaid => "unpaid",
            FinanceStatus::Invoiced => "invoiced",
            FinanceStatus::Paid => "paid",
            FinanceStatus::Exported => "exported",
        })
    }
}

impl fmt::Display for AdvanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AdvanceStatus::Unpaid => "Unpaid",
            AdvanceStatus::Paid => "Paid",
        })
    }
}

// ---------------------------------------------------------------------------
// Transition rules
// ---------------------------------------------------------------------------

impl StockStatus {
    pub fn can_transition_to(self, to: StockStatus) -> bool {
        matches!(
            (self, to),
            (StockStatus::InStock, StockStatus::Withdrawn)
                | (StockStatus::InStock, StockStatus::Resampled)
                | (StockStatus::Resampled, StockStatus::InStock)
        )
    }
}

impl FinanceStatus {
    pub fn can_transition_to(self, to: FinanceStatus) -> bool {
        matches!(
            (self, to),
            (FinanceStatus::Unpaid, FinanceStatus::Invoiced)
                | (FinanceStatus::Invoiced, FinanceStatus::Paid)
                | (FinanceStatus::Unpaid, FinanceStatus::Paid)
                | (FinanceStatus::Unpaid, FinanceStatus::Exported)
                | (FinanceStatus::Invoiced, FinanceStatus::Exported)
        )
    }

    /// Lots in these states may be aggregated into a payment.
    pub fn is_payable(self) -> bool {
        matches!(self, FinanceStatus::Unpaid | FinanceStatus::Invoiced)
    }

    /// Paid and exported lots carry a frozen settlement.
    pub fn is_terminal(self) -> bool {
        matches!(self, FinanceStatus::Paid | FinanceStatus::Exported)
    }
}

impl AdvanceStatus {
    pub fn can_transition_to(self, to: AdvanceStatus) -> bool {
        self == AdvanceStatus::Unpaid && to == AdvanceStatus::Paid
    }
}

fn invalid(entity: &str, from: impl fmt::Display, to: impl fmt::Display) -> OreSettlementError {
    OreSettlementError::InvalidTransition {
        entity: entity.to_string(),
        from: from.to_string(),
        to: to.to_string(),
    }
}

pub fn transition_stock(from: StockStatus, to: StockStatus) -> OreSettlementResult<StockStatus> {
    if from.can_transition_to(to) {
        Ok(to)
    } else {
        Err(invalid("stock status", from, to))
    }
}

/// Finance transitions requested by operators. Moving a lot to `paid` is
/// reserved for payment commits and is refused here.
pub fn transition_finance(
    from: FinanceStatus,
    to: FinanceStatus,
) -> OreSettlementResult<FinanceStatus> {
    if to == FinanceStatus::Paid {
        return Err(invalid("finance status", from, to));
    }
    if from.can_transition_to(to) {
        Ok(to)
    } else {
        Err(invalid("finance status", from, to))
    }
}

/// Finance transition applied when a commit consumes the lot.
pub(crate) fn settle_finance(from: FinanceStatus) -> OreSettlementResult<FinanceStatus> {
    if from.can_transition_to(FinanceStatus::Paid) {
        Ok(FinanceStatus::Paid)
    } else {
        Err(invalid("finance status", from, FinanceStatus::Paid))
    }
}

pub(crate) fn settle_advance(from: AdvanceStatus) -> OreSettlementResult<AdvanceStatus> {
    if from.can_transition_to(AdvanceStatus::Paid) {
        Ok(AdvanceStatus::Paid)
    } else {
        Err(invalid("advance status", from, AdvanceStatus::Paid))
    }
}

/// A lot can be selected for a payment when its finance status is payable
/// and it has not been withdrawn from stock.
pub fn lot_is_eligible(lot: &MineralLot) -> bool {
    lot.finance_status.is_payable() && lot.stock_status != StockStatus::Withdrawn
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
