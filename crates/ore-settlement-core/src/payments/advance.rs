use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::lifecycle::AdvanceStatus;
use crate::types::*;
use crate::{OreSettlementError, OreSettlementResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceMethod {
    Cash,
    BankTransfer,
    MobileMoney,
    Cheque,
}

/// Cash paid to a supplier ahead of settlement, deducted from a later
/// payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancePayment {
    pub id: AdvanceId,
    pub supplier_id: SupplierId,
    pub amount: Money,
    #[serde(default)]
    pub currency: Currency,
    pub method: AdvanceMethod,
    pub date: NaiveDate,
    #[serde(default)]
    pub status: AdvanceStatus,
}

pub fn validate_advance(advance: &AdvancePayment) -> OreSettlementResult<()> {
    if advance.id.trim().is_empty() {
        return Err(OreSettlementError::validation("id", "Advance id is required"));
    }
    if advance.supplier_id.trim().is_empty() {
        return Err(OreSettlementError::validation(
            "supplier_id",
            "Supplier reference is required",
        ));
    }
    if advance.amount <= Decimal::ZERO {
        return Err(OreSettlementError::validation(
            "amount",
            "Advance amount must be positive",
        ));
    }
    Ok(())
}
