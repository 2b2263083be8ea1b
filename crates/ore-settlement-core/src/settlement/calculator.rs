use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::fees::{resolve, EffectiveFees, FeeSchedule, FeeSource};
use crate::lots::{validate_lot, MineralLot};
use crate::types::*;
use crate::{OreSettlementError, OreSettlementResult};

// ---------------------------------------------------------------------------
// Input / Output types
// ---------------------------------------------------------------------------

/// Monetary breakdown for one lot. Amounts are USD except `inkomane_fee`
/// and `advance`, which are in local currency and converted through the
/// lot's exchange rate inside `total_charge`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementResult {
    pub unit_price: Money,
    pub total_amount: Money,
    pub rra: Money,
    pub rma: Money,
    pub inkomane_fee: Money,
    pub advance: Money,
    pub total_charge: Money,
    pub net_amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SettlementOutcome {
    Settled(SettlementResult),
    /// Not yet computable. `missing` names the absent (or, for the exchange
    /// rate, zero) inputs.
    Incomplete { missing: Vec<String> },
}

impl SettlementOutcome {
    pub fn result(&self) -> Option<&SettlementResult> {
        match self {
            SettlementOutcome::Settled(r) => Some(r),
            SettlementOutcome::Incomplete { .. } => None,
        }
    }

    pub fn into_result(self) -> Option<SettlementResult> {
        match self {
            SettlementOutcome::Settled(r) => Some(r),
            SettlementOutcome::Incomplete { .. } => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, SettlementOutcome::Settled(_))
    }
}

/// Input for a one-shot settlement calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementInput {
    pub lot: MineralLot,
    /// Current global schedule for the lot's category, if one exists.
    #[serde(default)]
    pub schedule: Option<FeeSchedule>,
}

// ---------------------------------------------------------------------------
// Core calculation
// ---------------------------------------------------------------------------

/// Names of required inputs that prevent a settlement from being computed.
pub fn missing_inputs(lot: &MineralLot) -> Vec<String> {
    let p = &lot.pricing;
    let mut missing = Vec::new();
    if p.price_per_percentage.is_none() {
        missing.push("price_per_percentage".to_string());
    }
    if p.purchased_percentage.is_none() {
        missing.push("purchased_percentage".to_string());
    }
    if lot.net_weight.is_none() {
        missing.push("net_weight".to_string());
    }
    // A zero rate would divide the local-currency charges by zero.
    match p.exchange_rate {
        Some(rate) if !rate.is_zero() => {}
        _ => missing.push("exchange_rate".to_string()),
    }
    if p.tag_price_per_kg.is_none() {
        missing.push("tag_price_per_kg".to_string());
    }
    missing
}

fn mul(a: Decimal, b: Decimal, field: &str) -> OreSettlementResult<Decimal> {
    a.checked_mul(b).ok_or_else(|| OreSettlementError::overflow(field))
}

fn div(a: Decimal, b: Decimal, field: &str) -> OreSettlementResult<Decimal> {
    a.checked_div(b).ok_or_else(|| OreSettlementError::overflow(field))
}

/// Settle a single lot with already-resolved fees.
///
/// # Formulas
///
/// ```text
/// unit_price   = price_per_percentage * purchased_percentage
/// total_amount = unit_price * net_weight
/// rra          = purchased_percentage * net_weight * price_per_percentage_rate * rra_rate
/// rma          = rma_per_kg * net_weight
/// inkomane_fee = inkomane_per_kg * net_weight
/// advance      = tag_price_per_kg * net_weight
/// total_charge = rra + rma + inkomane_fee / fx + advance / fx
///                + transport_charge + external_assay_charge
/// net_amount   = total_amount - total_charge
/// ```
///
/// Pure: identical inputs always produce identical output. Inputs whose
/// amounts leave the decimal range are rejected rather than rounded.
pub fn settle(lot: &MineralLot, fees: &EffectiveFees) -> OreSettlementResult<SettlementOutcome> {
    let p = &lot.pricing;
    let (Some(price), Some(purchased), Some(weight), Some(fx), Some(tag)) = (
        p.price_per_percentage,
        p.purchased_percentage,
        lot.net_weight,
        p.exchange_rate,
        p.tag_price_per_kg,
    ) else {
        return Ok(SettlementOutcome::Incomplete {
            missing: missing_inputs(lot),
        });
    };
    if fx.is_zero() {
        return Ok(SettlementOutcome::Incomplete {
            missing: vec!["exchange_rate".to_string()],
        });
    }

    let unit_price = mul(price, purchased, "unit_price")?;
    let total_amount = mul(unit_price, weight, "total_amount")?;
    let rra = mul(
        mul(mul(purchased, weight, "rra")?, fees.price_per_percentage_rate, "rra")?,
        fees.rra_rate,
        "rra",
    )?;
    let rma = mul(fees.rma_per_kg, weight, "rma")?;
    let inkomane_fee = mul(fees.inkomane_per_kg, weight, "inkomane_fee")?;
    let advance = mul(tag, weight, "advance")?;
    let total_charge = [
        rra,
        rma,
        div(inkomane_fee, fx, "total_charge")?,
        div(advance, fx, "total_charge")?,
        p.transport_charge.unwrap_or(Decimal::ZERO),
        p.external_assay_charge.unwrap_or(Decimal::ZERO),
    ]
    .into_iter()
    .try_fold(Decimal::ZERO, |acc, charge| {
        acc.checked_add(charge)
            .ok_or_else(|| OreSettlementError::overflow("total_charge"))
    })?;
    let net_amount = total_amount
        .checked_sub(total_charge)
        .ok_or_else(|| OreSettlementError::overflow("net_amount"))?;

    Ok(SettlementOutcome::Settled(SettlementResult {
        unit_price,
        total_amount,
        rra,
        rma,
        inkomane_fee,
        advance,
        total_charge,
        net_amount,
    }))
}

/// Resolve fees and settle. Fees are only resolved when every required
/// input is present, so an unconfigured category does not block lots that
/// are incomplete anyway.
pub fn evaluate(
    lot: &MineralLot,
    schedule: Option<&FeeSchedule>,
) -> OreSettlementResult<SettlementOutcome> {
    let missing = missing_inputs(lot);
    if !missing.is_empty() {
        return Ok(SettlementOutcome::Incomplete { missing });
    }
    let fees = resolve(lot, schedule)?;
    settle(lot, &fees)
}

/// Recompute and store a lot's settlement fields.
pub fn refresh_settlement(
    lot: &mut MineralLot,
    schedule: Option<&FeeSchedule>,
) -> OreSettlementResult<SettlementOutcome> {
    let outcome = evaluate(lot, schedule)?;
    lot.settlement = outcome.result().cloned();
    Ok(outcome)
}

/// Re-derive the stored settlement of a lot that arrived from storage.
///
/// Paid and exported lots keep their frozen settlement. For open lots any
/// stored settlement is discarded and recomputed from the lot's inputs; a
/// complete lot whose category has no schedule yet is left unsettled.
pub fn resettle_lot(
    lot: &mut MineralLot,
    schedule: Option<&FeeSchedule>,
) -> OreSettlementResult<()> {
    if lot.finance_status.is_terminal() {
        return Ok(());
    }
    match refresh_settlement(lot, schedule) {
        Ok(_) => Ok(()),
        Err(OreSettlementError::Configuration { .. }) => {
            lot.settlement = None;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Validate, resolve and settle one lot, wrapped in the standard envelope.
pub fn calculate_settlement(
    input: &SettlementInput,
) -> OreSettlementResult<ComputationOutput<SettlementOutcome>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_lot(&input.lot)?;
    let lot = &input.lot;
    let fees = resolve(lot, input.schedule.as_ref())?;

    if lot.fee_override.enabled && fees.source != FeeSource::LotOverride {
        warnings.push(
            "Fee override is enabled but incomplete; the global schedule was applied".into(),
        );
    }
    if lot.pricing.external_assay_charge.is_some() && !lot.assays.has_external() {
        warnings.push("External assay charge applied but no external assay is recorded".into());
    }

    let outcome = settle(lot, &fees)?;
    match &outcome {
        SettlementOutcome::Incomplete { missing } => {
            warnings.push(format!("Settlement incomplete: missing {}", missing.join(", ")));
        }
        SettlementOutcome::Settled(r) if r.net_amount < Decimal::ZERO => {
            warnings.push("Charges exceed the lot's total amount".into());
        }
        SettlementOutcome::Settled(_) => {}
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Unit price x net weight less RRA, RMA, Inkomane, tag advance and lot charges",
        &fees,
        warnings,
        elapsed,
        outcome,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
