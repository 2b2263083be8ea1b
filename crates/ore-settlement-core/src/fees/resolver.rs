use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::lots::{FeeOverride, MineralLot};
use crate::types::*;
use crate::{OreSettlementError, OreSettlementResult};

const KG_PER_TON: Decimal = dec!(1000);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The current global fee record for one mineral category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub category: MineralCategory,
    /// Incremented on every replacement; only the latest version is current.
    pub version: u32,
    /// RRA percentage rate as a decimal (0.03 = 3%).
    pub rra_rate: Rate,
    /// RMA charge per metric ton of net weight.
    pub rma_per_ton: Money,
    /// Inkomane flat fee per kg, in local currency.
    pub inkomane_per_kg: Money,
    /// Reference price per percentage point used for the RRA base.
    pub price_per_percentage_rate: Money,
    #[serde(default)]
    pub effective_from: Option<NaiveDate>,
}

/// Where the fees applied to a lot came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeeSource {
    GlobalSchedule { version: u32 },
    LotOverride,
}

/// Fee parameters in the units the calculator consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveFees {
    pub source: FeeSource,
    pub rra_rate: Rate,
    pub rma_per_kg: Money,
    pub inkomane_per_kg: Money,
    pub price_per_percentage_rate: Money,
}

impl FeeOverride {
    /// True only when the flag is set and all four numbers are present.
    pub fn is_complete(&self) -> bool {
        self.enabled
            && self.rra_rate.is_some()
            && self.rma_per_ton.is_some()
            && self.inkomane_per_kg.is_some()
            && self.price_per_percentage_rate.is_some()
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve the fees that apply to `lot`.
///
/// A complete, enabled per-lot override wins. Otherwise the category's
/// global schedule applies. With neither available the lot cannot be
/// settled and a configuration error is returned.
pub fn resolve(
    lot: &MineralLot,
    global: Option<&FeeSchedule>,
) -> OreSettlementResult<EffectiveFees> {
    let o = &lot.fee_override;
    if let (true, Some(rra), Some(rma), Some(inkomane), Some(ppp)) = (
        o.enabled,
        o.rra_rate,
        o.rma_per_ton,
        o.inkomane_per_kg,
        o.price_per_percentage_rate,
    ) {
        return Ok(EffectiveFees {
            source: FeeSource::LotOverride,
            rra_rate: rra,
            rma_per_kg: rma / KG_PER_TON,
            inkomane_per_kg: inkomane,
            price_per_percentage_rate: ppp,
        });
    }

    let category = lot.category();
    let schedule = global.ok_or_else(|| OreSettlementError::Configuration {
        category: category.to_string(),
        reason: "No global fee schedule and no complete lot override".into(),
    })?;
    if schedule.category != category {
        return Err(OreSettlementError::Configuration {
            category: category.to_string(),
            reason: format!("Supplied schedule is for {}", schedule.category),
        });
    }

    Ok(EffectiveFees {
        source: FeeSource::GlobalSchedule {
            version: schedule.version,
        },
        rra_rate: schedule.rra_rate,
        rma_per_kg: schedule.rma_per_ton / KG_PER_TON,
        inkomane_per_kg: schedule.inkomane_per_kg,
        price_per_percentage_rate: schedule.price_per_percentage_rate,
    })
}

pub fn validate_schedule(schedule: &FeeSchedule) -> OreSettlementResult<()> {
    if schedule.version == 0 {
        return Err(OreSettlementError::validation(
            "version",
            "Schedule versions start at 1",
        ));
    }
    let rates = [
        ("rra_rate", schedule.rra_rate),
        ("rma_per_ton", schedule.rma_per_ton),
        ("inkomane_per_kg", schedule.inkomane_per_kg),
        ("price_per_percentage_rate", schedule.price_per_percentage_rate),
    ];
    for (field, value) in rates {
        if value < Decimal::ZERO {
            return Err(OreSettlementError::validation(field, "Must be non-negative"));
        }
    }
    if schedule.rra_rate > Decimal::ONE {
        return Err(OreSettlementError::validation(
            "rra_rate",
            "RRA rate is a decimal fraction and cannot exceed 1",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
