use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access::Capability;
use crate::lots::{FeeOverride, LotAssays, MineralLot, PricingInputs};
use crate::types::Weight;
use crate::{OreSettlementError, OreSettlementResult};

/// An update to one independent field group of a lot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "group", rename_all = "snake_case")]
pub enum LotEdit {
    Stock {
        net_weight: Option<Weight>,
    },
    Lab {
        assays: LotAssays,
    },
    Financial {
        pricing: PricingInputs,
        fee_override: FeeOverride,
    },
}

impl LotEdit {
    pub fn required_capability(&self) -> Capability {
        match self {
            LotEdit::Stock { .. } => Capability::Stock,
            LotEdit::Lab { .. } => Capability::Lab,
            LotEdit::Financial { .. } => Capability::Financial,
        }
    }

    /// Writes the field group onto the lot. Settlement is not touched here;
    /// the caller recomputes it afterwards.
    pub fn apply(&self, lot: &mut MineralLot, at: DateTime<Utc>) -> OreSettlementResult<()> {
        match self {
            LotEdit::Stock { net_weight } => {
                ensure_not_frozen(lot, "net_weight")?;
                lot.net_weight = *net_weight;
            }
            LotEdit::Lab { assays } => {
                if assays.category() != lot.category() {
                    return Err(OreSettlementError::validation(
                        "assays.category",
                        format!(
                            "Lot {} is {}, assays are for {}",
                            lot.id,
                            lot.category(),
                            assays.category()
                        ),
                    ));
                }
                lot.assays = assays.clone();
            }
            LotEdit::Financial {
                pricing,
                fee_override,
            } => {
                ensure_not_frozen(lot, "pricing")?;
                lot.pricing = pricing.clone();
                lot.fee_override = fee_override.clone();
            }
        }
        lot.updated_at = at;
        Ok(())
    }
}

fn ensure_not_frozen(lot: &MineralLot, field: &str) -> OreSettlementResult<()> {
    if lot.finance_status.is_terminal() {
        return Err(OreSettlementError::validation(
            field,
            format!(
                "Lot {} is {}; its settlement is frozen",
                lot.id, lot.finance_status
            ),
        ));
    }
    Ok(())
}
