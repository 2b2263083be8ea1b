use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::lifecycle::{FinanceStatus, StockStatus};
use crate::settlement::SettlementResult;
use crate::types::*;
use crate::{OreSettlementError, OreSettlementResult};

// ---------------------------------------------------------------------------
// Assays
// ---------------------------------------------------------------------------

/// Which laboratory reading a calculation should use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssaySource {
    /// External (independent lab) reading when present, else internal.
    #[default]
    Preferred,
    Internal,
    External,
}

/// One element's concentration as measured by the internal lab and,
/// optionally, an independent external lab.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assay {
    pub internal: Option<Percentage>,
    pub external: Option<Percentage>,
}

impl Assay {
    pub fn value(&self, source: AssaySource) -> Option<Percentage> {
        match source {
            AssaySource::Preferred => self.external.or(self.internal),
            AssaySource::Internal => self.internal,
            AssaySource::External => self.external,
        }
    }
}

/// Category-specific assay block. The variant fixes the lot's category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum LotAssays {
    Coltan { ta2o5: Assay, nb2o5: Assay },
    Cassiterite { sn: Assay },
    Wolframite { wo3: Assay },
}

impl LotAssays {
    /// Assay block with no lab results yet.
    pub fn pending(category: MineralCategory) -> Self {
        match category {
            MineralCategory::Coltan => LotAssays::Coltan {
                ta2o5: Assay::default(),
                nb2o5: Assay::default(),
            },
            MineralCategory::Cassiterite => LotAssays::Cassiterite {
                sn: Assay::default(),
            },
            MineralCategory::Wolframite => LotAssays::Wolframite {
                wo3: Assay::default(),
            },
        }
    }

    pub fn category(&self) -> MineralCategory {
        match self {
            LotAssays::Coltan { .. } => MineralCategory::Coltan,
            LotAssays::Cassiterite { .. } => MineralCategory::Cassiterite,
            LotAssays::Wolframite { .. } => MineralCategory::Wolframite,
        }
    }

    /// The paying element's assay (Ta2O5, Sn or WO3).
    pub fn primary(&self) -> &Assay {
        match self {
            LotAssays::Coltan { ta2o5, .. } => ta2o5,
            LotAssays::Cassiterite { sn } => sn,
            LotAssays::Wolframite { wo3 } => wo3,
        }
    }

    pub fn elements(&self) -> Vec<(&'static str, &Assay)> {
        match self {
            LotAssays::Coltan { ta2o5, nb2o5 } => vec![("ta2o5", ta2o5), ("nb2o5", nb2o5)],
            LotAssays::Cassiterite { sn } => vec![("sn", sn)],
            LotAssays::Wolframite { wo3 } => vec![("wo3", wo3)],
        }
    }

    pub fn has_external(&self) -> bool {
        self.elements().iter().any(|(_, a)| a.external.is_some())
    }
}

// ---------------------------------------------------------------------------
// Pricing and fee override
// ---------------------------------------------------------------------------

/// Commercial inputs entered by the finance team.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingInputs {
    /// USD per percentage point per kg.
    pub price_per_percentage: Option<Money>,
    /// Grade the lot is bought at (0-100).
    pub purchased_percentage: Option<Percentage>,
    /// Local currency units per USD.
    pub exchange_rate: Option<Decimal>,
    /// Tag advance in local currency per kg.
    pub tag_price_per_kg: Option<Money>,
    /// USD, optional.
    pub transport_charge: Option<Money>,
    /// USD, optional.
    pub external_assay_charge: Option<Money>,
}

/// Per-lot replacement for the category's global fee schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeOverride {
    pub enabled: bool,
    pub rra_rate: Option<Rate>,
    pub rma_per_ton: Option<Money>,
    pub inkomane_per_kg: Option<Money>,
    pub price_per_percentage_rate: Option<Money>,
}

// ---------------------------------------------------------------------------
// Lot
// ---------------------------------------------------------------------------

/// One delivered batch of ore from a supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MineralLot {
    pub id: LotId,
    pub supplier_id: SupplierId,
    pub net_weight: Option<Weight>,
    pub assays: LotAssays,
    #[serde(default)]
    pub pricing: PricingInputs,
    #[serde(default)]
    pub fee_override: FeeOverride,
    /// Either a complete settlement or none at all.
    #[serde(default)]
    pub settlement: Option<SettlementResult>,
    #[serde(default)]
    pub stock_status: StockStatus,
    #[serde(default)]
    pub finance_status: FinanceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MineralLot {
    pub fn new(
        id: impl Into<LotId>,
        supplier_id: impl Into<SupplierId>,
        category: MineralCategory,
        net_weight: Weight,
        now: DateTime<Utc>,
    ) -> Self {
        MineralLot {
            id: id.into(),
            supplier_id: supplier_id.into(),
            net_weight: Some(net_weight),
            assays: LotAssays::pending(category),
            pricing: PricingInputs::default(),
            fee_override: FeeOverride::default(),
            settlement: None,
            stock_status: StockStatus::default(),
            finance_status: FinanceStatus::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn category(&self) -> MineralCategory {
        self.assays.category()
    }

    /// Primary element percentage used for payment weighted averages.
    pub fn assay_percentage(&self, source: AssaySource) -> Option<Percentage> {
        self.assays.primary().value(source)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn check_percentage(field: &str, value: Option<Percentage>) -> OreSettlementResult<()> {
    if let Some(v) = value {
        if v < Decimal::ZERO || v > Decimal::ONE_HUNDRED {
            return Err(OreSettlementError::validation(
                field,
                "Percentage must be between 0 and 100",
            ));
        }
    }
    Ok(())
}

fn check_non_negative(field: &str, value: Option<Decimal>) -> OreSettlementResult<()> {
    if let Some(v) = value {
        if v < Decimal::ZERO {
            return Err(OreSettlementError::validation(field, "Must be non-negative"));
        }
    }
    Ok(())
}

/// Field validation run before a lot reaches the calculator or the ledger.
///
/// Zero exchange rates and zero tag prices pass: the first makes the
/// settlement incomplete, the second is a legitimate free tag.
pub fn validate_lot(lot: &MineralLot) -> OreSettlementResult<()> {
    if lot.id.trim().is_empty() {
        return Err(OreSettlementError::validation("id", "Lot id is required"));
    }
    if lot.supplier_id.trim().is_empty() {
        return Err(OreSettlementError::validation(
            "supplier_id",
            "Supplier reference is required",
        ));
    }
    match lot.net_weight {
        None => {
            return Err(OreSettlementError::validation(
                "net_weight",
                "Net weight is required",
            ))
        }
        Some(w) if w <= Decimal::ZERO => {
            return Err(OreSettlementError::validation(
                "net_weight",
                "Net weight must be positive",
            ))
        }
        Some(_) => {}
    }

    for (element, assay) in lot.assays.elements() {
        check_percentage(&format!("assays.{element}.internal"), assay.internal)?;
        check_percentage(&format!("assays.{element}.external"), assay.external)?;
    }

    let p = &lot.pricing;
    if let Some(price) = p.price_per_percentage {
        if price <= Decimal::ZERO {
            return Err(OreSettlementError::validation(
                "pricing.price_per_percentage",
                "Price per percentage must be positive",
            ));
        }
    }
    check_percentage("pricing.purchased_percentage", p.purchased_percentage)?;
    check_non_negative("pricing.exchange_rate", p.exchange_rate)?;
    check_non_negative("pricing.tag_price_per_kg", p.tag_price_per_kg)?;
    check_non_negative("pricing.transport_charge", p.transport_charge)?;
    check_non_negative("pricing.external_assay_charge", p.external_assay_charge)?;

    let o = &lot.fee_override;
    check_non_negative("fee_override.rra_rate", o.rra_rate)?;
    check_non_negative("fee_override.rma_per_ton", o.rma_per_ton)?;
    check_non_negative("fee_override.inkomane_per_kg", o.inkomane_per_kg)?;
    check_non_negative(
        "fee_override.price_per_percentage_rate",
        o.price_per_percentage_rate,
    )?;

    Ok(())
}
