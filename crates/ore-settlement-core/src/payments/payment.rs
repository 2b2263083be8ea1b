use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::lots::AssaySource;
use crate::payments::AggregateResult;
use crate::settlement::SettlementResult;
use crate::types::*;

/// Settlement of one lot as it stood when the payment was committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLine {
    pub lot_id: LotId,
    pub category: MineralCategory,
    pub net_weight: Weight,
    pub assay_percentage: Option<Percentage>,
    pub settlement: SettlementResult,
}

/// Supplier-facing record combining settled lots and advances. Immutable
/// once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub supplier_id: SupplierId,
    pub mineral_types: BTreeSet<MineralCategory>,
    pub lot_ids: BTreeMap<MineralCategory, Vec<LotId>>,
    pub advance_ids: Vec<AdvanceId>,
    pub total_weight: Weight,
    pub subtotal_weights: BTreeMap<MineralCategory, Weight>,
    pub weighted_avg_percentages: BTreeMap<MineralCategory, Option<Percentage>>,
    pub total_amount: Money,
    pub advance_amount: Money,
    pub payable_amount: Money,
    pub assay_source: AssaySource,
    pub lines: Vec<PaymentLine>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn from_aggregate(
        id: impl Into<PaymentId>,
        aggregate: AggregateResult,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut lot_ids = BTreeMap::new();
        let mut subtotal_weights = BTreeMap::new();
        let mut weighted_avg_percentages = BTreeMap::new();
        for (category, subtotal) in aggregate.categories {
            subtotal_weights.insert(category, subtotal.subtotal_weight);
            weighted_avg_percentages.insert(category, subtotal.weighted_avg_percentage);
            lot_ids.insert(category, subtotal.lot_ids);
        }

        Payment {
            id: id.into(),
            supplier_id: aggregate.supplier_id,
            mineral_types: aggregate.mineral_types,
            lot_ids,
            advance_ids: aggregate.advance_ids,
            total_weight: aggregate.total_weight,
            subtotal_weights,
            weighted_avg_percentages,
            total_amount: aggregate.total_amount,
            advance_amount: aggregate.advance_amount,
            payable_amount: aggregate.payable_amount,
            assay_source: aggregate.assay_source,
            lines: aggregate.lines,
            created_at,
        }
    }

    /// Every (category, lot id) pair included in the payment.
    pub fn included_lots(&self) -> impl Iterator<Item = (MineralCategory, &LotId)> + '_ {
        self.lot_ids
            .iter()
            .flat_map(|(category, ids)| ids.iter().map(move |id| (*category, id)))
    }
}
