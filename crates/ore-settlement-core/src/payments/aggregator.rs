use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::lifecycle::{lot_is_eligible, AdvanceStatus};
use crate::lots::{AssaySource, MineralLot};
use crate::payments::{AdvancePayment, PaymentLine};
use crate::store::{AdvanceRepository, LotRepository};
use crate::types::*;
use crate::{OreSettlementError, OreSettlementResult};

// ---------------------------------------------------------------------------
// Input / Output types
// ---------------------------------------------------------------------------

/// The lots and advances a user picked for one supplier payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSelection {
    pub supplier_id: SupplierId,
    #[serde(default)]
    pub lot_ids: BTreeMap<MineralCategory, Vec<LotId>>,
    #[serde(default)]
    pub advance_ids: Vec<AdvanceId>,
    /// Assay reading used for the weighted averages.
    #[serde(default)]
    pub assay_source: AssaySource,
}

impl PaymentSelection {
    pub fn new(supplier_id: impl Into<SupplierId>) -> Self {
        PaymentSelection {
            supplier_id: supplier_id.into(),
            lot_ids: BTreeMap::new(),
            advance_ids: Vec::new(),
            assay_source: AssaySource::default(),
        }
    }

    pub fn with_lots<I, S>(mut self, category: MineralCategory, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<LotId>,
    {
        self.lot_ids
            .entry(category)
            .or_default()
            .extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_advances<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<AdvanceId>,
    {
        self.advance_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_assay_source(mut self, source: AssaySource) -> Self {
        self.assay_source = source;
        self
    }

    pub fn lot_count(&self) -> usize {
        self.lot_ids.values().map(Vec::len).sum()
    }
}

/// Totals for one mineral category within a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySubtotal {
    pub lot_ids: Vec<LotId>,
    pub subtotal_weight: Weight,
    pub subtotal_amount: Money,
    /// None when no selected lot of the category has an assay.
    pub weighted_avg_percentage: Option<Percentage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub supplier_id: SupplierId,
    pub mineral_types: BTreeSet<MineralCategory>,
    pub categories: BTreeMap<MineralCategory, CategorySubtotal>,
    pub advance_ids: Vec<AdvanceId>,
    pub advance_currency: Option<Currency>,
    pub total_weight: Weight,
    pub total_amount: Money,
    pub advance_amount: Money,
    /// total_amount - advance_amount. Negative when advances exceed the
    /// value of the lots.
    pub payable_amount: Money,
    pub assay_source: AssaySource,
    pub lines: Vec<PaymentLine>,
}

impl AggregateResult {
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.payable_amount < Decimal::ZERO {
            warnings.push(format!(
                "Advances exceed earned value: payable amount is {}",
                self.payable_amount
            ));
        }
        for (category, subtotal) in &self.categories {
            if subtotal.weighted_avg_percentage.is_none() {
                warnings.push(format!(
                    "No assay results for selected {category} lots; weighted average undefined"
                ));
            }
        }
        warnings
    }
}

/// Everything that could currently be selected for a supplier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCandidates {
    pub supplier_id: SupplierId,
    pub lots: BTreeMap<MineralCategory, Vec<MineralLot>>,
    pub advances: Vec<AdvancePayment>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn add(a: Decimal, b: Decimal, field: &str) -> OreSettlementResult<Decimal> {
    a.checked_add(b).ok_or_else(|| OreSettlementError::overflow(field))
}

/// Weight-weighted mean over the points that carry a percentage. None when
/// no point has one or their total weight is zero.
pub(crate) fn weighted_average(
    points: impl IntoIterator<Item = (Weight, Option<Percentage>)>,
) -> OreSettlementResult<Option<Percentage>> {
    let mut weighted_sum = Decimal::ZERO;
    let mut weight_sum = Decimal::ZERO;
    for (weight, pct) in points {
        if let Some(pct) = pct {
            let weighted = pct
                .checked_mul(weight)
                .ok_or_else(|| OreSettlementError::overflow("weighted_avg_percentage"))?;
            weighted_sum = add(weighted_sum, weighted, "weighted_avg_percentage")?;
            weight_sum = add(weight_sum, weight, "weighted_avg_percentage")?;
        }
    }
    if weight_sum.is_zero() {
        return Ok(None);
    }
    weighted_sum
        .checked_div(weight_sum)
        .map(Some)
        .ok_or_else(|| OreSettlementError::overflow("weighted_avg_percentage"))
}

fn lot_field(category: MineralCategory) -> String {
    format!("lot_ids.{category}")
}

fn check_lot(
    selection: &PaymentSelection,
    category: MineralCategory,
    id: &str,
    lot: &MineralLot,
) -> OreSettlementResult<()> {
    let field = lot_field(category);
    if lot.category() != category {
        return Err(OreSettlementError::validation(
            field,
            format!("Lot {id} is {}, not {category}", lot.category()),
        ));
    }
    if lot.supplier_id != selection.supplier_id {
        return Err(OreSettlementError::validation(
            field,
            format!(
                "Lot {id} belongs to supplier {}, not {}",
                lot.supplier_id, selection.supplier_id
            ),
        ));
    }
    if !lot_is_eligible(lot) {
        return Err(OreSettlementError::validation(
            field,
            format!(
                "Lot {id} is not eligible (finance {}, stock {})",
                lot.finance_status, lot.stock_status
            ),
        ));
    }
    Ok(())
}

fn check_advance(
    selection: &PaymentSelection,
    advance: &AdvancePayment,
) -> OreSettlementResult<()> {
    if advance.supplier_id != selection.supplier_id {
        return Err(OreSettlementError::validation(
            "advance_ids",
            format!(
                "Advance {} belongs to supplier {}, not {}",
                advance.id, advance.supplier_id, selection.supplier_id
            ),
        ));
    }
    if advance.status != AdvanceStatus::Unpaid {
        return Err(OreSettlementError::validation(
            "advance_ids",
            format!("Advance {} is already {}", advance.id, advance.status),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Core functions
// ---------------------------------------------------------------------------

/// Combine the selected lots and advances of one supplier into payment
/// totals.
///
/// # Rules
///
/// - At least one lot is required; advances alone cannot form a payment.
/// - Every id must exist, belong to the supplier and be eligible. Lots must
///   carry a complete settlement.
/// - `total_amount` sums the lots' net amounts; `payable_amount` is
///   `total_amount - advance_amount` and is never clamped.
/// - Per category, `weighted_avg = Σ(pct_i · w_i) / Σ w_i` over lots with an
///   assay result.
///
/// Reads only; nothing is mutated.
pub fn aggregate<L, A>(
    selection: &PaymentSelection,
    lots: &L,
    advances: &A,
) -> OreSettlementResult<AggregateResult>
where
    L: LotRepository + ?Sized,
    A: AdvanceRepository + ?Sized,
{
    // -- Validation ----------------------------------------------------------
    if selection.supplier_id.trim().is_empty() {
        return Err(OreSettlementError::validation(
            "supplier_id",
            "Supplier reference is required",
        ));
    }
    if selection.lot_count() == 0 {
        return Err(OreSettlementError::validation(
            "lot_ids",
            "At least one lot must be selected; advances alone cannot form a payment",
        ));
    }

    // -- Lots ----------------------------------------------------------------
    let mut seen_lots: HashSet<(MineralCategory, &str)> = HashSet::new();
    let mut categories: BTreeMap<MineralCategory, CategorySubtotal> = BTreeMap::new();
    let mut lines: Vec<PaymentLine> = Vec::new();

    for (category, ids) in &selection.lot_ids {
        if ids.is_empty() {
            continue;
        }
        let mut points: Vec<(Weight, Option<Percentage>)> = Vec::with_capacity(ids.len());
        let mut subtotal_weight = Decimal::ZERO;
        let mut subtotal_amount = Decimal::ZERO;

        for id in ids {
            if !seen_lots.insert((*category, id.as_str())) {
                return Err(OreSettlementError::validation(
                    lot_field(*category),
                    format!("Lot {id} is selected more than once"),
                ));
            }
            let lot = lots.fetch_lot(*category, id).ok_or_else(|| {
                OreSettlementError::validation(
                    lot_field(*category),
                    format!("Lot {id} not found"),
                )
            })?;
            check_lot(selection, *category, id, &lot)?;

            let (Some(settlement), Some(weight)) = (lot.settlement.clone(), lot.net_weight)
            else {
                return Err(OreSettlementError::validation(
                    lot_field(*category),
                    format!("Lot {id} has no complete settlement"),
                ));
            };

            let pct = lot.assay_percentage(selection.assay_source);
            points.push((weight, pct));
            subtotal_weight = add(subtotal_weight, weight, "total_weight")?;
            subtotal_amount = add(subtotal_amount, settlement.net_amount, "total_amount")?;
            lines.push(PaymentLine {
                lot_id: id.clone(),
                category: *category,
                net_weight: weight,
                assay_percentage: pct,
                settlement,
            });
        }

        categories.insert(
            *category,
            CategorySubtotal {
                lot_ids: ids.clone(),
                subtotal_weight,
                subtotal_amount,
                weighted_avg_percentage: weighted_average(points)?,
            },
        );
    }

    // -- Advances ------------------------------------------------------------
    let mut seen_advances: HashSet<&str> = HashSet::new();
    let mut advance_amount = Decimal::ZERO;
    let mut advance_currency: Option<Currency> = None;

    for id in &selection.advance_ids {
        if !seen_advances.insert(id.as_str()) {
            return Err(OreSettlementError::validation(
                "advance_ids",
                format!("Advance {id} is selected more than once"),
            ));
        }
        let advance = advances.fetch_advance(id).ok_or_else(|| {
            OreSettlementError::validation("advance_ids", format!("Advance {id} not found"))
        })?;
        check_advance(selection, &advance)?;

        match &advance_currency {
            Some(currency) if *currency != advance.currency => {
                return Err(OreSettlementError::validation(
                    "advance_ids",
                    format!(
                        "Advance {id} is in {}, other selected advances are in {currency}",
                        advance.currency
                    ),
                ));
            }
            Some(_) => {}
            None => advance_currency = Some(advance.currency.clone()),
        }
        advance_amount = add(advance_amount, advance.amount, "advance_amount")?;
    }

    // -- Totals --------------------------------------------------------------
    let total_weight: Weight = categories
        .values()
        .try_fold(Decimal::ZERO, |acc, c| add(acc, c.subtotal_weight, "total_weight"))?;
    let total_amount: Money = categories
        .values()
        .try_fold(Decimal::ZERO, |acc, c| add(acc, c.subtotal_amount, "total_amount"))?;
    let payable_amount = total_amount
        .checked_sub(advance_amount)
        .ok_or_else(|| OreSettlementError::overflow("payable_amount"))?;

    Ok(AggregateResult {
        supplier_id: selection.supplier_id.clone(),
        mineral_types: categories.keys().copied().collect(),
        categories,
        advance_ids: selection.advance_ids.clone(),
        advance_currency,
        total_weight,
        total_amount,
        advance_amount,
        payable_amount,
        assay_source: selection.assay_source,
        lines,
    })
}

/// Lots and advances that can currently be offered for a supplier payment.
/// Unsettled and withdrawn lots are left out.
pub fn eligible_candidates<L, A>(supplier_id: &str, lots: &L, advances: &A) -> PaymentCandidates
where
    L: LotRepository + ?Sized,
    A: AdvanceRepository + ?Sized,
{
    let mut by_category = BTreeMap::new();
    for category in MineralCategory::ALL {
        let ready: Vec<MineralLot> = lots
            .eligible_lots(supplier_id, category)
            .into_iter()
            .filter(|lot| lot_is_eligible(lot) && lot.settlement.is_some())
            .collect();
        if !ready.is_empty() {
            by_category.insert(category, ready);
        }
    }

    let advances = advances
        .unpaid_advances(supplier_id)
        .into_iter()
        .filter(|a| a.status == AdvanceStatus::Unpaid)
        .collect();

    PaymentCandidates {
        supplier_id: supplier_id.to_string(),
        lots: by_category,
        advances,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn assert_approx(actual: Decimal, expected: Decimal, tolerance: Decimal, label: &str) {
        let diff = (actual - expected).abs();
        assert!(
            diff <= tolerance,
            "{label}: expected ~{expected}, got {actual} (diff={diff}, tol={tolerance})"
        );
    }

    #[test]
    fn test_weighted_average_reference() {
        let avg = weighted_average([(dec!(100), Some(dec!(40))), (dec!(200), Some(dec!(50)))])
            .unwrap()
            .unwrap();
        assert_approx(avg, dec!(46.67), dec!(0.01), "weighted average");
    }

    #[test]
    fn test_weighted_average_ignores_unassayed_lots() {
        let avg = weighted_average([(dec!(100), Some(dec!(40))), (dec!(500), None)])
            .unwrap()
            .unwrap();
        assert_eq!(avg, dec!(40));
    }

    #[test]
    fn test_weighted_average_undefined_without_assays() {
        assert_eq!(weighted_average([(dec!(100), None)]).unwrap(), None);
        assert_eq!(
            weighted_average(Vec::<(Weight, Option<Percentage>)>::new()).unwrap(),
            None
        );
    }

    #[test]
    fn test_weighted_average_undefined_for_zero_weight() {
        assert_eq!(weighted_average([(Decimal::ZERO, Some(dec!(40)))]).unwrap(), None);
    }

    #[test]
    fn test_weighted_average_split_invariance() {
        let whole = weighted_average([(dec!(100), Some(dec!(40))), (dec!(200), Some(dec!(50)))]);
        let split = weighted_average([
            (dec!(100), Some(dec!(40))),
            (dec!(120), Some(dec!(50))),
            (dec!(80), Some(dec!(50))),
        ]);
        assert_eq!(whole.unwrap(), split.unwrap());
    }

    #[test]
    fn test_weighted_average_overflow_is_an_error() {
        let err = weighted_average([(Decimal::MAX, Some(dec!(50)))]).unwrap_err();
        assert!(matches!(err, OreSettlementError::Validation { .. }));
    }

    #[test]
    fn test_selection_builder() {
        let selection = PaymentSelection::new("SUP-1")
            .with_lots(MineralCategory::Coltan, ["A", "B"])
            .with_lots(MineralCategory::Wolframite, ["C"])
            .with_advances(["ADV-1"]);
        assert_eq!(selection.lot_count(), 3);
        assert_eq!(selection.advance_ids, vec!["ADV-1".to_string()]);
    }

    #[test]
    fn test_selection_json_uses_category_keys() {
        let selection = PaymentSelection::new("SUP-1").with_lots(MineralCategory::Cassiterite, ["S1"]);
        let json = serde_json::to_value(&selection).unwrap();
        assert_eq!(json["lot_ids"]["cassiterite"][0], "S1");
        assert_eq!(json["assay_source"], "preferred");
    }
}
