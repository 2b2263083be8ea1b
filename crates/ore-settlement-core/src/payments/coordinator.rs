use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::access::{Capability, CapabilitySet};
use crate::lifecycle::{lot_is_eligible, AdvanceStatus};
use crate::payments::{aggregate, AggregateResult, Payment, PaymentSelection};
use crate::store::{AdvanceRepository, LotRepository, PaymentRepository};
use crate::types::*;
use crate::{OreSettlementError, OreSettlementResult};

/// A selection together with the totals its preview showed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRequest {
    pub selection: PaymentSelection,
    pub preview: AggregateResult,
}

/// Two-phase payment workflow over a store.
///
/// `preview` may be called any number of times and never writes. `commit`
/// re-checks the selection against the store and re-aggregates it. The
/// whole commit is rejected if any record was consumed in the meantime or
/// if the fresh totals differ from the preview the caller confirmed;
/// otherwise one Payment goes to the store's atomic `create_payment`.
pub struct PaymentCoordinator<S> {
    store: S,
    capabilities: CapabilitySet,
}

impl<S> PaymentCoordinator<S>
where
    S: LotRepository + AdvanceRepository + PaymentRepository,
{
    pub fn new(store: S, capabilities: CapabilitySet) -> Self {
        PaymentCoordinator {
            store,
            capabilities,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn preview(
        &self,
        selection: &PaymentSelection,
    ) -> OreSettlementResult<ComputationOutput<AggregateResult>> {
        let start = Instant::now();
        let _span = info_span!("payment_preview", supplier = %selection.supplier_id).entered();
        self.capabilities.require(Capability::Payments)?;

        let result = aggregate(selection, &self.store, &self.store)?;
        debug!(
            lots = result.lines.len(),
            payable = %result.payable_amount,
            "previewed payment"
        );

        let warnings = result.warnings();
        let elapsed = start.elapsed().as_micros() as u64;
        Ok(with_metadata(
            "Sum of lot net amounts less selected advances; weight-weighted assay averages per category",
            selection,
            warnings,
            elapsed,
            result,
        ))
    }

    /// Ids in the selection that exist for this supplier but can no longer
    /// be paid.
    fn stale_ids(&self, selection: &PaymentSelection) -> Vec<String> {
        let mut stale = Vec::new();
        for (category, ids) in &selection.lot_ids {
            for id in ids {
                if let Some(lot) = self.store.fetch_lot(*category, id) {
                    if lot.supplier_id == selection.supplier_id && !lot_is_eligible(&lot) {
                        stale.push(id.clone());
                    }
                }
            }
        }
        for id in &selection.advance_ids {
            if let Some(advance) = self.store.fetch_advance(id) {
                if advance.supplier_id == selection.supplier_id
                    && advance.status != AdvanceStatus::Unpaid
                {
                    stale.push(id.clone());
                }
            }
        }
        stale
    }

    /// Persist `selection` as a payment, provided the store still yields
    /// exactly the `previewed` totals.
    pub fn commit(
        &mut self,
        selection: &PaymentSelection,
        previewed: &AggregateResult,
        now: DateTime<Utc>,
    ) -> OreSettlementResult<Payment> {
        let _span = info_span!("payment_commit", supplier = %selection.supplier_id).entered();
        self.capabilities.require(Capability::Payments)?;

        let stale_ids = self.stale_ids(selection);
        if !stale_ids.is_empty() {
            warn!(?stale_ids, "commit rejected, selection no longer eligible");
            return Err(OreSettlementError::Consistency { stale_ids });
        }

        let result = aggregate(selection, &self.store, &self.store)?;
        if result != *previewed {
            let stale_ids = drifted_ids(selection, previewed, &result);
            warn!(?stale_ids, "commit rejected, totals changed since preview");
            return Err(OreSettlementError::Consistency { stale_ids });
        }

        let payment = Payment::from_aggregate(Uuid::new_v4().to_string(), result, now);
        let payment = self.store.create_payment(payment).inspect_err(|e| {
            warn!(error = %e, "payment store rejected commit");
        })?;

        info!(
            payment_id = %payment.id,
            lots = payment.lines.len(),
            advances = payment.advance_ids.len(),
            payable = %payment.payable_amount,
            "payment committed"
        );
        Ok(payment)
    }
}

/// Ids whose contribution differs between the preview and a fresh
/// aggregation. Falls back to every selected id when the difference is not
/// attributable to a single record.
fn drifted_ids(
    selection: &PaymentSelection,
    previewed: &AggregateResult,
    fresh: &AggregateResult,
) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for line in &fresh.lines {
        let before = previewed
            .lines
            .iter()
            .find(|l| l.category == line.category && l.lot_id == line.lot_id);
        if before != Some(line) {
            ids.push(line.lot_id.clone());
        }
    }
    for line in &previewed.lines {
        let kept = fresh
            .lines
            .iter()
            .any(|l| l.category == line.category && l.lot_id == line.lot_id);
        if !kept && !ids.contains(&line.lot_id) {
            ids.push(line.lot_id.clone());
        }
    }
    if previewed.advance_ids != fresh.advance_ids
        || previewed.advance_amount != fresh.advance_amount
        || previewed.advance_currency != fresh.advance_currency
    {
        ids.extend(fresh.advance_ids.iter().cloned());
    }
    if ids.is_empty() {
        ids.extend(selection.lot_ids.values().flatten().cloned());
        ids.extend(selection.advance_ids.iter().cloned());
    }
    ids
}
