use serde::{Deserialize, Serialize};

use crate::fees::FeeSchedule;
use crate::lots::MineralLot;
use crate::settlement::{evaluate, SettlementOutcome};
use crate::OreSettlementResult;

/// The settlement currently shown for a lot being edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayedSettlement {
    pub generation: u64,
    pub outcome: SettlementOutcome,
}

/// Single-slot recompute for a lot under edit.
///
/// Every input change is submitted with a fresh generation number and
/// replaces whatever was pending. Only the latest submission is computed,
/// and a result can only be published for the latest generation, so an
/// older recompute never overwrites a newer one.
#[derive(Debug, Default)]
pub struct LiveSettlement {
    latest: u64,
    pending: Option<(u64, MineralLot)>,
    displayed: Option<DisplayedSettlement>,
}

impl LiveSettlement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a recompute for the lot's current inputs, superseding any
    /// pending one. Returns the generation assigned to this submission.
    pub fn submit(&mut self, lot: MineralLot) -> u64 {
        self.latest += 1;
        self.pending = Some((self.latest, lot));
        self.latest
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn latest_generation(&self) -> u64 {
        self.latest
    }

    /// Compute the pending submission, if any, and publish it.
    pub fn run_pending(
        &mut self,
        schedule: Option<&FeeSchedule>,
    ) -> OreSettlementResult<Option<&DisplayedSettlement>> {
        let Some((generation, lot)) = self.pending.take() else {
            return Ok(None);
        };
        let outcome = evaluate(&lot, schedule)?;
        self.publish(generation, outcome);
        Ok(self.displayed.as_ref())
    }

    /// Publish a result computed elsewhere. Returns `false` and discards the
    /// result when a newer submission exists.
    pub fn publish(&mut self, generation: u64, outcome: SettlementOutcome) -> bool {
        if generation != self.latest {
            tracing::debug!(generation, latest = self.latest, "discarding superseded recompute");
            return false;
        }
        self.displayed = Some(DisplayedSettlement {
            generation,
            outcome,
        });
        true
    }

    pub fn displayed(&self) -> Option<&DisplayedSettlement> {
        self.displayed.as_ref()
    }
}
