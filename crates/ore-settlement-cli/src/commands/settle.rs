use clap::Args;
use serde_json::Value;
use std::time::Instant;

use ore_settlement_core::fees;
use ore_settlement_core::settlement::{self, SettlementInput};
use ore_settlement_core::store::FeeScheduleRepository;
use ore_settlement_core::with_metadata;

use crate::config::FeeConfig;
use crate::input;

/// Arguments for a single-lot settlement
#[derive(Args)]
pub struct SettleArgs {
    /// Path to JSON input file ({"lot": ..., "schedule": ...})
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for fee resolution
#[derive(Args)]
pub struct ResolveFeesArgs {
    /// Path to JSON input file ({"lot": ..., "schedule": ...})
    #[arg(long)]
    pub input: Option<String>,
}

/// A schedule given in the input wins over the configured one.
fn with_configured_schedule<R: FeeScheduleRepository>(
    mut input: SettlementInput,
    schedules: &R,
) -> SettlementInput {
    if input.schedule.is_none() {
        input.schedule = schedules.current_schedule(input.lot.category());
    }
    input
}

pub fn run_settle(args: SettleArgs, config: &FeeConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let settle_input: SettlementInput =
        input::stdin::read_input(args.input.as_deref(), "lot settlement")?;
    let settle_input = with_configured_schedule(settle_input, config);
    let result = settlement::calculate_settlement(&settle_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_resolve_fees(
    args: ResolveFeesArgs,
    config: &FeeConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let fee_input: SettlementInput =
        input::stdin::read_input(args.input.as_deref(), "fee resolution")?;
    let fee_input = with_configured_schedule(fee_input, config);
    let resolved = fees::resolve(&fee_input.lot, fee_input.schedule.as_ref())?;

    let output = with_metadata(
        "Complete enabled lot override, else the category's current global schedule",
        &fee_input.schedule,
        Vec::new(),
        start.elapsed().as_micros() as u64,
        resolved,
    );
    Ok(serde_json::to_value(output)?)
}
