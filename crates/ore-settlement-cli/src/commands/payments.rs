use chrono::Utc;
use clap::Args;
use serde_json::{json, Value};
use tracing::info;

use ore_settlement_core::access::{Capability, CapabilitySet};
use ore_settlement_core::payments::{
    eligible_candidates, CommitRequest, PaymentCoordinator, PaymentSelection,
};
use ore_settlement_core::state::{LedgerAction, LedgerState};
use ore_settlement_core::store::{FeeScheduleRepository, PaymentRepository};
use ore_settlement_core::MineralCategory;

use crate::config::FeeConfig;
use crate::input;

/// Ledger file and the capabilities the operator acts with
#[derive(Args)]
pub struct LedgerArgs {
    /// Path to the JSON ledger file (lots, advances, payments, schedules)
    #[arg(long)]
    pub ledger: String,

    /// Comma-separated capabilities (stock, lab, financial, payments).
    /// Defaults to all of them
    #[arg(long, value_delimiter = ',')]
    pub capabilities: Option<Vec<String>>,
}

/// Arguments for listing payable records
#[derive(Args)]
pub struct CandidatesArgs {
    #[command(flatten)]
    pub ledger: LedgerArgs,

    /// Supplier to list candidates for
    #[arg(long)]
    pub supplier: String,
}

/// Arguments for a payment preview
#[derive(Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub ledger: LedgerArgs,

    /// Path to JSON payment selection file
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for a payment commit
#[derive(Args)]
pub struct CommitArgs {
    #[command(flatten)]
    pub ledger: LedgerArgs,

    /// Path to JSON commit file ({"selection": ..., "preview": <preview result>})
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for listing committed payments
#[derive(Args)]
pub struct PaymentsArgs {
    /// Path to the JSON ledger file
    #[arg(long)]
    pub ledger: String,

    /// Only list payments to this supplier
    #[arg(long)]
    pub supplier: Option<String>,
}

fn capabilities(args: &LedgerArgs) -> Result<CapabilitySet, Box<dyn std::error::Error>> {
    match &args.capabilities {
        None => Ok(CapabilitySet::all()),
        Some(names) => {
            let granted = names
                .iter()
                .map(|n| n.parse::<Capability>())
                .collect::<Result<Vec<_>, _>>()?;
            Ok(CapabilitySet::new(granted))
        }
    }
}

/// Read the ledger, install configured schedules for categories the ledger
/// has none for, and re-derive every open lot's settlement.
fn load_ledger(path: &str, config: &FeeConfig) -> Result<LedgerState, Box<dyn std::error::Error>> {
    let mut ledger: LedgerState = input::file::read_json(path)?;
    ledger.resettle()?;
    for category in MineralCategory::ALL {
        if ledger.current_schedule(category).is_some() {
            continue;
        }
        if let Some(schedule) = config.current_schedule(category) {
            ledger.dispatch(LedgerAction::ScheduleUpdated { schedule }, &CapabilitySet::all())?;
        }
    }
    info!(
        path,
        lots = ledger.lots.values().map(|l| l.len()).sum::<usize>(),
        advances = ledger.advances.len(),
        payments = ledger.payments.len(),
        "loaded ledger"
    );
    Ok(ledger)
}

pub fn run_candidates(
    args: CandidatesArgs,
    config: &FeeConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let ledger = load_ledger(&args.ledger.ledger, config)?;
    capabilities(&args.ledger)?.require(Capability::Payments)?;
    let candidates = eligible_candidates(&args.supplier, &ledger, &ledger);
    Ok(serde_json::to_value(candidates)?)
}

pub fn run_preview(args: PreviewArgs, config: &FeeConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let selection: PaymentSelection =
        input::stdin::read_input(args.input.as_deref(), "payment preview")?;
    let ledger = load_ledger(&args.ledger.ledger, config)?;
    let coordinator = PaymentCoordinator::new(ledger, capabilities(&args.ledger)?);
    let result = coordinator.preview(&selection)?;
    Ok(serde_json::to_value(result)?)
}

/// Commit the selection against its preview and, only if that succeeds,
/// replace the ledger file.
pub fn run_commit(args: CommitArgs, config: &FeeConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let request: CommitRequest =
        input::stdin::read_input(args.input.as_deref(), "payment commit")?;
    let ledger = load_ledger(&args.ledger.ledger, config)?;
    let mut coordinator = PaymentCoordinator::new(ledger, capabilities(&args.ledger)?);
    let payment = coordinator.commit(&request.selection, &request.preview, Utc::now())?;

    input::file::write_json_atomic(&args.ledger.ledger, coordinator.store())?;
    info!(payment_id = %payment.id, ledger = %args.ledger.ledger, "ledger updated");
    Ok(serde_json::to_value(payment)?)
}

pub fn run_payments(args: PaymentsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let ledger: LedgerState = input::file::read_json(&args.ledger)?;
    let payments = match &args.supplier {
        Some(supplier) => ledger.list_payments(supplier),
        None => ledger.payments.clone(),
    };
    let rows: Vec<Value> = payments
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "supplier_id": p.supplier_id,
                "created_at": p.created_at,
                "lots": p.lines.len(),
                "advances": p.advance_ids.len(),
                "total_weight": p.total_weight,
                "total_amount": p.total_amount,
                "advance_amount": p.advance_amount,
                "payable_amount": p.payable_amount,
            })
        })
        .collect();
    Ok(Value::Array(rows))
}
