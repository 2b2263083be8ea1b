use chrono::Utc;
use napi::Result as NapiResult;
use napi_derive::napi;
use serde::{Deserialize, Serialize};

use ore_settlement_core::access::CapabilitySet;
use ore_settlement_core::payments::{
    eligible_candidates, AggregateResult, Payment, PaymentCoordinator, PaymentSelection,
};
use ore_settlement_core::settlement::{self, SettlementInput};
use ore_settlement_core::state::{LedgerAction, LedgerState};
use ore_settlement_core::{fees, SupplierId};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

fn resettled(mut ledger: LedgerState) -> NapiResult<LedgerState> {
    ledger.resettle().map_err(to_napi_error)?;
    Ok(ledger)
}

/// Ledger-backed requests carry the caller's ledger snapshot; the host owns
/// persistence and writes back whatever ledger a call returns. Stored
/// settlements in that snapshot are re-derived before use.
#[derive(Deserialize)]
struct PaymentRequest {
    ledger: LedgerState,
    selection: PaymentSelection,
    #[serde(default = "CapabilitySet::all")]
    capabilities: CapabilitySet,
}

#[derive(Deserialize)]
struct CommitPaymentRequest {
    ledger: LedgerState,
    selection: PaymentSelection,
    /// Result of the preview the caller confirmed.
    preview: AggregateResult,
    #[serde(default = "CapabilitySet::all")]
    capabilities: CapabilitySet,
}

#[derive(Deserialize)]
struct CandidatesRequest {
    ledger: LedgerState,
    supplier_id: SupplierId,
}

#[derive(Deserialize)]
struct ActionRequest {
    ledger: LedgerState,
    action: LedgerAction,
    #[serde(default = "CapabilitySet::all")]
    capabilities: CapabilitySet,
}

#[derive(Serialize)]
struct CommitResponse {
    payment: Payment,
    ledger: LedgerState,
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

#[napi]
pub fn settle_lot(input_json: String) -> NapiResult<String> {
    let input: SettlementInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = settlement::calculate_settlement(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn resolve_fees(input_json: String) -> NapiResult<String> {
    let input: SettlementInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let resolved = fees::resolve(&input.lot, input.schedule.as_ref()).map_err(to_napi_error)?;
    serde_json::to_string(&resolved).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Apply one lot/status/schedule action and return the next ledger.
#[napi]
pub fn apply_ledger_action(input_json: String) -> NapiResult<String> {
    let ActionRequest {
        mut ledger,
        action,
        capabilities,
    } = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    ledger.resettle().map_err(to_napi_error)?;
    ledger.dispatch(action, &capabilities).map_err(to_napi_error)?;
    serde_json::to_string(&ledger).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

#[napi]
pub fn payment_candidates(input_json: String) -> NapiResult<String> {
    let input: CandidatesRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let ledger = resettled(input.ledger)?;
    let candidates = eligible_candidates(&input.supplier_id, &ledger, &ledger);
    serde_json::to_string(&candidates).map_err(to_napi_error)
}

#[napi]
pub fn preview_payment(input_json: String) -> NapiResult<String> {
    let input: PaymentRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let coordinator = PaymentCoordinator::new(resettled(input.ledger)?, input.capabilities);
    let output = coordinator.preview(&input.selection).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

/// Commit a payment against the preview the caller confirmed. On success
/// returns the payment together with the updated ledger; on failure the
/// caller's ledger is still current.
#[napi]
pub fn commit_payment(input_json: String) -> NapiResult<String> {
    let input: CommitPaymentRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let mut coordinator = PaymentCoordinator::new(resettled(input.ledger)?, input.capabilities);
    let payment = coordinator
        .commit(&input.selection, &input.preview, Utc::now())
        .map_err(to_napi_error)?;
    let response = CommitResponse {
        payment,
        ledger: coordinator.into_store(),
    };
    serde_json::to_string(&response).map_err(to_napi_error)
}
