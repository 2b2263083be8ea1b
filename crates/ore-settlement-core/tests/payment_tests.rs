use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use ore_settlement_core::access::{Capability, CapabilitySet};
use ore_settlement_core::fees::FeeSchedule;
use ore_settlement_core::lifecycle::{AdvanceStatus, FinanceStatus, StockStatus};
use ore_settlement_core::lots::{Assay, FeeOverride, LotAssays, LotEdit, MineralLot, PricingInputs};
use ore_settlement_core::payments::{
    aggregate, eligible_candidates, AdvanceMethod, AdvancePayment, AggregateResult, Payment,
    PaymentCoordinator, PaymentSelection,
};
use ore_settlement_core::state::{LedgerAction, LedgerState};
use ore_settlement_core::store::{AdvanceRepository, LotRepository, PaymentRepository};
use ore_settlement_core::{Currency, MineralCategory, OreSettlementError, OreSettlementResult};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ===========================================================================
// Fixtures
// ===========================================================================

fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, day, 10, 0, 0).unwrap()
}

fn schedule(category: MineralCategory) -> FeeSchedule {
    FeeSchedule {
        category,
        version: 1,
        rra_rate: dec!(0.03),
        rma_per_ton: dec!(125),
        inkomane_per_kg: dec!(40),
        price_per_percentage_rate: dec!(5),
        effective_from: NaiveDate::from_ymd_opt(2024, 1, 1),
    }
}

fn pricing() -> PricingInputs {
    PricingInputs {
        price_per_percentage: Some(dec!(5)),
        purchased_percentage: Some(dec!(40)),
        exchange_rate: Some(dec!(1300)),
        tag_price_per_kg: Some(dec!(10)),
        transport_charge: None,
        external_assay_charge: None,
    }
}

fn coltan_lot(id: &str, supplier: &str, weight: Decimal, ta2o5: Option<Decimal>) -> MineralLot {
    let mut lot = MineralLot::new(id, supplier, MineralCategory::Coltan, weight, at(1));
    lot.assays = LotAssays::Coltan {
        ta2o5: Assay {
            internal: ta2o5.map(|p| p - dec!(1)),
            external: ta2o5,
        },
        nb2o5: Assay::default(),
    };
    lot.pricing = pricing();
    lot
}

fn cassiterite_lot(id: &str, weight: Decimal, sn: Decimal) -> MineralLot {
    let mut lot = MineralLot::new(id, "SUP-1", MineralCategory::Cassiterite, weight, at(1));
    lot.assays = LotAssays::Cassiterite {
        sn: Assay {
            internal: Some(sn),
            external: None,
        },
    };
    lot.pricing = pricing();
    lot
}

fn advance(id: &str, supplier: &str, amount: Decimal) -> AdvancePayment {
    AdvancePayment {
        id: id.into(),
        supplier_id: supplier.into(),
        amount,
        currency: Currency::USD,
        method: AdvanceMethod::Cash,
        date: NaiveDate::from_ymd_opt(2024, 8, 20).unwrap(),
        status: AdvanceStatus::Unpaid,
    }
}

/// Ledger with two coltan lots (100 kg @ 40%, 200 kg @ 50%), one
/// cassiterite lot and one unsettled coltan lot for SUP-1, a coltan lot for
/// SUP-2, and advances for both suppliers. Schedules are loaded last so
/// every complete lot is settled on load.
fn ledger() -> LedgerState {
    let mut unsettled = coltan_lot("C-3", "SUP-1", dec!(50), Some(dec!(30)));
    unsettled.pricing.exchange_rate = None;

    let mut state = LedgerState::new();
    let caps = CapabilitySet::all();
    state
        .dispatch(
            LedgerAction::LotsLoaded {
                lots: vec![
                    coltan_lot("C-1", "SUP-1", dec!(100), Some(dec!(40))),
                    coltan_lot("C-2", "SUP-1", dec!(200), Some(dec!(50))),
                    unsettled,
                    cassiterite_lot("S-1", dec!(150), dec!(65)),
                    coltan_lot("X-1", "SUP-2", dec!(80), Some(dec!(35))),
                ],
            },
            &caps,
        )
        .unwrap();
    state
        .dispatch(
            LedgerAction::AdvancesLoaded {
                advances: vec![
                    advance("ADV-1", "SUP-1", dec!(1000)),
                    advance("ADV-2", "SUP-1", dec!(500)),
                    advance("ADV-9", "SUP-2", dec!(700)),
                ],
            },
            &caps,
        )
        .unwrap();
    for category in MineralCategory::ALL {
        state
            .dispatch(
                LedgerAction::ScheduleUpdated {
                    schedule: schedule(category),
                },
                &caps,
            )
            .unwrap();
    }
    state
}

fn coordinator() -> PaymentCoordinator<LedgerState> {
    PaymentCoordinator::new(ledger(), CapabilitySet::all())
}

/// Preview `selection` and commit it against that preview.
fn preview_and_commit<S>(
    coord: &mut PaymentCoordinator<S>,
    selection: &PaymentSelection,
    now: DateTime<Utc>,
) -> OreSettlementResult<Payment>
where
    S: LotRepository + AdvanceRepository + PaymentRepository,
{
    let preview = coord.preview(selection)?.result;
    coord.commit(selection, &preview, now)
}

fn net_of(state: &LedgerState, category: MineralCategory, id: &str) -> Decimal {
    state
        .lot(category, id)
        .and_then(|l| l.settlement.as_ref())
        .map(|s| s.net_amount)
        .unwrap()
}

fn assert_approx(actual: Decimal, expected: Decimal, tolerance: Decimal, label: &str) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= tolerance,
        "{label}: expected ~{expected}, got {actual} (diff={diff}, tol={tolerance})"
    );
}

// ===========================================================================
// Preview
// ===========================================================================

#[test]
fn test_preview_weighted_average_reference() {
    let coord = coordinator();
    let selection = PaymentSelection::new("SUP-1").with_lots(MineralCategory::Coltan, ["C-1", "C-2"]);
    let out = coord.preview(&selection).unwrap();
    let coltan = &out.result.categories[&MineralCategory::Coltan];

    assert_eq!(out.result.total_weight, dec!(300));
    assert_eq!(coltan.subtotal_weight, dec!(300));
    assert_approx(
        coltan.weighted_avg_percentage.unwrap(),
        dec!(46.67),
        dec!(0.01),
        "coltan weighted average",
    );
}

#[test]
fn test_preview_mixed_categories_and_advances() {
    let coord = coordinator();
    let selection = PaymentSelection::new("SUP-1")
        .with_lots(MineralCategory::Coltan, ["C-1", "C-2"])
        .with_lots(MineralCategory::Cassiterite, ["S-1"])
        .with_advances(["ADV-1", "ADV-2"]);
    let result = coord.preview(&selection).unwrap().result;
    let store = coord.store();

    let expected_total = net_of(store, MineralCategory::Coltan, "C-1")
        + net_of(store, MineralCategory::Coltan, "C-2")
        + net_of(store, MineralCategory::Cassiterite, "S-1");

    assert_eq!(result.total_weight, dec!(450));
    assert_eq!(result.total_amount, expected_total);
    assert_eq!(result.advance_amount, dec!(1500));
    assert_eq!(result.payable_amount, result.total_amount - result.advance_amount);
    assert_eq!(
        result.mineral_types.iter().copied().collect::<Vec<_>>(),
        vec![MineralCategory::Coltan, MineralCategory::Cassiterite]
    );
    assert_eq!(result.lines.len(), 3);
    assert_eq!(
        result.categories[&MineralCategory::Cassiterite].weighted_avg_percentage,
        Some(dec!(65))
    );
}

#[test]
fn test_preview_uses_internal_assay_when_selected() {
    let coord = coordinator();
    let selection = PaymentSelection::new("SUP-1")
        .with_lots(MineralCategory::Coltan, ["C-1"])
        .with_assay_source(ore_settlement_core::lots::AssaySource::Internal);
    let result = coord.preview(&selection).unwrap().result;
    // Fixture internal readings sit one point below the external ones.
    assert_eq!(
        result.categories[&MineralCategory::Coltan].weighted_avg_percentage,
        Some(dec!(39))
    );
}

#[test]
fn test_preview_is_side_effect_free() {
    let coord = coordinator();
    let before = coord.store().clone();
    let selection = PaymentSelection::new("SUP-1")
        .with_lots(MineralCategory::Coltan, ["C-1"])
        .with_advances(["ADV-1"]);
    let first = coord.preview(&selection).unwrap().result;
    let second = coord.preview(&selection).unwrap().result;
    assert_eq!(first, second);
    assert_eq!(coord.store(), &before);
}

#[test]
fn test_negative_payable_is_surfaced_not_clamped() {
    let mut state = ledger();
    state
        .dispatch(
            LedgerAction::AdvancesLoaded {
                advances: vec![advance("ADV-BIG", "SUP-1", dec!(50000))],
            },
            &CapabilitySet::all(),
        )
        .unwrap();
    let coord = PaymentCoordinator::new(state, CapabilitySet::all());
    let selection = PaymentSelection::new("SUP-1")
        .with_lots(MineralCategory::Coltan, ["C-1"])
        .with_advances(["ADV-BIG"]);
    let out = coord.preview(&selection).unwrap();
    assert!(out.result.payable_amount < Decimal::ZERO);
    assert_eq!(
        out.result.payable_amount,
        out.result.total_amount - dec!(50000)
    );
    assert!(out.warnings.iter().any(|w| w.contains("Advances exceed")));
}

#[test]
fn test_advances_alone_cannot_form_payment() {
    let coord = coordinator();
    let selection = PaymentSelection::new("SUP-1").with_advances(["ADV-1"]);
    match coord.preview(&selection) {
        Err(OreSettlementError::Validation { field, .. }) => assert_eq!(field, "lot_ids"),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_other_suppliers_records_are_rejected() {
    let coord = coordinator();
    let foreign_lot = PaymentSelection::new("SUP-1").with_lots(MineralCategory::Coltan, ["X-1"]);
    assert!(matches!(
        coord.preview(&foreign_lot),
        Err(OreSettlementError::Validation { .. })
    ));

    let foreign_advance = PaymentSelection::new("SUP-1")
        .with_lots(MineralCategory::Coltan, ["C-1"])
        .with_advances(["ADV-9"]);
    assert!(matches!(
        coord.preview(&foreign_advance),
        Err(OreSettlementError::Validation { .. })
    ));
}

#[test]
fn test_unsettled_lot_cannot_be_selected() {
    let coord = coordinator();
    let selection = PaymentSelection::new("SUP-1").with_lots(MineralCategory::Coltan, ["C-3"]);
    match coord.preview(&selection) {
        Err(OreSettlementError::Validation { reason, .. }) => {
            assert!(reason.contains("no complete settlement"))
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_duplicate_and_unknown_ids_rejected() {
    let coord = coordinator();
    let dup = PaymentSelection::new("SUP-1").with_lots(MineralCategory::Coltan, ["C-1", "C-1"]);
    assert!(coord.preview(&dup).is_err());

    let unknown = PaymentSelection::new("SUP-1").with_lots(MineralCategory::Cassiterite, ["C-1"]);
    assert!(coord.preview(&unknown).is_err());
}

#[test]
fn test_mixed_currency_advances_rejected() {
    let mut state = ledger();
    let mut rwf = advance("ADV-RWF", "SUP-1", dec!(130000));
    rwf.currency = Currency::RWF;
    state
        .dispatch(
            LedgerAction::AdvancesLoaded { advances: vec![rwf] },
            &CapabilitySet::all(),
        )
        .unwrap();
    let coord = PaymentCoordinator::new(state, CapabilitySet::all());
    let selection = PaymentSelection::new("SUP-1")
        .with_lots(MineralCategory::Coltan, ["C-1"])
        .with_advances(["ADV-1", "ADV-RWF"]);
    assert!(coord.preview(&selection).is_err());
}

#[test]
fn test_withdrawn_lot_is_not_eligible() {
    let mut state = ledger();
    state
        .dispatch(
            LedgerAction::StockStatusChanged {
                category: MineralCategory::Coltan,
                lot_id: "C-1".into(),
                to: StockStatus::Withdrawn,
                at: at(3),
            },
            &CapabilitySet::all(),
        )
        .unwrap();
    let candidates = eligible_candidates("SUP-1", &state, &state);
    let coltan: Vec<&str> = candidates.lots[&MineralCategory::Coltan]
        .iter()
        .map(|l| l.id.as_str())
        .collect();
    assert_eq!(coltan, vec!["C-2"]);
}

#[test]
fn test_preview_requires_payments_capability() {
    let coord = PaymentCoordinator::new(
        ledger(),
        CapabilitySet::new([Capability::Stock, Capability::Lab]),
    );
    let selection = PaymentSelection::new("SUP-1").with_lots(MineralCategory::Coltan, ["C-1"]);
    assert!(matches!(
        coord.preview(&selection),
        Err(OreSettlementError::Unauthorized { .. })
    ));
}

// ===========================================================================
// Commit
// ===========================================================================

#[test]
fn test_commit_persists_exactly_the_previewed_totals() {
    let mut coord = coordinator();
    let selection = PaymentSelection::new("SUP-1")
        .with_lots(MineralCategory::Coltan, ["C-1", "C-2"])
        .with_lots(MineralCategory::Cassiterite, ["S-1"])
        .with_advances(["ADV-1"]);
    let preview = coord.preview(&selection).unwrap().result;
    let payment = coord.commit(&selection, &preview, at(5)).unwrap();

    assert_eq!(payment.total_amount, preview.total_amount);
    assert_eq!(payment.advance_amount, preview.advance_amount);
    assert_eq!(payment.payable_amount, preview.payable_amount);
    assert_eq!(payment.total_weight, preview.total_weight);
    assert_eq!(payment.lines, preview.lines);
    assert_eq!(payment.created_at, at(5));
    assert_eq!(payment.subtotal_weights[&MineralCategory::Coltan], dec!(300));

    let store = coord.store();
    assert_eq!(store.fetch_payment(&payment.id), Some(payment.clone()));
    assert_eq!(store.list_payments("SUP-1").len(), 1);
    for (category, id) in [
        (MineralCategory::Coltan, "C-1"),
        (MineralCategory::Coltan, "C-2"),
        (MineralCategory::Cassiterite, "S-1"),
    ] {
        assert_eq!(
            store.lot(category, id).unwrap().finance_status,
            FinanceStatus::Paid
        );
    }
    assert_eq!(store.advance("ADV-1").unwrap().status, AdvanceStatus::Paid);
    assert_eq!(store.advance("ADV-2").unwrap().status, AdvanceStatus::Unpaid);
}

#[test]
fn test_consumed_lot_never_eligible_again() {
    let mut coord = coordinator();
    let selection = PaymentSelection::new("SUP-1")
        .with_lots(MineralCategory::Coltan, ["C-1"])
        .with_advances(["ADV-1"]);
    let preview = coord.preview(&selection).unwrap().result;
    coord.commit(&selection, &preview, at(5)).unwrap();

    let candidates = eligible_candidates("SUP-1", coord.store(), coord.store());
    assert!(candidates.lots[&MineralCategory::Coltan]
        .iter()
        .all(|l| l.id != "C-1"));
    assert!(candidates.advances.iter().all(|a| a.id != "ADV-1"));
    assert!(coord
        .store()
        .eligible_lots("SUP-1", MineralCategory::Coltan)
        .iter()
        .all(|l| l.id != "C-1"));

    assert!(coord.preview(&selection).is_err());
    match coord.commit(&selection, &preview, at(6)) {
        Err(OreSettlementError::Consistency { stale_ids }) => {
            assert_eq!(stale_ids, vec!["C-1".to_string(), "ADV-1".to_string()])
        }
        other => panic!("expected consistency error, got {other:?}"),
    }
    assert_eq!(coord.store().payments.len(), 1);
}

#[test]
fn test_stale_commit_mutates_nothing() {
    let mut coord = coordinator();
    let overlapping = PaymentSelection::new("SUP-1")
        .with_lots(MineralCategory::Coltan, ["C-1", "C-2"])
        .with_advances(["ADV-1"]);
    let overlapping_preview = coord.preview(&overlapping).unwrap().result;

    preview_and_commit(
        &mut coord,
        &PaymentSelection::new("SUP-1").with_lots(MineralCategory::Coltan, ["C-2"]),
        at(5),
    )
    .unwrap();
    let before = coord.store().clone();

    // C-1 is still open, C-2 was consumed above: the whole commit must fail.
    assert!(matches!(
        coord.commit(&overlapping, &overlapping_preview, at(6)),
        Err(OreSettlementError::Consistency { .. })
    ));
    assert_eq!(coord.store(), &before);
}

#[test]
fn test_commit_rejects_totals_changed_since_preview() {
    let mut coord = coordinator();
    let selection = PaymentSelection::new("SUP-1")
        .with_lots(MineralCategory::Coltan, ["C-1", "C-2"])
        .with_advances(["ADV-1"]);
    let preview = coord.preview(&selection).unwrap().result;

    // A financial edit lands between preview and commit.
    let mut state = coord.into_store();
    state
        .dispatch(
            LedgerAction::LotEdited {
                category: MineralCategory::Coltan,
                lot_id: "C-1".into(),
                edit: LotEdit::Financial {
                    pricing: PricingInputs {
                        price_per_percentage: Some(dec!(9)),
                        ..pricing()
                    },
                    fee_override: FeeOverride::default(),
                },
                at: at(4),
            },
            &CapabilitySet::all(),
        )
        .unwrap();
    let before = state.clone();
    let mut coord = PaymentCoordinator::new(state, CapabilitySet::all());

    match coord.commit(&selection, &preview, at(5)) {
        Err(OreSettlementError::Consistency { stale_ids }) => {
            assert_eq!(stale_ids, vec!["C-1".to_string()])
        }
        other => panic!("expected consistency error, got {other:?}"),
    }
    assert_eq!(coord.store(), &before);

    // A fresh preview commits with the new totals.
    let repreviewed = coord.preview(&selection).unwrap().result;
    assert!(repreviewed.payable_amount > preview.payable_amount);
    let payment = coord.commit(&selection, &repreviewed, at(5)).unwrap();
    assert_eq!(payment.payable_amount, repreviewed.payable_amount);
}

#[test]
fn test_commit_rejects_preview_of_other_selection() {
    let mut coord = coordinator();
    let one = PaymentSelection::new("SUP-1").with_lots(MineralCategory::Coltan, ["C-1"]);
    let both = PaymentSelection::new("SUP-1").with_lots(MineralCategory::Coltan, ["C-1", "C-2"]);
    let preview_of_one: AggregateResult = coord.preview(&one).unwrap().result;
    match coord.commit(&both, &preview_of_one, at(5)) {
        Err(OreSettlementError::Consistency { stale_ids }) => {
            assert_eq!(stale_ids, vec!["C-2".to_string()])
        }
        other => panic!("expected consistency error, got {other:?}"),
    }
    assert!(coord.store().payments.is_empty());
}

#[test]
fn test_conditional_write_blocks_double_spend() {
    // Two callers aggregate the same lot from the same state; only the
    // first write may succeed.
    let mut state = ledger();
    let selection = PaymentSelection::new("SUP-1").with_lots(MineralCategory::Cassiterite, ["S-1"]);
    let first = aggregate(&selection, &state, &state).unwrap();
    let second = first.clone();

    state
        .create_payment(Payment::from_aggregate("PAY-A", first, at(5)))
        .unwrap();
    let before = state.clone();
    let err = state
        .create_payment(Payment::from_aggregate("PAY-B", second, at(5)))
        .unwrap_err();
    assert!(matches!(err, OreSettlementError::Consistency { .. }));
    assert_eq!(state, before);
}

/// Store whose payment write always fails after the coordinator's checks
/// have passed.
struct FailingPaymentStore {
    inner: LedgerState,
}

impl LotRepository for FailingPaymentStore {
    fn fetch_lot(&self, category: MineralCategory, id: &str) -> Option<MineralLot> {
        self.inner.fetch_lot(category, id)
    }

    fn eligible_lots(&self, supplier_id: &str, category: MineralCategory) -> Vec<MineralLot> {
        self.inner.eligible_lots(supplier_id, category)
    }
}

impl AdvanceRepository for FailingPaymentStore {
    fn fetch_advance(&self, id: &str) -> Option<AdvancePayment> {
        self.inner.fetch_advance(id)
    }

    fn unpaid_advances(&self, supplier_id: &str) -> Vec<AdvancePayment> {
        self.inner.unpaid_advances(supplier_id)
    }
}

impl PaymentRepository for FailingPaymentStore {
    fn create_payment(&mut self, _payment: Payment) -> OreSettlementResult<Payment> {
        Err(OreSettlementError::SerializationError(
            "storage unavailable".into(),
        ))
    }

    fn fetch_payment(&self, id: &str) -> Option<Payment> {
        self.inner.fetch_payment(id)
    }

    fn list_payments(&self, supplier_id: &str) -> Vec<Payment> {
        self.inner.list_payments(supplier_id)
    }
}

#[test]
fn test_failed_write_leaves_everything_unchanged() {
    let state = ledger();
    let before = state.clone();
    let mut coord = PaymentCoordinator::new(FailingPaymentStore { inner: state }, CapabilitySet::all());
    let selection = PaymentSelection::new("SUP-1")
        .with_lots(MineralCategory::Coltan, ["C-1"])
        .with_advances(["ADV-1"]);
    assert!(preview_and_commit(&mut coord, &selection, at(5)).is_err());
    assert_eq!(coord.into_store().inner, before);
}

#[test]
fn test_commit_requires_payments_capability() {
    let mut coord = PaymentCoordinator::new(
        ledger(),
        CapabilitySet::new([Capability::Financial]),
    );
    let selection = PaymentSelection::new("SUP-1").with_lots(MineralCategory::Coltan, ["C-1"]);
    let preview = aggregate(&selection, coord.store(), coord.store()).unwrap();
    assert!(matches!(
        coord.commit(&selection, &preview, at(5)),
        Err(OreSettlementError::Unauthorized { .. })
    ));
    assert!(coord.store().payments.is_empty());
}

// ===========================================================================
// Frozen snapshot
// ===========================================================================

#[test]
fn test_committed_payment_is_a_frozen_snapshot() {
    let mut coord = coordinator();
    let selection = PaymentSelection::new("SUP-1").with_lots(MineralCategory::Coltan, ["C-1"]);
    let payment = preview_and_commit(&mut coord, &selection, at(5)).unwrap();
    let mut state = coord.into_store();
    let paid_settlement = state
        .lot(MineralCategory::Coltan, "C-1")
        .unwrap()
        .settlement
        .clone();

    // Pricing of a paid lot cannot be edited.
    let edit = LedgerAction::LotEdited {
        category: MineralCategory::Coltan,
        lot_id: "C-1".into(),
        edit: LotEdit::Financial {
            pricing: PricingInputs {
                price_per_percentage: Some(dec!(9)),
                ..pricing()
            },
            fee_override: FeeOverride::default(),
        },
        at: at(6),
    };
    assert!(state.dispatch(edit, &CapabilitySet::all()).is_err());

    // A new schedule reprices open lots only.
    let mut newer = schedule(MineralCategory::Coltan);
    newer.version = 2;
    newer.rra_rate = dec!(0.05);
    state
        .dispatch(
            LedgerAction::ScheduleUpdated { schedule: newer },
            &CapabilitySet::all(),
        )
        .unwrap();
    assert_eq!(
        state.lot(MineralCategory::Coltan, "C-1").unwrap().settlement,
        paid_settlement
    );
    assert_ne!(
        state.lot(MineralCategory::Coltan, "C-2").unwrap().settlement.as_ref().unwrap().rra,
        dec!(1200)
    );
    assert_eq!(state.fetch_payment(&payment.id), Some(payment));
}

#[test]
fn test_dispatch_checks_capabilities() {
    let mut state = ledger();
    let before = state.clone();
    let edit = LedgerAction::LotEdited {
        category: MineralCategory::Coltan,
        lot_id: "C-1".into(),
        edit: LotEdit::Stock {
            net_weight: Some(dec!(120)),
        },
        at: at(4),
    };
    let lab_only = CapabilitySet::new([Capability::Lab]);
    assert!(matches!(
        state.dispatch(edit.clone(), &lab_only),
        Err(OreSettlementError::Unauthorized { .. })
    ));
    assert_eq!(state, before);

    state
        .dispatch(edit, &CapabilitySet::new([Capability::Stock]))
        .unwrap();
    let lot = state.lot(MineralCategory::Coltan, "C-1").unwrap();
    assert_eq!(lot.net_weight, Some(dec!(120)));
    assert_eq!(lot.settlement.as_ref().unwrap().total_amount, dec!(24000));
}

#[test]
fn test_ledger_round_trips_through_json() {
    let mut coord = coordinator();
    preview_and_commit(
        &mut coord,
        &PaymentSelection::new("SUP-1").with_lots(MineralCategory::Coltan, ["C-1"]),
        at(5),
    )
    .unwrap();
    let state = coord.into_store();
    let json = serde_json::to_string(&state).unwrap();
    let back: LedgerState = serde_json::from_str(&json).unwrap();
    assert_eq!(back, state);
}

// ===========================================================================
// Loading
// ===========================================================================

#[test]
fn test_lot_loaded_after_schedule_is_payable() {
    let mut state = ledger();
    state
        .dispatch(
            LedgerAction::LotsLoaded {
                lots: vec![coltan_lot("C-8", "SUP-1", dec!(100), Some(dec!(40)))],
            },
            &CapabilitySet::all(),
        )
        .unwrap();
    assert_eq!(
        net_of(&state, MineralCategory::Coltan, "C-8"),
        net_of(&state, MineralCategory::Coltan, "C-1")
    );

    let coord = PaymentCoordinator::new(state, CapabilitySet::all());
    let selection = PaymentSelection::new("SUP-1").with_lots(MineralCategory::Coltan, ["C-8"]);
    assert!(coord.preview(&selection).is_ok());
}

#[test]
fn test_loaded_settlement_without_pricing_is_discarded() {
    let mut state = ledger();
    let copied = state
        .lot(MineralCategory::Coltan, "C-2")
        .unwrap()
        .settlement
        .clone();
    let mut forged = MineralLot::new("C-9", "SUP-1", MineralCategory::Coltan, dec!(200), at(2));
    forged.settlement = copied;
    state
        .dispatch(
            LedgerAction::LotsLoaded { lots: vec![forged] },
            &CapabilitySet::all(),
        )
        .unwrap();
    assert!(state
        .lot(MineralCategory::Coltan, "C-9")
        .unwrap()
        .settlement
        .is_none());

    let coord = PaymentCoordinator::new(state, CapabilitySet::all());
    let selection = PaymentSelection::new("SUP-1").with_lots(MineralCategory::Coltan, ["C-9"]);
    assert!(matches!(
        coord.preview(&selection),
        Err(OreSettlementError::Validation { .. })
    ));
}

#[test]
fn test_deserialized_ledger_is_resettled() {
    let mut json = serde_json::to_value(ledger()).unwrap();
    // Unpriced lot smuggled in with another lot's settlement, and an
    // inflated settlement on a priced one.
    let c2 = json["lots"]["coltan"]["C-2"].clone();
    let mut forged = c2.clone();
    forged["id"] = "C-9".into();
    forged["pricing"] = serde_json::json!({});
    json["lots"]["coltan"]["C-9"] = forged;
    json["lots"]["coltan"]["C-1"]["settlement"] = c2["settlement"].clone();

    let mut state: LedgerState = serde_json::from_value(json).unwrap();
    state.resettle().unwrap();

    assert!(state
        .lot(MineralCategory::Coltan, "C-9")
        .unwrap()
        .settlement
        .is_none());
    assert_eq!(state, ledger_with_c9_unsettled());
}

/// The fixture ledger plus an unpriced C-9.
fn ledger_with_c9_unsettled() -> LedgerState {
    let mut state = ledger();
    let mut lot = coltan_lot("C-9", "SUP-1", dec!(200), Some(dec!(50)));
    lot.pricing = PricingInputs::default();
    state
        .dispatch(
            LedgerAction::LotsLoaded { lots: vec![lot] },
            &CapabilitySet::all(),
        )
        .unwrap();
    state
}

#[test]
fn test_resettle_keeps_paid_lot_snapshot() {
    let mut coord = coordinator();
    let selection = PaymentSelection::new("SUP-1").with_lots(MineralCategory::Coltan, ["C-1"]);
    preview_and_commit(&mut coord, &selection, at(5)).unwrap();
    let mut state = coord.into_store();
    let before = state.clone();

    let mut newer = schedule(MineralCategory::Coltan);
    newer.version = 2;
    newer.rra_rate = dec!(0.05);
    state.schedules.insert(MineralCategory::Coltan, newer);
    state.resettle().unwrap();
    assert_eq!(
        state.lot(MineralCategory::Coltan, "C-1").unwrap().settlement,
        before.lot(MineralCategory::Coltan, "C-1").unwrap().settlement
    );
    assert_ne!(
        state.lot(MineralCategory::Coltan, "C-2").unwrap().settlement,
        before.lot(MineralCategory::Coltan, "C-2").unwrap().settlement
    );
}
