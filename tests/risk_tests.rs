//! Risk gate behavior against a live ledger.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use plutus::app::RiskConfig;
use plutus::domain::PositionId;
use plutus::ledger::Ledger;
use plutus::risk::{RejectReason, RiskGate};
use plutus::testkit::domain::structural_opportunity;

fn gate() -> RiskGate {
    RiskGate::new(RiskConfig {
        daily_loss_limit: dec!(100),
        max_position_notional: dec!(50),
        max_open_notional: dec!(200),
        ..RiskConfig::default()
    })
}

#[test]
fn approved_trades_never_exceed_the_position_limit() {
    let gate = gate();
    let ledger = Ledger::new(dec!(10_000), dec!(100), Utc::now()).unwrap();

    let cases = [
        (dec!(0.45), dec!(0.45), dec!(1_000)),
        (dec!(0.30), dec!(0.60), dec!(500)),
        (dec!(0.49), dec!(0.50), dec!(20)),
        (dec!(0.10), dec!(0.10), dec!(5)),
    ];
    for (yes, no, depth) in cases {
        let opportunity = structural_opportunity(yes, no, depth);
        match gate.evaluate(&opportunity, &ledger.snapshot(), 0) {
            Ok(trade) => {
                assert!(trade.notional <= dec!(50), "{yes}/{no}: {}", trade.notional);
                assert!(trade.size <= depth);
                assert!(trade.size > Decimal::ZERO);
            }
            Err(rejection) => assert!(RejectReason::ALL.contains(&rejection.reason)),
        }
    }
}

#[test]
fn daily_loss_at_limit_rejects_until_the_next_day() {
    let gate = gate();
    let today = Utc::now();
    let ledger = Ledger::new(dec!(1_000), dec!(100), today).unwrap();

    let reservation = ledger.reserve(PositionId::new(1), dec!(150)).unwrap();
    ledger
        .commit(PositionId::new(1), reservation, dec!(-100))
        .unwrap();

    let opportunity = structural_opportunity(dec!(0.45), dec!(0.45), dec!(100));
    let rejection = gate
        .evaluate(&opportunity, &ledger.snapshot(), 0)
        .unwrap_err();
    assert_eq!(rejection.reason, RejectReason::LossLimit);
    assert_eq!(rejection.reason.as_str(), "loss-limit");

    // same day: still refused
    assert!(!ledger.roll_day(today).unwrap());
    assert!(gate.evaluate(&opportunity, &ledger.snapshot(), 0).is_err());

    assert!(ledger.roll_day(today + Duration::days(1)).unwrap());
    assert!(gate.evaluate(&opportunity, &ledger.snapshot(), 0).is_ok());
}

#[test]
fn concurrency_limit_is_checked_before_sizing() {
    let gate = RiskGate::new(RiskConfig {
        max_concurrent_positions: 2,
        ..RiskConfig::default()
    });
    let ledger = Ledger::new(dec!(1_000), dec!(100), Utc::now()).unwrap();
    let opportunity = structural_opportunity(dec!(0.45), dec!(0.45), dec!(100));

    assert!(gate.evaluate(&opportunity, &ledger.snapshot(), 1).is_ok());
    assert_eq!(
        gate.evaluate(&opportunity, &ledger.snapshot(), 2)
            .unwrap_err()
            .reason,
        RejectReason::ConcurrencyLimit
    );
}
