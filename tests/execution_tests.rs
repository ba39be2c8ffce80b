//! Positions either fill every leg or unwind, and the ledger balances either way.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::{broadcast, mpsc};

use plutus::domain::{AssetId, PositionStatus, Side};
use plutus::error::LedgerError;
use plutus::exchange::OrderGateway;
use plutus::execution::{Coordinator, KillSwitch, MarketUpdate, PositionEvent};
use plutus::ledger::{replay, AuditEntry, AuditSink, Ledger, MemorySink};
use plutus::risk::{RiskGate, SizedTrade};
use plutus::testkit::config::execution;
use plutus::testkit::domain::{key, structural_opportunity};
use plutus::testkit::gateway::{Fill, ScriptedGateway};

struct Setup {
    coordinator: Coordinator,
    ledger: Arc<Ledger>,
    events: mpsc::UnboundedReceiver<PositionEvent>,
    updates: broadcast::Sender<MarketUpdate>,
}

fn setup(gateway: ScriptedGateway) -> Setup {
    let ledger = Ledger::new(dec!(1_000), dec!(100), Utc::now()).unwrap();
    setup_with(gateway, ledger)
}

fn setup_with(gateway: ScriptedGateway, ledger: Ledger) -> Setup {
    let ledger = Arc::new(ledger);
    let (events_tx, events) = mpsc::unbounded_channel();
    let (updates, _) = broadcast::channel(16);
    let coordinator = Coordinator::new(
        vec![Arc::new(gateway) as Arc<dyn OrderGateway>],
        Arc::clone(&ledger),
        execution(),
        KillSwitch::new(),
        events_tx,
        updates.clone(),
    );
    Setup {
        coordinator,
        ledger,
        events,
        updates,
    }
}

/// Persists the first `healthy` entries, then refuses every write.
struct FlakySink {
    stored: MemorySink,
    healthy: usize,
    appends: AtomicUsize,
}

impl FlakySink {
    fn new(healthy: usize) -> Self {
        Self {
            stored: MemorySink::new(),
            healthy,
            appends: AtomicUsize::new(0),
        }
    }
}

impl AuditSink for FlakySink {
    fn append(&self, entry: &AuditEntry) -> Result<(), LedgerError> {
        if self.appends.fetch_add(1, Ordering::SeqCst) >= self.healthy {
            return Err(LedgerError::Sink("database is locked".into()));
        }
        self.stored.append(entry)
    }

    fn load(&self) -> Result<Vec<AuditEntry>, LedgerError> {
        self.stored.load()
    }
}

fn drain_statuses(
    events: &mut mpsc::UnboundedReceiver<PositionEvent>,
) -> Vec<(&'static str, PositionStatus)> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push((event.kind(), event.status()));
    }
    seen
}

fn sized(size: Decimal) -> SizedTrade {
    let opportunity = structural_opportunity(dec!(0.45), dec!(0.45), dec!(100));
    SizedTrade {
        notional: size * opportunity.notional_per_unit(),
        opportunity,
        size,
        kelly_fraction: dec!(0.1),
    }
}

fn assert_balanced(ledger: &Ledger) {
    ledger.verify().unwrap();
    assert_eq!(replay(&ledger.entries()).unwrap(), ledger.state());
}

#[tokio::test]
async fn failing_scripts_always_end_rolled_back() {
    let scripts = [
        ScriptedGateway::new("pm").script_side("m1-no", Side::Buy, Fill::Rest),
        ScriptedGateway::new("pm").script_side("m1-no", Side::Buy, Fill::Partial(dec!(4))),
        ScriptedGateway::new("pm").script("m1-no", Fill::Reject),
        ScriptedGateway::new("pm").script("m1-yes", Fill::Refuse),
        ScriptedGateway::new("pm").with_default(Fill::Rest),
    ];

    for gateway in scripts {
        let s = setup(gateway);
        let (_, task) = s.coordinator.open(sized(dec!(10))).unwrap();

        let position = tokio::time::timeout(StdDuration::from_secs(5), task.run())
            .await
            .expect("task finishes after the fill timeout");

        assert_eq!(position.status(), PositionStatus::Failed);
        assert!(position.failure().is_some());
        let snapshot = s.ledger.snapshot();
        assert_eq!(snapshot.open_reservations, 0);
        assert_eq!(snapshot.open_notional, Decimal::ZERO);
        // flattening can only cost the slippage concession
        assert!(snapshot.cash <= dec!(1_000));
        assert!(snapshot.cash > dec!(999));
        assert!(!s.coordinator.kill_switch().is_tripped());
        assert_balanced(&s.ledger);
    }
}

#[tokio::test]
async fn complete_fill_holds_the_reservation_until_exit() {
    let mut s = setup(ScriptedGateway::new("pm"));
    let (position, task) = s.coordinator.open(sized(dec!(10))).unwrap();
    let handle = tokio::spawn(task.run());

    let filled = tokio::time::timeout(StdDuration::from_secs(5), async {
        loop {
            match s.events.recv().await {
                Some(event) if event.status() == PositionStatus::Filled => return event,
                Some(_) => {}
                None => panic!("events closed before fill"),
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(filled.position_id(), position.id());
    assert!(filled.position().all_legs_filled());
    let snapshot = s.ledger.snapshot();
    assert_eq!(snapshot.open_reservations, 1);
    assert_eq!(snapshot.open_notional, dec!(9));

    // forced exit sells both legs back
    s.coordinator.kill_switch().trip("test shutdown");
    let closed = tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(closed.status(), PositionStatus::Closed);
    assert_eq!(s.ledger.snapshot().open_reservations, 0);
    assert_balanced(&s.ledger);

    // FILLED -> RESOLVING -> CLOSED
    assert_eq!(
        drain_statuses(&mut s.events),
        vec![
            ("updated", PositionStatus::Resolving),
            ("closed", PositionStatus::Closed),
        ]
    );
}

#[tokio::test]
async fn refused_commit_leaves_the_position_resolving() {
    // genesis and the reservation persist, the settlement write does not
    let sink = Arc::new(FlakySink::new(2));
    let ledger = Ledger::open(dec!(1_000), dec!(100), sink, Utc::now()).unwrap();
    let mut s = setup_with(ScriptedGateway::new("pm"), ledger);
    let (_, task) = s.coordinator.open(sized(dec!(10))).unwrap();
    s.updates
        .send(MarketUpdate::Resolved {
            key: key("pm", "m1"),
            winning_asset: AssetId::from("m1-yes"),
        })
        .unwrap();

    let position = tokio::time::timeout(StdDuration::from_secs(5), task.run())
        .await
        .unwrap();

    assert_eq!(position.status(), PositionStatus::Resolving);
    assert_eq!(position.realized_pnl(), None);
    let kill_switch = s.coordinator.kill_switch();
    assert!(kill_switch.is_tripped());
    assert!(kill_switch.reason().unwrap().contains("audit sink failure"));

    let snapshot = s.ledger.snapshot();
    assert_eq!(snapshot.open_reservations, 1);
    assert_eq!(snapshot.open_notional, dec!(9));
    assert_eq!(snapshot.cash, dec!(991));
    assert_balanced(&s.ledger);

    let seen = drain_statuses(&mut s.events);
    assert!(seen.iter().all(|(kind, _)| *kind == "updated"));
    assert_eq!(seen.last(), Some(&("updated", PositionStatus::Resolving)));
}

#[tokio::test]
async fn gate_and_coordinator_agree_on_notional() {
    let s = setup(ScriptedGateway::new("pm"));
    let gate = RiskGate::new(plutus::app::RiskConfig {
        max_position_notional: dec!(25),
        ..plutus::app::RiskConfig::default()
    });
    let opportunity = structural_opportunity(dec!(0.45), dec!(0.45), dec!(100));

    let trade = gate.evaluate(&opportunity, &s.ledger.snapshot(), 0).unwrap();
    let notional = trade.notional;
    let (position, _task) = s.coordinator.open(trade).unwrap();

    assert_eq!(position.reserved(), notional);
    assert_eq!(s.ledger.snapshot().open_notional, notional);
    assert!(notional <= dec!(25));
}
