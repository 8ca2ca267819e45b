//! Zone selection, pass isolation and scheduler behaviour

use super::{FlakyStore, StoreCall, TestUtils};
use chrono::Utc;
use funding_anomaly_engine::{
    engine::{
        AnomalyEngine, ContractAnalyzer, ContractOutcome, EngineHealth, PassKind, PassScheduler, PassSnapshot,
        SchedulerState, StandardAnalyzer,
    },
    model::{ContractKey, UpdateZone},
    store::{AnomalyResultStore, SqliteStore},
    EngineError, Result,
};
use std::sync::Arc;
use std::time::Duration;

fn btc() -> ContractKey {
    ContractKey::new("binance", "BTCUSDT")
}

fn eth() -> ContractKey {
    ContractKey::new("bybit", "ETHUSDT")
}

/// BTC is an outlier (active), ETH sits on its mean (stable)
async fn seeded_store() -> Result<SqliteStore> {
    let store = SqliteStore::open_in_memory()?;
    let now = TestUtils::now();
    TestUtils::seed_contract(&store, &btc(), &TestUtils::bimodal_rates(), Some(0.0003), now).await?;
    TestUtils::seed_contract(&store, &eth(), &TestUtils::alternating_rates(), Some(0.00015), now).await?;
    Ok(store)
}

#[tokio::test]
async fn test_zone_passes_follow_stored_membership() -> Result<()> {
    let store = Arc::new(seeded_store().await?);
    let now = TestUtils::now();
    let engine = AnomalyEngine::new(Arc::clone(&store), TestUtils::create_test_config(), EngineHealth::new());

    engine.run_pass_at(PassKind::Bootstrap, now).await?;
    let membership = store.zone_membership().await?;
    assert_eq!(membership.get(&btc()), Some(&UpdateZone::Active));
    assert_eq!(membership.get(&eth()), Some(&UpdateZone::Stable));

    let active = engine.run_pass_at(PassKind::Active, now).await?;
    assert_eq!(active.contracts_selected, 1);
    assert_eq!(active.active_after, 1);

    let stable = engine.run_pass_at(PassKind::Stable, now).await?;
    assert_eq!(stable.contracts_selected, 1);
    assert_eq!(stable.stable_after, 1);

    // ETH spikes; the stable pass that covers it promotes it to the active timer
    TestUtils::set_current(&store, &eth(), 0.0008, now).await?;
    let stable = engine.run_pass_at(PassKind::Stable, now).await?;
    assert_eq!(stable.active_after, 1);
    assert_eq!(store.zone_membership().await?.get(&eth()), Some(&UpdateZone::Active));

    let active = engine.run_pass_at(PassKind::Active, now).await?;
    assert_eq!(active.contracts_selected, 2);

    Ok(())
}

#[tokio::test]
async fn test_unclassified_contracts_join_active_pass() -> Result<()> {
    let store = Arc::new(seeded_store().await?);
    let now = TestUtils::now();
    let engine = AnomalyEngine::new(Arc::clone(&store), TestUtils::create_test_config(), EngineHealth::new());

    // No bootstrap yet: nothing is classified
    let report = engine.run_pass_at(PassKind::Active, now).await?;
    assert_eq!(report.contracts_selected, 2);
    assert_eq!(report.written, 2);

    let stable = engine.run_pass_at(PassKind::Stable, now).await?;
    assert_eq!(stable.contracts_selected, 1);

    Ok(())
}

#[tokio::test]
async fn test_failed_write_leaves_other_rows_untouched() -> Result<()> {
    let store = Arc::new(FlakyStore::new(seeded_store().await?));
    let now = TestUtils::now();
    let health = EngineHealth::new();
    let engine = AnomalyEngine::new(Arc::clone(&store), TestUtils::create_test_config(), health.clone());

    engine.run_pass_at(PassKind::Bootstrap, now).await?;
    let btc_before = store.fetch_result(&btc()).await?;
    let eth_before = store.fetch_result(&eth()).await?;

    store.set_fail_writes(true);
    let later = now + chrono::Duration::minutes(1);
    let err = engine.run_pass_at(PassKind::Active, later).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<EngineError>(), Some(EngineError::WriteFailure(_))));

    assert_eq!(store.fetch_result(&btc()).await?, btc_before);
    assert_eq!(store.fetch_result(&eth()).await?, eth_before);

    let snapshot = health.snapshot().await;
    assert_eq!(snapshot.passes_failed, 1);
    assert!(snapshot.last_error.unwrap().starts_with("active pass"));

    // The stable timer is unaffected once the store recovers
    store.set_fail_writes(false);
    let stable = engine.run_pass_at(PassKind::Stable, later).await?;
    assert_eq!(stable.written, 1);
    let eth_after = store.fetch_result(&eth()).await?.expect("result row");
    assert_eq!(eth_after.calculated_at, later);
    assert_eq!(store.fetch_result(&btc()).await?, btc_before);
    assert_eq!(health.snapshot().await.consecutive_failures, 0);

    Ok(())
}

/// Panics on one contract to simulate a crashed worker
struct PanickingAnalyzer {
    poison: ContractKey,
}

impl ContractAnalyzer for PanickingAnalyzer {
    fn analyze(&self, snapshot: &PassSnapshot, key: &ContractKey) -> ContractOutcome {
        if *key == self.poison {
            panic!("worker crashed on {}", key);
        }
        StandardAnalyzer.analyze(snapshot, key)
    }
}

#[tokio::test]
async fn test_worker_failure_only_loses_its_chunk() -> Result<()> {
    let store = Arc::new(SqliteStore::open_in_memory()?);
    let now = TestUtils::now();
    let keys: Vec<ContractKey> = ["AAVEUSDT", "BNBUSDT", "DOGEUSDT", "XRPUSDT"]
        .iter()
        .map(|symbol| ContractKey::new("binance", *symbol))
        .collect();
    for key in &keys {
        TestUtils::seed_contract(&store, key, &TestUtils::alternating_rates(), Some(0.00015), now).await?;
    }

    let analyzer = Arc::new(PanickingAnalyzer {
        poison: keys[0].clone(),
    });
    let engine = AnomalyEngine::with_analyzer(
        Arc::clone(&store),
        TestUtils::create_test_config(),
        EngineHealth::new(),
        analyzer,
    );

    let report = engine.run_pass_at(PassKind::Bootstrap, now).await?;
    assert_eq!(report.chunks, 2);
    assert_eq!(report.failed_chunks, 1);
    assert_eq!(report.errors, 2);
    assert_eq!(report.computed, 2);
    assert_eq!(report.written, 2);

    assert!(store.fetch_result(&keys[0]).await?.is_none());
    assert!(store.fetch_result(&keys[1]).await?.is_none());
    assert!(store.fetch_result(&keys[2]).await?.is_some());
    assert!(store.fetch_result(&keys[3]).await?.is_some());

    Ok(())
}

#[tokio::test]
async fn test_scheduler_runs_until_stopped() -> Result<()> {
    let store = Arc::new(SqliteStore::open_in_memory()?);
    let now = Utc::now();
    TestUtils::seed_contract(&store, &btc(), &TestUtils::bimodal_rates(), Some(0.0003), now).await?;
    TestUtils::seed_contract(&store, &eth(), &TestUtils::alternating_rates(), Some(0.00015), now).await?;

    let health = EngineHealth::new();
    let engine = Arc::new(AnomalyEngine::new(
        Arc::clone(&store),
        TestUtils::create_test_config(),
        health.clone(),
    ));
    let (scheduler, handle) =
        PassScheduler::with_intervals(engine, Duration::from_millis(25), Duration::from_millis(60))?;

    let task = tokio::spawn(scheduler.run());
    tokio::time::sleep(Duration::from_millis(400)).await;
    handle.stop();
    task.await.expect("scheduler task")?;

    let snapshot = health.snapshot().await;
    assert_eq!(snapshot.state, SchedulerState::Stopped);
    assert!(snapshot.bootstrapped);
    assert_eq!(snapshot.passes_failed, 0);

    let active = &snapshot.last_reports[&PassKind::Active];
    assert_eq!(active.contracts_selected, 1);
    let stable = &snapshot.last_reports[&PassKind::Stable];
    assert_eq!(stable.contracts_selected, 1);

    assert_eq!(store.zone_membership().await?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_snapshot_query_failures_abort_only_that_pass() -> Result<()> {
    let store = Arc::new(FlakyStore::new(seeded_store().await?));
    let now = TestUtils::now();
    let health = EngineHealth::new();
    let engine = AnomalyEngine::new(Arc::clone(&store), TestUtils::create_test_config(), health.clone());

    engine.run_pass_at(PassKind::Bootstrap, now).await?;
    let btc_before = store.fetch_result(&btc()).await?;
    let eth_before = store.fetch_result(&eth()).await?;

    let later = now + chrono::Duration::minutes(1);
    let cases = [
        (StoreCall::CurrentFunding, PassKind::Stable),
        (StoreCall::Metadata, PassKind::Bootstrap),
        (StoreCall::ZoneMembership, PassKind::Active),
    ];
    for (index, (call, kind)) in cases.into_iter().enumerate() {
        store.set_failing(call, true);
        let err = engine.run_pass_at(kind, later).await.unwrap_err();
        assert!(
            matches!(err.downcast_ref::<EngineError>(), Some(EngineError::QueryFailure(_))),
            "{:?} failure surfaced as {}",
            call,
            err
        );
        store.set_failing(call, false);

        assert_eq!(store.fetch_result(&btc()).await?, btc_before);
        assert_eq!(store.fetch_result(&eth()).await?, eth_before);
        assert_eq!(health.snapshot().await.passes_failed, index as u64 + 1);
    }

    let snapshot = health.snapshot().await;
    assert_eq!(snapshot.consecutive_failures, 3);
    assert!(snapshot.last_error.unwrap().starts_with("active pass"));

    let report = engine.run_pass_at(PassKind::Active, later).await?;
    assert_eq!(report.written, 1);
    assert_eq!(store.fetch_result(&btc()).await?.expect("result row").calculated_at, later);
    assert_eq!(health.snapshot().await.consecutive_failures, 0);

    Ok(())
}

#[tokio::test]
async fn test_scheduler_survives_failed_passes() -> Result<()> {
    let inner = SqliteStore::open_in_memory()?;
    let now = Utc::now();
    TestUtils::seed_contract(&inner, &btc(), &TestUtils::bimodal_rates(), Some(0.0003), now).await?;
    TestUtils::seed_contract(&inner, &eth(), &TestUtils::alternating_rates(), Some(0.00015), now).await?;
    let store = Arc::new(FlakyStore::new(inner));

    let health = EngineHealth::new();
    let engine = Arc::new(AnomalyEngine::new(
        Arc::clone(&store),
        TestUtils::create_test_config(),
        health.clone(),
    ));
    let (scheduler, handle) =
        PassScheduler::with_intervals(engine, Duration::from_millis(20), Duration::from_millis(40))?;
    let task = tokio::spawn(scheduler.run());

    for _ in 0..100 {
        if health.is_bootstrapped().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(health.is_bootstrapped().await);

    store.set_failing(StoreCall::CurrentFunding, true);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let failing = health.snapshot().await;
    assert!(failing.passes_failed >= 1);
    assert!(failing.consecutive_failures >= 1);
    assert_ne!(failing.state, SchedulerState::Stopped);

    store.set_failing(StoreCall::CurrentFunding, false);
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.stop();
    task.await.expect("scheduler task")?;

    let recovered = health.snapshot().await;
    assert_eq!(recovered.state, SchedulerState::Stopped);
    assert!(recovered.passes_succeeded > failing.passes_succeeded);
    assert_eq!(recovered.consecutive_failures, 0);

    Ok(())
}
