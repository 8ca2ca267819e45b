//! End-to-end passes over a seeded in-memory store

use super::TestUtils;
use funding_anomaly_engine::{
    engine::{AnomalyEngine, EngineHealth, PassKind},
    model::{ConfidenceLevel, ContractKey, UpdateZone},
    store::{AnomalyResultStore, SqliteStore},
    Result,
};
use std::sync::Arc;

fn engine(store: &Arc<SqliteStore>) -> AnomalyEngine<SqliteStore> {
    AnomalyEngine::new(Arc::clone(store), TestUtils::create_test_config(), EngineHealth::new())
}

#[tokio::test]
async fn test_outlier_contract_scores_and_moves_to_active() -> Result<()> {
    let store = Arc::new(SqliteStore::open_in_memory()?);
    let now = TestUtils::now();
    let key = ContractKey::new("binance", "BTCUSDT");
    TestUtils::seed_contract(&store, &key, &TestUtils::bimodal_rates(), Some(0.0003), now).await?;

    let report = engine(&store).run_pass_at(PassKind::Bootstrap, now).await?;
    assert_eq!(report.computed, 1);
    assert_eq!(report.written, 1);
    assert_eq!(report.active_after, 1);

    let result = store.fetch_result(&key).await?.expect("result row");
    assert!((result.z_score.unwrap() - 4.0).abs() < 1e-6);
    assert!((result.z_score_apr.unwrap() - 4.0).abs() < 1e-6);
    assert_eq!(result.update_zone, UpdateZone::Active);
    assert_eq!(result.confidence_level, ConfidenceLevel::Medium);
    assert_eq!(result.data_points, 85);
    assert_eq!(result.expected_points, 90);
    assert!((result.completeness_percentage - 94.444).abs() < 0.01);
    assert_eq!(result.percentile, Some(100));
    assert!((result.current_apr - 32.85).abs() < 1e-9);
    assert!((result.summary.rate.mean - 0.0001).abs() < 1e-12);
    assert!((result.summary.rate.std_dev - 0.00005).abs() < 1e-12);
    assert_eq!(result.calculated_at, now);

    Ok(())
}

#[tokio::test]
async fn test_sparse_contract_is_never_written() -> Result<()> {
    let store = Arc::new(SqliteStore::open_in_memory()?);
    let now = TestUtils::now();
    let sparse = ContractKey::new("bybit", "NEWUSDT");
    TestUtils::seed_contract(&store, &sparse, &[0.0001; 9], Some(0.0002), now).await?;

    let report = engine(&store).run_pass_at(PassKind::Bootstrap, now).await?;
    assert_eq!(report.computed, 0);
    assert_eq!(report.skipped.insufficient_samples, 1);
    assert_eq!(report.written, 0);
    assert!(store.fetch_result(&sparse).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_constant_baseline_has_no_z_score() -> Result<()> {
    let store = Arc::new(SqliteStore::open_in_memory()?);
    let now = TestUtils::now();
    let flat = ContractKey::new("okx", "SOLUSDT");
    TestUtils::seed_contract(&store, &flat, &[0.0001; 20], Some(0.0005), now).await?;

    engine(&store).run_pass_at(PassKind::Bootstrap, now).await?;

    let result = store.fetch_result(&flat).await?.expect("result row");
    assert_eq!(result.z_score, None);
    assert_eq!(result.z_score_apr, None);
    assert_eq!(result.summary.rate.std_dev, 0.0);
    assert_eq!(result.update_zone, UpdateZone::Stable);
    assert_eq!(result.confidence_level, ConfidenceLevel::Low);
    assert_eq!(result.percentile, Some(100));

    Ok(())
}

#[tokio::test]
async fn test_contract_without_history_is_excluded() -> Result<()> {
    let store = Arc::new(SqliteStore::open_in_memory()?);
    let now = TestUtils::now();
    let listed = ContractKey::new("binance", "ETHUSDT");
    let fresh = ContractKey::new("binance", "PEPEUSDT");
    TestUtils::seed_contract(&store, &listed, &TestUtils::alternating_rates(), Some(0.00015), now).await?;
    TestUtils::set_current(&store, &fresh, 0.001, now).await?;

    let report = engine(&store).run_pass_at(PassKind::Bootstrap, now).await?;
    assert_eq!(report.contracts_selected, 2);
    assert_eq!(report.computed, 1);
    assert_eq!(report.skipped.no_history, 1);
    assert!(store.fetch_result(&fresh).await?.is_none());

    let membership = store.zone_membership().await?;
    assert_eq!(membership.len(), 1);
    assert_eq!(membership.get(&listed), Some(&UpdateZone::Stable));

    Ok(())
}

#[tokio::test]
async fn test_repeated_pass_is_idempotent() -> Result<()> {
    let store = Arc::new(SqliteStore::open_in_memory()?);
    let now = TestUtils::now();
    let keys = [
        ContractKey::new("binance", "BTCUSDT"),
        ContractKey::new("bybit", "ETHUSDT"),
    ];
    TestUtils::seed_contract(&store, &keys[0], &TestUtils::bimodal_rates(), Some(0.0003), now).await?;
    TestUtils::seed_contract(&store, &keys[1], &TestUtils::alternating_rates(), None, now).await?;

    let engine = engine(&store);
    engine.run_pass_at(PassKind::Bootstrap, now).await?;
    let first: Vec<_> = [store.fetch_result(&keys[0]).await?, store.fetch_result(&keys[1]).await?].into();

    let report = engine.run_pass_at(PassKind::Bootstrap, now).await?;
    assert_eq!(report.written, 2);
    let second: Vec<_> = [store.fetch_result(&keys[0]).await?, store.fetch_result(&keys[1]).await?].into();

    assert!(first.iter().all(Option::is_some));
    assert_eq!(first, second);
    assert_eq!(store.zone_membership().await?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_latest_observation_stands_in_for_missing_current() -> Result<()> {
    let store = Arc::new(SqliteStore::open_in_memory()?);
    let now = TestUtils::now();
    let key = ContractKey::new("bybit", "ETHUSDT");
    // Newest sample first: 0.0001
    TestUtils::seed_contract(&store, &key, &TestUtils::alternating_rates(), None, now).await?;

    engine(&store).run_pass_at(PassKind::Bootstrap, now).await?;

    let result = store.fetch_result(&key).await?.expect("result row");
    assert_eq!(result.current_rate, 0.0001);
    assert!(result.z_score.unwrap() < 0.0);
    assert_eq!(result.update_zone, UpdateZone::Stable);

    Ok(())
}
