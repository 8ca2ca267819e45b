//! SQLite-backed implementation of every store trait

use super::traits::{AnomalyResultStore, CurrentFundingStore, MetadataStore, ObservationRow, ObservationStore};
use crate::{
    model::{
        AnomalyResult, ConfidenceLevel, ContractKey, ContractMetadata, CurrentFunding, HistoricalObservation,
        SeriesSummary, StatisticalSummary, UpdateZone,
    },
    EngineError, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS funding_rate_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    exchange TEXT NOT NULL,
    symbol TEXT NOT NULL,
    funding_rate REAL NULL,
    funding_time INTEGER NOT NULL,
    funding_interval_hours INTEGER NULL,
    mark_price REAL NULL
);
CREATE INDEX IF NOT EXISTS idx_funding_history_key_time
    ON funding_rate_history(exchange, symbol, funding_time DESC);
CREATE INDEX IF NOT EXISTS idx_funding_history_time
    ON funding_rate_history(funding_time);

CREATE TABLE IF NOT EXISTS current_funding (
    exchange TEXT NOT NULL,
    symbol TEXT NOT NULL,
    funding_rate REAL NOT NULL,
    funding_interval_hours INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (exchange, symbol)
);

CREATE TABLE IF NOT EXISTS contract_metadata (
    exchange TEXT NOT NULL,
    symbol TEXT NOT NULL,
    funding_interval_hours INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    data_quality_score REAL NULL,
    PRIMARY KEY (exchange, symbol)
);

CREATE TABLE IF NOT EXISTS contract_anomalies (
    exchange TEXT NOT NULL,
    symbol TEXT NOT NULL,
    current_rate REAL NOT NULL,
    current_apr REAL NOT NULL,
    z_score REAL NULL,
    z_score_apr REAL NULL,
    percentile INTEGER NULL,
    percentile_apr INTEGER NULL,
    mean_rate REAL NOT NULL,
    std_dev_rate REAL NOT NULL,
    min_rate REAL NOT NULL,
    max_rate REAL NOT NULL,
    mean_apr REAL NOT NULL,
    std_dev_apr REAL NOT NULL,
    min_apr REAL NOT NULL,
    max_apr REAL NOT NULL,
    confidence_level TEXT NOT NULL,
    completeness_percentage REAL NOT NULL,
    data_points INTEGER NOT NULL,
    expected_points INTEGER NOT NULL,
    update_zone TEXT NOT NULL,
    calculated_at INTEGER NOT NULL,
    PRIMARY KEY (exchange, symbol)
);
CREATE INDEX IF NOT EXISTS idx_contract_anomalies_zone
    ON contract_anomalies(update_zone);
"#;

const UPSERT_RESULT_SQL: &str = r#"
INSERT INTO contract_anomalies (
    exchange, symbol, current_rate, current_apr,
    z_score, z_score_apr, percentile, percentile_apr,
    mean_rate, std_dev_rate, min_rate, max_rate,
    mean_apr, std_dev_apr, min_apr, max_apr,
    confidence_level, completeness_percentage, data_points, expected_points,
    update_zone, calculated_at
) VALUES (
    ?1, ?2, ?3, ?4,
    ?5, ?6, ?7, ?8,
    ?9, ?10, ?11, ?12,
    ?13, ?14, ?15, ?16,
    ?17, ?18, ?19, ?20,
    ?21, ?22
)
ON CONFLICT(exchange, symbol) DO UPDATE SET
    current_rate = excluded.current_rate,
    current_apr = excluded.current_apr,
    z_score = excluded.z_score,
    z_score_apr = excluded.z_score_apr,
    percentile = excluded.percentile,
    percentile_apr = excluded.percentile_apr,
    mean_rate = excluded.mean_rate,
    std_dev_rate = excluded.std_dev_rate,
    min_rate = excluded.min_rate,
    max_rate = excluded.max_rate,
    mean_apr = excluded.mean_apr,
    std_dev_apr = excluded.std_dev_apr,
    min_apr = excluded.min_apr,
    max_apr = excluded.max_apr,
    confidence_level = excluded.confidence_level,
    completeness_percentage = excluded.completeness_percentage,
    data_points = excluded.data_points,
    expected_points = excluded.expected_points,
    update_zone = excluded.update_zone,
    calculated_at = excluded.calculated_at
"#;

const SELECT_RESULT_SQL: &str = r#"
SELECT exchange, symbol, current_rate, current_apr,
       z_score, z_score_apr, percentile, percentile_apr,
       mean_rate, std_dev_rate, min_rate, max_rate,
       mean_apr, std_dev_apr, min_apr, max_apr,
       confidence_level, completeness_percentage, data_points, expected_points,
       update_zone, calculated_at
FROM contract_anomalies
WHERE exchange = ?1 AND symbol = ?2
"#;

/// Single-database store shared by the engine and the ingest helpers.
///
/// Every call runs on the blocking pool; the connection never blocks a
/// runtime worker thread.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file and ensure the schema exists
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref())?;
        info!("Opened funding database at {}", path.as_ref().display());
        Self::from_connection(conn)
    }

    /// Private in-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| EngineError::QueryFailure("sqlite connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| EngineError::QueryFailure(format!("sqlite task failed: {}", e)))?
    }

    /// Append observations in one transaction
    pub async fn record_observations(&self, rows: &[ObservationRow]) -> Result<usize> {
        let rows = rows.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO funding_rate_history \
                     (exchange, symbol, funding_rate, funding_time, funding_interval_hours, mark_price) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for row in &rows {
                    stmt.execute(params![
                        row.key.exchange,
                        row.key.symbol,
                        row.observation.funding_rate,
                        row.observation.observed_at.timestamp_millis(),
                        row.observation.funding_interval_hours.map(i64::from),
                        row.observation.mark_price,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(rows.len())
        })
        .await
    }

    /// Replace the current funding snapshot of one contract
    pub async fn upsert_current_funding(
        &self,
        key: &ContractKey,
        current: CurrentFunding,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let key = key.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO current_funding \
                 (exchange, symbol, funding_rate, funding_interval_hours, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(exchange, symbol) DO UPDATE SET \
                    funding_rate = excluded.funding_rate, \
                    funding_interval_hours = excluded.funding_interval_hours, \
                    updated_at = excluded.updated_at",
                params![
                    key.exchange,
                    key.symbol,
                    current.rate,
                    i64::from(current.interval_hours),
                    updated_at.timestamp_millis(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Register or update a contract in the metadata table
    pub async fn upsert_metadata(&self, key: &ContractKey, metadata: &ContractMetadata) -> Result<()> {
        let key = key.clone();
        let metadata = metadata.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO contract_metadata \
                 (exchange, symbol, funding_interval_hours, created_at, data_quality_score) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(exchange, symbol) DO UPDATE SET \
                    funding_interval_hours = excluded.funding_interval_hours, \
                    created_at = excluded.created_at, \
                    data_quality_score = excluded.data_quality_score",
                params![
                    key.exchange,
                    key.symbol,
                    i64::from(metadata.funding_interval_hours),
                    metadata.created_at.timestamp_millis(),
                    metadata.data_quality_score,
                ],
            )?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ObservationStore for SqliteStore {
    async fn fetch_observations_since(&self, since: DateTime<Utc>) -> Result<Vec<ObservationRow>> {
        let rows = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT exchange, symbol, funding_rate, funding_time, funding_interval_hours, mark_price \
                     FROM funding_rate_history \
                     WHERE funding_rate IS NOT NULL AND funding_time >= ?1 \
                     ORDER BY exchange, symbol, funding_time DESC",
                )?;
                let rows = stmt
                    .query_map(params![since.timestamp_millis()], |row| {
                        Ok(ObservationRow {
                            key: ContractKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                            observation: HistoricalObservation {
                                funding_rate: row.get(2)?,
                                observed_at: millis_to_datetime(row.get(3)?, 3)?,
                                funding_interval_hours: interval_column(row.get(4)?),
                                mark_price: row.get(5)?,
                            },
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        debug!("Fetched {} observations since {}", rows.len(), since);
        Ok(rows)
    }
}

#[async_trait]
impl CurrentFundingStore for SqliteStore {
    async fn fetch_current_funding(&self) -> Result<HashMap<ContractKey, CurrentFunding>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT exchange, symbol, funding_rate, funding_interval_hours FROM current_funding")?;
            let rows = stmt
                .query_map([], |row| {
                    let key = ContractKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?);
                    let interval: i64 = row.get(3)?;
                    Ok((
                        key,
                        CurrentFunding {
                            rate: row.get(2)?,
                            interval_hours: u32::try_from(interval).unwrap_or(0),
                        },
                    ))
                })?
                .collect::<rusqlite::Result<HashMap<_, _>>>()?;
            Ok(rows)
        })
        .await
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn fetch_contract_metadata(&self) -> Result<HashMap<ContractKey, ContractMetadata>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT exchange, symbol, funding_interval_hours, created_at, data_quality_score \
                 FROM contract_metadata",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    let key = ContractKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?);
                    let interval: i64 = row.get(2)?;
                    Ok((
                        key,
                        ContractMetadata {
                            funding_interval_hours: u32::try_from(interval).unwrap_or(0),
                            created_at: millis_to_datetime(row.get(3)?, 3)?,
                            data_quality_score: row.get(4)?,
                        },
                    ))
                })?
                .collect::<rusqlite::Result<HashMap<_, _>>>()?;
            Ok(rows)
        })
        .await
    }
}

#[async_trait]
impl AnomalyResultStore for SqliteStore {
    async fn upsert_results(&self, results: &[AnomalyResult]) -> Result<usize> {
        let results = results.to_vec();
        self.with_conn(move |conn| {
            // Dropping the transaction without commit rolls the whole batch back
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(UPSERT_RESULT_SQL)?;
                for result in &results {
                    let summary = &result.summary;
                    stmt.execute(params![
                        result.key.exchange,
                        result.key.symbol,
                        result.current_rate,
                        result.current_apr,
                        result.z_score,
                        result.z_score_apr,
                        result.percentile.map(i64::from),
                        result.percentile_apr.map(i64::from),
                        summary.rate.mean,
                        summary.rate.std_dev,
                        summary.rate.min,
                        summary.rate.max,
                        summary.apr.mean,
                        summary.apr.std_dev,
                        summary.apr.min,
                        summary.apr.max,
                        result.confidence_level.as_str(),
                        result.completeness_percentage,
                        result.data_points as i64,
                        result.expected_points as i64,
                        result.update_zone.as_str(),
                        result.calculated_at.timestamp_millis(),
                    ])
                    .map_err(|e| EngineError::WriteFailure(format!("upsert of {} failed: {}", result.key, e)))?;
                }
            }
            tx.commit()
                .map_err(|e| EngineError::WriteFailure(format!("commit failed: {}", e)))?;
            Ok(results.len())
        })
        .await
    }

    async fn zone_membership(&self) -> Result<HashMap<ContractKey, UpdateZone>> {
        let rows = self
            .with_conn(|conn| {
                let mut stmt = conn.prepare("SELECT exchange, symbol, update_zone FROM contract_anomalies")?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            ContractKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                            row.get::<_, String>(2)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        let mut membership = HashMap::with_capacity(rows.len());
        for (key, zone) in rows {
            membership.insert(key, zone.parse::<UpdateZone>()?);
        }
        Ok(membership)
    }

    async fn fetch_result(&self, key: &ContractKey) -> Result<Option<AnomalyResult>> {
        let key = key.clone();
        let raw = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(SELECT_RESULT_SQL, params![key.exchange, key.symbol], RawResultRow::from_row)
                    .optional()?)
            })
            .await?;
        raw.map(RawResultRow::into_result).transpose()
    }
}

/// Column values of a stored result before enum parsing
struct RawResultRow {
    key: ContractKey,
    current_rate: f64,
    current_apr: f64,
    z_score: Option<f64>,
    z_score_apr: Option<f64>,
    percentile: Option<i64>,
    percentile_apr: Option<i64>,
    rate: [f64; 4],
    apr: [f64; 4],
    confidence_level: String,
    completeness_percentage: f64,
    data_points: i64,
    expected_points: i64,
    update_zone: String,
    calculated_at: DateTime<Utc>,
}

impl RawResultRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: ContractKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
            current_rate: row.get(2)?,
            current_apr: row.get(3)?,
            z_score: row.get(4)?,
            z_score_apr: row.get(5)?,
            percentile: row.get(6)?,
            percentile_apr: row.get(7)?,
            rate: [row.get(8)?, row.get(9)?, row.get(10)?, row.get(11)?],
            apr: [row.get(12)?, row.get(13)?, row.get(14)?, row.get(15)?],
            confidence_level: row.get(16)?,
            completeness_percentage: row.get(17)?,
            data_points: row.get(18)?,
            expected_points: row.get(19)?,
            update_zone: row.get(20)?,
            calculated_at: millis_to_datetime(row.get(21)?, 21)?,
        })
    }

    fn into_result(self) -> Result<AnomalyResult> {
        let data_points = usize::try_from(self.data_points).unwrap_or(0);
        let series = |[mean, std_dev, min, max]: [f64; 4]| SeriesSummary {
            mean,
            std_dev,
            min,
            max,
            count: data_points,
        };
        Ok(AnomalyResult {
            key: self.key,
            current_rate: self.current_rate,
            current_apr: self.current_apr,
            z_score: self.z_score,
            z_score_apr: self.z_score_apr,
            percentile: self.percentile.map(clamp_percentile),
            percentile_apr: self.percentile_apr.map(clamp_percentile),
            summary: StatisticalSummary {
                rate: series(self.rate),
                apr: series(self.apr),
            },
            confidence_level: self.confidence_level.parse::<ConfidenceLevel>()?,
            completeness_percentage: self.completeness_percentage,
            data_points,
            expected_points: u64::try_from(self.expected_points).unwrap_or(0),
            update_zone: self.update_zone.parse::<UpdateZone>()?,
            calculated_at: self.calculated_at,
        })
    }
}

fn clamp_percentile(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

fn interval_column(value: Option<i64>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

fn millis_to_datetime(ms: i64, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(column, ms))
}
