//! 预测结果持久化

use crate::types::{ETLError, ETLResult, ForecastRecord, N_FEATURES, TIMESTAMP_FORMAT};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

/// 单次插入的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    pub rows_affected: u64,
    pub row_id: i64,
}

impl InsertOutcome {
    /// 是否恰好写入一行
    pub fn is_single_row(&self) -> bool {
        self.rows_affected == 1
    }
}

/// 持久化网关接口
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// 最近一条预测的时间，库为空时返回 `None`
    async fn last_timestamp(&self) -> ETLResult<Option<NaiveDateTime>>;

    /// 追加一条预测
    async fn insert_forecast(&self, record: &ForecastRecord) -> ETLResult<InsertOutcome>;

    /// 释放连接，预测循环结束后调用一次
    async fn close(&self);
}

/// SQLite 预测存储
pub struct SqliteForecastStore {
    pool: SqlitePool,
}

impl SqliteForecastStore {
    /// 创建新的存储实例
    pub async fn new(database_url: &str) -> ETLResult<Self> {
        // 确保数据库文件的目录存在
        if !database_url.contains(":memory:") {
            let file = database_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(file).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // 内存库每个连接是独立的数据库，只保留一个常驻连接
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;

        let store = Self { pool };
        store.initialize_schema().await?;

        Ok(store)
    }

    /// 初始化数据库schema
    async fn initialize_schema(&self) -> ETLResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS aqi_forecasts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                usaqi REAL NOT NULL,
                co2_ppm REAL NOT NULL,
                co_ppb REAL NOT NULL,
                r_humidity REAL NOT NULL,
                pm2_5 REAL NOT NULL,
                pm10 REAL NOT NULL,
                pm1 REAL NOT NULL,
                pm100 REAL NOT NULL,
                temperature REAL NOT NULL,
                todate TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_aqi_forecasts_todate ON aqi_forecasts(todate)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// 已存储的预测条数
    pub async fn count(&self) -> ETLResult<usize> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM aqi_forecasts")
            .fetch_one(&self.pool)
            .await?;

        Ok(total as usize)
    }

    /// 按时间范围查询预测（闭区间，按时间升序）
    pub async fn fetch_range(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> ETLResult<Vec<ForecastRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT usaqi, co2_ppm, co_ppb, r_humidity, pm2_5, pm10, pm1, pm100, temperature, todate
            FROM aqi_forecasts
            WHERE todate >= ? AND todate <= ?
            ORDER BY todate ASC, id ASC
            "#,
        )
        .bind(start.format(TIMESTAMP_FORMAT).to_string())
        .bind(end.format(TIMESTAMP_FORMAT).to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> ETLResult<ForecastRecord> {
                let mut features = [0.0; N_FEATURES];
                for (j, slot) in features.iter_mut().enumerate() {
                    *slot = row.try_get(j + 1)?;
                }

                Ok(ForecastRecord {
                    usaqi: row.try_get("usaqi")?,
                    features,
                    todate: parse_stored_timestamp(&row.try_get::<String, _>("todate")?)?,
                })
            })
            .collect()
    }
}

fn parse_stored_timestamp(text: &str) -> ETLResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map_err(|e| ETLError::Database(format!("无法解析存储的时间 {}: {}", text, e)))
}

#[async_trait]
impl PersistenceGateway for SqliteForecastStore {
    async fn last_timestamp(&self) -> ETLResult<Option<NaiveDateTime>> {
        let last: Option<String> = sqlx::query_scalar("SELECT MAX(todate) FROM aqi_forecasts")
            .fetch_one(&self.pool)
            .await?;

        last.as_deref().map(parse_stored_timestamp).transpose()
    }

    async fn insert_forecast(&self, record: &ForecastRecord) -> ETLResult<InsertOutcome> {
        let [co2_ppm, co_ppb, r_humidity, pm2_5, pm10, pm1, pm100, temperature] = record.features;

        let result = sqlx::query(
            r#"
            INSERT INTO aqi_forecasts
            (usaqi, co2_ppm, co_ppb, r_humidity, pm2_5, pm10, pm1, pm100, temperature, todate)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.usaqi)
        .bind(co2_ppm)
        .bind(co_ppb)
        .bind(r_humidity)
        .bind(pm2_5)
        .bind(pm10)
        .bind(pm1)
        .bind(pm100)
        .bind(temperature)
        .bind(record.todate.format(TIMESTAMP_FORMAT).to_string())
        .execute(&self.pool)
        .await?;

        Ok(InsertOutcome {
            rows_affected: result.rows_affected(),
            row_id: result.last_insert_rowid(),
        })
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Forecast store connections released");
    }
}

/// 测试用内存网关，可注入失败
#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct MemoryGateway {
        pub records: Mutex<Vec<ForecastRecord>>,
        pub calls: AtomicUsize,
        pub closes: AtomicUsize,
        /// 第几次插入（从 1 开始）返回错误
        pub fail_on_call: Option<usize>,
        pub fail_last_timestamp: bool,
    }

    impl MemoryGateway {
        pub fn with_last(todate: NaiveDateTime) -> Self {
            let existing = ForecastRecord {
                usaqi: 1.0,
                features: [0.0; N_FEATURES],
                todate,
            };
            Self {
                records: Mutex::new(vec![existing]),
                ..Default::default()
            }
        }

        pub fn snapshot(&self) -> Vec<ForecastRecord> {
            self.records.lock().unwrap().clone()
        }

        pub fn close_count(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PersistenceGateway for MemoryGateway {
        async fn last_timestamp(&self) -> ETLResult<Option<NaiveDateTime>> {
            if self.fail_last_timestamp {
                return Err(ETLError::Database("database is locked".to_string()));
            }
            Ok(self.records.lock().unwrap().iter().map(|r| r.todate).max())
        }

        async fn insert_forecast(&self, record: &ForecastRecord) -> ETLResult<InsertOutcome> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_call == Some(call) {
                return Err(ETLError::Database("connection reset".to_string()));
            }

            let mut records = self.records.lock().unwrap();
            records.push(record.clone());
            Ok(InsertOutcome {
                rows_affected: 1,
                row_id: records.len() as i64,
            })
        }

        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn record(usaqi: f64, todate: NaiveDateTime) -> ForecastRecord {
        ForecastRecord {
            usaqi,
            features: [400.0, 250.0, 60.0, 10.0, 18.0, 6.0, 22.0, 19.5],
            todate,
        }
    }

    #[tokio::test]
    async fn test_empty_store_has_no_last_timestamp() {
        let store = SqliteForecastStore::new("sqlite::memory:").await.unwrap();
        assert_eq!(store.last_timestamp().await.unwrap(), None);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_and_query() {
        let store = SqliteForecastStore::new("sqlite::memory:").await.unwrap();

        let outcome = store.insert_forecast(&record(41.5, at(2, 9))).await.unwrap();
        assert!(outcome.is_single_row());
        store.insert_forecast(&record(39.25, at(2, 23))).await.unwrap();
        store.insert_forecast(&record(40.0, at(1, 23))).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 3);
        assert_eq!(store.last_timestamp().await.unwrap(), Some(at(2, 23)));

        let rows = store.fetch_range(at(2, 0), at(2, 23)).await.unwrap();
        assert_eq!(rows, vec![record(41.5, at(2, 9)), record(39.25, at(2, 23))]);

        store.close().await;
    }
}
