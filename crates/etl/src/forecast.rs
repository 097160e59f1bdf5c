//! 预测调度
//!
//! 把模型在测试集上的输出逐条映射成带整点时间戳的预测记录。
//! 时间由 (日期, 小时) 游标给出：游标从库中最近一条记录的时间开始，
//! 每尝试一条预测（无论是否写入）前进一小时，到 24 点滚动到下一天。
//!
//! 停止条件在每次迭代前检查，任一满足即停止：
//! - 已尝试 `horizon_hours` 条
//! - 游标日期是 `stop_weekday`
//! - 模型输出已用完

use crate::storage::PersistenceGateway;
use crate::types::{ETLError, ETLResult, ForecastConfig, ForecastRecord, N_FEATURES};
use aqi_ml::MinMaxScaler;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use ndarray::{Array1, Array2, ArrayView1};
use std::fmt;

/// (日期, 小时) 游标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForecastCursor {
    date: NaiveDate,
    hour: u32,
}

impl ForecastCursor {
    /// `hour` 必须小于 24
    pub fn new(date: NaiveDate, hour: u32) -> Option<Self> {
        (hour < 24).then_some(Self { date, hour })
    }

    /// 取最近一条记录的日期与小时；没有记录时用默认起点
    pub fn seeded(last: Option<NaiveDateTime>, default: NaiveDateTime) -> Self {
        let seed = last.unwrap_or(default);
        Self {
            date: seed.date(),
            hour: seed.hour(),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn weekday(&self) -> Weekday {
        self.date.weekday()
    }

    /// 当前整点时间，分秒为 0
    pub fn timestamp(&self) -> NaiveDateTime {
        self.date.and_time(NaiveTime::MIN) + Duration::hours(i64::from(self.hour))
    }

    /// 前进一小时，24 点滚动到下一天
    pub fn advance(&mut self) {
        self.hour += 1;
        if self.hour == 24 {
            self.hour = 0;
            self.date = self.date.succ_opt().unwrap_or(NaiveDate::MAX);
        }
    }
}

/// 停止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    HorizonReached,
    StopWeekday(Weekday),
    OutputsExhausted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::HorizonReached => write!(f, "horizon reached"),
            StopReason::StopWeekday(day) => write!(f, "reached {}", day),
            StopReason::OutputsExhausted => write!(f, "model outputs exhausted"),
        }
    }
}

/// 调度结果
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleReport {
    /// 尝试的迭代数（含被拒绝与写入失败的）
    pub attempted: usize,
    pub persisted: usize,
    /// AQI 非有限或 <= 0 而跳过的
    pub rejected: usize,
    /// 写入失败或未确认写入一行的
    pub failed: usize,
    pub stop_reason: StopReason,
    /// 最后一次尝试的时间
    pub last_slot: Option<NaiveDateTime>,
    /// 停止时的游标位置
    pub next_cursor: ForecastCursor,
}

/// AQI 保留两位小数
pub fn round_aqi(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// 反归一化一行特征，得到物理单位的值
pub fn physical_features(
    scaler: &MinMaxScaler,
    row: ArrayView1<f64>,
) -> ETLResult<[f64; N_FEATURES]> {
    let denormalized = scaler.inverse_transform_row(row)?;
    let mut values = [0.0; N_FEATURES];
    for (value, x) in values.iter_mut().zip(denormalized.iter()) {
        *value = *x;
    }
    Ok(values)
}

/// 预测调度器
#[derive(Debug, Clone)]
pub struct ForecastScheduler {
    horizon_hours: usize,
    stop_weekday: Weekday,
}

impl ForecastScheduler {
    pub fn new(horizon_hours: usize, stop_weekday: Weekday) -> Self {
        Self {
            horizon_hours,
            stop_weekday,
        }
    }

    pub fn from_config(config: &ForecastConfig) -> Self {
        Self::new(config.horizon_hours, config.stop_weekday)
    }

    fn stop_reason(
        &self,
        attempted: usize,
        cursor: &ForecastCursor,
        available: usize,
    ) -> Option<StopReason> {
        if attempted >= self.horizon_hours {
            Some(StopReason::HorizonReached)
        } else if cursor.weekday() == self.stop_weekday {
            Some(StopReason::StopWeekday(self.stop_weekday))
        } else if attempted >= available {
            Some(StopReason::OutputsExhausted)
        } else {
            None
        }
    }

    /// 不做任何写入，只计算会尝试的时间序列
    pub fn plan(&self, mut cursor: ForecastCursor, available: usize) -> Vec<NaiveDateTime> {
        let mut slots = Vec::new();
        while self.stop_reason(slots.len(), &cursor, available).is_none() {
            slots.push(cursor.timestamp());
            cursor.advance();
        }
        slots
    }

    /// 按顺序逐条生成并写入预测
    ///
    /// `features` 为归一化后的测试集特征，`predictions` 为对应的 AQI 预测，
    /// 两者按行对齐。单条写入失败只记录日志，不中断循环。
    pub async fn run(
        &self,
        mut cursor: ForecastCursor,
        features: &Array2<f64>,
        predictions: &Array1<f64>,
        scaler: &MinMaxScaler,
        store: &dyn PersistenceGateway,
    ) -> ETLResult<ScheduleReport> {
        if features.ncols() != N_FEATURES || scaler.n_features() != N_FEATURES {
            return Err(ETLError::InvalidConfig(format!(
                "特征维度不一致: features {}, scaler {}, expected {}",
                features.ncols(),
                scaler.n_features(),
                N_FEATURES
            )));
        }

        if features.nrows() != predictions.len() {
            tracing::warn!(
                "Feature rows ({}) and predictions ({}) differ, using the shorter",
                features.nrows(),
                predictions.len()
            );
        }
        let available = features.nrows().min(predictions.len());

        tracing::info!(
            "Scheduling forecasts from {} ({} outputs, horizon {}, stop on {})",
            cursor.timestamp(),
            available,
            self.horizon_hours,
            self.stop_weekday
        );

        let mut attempted = 0;
        let mut persisted = 0;
        let mut rejected = 0;
        let mut failed = 0;
        let mut last_slot = None;

        let stop_reason = loop {
            if let Some(reason) = self.stop_reason(attempted, &cursor, available) {
                break reason;
            }

            let slot = cursor.timestamp();
            let raw_aqi = predictions[attempted];
            let usaqi = round_aqi(raw_aqi);
            let values = physical_features(scaler, features.row(attempted))?;

            if !(usaqi.is_finite() && usaqi > 0.0) {
                tracing::warn!(
                    "Rejected prediction {} at {} (features {:?})",
                    raw_aqi,
                    slot,
                    values
                );
                rejected += 1;
            } else if values.iter().any(|x| !x.is_finite()) {
                tracing::warn!(
                    "Rejected forecast at {}: non-finite features {:?} (usaqi {})",
                    slot,
                    values,
                    usaqi
                );
                rejected += 1;
            } else {
                let record = ForecastRecord {
                    usaqi,
                    features: values,
                    todate: slot,
                };

                match store.insert_forecast(&record).await {
                    Ok(outcome) if outcome.is_single_row() => {
                        persisted += 1;
                        tracing::info!("{}", record);
                    }
                    Ok(outcome) => {
                        failed += 1;
                        tracing::warn!(
                            "Insert wrote {} rows instead of 1: {}",
                            outcome.rows_affected,
                            record
                        );
                    }
                    Err(e) => {
                        failed += 1;
                        tracing::error!("Failed to insert forecast: {} ({})", e, record);
                    }
                }
            }

            last_slot = Some(slot);
            attempted += 1;
            cursor.advance();
        };

        tracing::info!(
            "Forecast loop stopped ({}): {} attempted, {} persisted, {} rejected, {} failed",
            stop_reason,
            attempted,
            persisted,
            rejected,
            failed
        );

        Ok(ScheduleReport {
            attempted,
            persisted,
            rejected,
            failed,
            stop_reason,
            last_slot,
            next_cursor: cursor,
        })
    }
}
