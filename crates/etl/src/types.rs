//! 核心类型定义

use aqi_ml::{MLError, MlpConfig};
use chrono::{NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type ETLResult<T> = Result<T, ETLError>;

#[derive(Debug, Error)]
pub enum ETLError {
    #[error("HTTP 请求失败: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("JSON 解析失败: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("数据源错误: {0}")]
    DataSource(String),

    #[error("没有有效样本 (共 {total} 条)")]
    NoValidSamples { total: usize },

    #[error("无效的配置: {0}")]
    InvalidConfig(String),

    #[error("模型错误: {0}")]
    Model(#[from] MLError),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for ETLError {
    fn from(e: sqlx::Error) -> Self {
        ETLError::Database(e.to_string())
    }
}

/// 特征数
pub const N_FEATURES: usize = 8;

/// 特征字段名，顺序即特征矩阵的列顺序
pub const FEATURE_NAMES: [&str; N_FEATURES] = [
    "co2_ppm",
    "co_ppb",
    "r_humidity",
    "pm2_5",
    "pm10",
    "pm1",
    "pm100",
    "temperature",
];

/// 存储与日志中的时间格式（字典序即时间序）
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 数据源返回的原始样本（字段可能是数字也可能是字符串）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSample {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co2_ppm: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co_ppb: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r_humidity: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm2_5: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm10: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm1: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm100: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<serde_json::Value>,
    /// AQI 标签
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usaqi: Option<serde_json::Value>,
    /// 采样时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todate: Option<serde_json::Value>,
}

impl RawSample {
    /// 按 `FEATURE_NAMES` 顺序返回特征字段
    pub fn feature_fields(&self) -> [Option<&serde_json::Value>; N_FEATURES] {
        [
            self.co2_ppm.as_ref(),
            self.co_ppb.as_ref(),
            self.r_humidity.as_ref(),
            self.pm2_5.as_ref(),
            self.pm10.as_ref(),
            self.pm1.as_ref(),
            self.pm100.as_ref(),
            self.temperature.as_ref(),
        ]
    }
}

/// 校验后的样本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: Option<NaiveDateTime>,
    pub features: [f64; N_FEATURES],
    pub usaqi: f64,
}

/// 一条预测记录，生成后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    /// 预测 AQI（保留两位小数）
    pub usaqi: f64,
    /// 反归一化后的特征
    pub features: [f64; N_FEATURES],
    /// 整点时间（分、秒、毫秒为 0）
    pub todate: NaiveDateTime,
}

impl fmt::Display for ForecastRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "usaqi: {:.2} | ", self.usaqi)?;
        for (name, value) in FEATURE_NAMES.iter().zip(self.features.iter()) {
            write!(f, "{}: {:.2} | ", name, value)?;
        }
        write!(f, "todate: {} |", self.todate.format(TIMESTAMP_FORMAT))
    }
}

/// 预测流水线配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// 历史样本接口
    pub source_url: String,
    /// 数据库路径
    pub database_url: String,
    /// 请求超时（秒）
    pub request_timeout_secs: u64,
    /// 训练集比例（其余为测试集）
    pub train_split: f64,
    /// 最多生成的小时预测条数
    pub horizon_hours: usize,
    /// 游标日期到达该星期几即停止
    pub stop_weekday: Weekday,
    /// 数据库为空时的起始时间
    pub default_seed: NaiveDateTime,
    /// 回归模型配置
    pub model: MlpConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            source_url: "https://web-servirce-machine.vercel.app/todo".to_string(),
            database_url: "sqlite:data/aqi.db".to_string(),
            request_timeout_secs: 30,
            train_split: 0.8,
            horizon_hours: 168, // 一周
            stop_weekday: Weekday::Sun,
            default_seed: NaiveDate::from_ymd_opt(2024, 5, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
            model: MlpConfig::default(),
        }
    }
}

/// 数据源地址环境变量
pub const ENV_SOURCE_URL: &str = "AQI_SOURCE_URL";
/// 数据库地址环境变量
pub const ENV_DATABASE_URL: &str = "AQI_DATABASE_URL";

impl ForecastConfig {
    /// 默认配置，地址可由环境变量覆盖
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(ENV_SOURCE_URL).filter(|v| !v.trim().is_empty()) {
            self.source_url = url;
        }
        if let Some(url) = lookup(ENV_DATABASE_URL).filter(|v| !v.trim().is_empty()) {
            self.database_url = url;
        }
        self
    }

    /// 在任何 IO 之前检查配置
    pub fn validate(&self) -> ETLResult<()> {
        if !(self.train_split > 0.0 && self.train_split < 1.0) {
            return Err(ETLError::InvalidConfig(format!(
                "train_split 必须在 (0, 1) 之间: {}",
                self.train_split
            )));
        }
        if self.horizon_hours == 0 {
            return Err(ETLError::InvalidConfig("horizon_hours 必须大于 0".to_string()));
        }
        if self.model.input_size != N_FEATURES {
            return Err(ETLError::InvalidConfig(format!(
                "模型输入维度应为 {}，实际为 {}",
                N_FEATURES, self.model.input_size
            )));
        }
        self.model.validate()?;
        Ok(())
    }
}
