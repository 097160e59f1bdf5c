//! # AQI 预测管道
//!
//! 从传感器历史数据训练 AQI 回归模型，并按小时生成未来一周的预测记录
//!
//! ## 功能
//!
//! - 从 HTTP 接口拉取历史样本
//! - 样本校验与最小-最大归一化
//! - 前馈神经网络训练、评估与预测
//! - 按 (日期, 小时) 游标调度预测并写入 SQLite

pub mod forecast;
pub mod pipeline;
pub mod source;
pub mod storage;
pub mod types;
pub mod validation;

pub use forecast::{ForecastCursor, ForecastScheduler, ScheduleReport, StopReason};
pub use pipeline::{ForecastPipeline, ForecastPipelineBuilder, PipelineSummary};
pub use source::{HttpSampleSource, SampleSource, StaticSampleSource};
pub use storage::{InsertOutcome, PersistenceGateway, SqliteForecastStore};
pub use types::{
    ETLError, ETLResult, ForecastConfig, ForecastRecord, RawSample, Sample, FEATURE_NAMES,
    N_FEATURES,
};
pub use validation::{SampleValidator, ValidationReport};
