//! # AQI 回归引擎
//!
//! 空气质量指数 (AQI) 预测所需的机器学习组件。
//!
//! ## 主要模块
//!
//! - `preprocessing`: 最小-最大归一化与反归一化
//! - `timeseries`: 按时间顺序切分数据集
//! - `models`: 前馈神经网络回归模型
//! - `evaluation`: 模型评估指标

pub mod evaluation;
pub mod models;
pub mod preprocessing;
pub mod timeseries;
pub mod types;

pub use models::mlp::{MlpConfig, MlpRegressor};
pub use models::Model;
pub use preprocessing::MinMaxScaler;
pub use timeseries::TimeSeriesSplitter;
pub use types::{MLError, MLResult, Metrics, TrainingHistory};
