//! 核心类型定义

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type MLResult<T> = Result<T, MLError>;

#[derive(Debug, Error)]
pub enum MLError {
    #[error("数据预处理错误: {0}")]
    Preprocessing(String),

    #[error("模型训练错误: {0}")]
    Training(String),

    #[error("模型预测错误: {0}")]
    Prediction(String),

    #[error("数据维度不匹配: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("无效的配置: {0}")]
    InvalidConfig(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(String),
}

/// 评估指标
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// 均方误差（训练目标，即报告的 loss）
    pub mse: f64,
    /// 均方根误差
    pub rmse: f64,
    /// 平均绝对误差
    pub mae: f64,
    /// R² 分数
    pub r2_score: f64,
}

impl Metrics {
    pub fn new(mse: f64, rmse: f64, mae: f64, r2_score: f64) -> Self {
        Self {
            mse,
            rmse,
            mae,
            r2_score,
        }
    }
}

/// 训练过程记录
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    /// 每个 epoch 的训练损失
    pub train_losses: Vec<f64>,
    /// 每个 epoch 的验证损失（验证集为空时为空）
    pub val_losses: Vec<f64>,
    /// 是否由早停结束
    pub stopped_early: bool,
    /// 最优监控损失
    pub best_loss: f64,
}

impl TrainingHistory {
    pub fn record(&mut self, train_loss: f64, val_loss: Option<f64>) {
        self.train_losses.push(train_loss);
        if let Some(val_loss) = val_loss {
            self.val_losses.push(val_loss);
        }
    }

    /// 实际运行的 epoch 数
    pub fn epochs_run(&self) -> usize {
        self.train_losses.len()
    }

    pub fn final_train_loss(&self) -> Option<f64> {
        self.train_losses.last().copied()
    }
}
