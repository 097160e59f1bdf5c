//! 回归模型模块

pub mod mlp;

use crate::evaluation::Evaluator;
use crate::types::{MLResult, Metrics, TrainingHistory};
use async_trait::async_trait;
use ndarray::Array2;

/// 模型训练接口
#[async_trait]
pub trait Model: Send + Sync {
    /// 训练模型
    async fn train(
        &mut self,
        x_train: &Array2<f64>,
        y_train: &Array2<f64>,
    ) -> MLResult<TrainingHistory>;

    /// 预测
    async fn predict(&self, x: &Array2<f64>) -> MLResult<Array2<f64>>;

    /// 在留出集上评估，`mse` 即报告的 loss
    async fn evaluate(&self, x: &Array2<f64>, y: &Array2<f64>) -> MLResult<Metrics> {
        let y_pred = self.predict(x).await?;
        Evaluator::evaluate(y, &y_pred)
    }

    /// 保存模型
    async fn save(&self, path: &str) -> MLResult<()>;

    /// 加载模型
    async fn load(path: &str) -> MLResult<Self>
    where
        Self: Sized;
}
