//! 模型评估模块

use crate::types::{MLError, MLResult, Metrics};
use ndarray::Array2;

/// 模型评估器
pub struct Evaluator;

impl Evaluator {
    /// 计算评估指标
    pub fn evaluate(y_true: &Array2<f64>, y_pred: &Array2<f64>) -> MLResult<Metrics> {
        if y_true.dim() != y_pred.dim() {
            return Err(MLError::DimensionMismatch {
                expected: y_true.nrows(),
                actual: y_pred.nrows(),
            });
        }

        if y_true.is_empty() {
            return Err(MLError::Prediction("评估数据为空".to_string()));
        }

        let mse = Self::mean_squared_error(y_true, y_pred);
        let rmse = mse.sqrt();
        let mae = Self::mean_absolute_error(y_true, y_pred);
        let r2 = Self::r2_score(y_true, y_pred);

        Ok(Metrics::new(mse, rmse, mae, r2))
    }

    /// 均方误差 (MSE)
    pub fn mean_squared_error(y_true: &Array2<f64>, y_pred: &Array2<f64>) -> f64 {
        let diff = y_true - y_pred;
        let squared = diff.mapv(|x| x * x);
        squared.mean().unwrap_or(0.0)
    }

    /// 平均绝对误差 (MAE)
    pub fn mean_absolute_error(y_true: &Array2<f64>, y_pred: &Array2<f64>) -> f64 {
        let diff = y_true - y_pred;
        let abs_diff = diff.mapv(|x| x.abs());
        abs_diff.mean().unwrap_or(0.0)
    }

    /// R² 分数
    pub fn r2_score(y_true: &Array2<f64>, y_pred: &Array2<f64>) -> f64 {
        let y_mean = y_true.mean().unwrap_or(0.0);

        let ss_res: f64 = (y_true - y_pred).mapv(|x| x * x).sum();
        let ss_tot: f64 = y_true.mapv(|x| (x - y_mean).powi(2)).sum();

        if ss_tot == 0.0 {
            return 0.0;
        }

        1.0 - (ss_res / ss_tot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mse() {
        let y_true = array![[1.0], [2.0], [3.0]];
        let y_pred = array![[1.1], [2.1], [2.9]];

        let mse = Evaluator::mean_squared_error(&y_true, &y_pred);
        assert!((mse - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_perfect_fit() {
        let y = array![[10.0], [20.0], [35.0]];
        let metrics = Evaluator::evaluate(&y, &y).unwrap();

        assert_eq!(metrics.mse, 0.0);
        assert_eq!(metrics.mae, 0.0);
        assert!((metrics.r2_score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_shape_mismatch() {
        let y_true = array![[1.0], [2.0]];
        let y_pred = array![[1.0]];
        assert!(Evaluator::evaluate(&y_true, &y_pred).is_err());
    }
}
