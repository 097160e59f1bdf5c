//! 数据预处理：最小-最大归一化与反归一化

use crate::types::{MLError, MLResult};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// 最小-最大缩放器
///
/// 按列计算 `min`/`max`，把特征映射到 `[0, 1]`，并能用同一组边界反向还原。
/// 每次训练运行各自拟合一份，不在运行之间复用。
///
/// `min == max` 的列（退化列）归一化结果恒为 `0.0`，反归一化回到 `min`，
/// 不会产生 NaN。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub min: Array1<f64>,
    pub max: Array1<f64>,
}

impl MinMaxScaler {
    /// 从数据拟合缩放器
    pub fn fit(data: &Array2<f64>) -> MLResult<Self> {
        if data.is_empty() {
            return Err(MLError::Preprocessing("数据为空".to_string()));
        }

        if data.iter().any(|v| !v.is_finite()) {
            return Err(MLError::Preprocessing("数据包含非有限值".to_string()));
        }

        let min = data.fold_axis(Axis(0), f64::INFINITY, |&acc, &x| acc.min(x));
        let max = data.fold_axis(Axis(0), f64::NEG_INFINITY, |&acc, &x| acc.max(x));

        Ok(Self { min, max })
    }

    /// 特征数
    pub fn n_features(&self) -> usize {
        self.min.len()
    }

    /// 第 `j` 列是否退化（`max == min`）
    pub fn is_degenerate(&self, j: usize) -> bool {
        self.range(j) <= 0.0
    }

    /// 退化列的下标
    pub fn degenerate_features(&self) -> Vec<usize> {
        (0..self.n_features())
            .filter(|&j| self.is_degenerate(j))
            .collect()
    }

    fn range(&self, j: usize) -> f64 {
        self.max[j] - self.min[j]
    }

    /// 归一化数据
    pub fn transform(&self, data: &Array2<f64>) -> MLResult<Array2<f64>> {
        self.check_width(data.ncols())?;

        let mut normalized = data.clone();
        for mut row in normalized.axis_iter_mut(Axis(0)) {
            for (j, val) in row.iter_mut().enumerate() {
                *val = if self.is_degenerate(j) {
                    0.0
                } else {
                    (*val - self.min[j]) / self.range(j)
                };
            }
        }

        Ok(normalized)
    }

    /// 拟合并转换
    pub fn fit_transform(data: &Array2<f64>) -> MLResult<(Self, Array2<f64>)> {
        let scaler = Self::fit(data)?;
        let transformed = scaler.transform(data)?;
        Ok((scaler, transformed))
    }

    /// 反归一化
    pub fn inverse_transform(&self, data: &Array2<f64>) -> MLResult<Array2<f64>> {
        self.check_width(data.ncols())?;

        let mut denormalized = data.clone();
        for mut row in denormalized.axis_iter_mut(Axis(0)) {
            for (j, val) in row.iter_mut().enumerate() {
                *val = *val * self.range(j) + self.min[j];
            }
        }

        Ok(denormalized)
    }

    /// 反归一化单行
    pub fn inverse_transform_row(&self, row: ArrayView1<f64>) -> MLResult<Array1<f64>> {
        self.check_width(row.len())?;

        Ok(row
            .iter()
            .enumerate()
            .map(|(j, &x)| x * self.range(j) + self.min[j])
            .collect())
    }

    fn check_width(&self, ncols: usize) -> MLResult<()> {
        if ncols != self.n_features() {
            return Err(MLError::DimensionMismatch {
                expected: self.n_features(),
                actual: ncols,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_min_max_scaler() {
        let data = array![[1.0, 10.0], [3.0, 30.0], [2.0, 20.0]];
        let (scaler, transformed) = MinMaxScaler::fit_transform(&data).unwrap();

        assert_eq!(scaler.min, array![1.0, 10.0]);
        assert_eq!(scaler.max, array![3.0, 30.0]);
        assert!(transformed.iter().all(|&x| (0.0..=1.0).contains(&x)));
        assert!((transformed[[2, 0]] - 0.5).abs() < 1e-12);

        let reconstructed = scaler.inverse_transform(&transformed).unwrap();
        assert!((reconstructed - data).mapv(|x| x.abs()).sum() < 1e-10);
    }

    #[test]
    fn test_degenerate_feature_is_zero_not_nan() {
        let data = array![[5.0, 1.0], [5.0, 2.0], [5.0, 4.0]];
        let (scaler, transformed) = MinMaxScaler::fit_transform(&data).unwrap();

        assert_eq!(scaler.degenerate_features(), vec![0]);
        assert!(transformed.column(0).iter().all(|&x| x == 0.0));
        assert!(transformed.iter().all(|x| x.is_finite()));

        let row = scaler.inverse_transform_row(transformed.row(1)).unwrap();
        assert_eq!(row[0], 5.0);
        assert!((row[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_round_trip_inside_observed_range() {
        let data = array![[0.0, -40.0, 400.0], [10.0, 60.0, 2000.0]];
        let scaler = MinMaxScaler::fit(&data).unwrap();

        let probe = array![[2.5, 12.3, 987.6], [9.9, -39.0, 400.0]];
        let normalized = scaler.transform(&probe).unwrap();
        let restored = scaler.inverse_transform(&normalized).unwrap();

        for (a, b) in probe.iter().zip(restored.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_width_mismatch() {
        let scaler = MinMaxScaler::fit(&array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let err = scaler.transform(&array![[1.0, 2.0, 3.0]]).unwrap_err();
        assert!(matches!(
            err,
            MLError::DimensionMismatch { expected: 2, actual: 3 }
        ));
    }

    #[test]
    fn test_fit_empty() {
        let empty = Array2::<f64>::zeros((0, 8));
        assert!(MinMaxScaler::fit(&empty).is_err());
    }
}
