//! 时间序列数据处理模块

use crate::types::{MLError, MLResult};
use ndarray::{s, Array2};

/// 时间序列数据分割器
///
/// 只按时间顺序切分，不打乱，保证评估反映的是"向前预测"的效果。
pub struct TimeSeriesSplitter;

impl TimeSeriesSplitter {
    /// 前段长度：`floor(n * ratio)`
    pub fn split_index(n: usize, ratio: f64) -> MLResult<usize> {
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(MLError::InvalidConfig(format!(
                "无效的数据分割比例: {}",
                ratio
            )));
        }

        Ok((n as f64 * ratio).floor() as usize)
    }

    /// 按时间顺序分割为前后两段
    ///
    /// # 参数
    /// - `data`: 输入数据
    /// - `ratio`: 前段比例，取值 (0, 1)
    pub fn split<T>(data: &[T], ratio: f64) -> MLResult<(Vec<T>, Vec<T>)>
    where
        T: Clone,
    {
        let at = Self::split_index(data.len(), ratio)?;
        Ok((data[..at].to_vec(), data[at..].to_vec()))
    }

    /// 分割 Array2 数据（按行）
    pub fn split_array2(
        data: &Array2<f64>,
        ratio: f64,
    ) -> MLResult<(Array2<f64>, Array2<f64>)> {
        let at = Self::split_index(data.nrows(), ratio)?;

        let head = data.slice(s![..at, ..]).to_owned();
        let tail = data.slice(s![at.., ..]).to_owned();

        Ok((head, tail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_series_split() {
        let data = Array2::from_shape_vec((100, 5), (0..500).map(|x| x as f64).collect()).unwrap();
        let (train, test) = TimeSeriesSplitter::split_array2(&data, 0.8).unwrap();

        assert_eq!(train.nrows(), 80);
        assert_eq!(test.nrows(), 20);
        // 顺序保持：测试集紧接训练集
        assert_eq!(test[[0, 0]], 400.0);
        assert_eq!(train[[79, 4]], 399.0);
    }

    #[test]
    fn test_split_floors() {
        let data: Vec<usize> = (0..7).collect();
        let (head, tail) = TimeSeriesSplitter::split(&data, 0.8).unwrap();

        assert_eq!(head, vec![0, 1, 2, 3, 4]);
        assert_eq!(tail, vec![5, 6]);
    }

    #[test]
    fn test_invalid_ratio() {
        let data = Array2::<f64>::zeros((10, 2));
        assert!(TimeSeriesSplitter::split_array2(&data, 0.0).is_err());
        assert!(TimeSeriesSplitter::split_array2(&data, 1.0).is_err());
        assert!(TimeSeriesSplitter::split_array2(&data, f64::NAN).is_err());
    }
}
