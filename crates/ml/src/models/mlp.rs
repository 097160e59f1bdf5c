//! 前馈神经网络回归模型
//!
//! 全连接网络（默认 8 → 20 → 10 → 1，ReLU 隐层，线性输出），
//! 均方误差目标，Adam 优化器，按验证损失早停。纯 ndarray 实现。

use crate::evaluation::Evaluator;
use crate::models::Model;
use crate::timeseries::TimeSeriesSplitter;
use crate::types::{MLError, MLResult, TrainingHistory};
use async_trait::async_trait;
use ndarray::{Array1, Array2, Axis, Zip};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// 网络与训练配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpConfig {
    pub input_size: usize,
    pub hidden_sizes: Vec<usize>,
    pub learning_rate: f64,
    /// epoch 上限
    pub epochs: usize,
    pub batch_size: usize,
    /// 连续多少个 epoch 无改善后停止
    pub patience: usize,
    pub min_delta: f64,
    /// 从训练集尾部留作验证集的比例
    pub validation_split: f64,
    /// 随机种子（初始化与每个 epoch 的打乱顺序）
    pub seed: u64,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            input_size: 8,
            hidden_sizes: vec![20, 10],
            learning_rate: 0.001,
            epochs: 10_000,
            batch_size: 32,
            patience: 10,
            min_delta: 0.0,
            validation_split: 0.2,
            seed: 42,
        }
    }
}

impl MlpConfig {
    pub fn validate(&self) -> MLResult<()> {
        if self.input_size == 0 {
            return Err(MLError::InvalidConfig("input_size 必须大于 0".to_string()));
        }
        if self.hidden_sizes.iter().any(|&h| h == 0) {
            return Err(MLError::InvalidConfig("隐层宽度必须大于 0".to_string()));
        }
        if self.batch_size == 0 {
            return Err(MLError::InvalidConfig("batch_size 必须大于 0".to_string()));
        }
        if self.patience == 0 {
            return Err(MLError::InvalidConfig("patience 必须大于 0".to_string()));
        }
        // 0 表示冻结权重
        if !(self.learning_rate.is_finite() && self.learning_rate >= 0.0) {
            return Err(MLError::InvalidConfig(format!(
                "无效的学习率: {}",
                self.learning_rate
            )));
        }
        if !(self.validation_split > 0.0 && self.validation_split < 1.0) {
            return Err(MLError::InvalidConfig(format!(
                "无效的验证集比例: {}",
                self.validation_split
            )));
        }
        Ok(())
    }
}

/// 全连接层
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Dense {
    weights: Array2<f64>,
    bias: Array1<f64>,
}

impl Dense {
    /// He 均匀初始化
    fn new(input_size: usize, output_size: usize, rng: &mut impl Rng) -> Self {
        let limit = (6.0 / input_size as f64).sqrt();
        let weights = Array2::random_using(
            (input_size, output_size),
            Uniform::new(-limit, limit),
            rng,
        );

        Self {
            weights,
            bias: Array1::zeros(output_size),
        }
    }
}

fn relu(x: &Array2<f64>) -> Array2<f64> {
    x.mapv(|v| if v > 0.0 { v } else { 0.0 })
}

fn relu_derivative(x: &Array2<f64>) -> Array2<f64> {
    x.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 })
}

/// 前向传播缓存：每层输入激活与线性输出
struct ForwardCache {
    activations: Vec<Array2<f64>>,
    pre_activations: Vec<Array2<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Network {
    layers: Vec<Dense>,
}

impl Network {
    fn new(config: &MlpConfig, rng: &mut impl Rng) -> Self {
        let mut sizes = vec![config.input_size];
        sizes.extend(config.hidden_sizes.iter().copied());
        sizes.push(1);

        let layers = sizes
            .windows(2)
            .map(|pair| Dense::new(pair[0], pair[1], &mut *rng))
            .collect();

        Self { layers }
    }

    fn input_size(&self) -> usize {
        self.layers.first().map_or(0, |l| l.weights.nrows())
    }

    fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        let last = self.layers.len() - 1;
        let mut output = x.to_owned();
        for (i, layer) in self.layers.iter().enumerate() {
            let z = output.dot(&layer.weights) + &layer.bias;
            output = if i < last { relu(&z) } else { z };
        }
        output
    }

    fn forward_cached(&self, x: &Array2<f64>) -> ForwardCache {
        let last = self.layers.len() - 1;
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        let mut pre_activations = Vec::with_capacity(self.layers.len());
        activations.push(x.to_owned());

        for (i, layer) in self.layers.iter().enumerate() {
            let z = activations[i].dot(&layer.weights) + &layer.bias;
            let a = if i < last { relu(&z) } else { z.clone() };
            pre_activations.push(z);
            activations.push(a);
        }

        ForwardCache {
            activations,
            pre_activations,
        }
    }

    /// MSE 对各层参数的梯度
    fn gradients(&self, cache: &ForwardCache, y: &Array2<f64>) -> Vec<(Array2<f64>, Array1<f64>)> {
        let n_layers = self.layers.len();
        let output = &cache.activations[n_layers];
        let mut delta = (output - y) * (2.0 / y.nrows() as f64);
        let mut grads = Vec::with_capacity(n_layers);

        for i in (0..n_layers).rev() {
            let grad_w = cache.activations[i].t().dot(&delta);
            let grad_b = delta.sum_axis(Axis(0));
            if i > 0 {
                delta = delta.dot(&self.layers[i].weights.t())
                    * relu_derivative(&cache.pre_activations[i - 1]);
            }
            grads.push((grad_w, grad_b));
        }

        grads.reverse();
        grads
    }
}

/// 单层的 Adam 状态
struct AdamState {
    m_w: Array2<f64>,
    v_w: Array2<f64>,
    m_b: Array1<f64>,
    v_b: Array1<f64>,
}

/// Adam 优化器
///
/// ```text
/// m_t = beta1 * m_{t-1} + (1 - beta1) * grad
/// v_t = beta2 * v_{t-1} + (1 - beta2) * grad^2
/// param = param - lr * m_hat / (sqrt(v_hat) + eps)
/// ```
struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    iteration: i32,
    state: Vec<AdamState>,
}

impl Adam {
    fn new(network: &Network, lr: f64) -> Self {
        let state = network
            .layers
            .iter()
            .map(|l| AdamState {
                m_w: Array2::zeros(l.weights.raw_dim()),
                v_w: Array2::zeros(l.weights.raw_dim()),
                m_b: Array1::zeros(l.bias.raw_dim()),
                v_b: Array1::zeros(l.bias.raw_dim()),
            })
            .collect();

        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-7,
            iteration: 0,
            state,
        }
    }

    fn step(&mut self, network: &mut Network, grads: &[(Array2<f64>, Array1<f64>)]) {
        self.iteration += 1;
        let (b1, b2, lr, eps) = (self.beta1, self.beta2, self.lr, self.eps);
        let bias_correction1 = 1.0 - b1.powi(self.iteration);
        let bias_correction2 = 1.0 - b2.powi(self.iteration);

        let update = move |p: &mut f64, m: &mut f64, v: &mut f64, g: f64| {
            *m = b1 * *m + (1.0 - b1) * g;
            *v = b2 * *v + (1.0 - b2) * g * g;
            let m_hat = *m / bias_correction1;
            let v_hat = *v / bias_correction2;
            *p -= lr * m_hat / (v_hat.sqrt() + eps);
        };

        for ((layer, state), (grad_w, grad_b)) in network
            .layers
            .iter_mut()
            .zip(self.state.iter_mut())
            .zip(grads)
        {
            Zip::from(&mut layer.weights)
                .and(&mut state.m_w)
                .and(&mut state.v_w)
                .and(grad_w)
                .for_each(|p, m, v, &g| update(p, m, v, g));
            Zip::from(&mut layer.bias)
                .and(&mut state.m_b)
                .and(&mut state.v_b)
                .and(grad_b)
                .for_each(|p, m, v, &g| update(p, m, v, g));
        }
    }
}

/// 早停：监控损失连续 `patience` 个 epoch 无改善即停止
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f64,
    wait: usize,
    best: f64,
}

impl EarlyStopping {
    pub fn new(patience: usize, min_delta: f64) -> Self {
        Self {
            patience,
            min_delta,
            wait: 0,
            best: f64::INFINITY,
        }
    }

    /// 记录一个 epoch 的损失，返回是否继续训练
    pub fn update(&mut self, loss: f64) -> bool {
        if loss < self.best - self.min_delta {
            self.best = loss;
            self.wait = 0;
        } else {
            self.wait += 1;
        }

        self.wait < self.patience
    }

    pub fn best(&self) -> f64 {
        self.best
    }
}

/// 前馈回归模型
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpRegressor {
    config: MlpConfig,
    network: Option<Network>,
}

impl MlpRegressor {
    pub fn new(config: MlpConfig) -> Self {
        Self {
            config,
            network: None,
        }
    }

    pub fn config(&self) -> &MlpConfig {
        &self.config
    }

    pub fn is_trained(&self) -> bool {
        self.network.is_some()
    }
}

impl Default for MlpRegressor {
    fn default() -> Self {
        Self::new(MlpConfig::default())
    }
}

#[async_trait]
impl Model for MlpRegressor {
    async fn train(
        &mut self,
        x_train: &Array2<f64>,
        y_train: &Array2<f64>,
    ) -> MLResult<TrainingHistory> {
        self.config.validate()?;

        if x_train.nrows() != y_train.nrows() {
            return Err(MLError::DimensionMismatch {
                expected: x_train.nrows(),
                actual: y_train.nrows(),
            });
        }
        if x_train.ncols() != self.config.input_size {
            return Err(MLError::DimensionMismatch {
                expected: self.config.input_size,
                actual: x_train.ncols(),
            });
        }
        if y_train.ncols() != 1 {
            return Err(MLError::DimensionMismatch {
                expected: 1,
                actual: y_train.ncols(),
            });
        }
        if x_train.nrows() == 0 {
            return Err(MLError::Training("训练集为空".to_string()));
        }

        // 验证集取训练集尾部；切分后任一侧为空则不做验证
        let at = TimeSeriesSplitter::split_index(
            x_train.nrows(),
            1.0 - self.config.validation_split,
        )?;
        let (x_fit, y_fit, validation) = if at == 0 || at == x_train.nrows() {
            (x_train.to_owned(), y_train.to_owned(), None)
        } else {
            let (x_fit, x_val) = TimeSeriesSplitter::split_array2(
                x_train,
                1.0 - self.config.validation_split,
            )?;
            let (y_fit, y_val) = TimeSeriesSplitter::split_array2(
                y_train,
                1.0 - self.config.validation_split,
            )?;
            (x_fit, y_fit, Some((x_val, y_val)))
        };

        if validation.is_none() {
            tracing::warn!(
                "Validation split is empty for {} samples, early stopping monitors training loss",
                x_train.nrows()
            );
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut network = Network::new(&self.config, &mut rng);
        let mut optimizer = Adam::new(&network, self.config.learning_rate);
        let mut stopper = EarlyStopping::new(self.config.patience, self.config.min_delta);
        let mut history = TrainingHistory::default();

        let mut indices: Vec<usize> = (0..x_fit.nrows()).collect();

        for epoch in 0..self.config.epochs {
            indices.shuffle(&mut rng);

            for batch in indices.chunks(self.config.batch_size) {
                let batch_x = x_fit.select(Axis(0), batch);
                let batch_y = y_fit.select(Axis(0), batch);

                let cache = network.forward_cached(&batch_x);
                let grads = network.gradients(&cache, &batch_y);
                optimizer.step(&mut network, &grads);
            }

            let train_loss = Evaluator::mean_squared_error(&y_fit, &network.forward(&x_fit));
            if !train_loss.is_finite() {
                return Err(MLError::Training(format!(
                    "第 {} 个 epoch 损失发散: {}",
                    epoch + 1,
                    train_loss
                )));
            }

            let val_loss = validation.as_ref().map(|(x_val, y_val)| {
                Evaluator::mean_squared_error(y_val, &network.forward(x_val))
            });
            history.record(train_loss, val_loss);

            if (epoch + 1) % 100 == 0 {
                tracing::info!(
                    "Epoch {}/{}, loss: {:.6}, val_loss: {:?}",
                    epoch + 1,
                    self.config.epochs,
                    train_loss,
                    val_loss
                );
            }

            if !stopper.update(val_loss.unwrap_or(train_loss)) {
                history.stopped_early = true;
                tracing::info!(
                    "Early stopping at epoch {} (best monitored loss {:.6})",
                    epoch + 1,
                    stopper.best()
                );
                break;
            }
        }

        history.best_loss = stopper.best();
        self.network = Some(network);
        Ok(history)
    }

    async fn predict(&self, x: &Array2<f64>) -> MLResult<Array2<f64>> {
        let network = self
            .network
            .as_ref()
            .ok_or_else(|| MLError::Prediction("模型未训练".to_string()))?;

        if x.ncols() != network.input_size() {
            return Err(MLError::DimensionMismatch {
                expected: network.input_size(),
                actual: x.ncols(),
            });
        }

        Ok(network.forward(x))
    }

    async fn save(&self, path: &str) -> MLResult<()> {
        if self.network.is_none() {
            return Err(MLError::Serialization("模型未训练，无法保存".to_string()));
        }

        let json = serde_json::to_string(self).map_err(|e| MLError::Serialization(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    async fn load(path: &str) -> MLResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let model: Self =
            serde_json::from_str(&json).map_err(|e| MLError::Serialization(e.to_string()))?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_dataset(n: usize) -> (Array2<f64>, Array2<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            let t = i as f64 / n as f64;
            if j == 0 {
                t
            } else {
                (t * 7.0).fract()
            }
        });
        let y = Array2::from_shape_fn((n, 1), |(i, _)| 2.0 * x[[i, 0]] + x[[i, 1]] + 0.5);
        (x, y)
    }

    fn small_config() -> MlpConfig {
        MlpConfig {
            input_size: 2,
            learning_rate: 0.01,
            epochs: 400,
            batch_size: 16,
            patience: 50,
            ..Default::default()
        }
    }

    #[test]
    fn test_early_stopping() {
        let mut stopper = EarlyStopping::new(2, 0.0);
        assert!(stopper.update(1.0));
        assert!(stopper.update(0.5));
        assert!(stopper.update(0.6));
        assert!(!stopper.update(0.5));
        assert_eq!(stopper.best(), 0.5);
    }

    #[tokio::test]
    async fn test_learns_linear_target() {
        let (x, y) = linear_dataset(128);
        let mut model = MlpRegressor::new(small_config());

        let history = model.train(&x, &y).await.unwrap();
        assert!(history.epochs_run() > 0);
        assert_eq!(history.val_losses.len(), history.epochs_run());

        let first = history.train_losses[0];
        let last = history.final_train_loss().unwrap();
        assert!(last < first);

        let metrics = model.evaluate(&x, &y).await.unwrap();
        assert!(metrics.mse < 0.1, "mse too high: {}", metrics.mse);
    }

    #[tokio::test]
    async fn test_frozen_weights_stop_after_patience() {
        let (x, y) = linear_dataset(40);
        let config = MlpConfig {
            learning_rate: 0.0,
            patience: 3,
            ..small_config()
        };
        let mut model = MlpRegressor::new(config);

        let history = model.train(&x, &y).await.unwrap();
        assert!(history.stopped_early);
        assert_eq!(history.epochs_run(), 4);
    }

    #[tokio::test]
    async fn test_same_seed_is_reproducible() {
        let (x, y) = linear_dataset(64);
        let config = MlpConfig {
            epochs: 20,
            ..small_config()
        };

        let mut a = MlpRegressor::new(config.clone());
        let mut b = MlpRegressor::new(config);
        a.train(&x, &y).await.unwrap();
        b.train(&x, &y).await.unwrap();

        assert_eq!(a.predict(&x).await.unwrap(), b.predict(&x).await.unwrap());
    }

    #[tokio::test]
    async fn test_tiny_set_trains_without_validation() {
        let (x, y) = linear_dataset(1);
        let mut model = MlpRegressor::new(MlpConfig {
            epochs: 5,
            ..small_config()
        });

        let history = model.train(&x, &y).await.unwrap();
        assert!(history.val_losses.is_empty());
        assert_eq!(history.epochs_run(), 5);
    }

    #[tokio::test]
    async fn test_training_errors() {
        let mut model = MlpRegressor::new(small_config());

        let empty_x = Array2::<f64>::zeros((0, 2));
        let empty_y = Array2::<f64>::zeros((0, 1));
        assert!(matches!(
            model.train(&empty_x, &empty_y).await,
            Err(MLError::Training(_))
        ));

        let x = Array2::<f64>::zeros((4, 3));
        let y = Array2::<f64>::zeros((4, 1));
        assert!(matches!(
            model.train(&x, &y).await,
            Err(MLError::DimensionMismatch { expected: 2, actual: 3 })
        ));

        assert!(matches!(
            model.predict(&Array2::zeros((1, 2))).await,
            Err(MLError::Prediction(_))
        ));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (x, y) = linear_dataset(32);
        let mut model = MlpRegressor::new(MlpConfig {
            epochs: 10,
            ..small_config()
        });
        model.train(&x, &y).await.unwrap();

        let path = std::env::temp_dir().join(format!("aqi-mlp-{}.json", std::process::id()));
        let path = path.to_str().unwrap();
        model.save(path).await.unwrap();
        let loaded = MlpRegressor::load(path).await.unwrap();
        std::fs::remove_file(path).ok();

        assert!(loaded.is_trained());
        assert_eq!(model.predict(&x).await.unwrap(), loaded.predict(&x).await.unwrap());
    }
}
