//! 预测管道
//!
//! 拉取历史样本 → 校验 → 归一化 → 训练/评估 → 预测 → 调度写入。
//! 存储连接在流程结束后释放一次，无论成功与否。

use crate::forecast::{ForecastCursor, ForecastScheduler, ScheduleReport};
use crate::source::{HttpSampleSource, SampleSource};
use crate::storage::{PersistenceGateway, SqliteForecastStore};
use crate::types::{ETLError, ETLResult, ForecastConfig, Sample, FEATURE_NAMES, N_FEATURES};
use crate::validation::{SampleValidator, ValidationReport};
use aqi_ml::{
    Metrics, MinMaxScaler, MlpConfig, MlpRegressor, Model, TimeSeriesSplitter, TrainingHistory,
};
use chrono::{NaiveDateTime, Weekday};
use ndarray::{Array1, Array2};
use std::sync::Arc;

/// 一次运行的汇总
#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub validation: ValidationReport,
    pub train_rows: usize,
    pub test_rows: usize,
    pub history: TrainingHistory,
    /// 测试集为空时为 `None`
    pub test_metrics: Option<Metrics>,
    pub schedule: ScheduleReport,
}

/// 预测管道
pub struct ForecastPipeline {
    config: ForecastConfig,
    source: Arc<dyn SampleSource>,
    store: Arc<dyn PersistenceGateway>,
}

impl ForecastPipeline {
    /// 按配置创建 HTTP 数据源与 SQLite 存储
    pub async fn new(config: ForecastConfig) -> ETLResult<Self> {
        ForecastPipelineBuilder::new().with_config(config).build().await
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// 完整流程，结束后关闭存储
    pub async fn run(self) -> ETLResult<PipelineSummary> {
        let result = self.execute().await;
        self.store.close().await;

        if let Err(e) = &result {
            tracing::error!("Forecast pipeline failed: {}", e);
        }
        result
    }

    async fn execute(&self) -> ETLResult<PipelineSummary> {
        tracing::info!("Running forecast pipeline with source {}", self.source.name());

        // 1. Extract
        let raw = self.source.fetch_samples().await?;

        // 2. 校验
        let (samples, validation) = SampleValidator::validate(&raw);
        if samples.is_empty() {
            return Err(ETLError::NoValidSamples { total: raw.len() });
        }

        // 3. 归一化
        let (x, y) = to_matrices(&samples);
        let (scaler, x_norm) = MinMaxScaler::fit_transform(&x)?;
        for j in scaler.degenerate_features() {
            tracing::warn!(
                "Feature {} is constant ({}), normalized to 0",
                FEATURE_NAMES[j],
                scaler.min[j]
            );
        }

        // 4. 按时间顺序切分
        let (x_train, x_test) = TimeSeriesSplitter::split_array2(&x_norm, self.config.train_split)?;
        let (y_train, y_test) = TimeSeriesSplitter::split_array2(&y, self.config.train_split)?;
        tracing::info!(
            "Split {} samples into {} train / {} test",
            samples.len(),
            x_train.nrows(),
            x_test.nrows()
        );

        // 5. 训练，失败时不写入任何数据
        let mut model = MlpRegressor::new(self.config.model.clone());
        let history = model.train(&x_train, &y_train).await?;
        tracing::info!(
            "Training finished after {} epochs (early stop: {})",
            history.epochs_run(),
            history.stopped_early
        );

        // 6. 评估与预测
        let (test_metrics, predictions) = if x_test.nrows() == 0 {
            tracing::warn!("Test split is empty, no forecasts will be generated");
            (None, Array1::zeros(0))
        } else {
            let metrics = model.evaluate(&x_test, &y_test).await?;
            tracing::info!(
                "Test loss (MSE): {:.4}, RMSE: {:.4}, R2: {:.4}",
                metrics.mse,
                metrics.rmse,
                metrics.r2_score
            );
            let predictions = model.predict(&x_test).await?.column(0).to_owned();
            (Some(metrics), predictions)
        };

        // 7. 调度
        let last = match self.store.last_timestamp().await {
            Ok(last) => last,
            Err(e) => {
                tracing::warn!(
                    "Failed to read last forecast time, starting from {}: {}",
                    self.config.default_seed,
                    e
                );
                None
            }
        };
        let cursor = ForecastCursor::seeded(last, self.config.default_seed);

        let schedule = ForecastScheduler::from_config(&self.config)
            .run(cursor, &x_test, &predictions, &scaler, self.store.as_ref())
            .await?;

        tracing::info!("Forecast pipeline completed");

        Ok(PipelineSummary {
            validation,
            train_rows: x_train.nrows(),
            test_rows: x_test.nrows(),
            history,
            test_metrics,
            schedule,
        })
    }
}

/// 特征矩阵 (n × 8) 与标签矩阵 (n × 1)
fn to_matrices(samples: &[Sample]) -> (Array2<f64>, Array2<f64>) {
    let x = Array2::from_shape_fn((samples.len(), N_FEATURES), |(i, j)| samples[i].features[j]);
    let y = Array2::from_shape_fn((samples.len(), 1), |(i, _)| samples[i].usaqi);
    (x, y)
}

/// 预测管道构建器
pub struct ForecastPipelineBuilder {
    config: ForecastConfig,
    source: Option<Arc<dyn SampleSource>>,
    store: Option<Arc<dyn PersistenceGateway>>,
}

impl ForecastPipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: ForecastConfig::default(),
            source: None,
            store: None,
        }
    }

    pub fn with_config(mut self, config: ForecastConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_source_url(mut self, url: String) -> Self {
        self.config.source_url = url;
        self
    }

    pub fn with_database(mut self, url: String) -> Self {
        self.config.database_url = url;
        self
    }

    pub fn with_train_split(mut self, ratio: f64) -> Self {
        self.config.train_split = ratio;
        self
    }

    pub fn with_horizon_hours(mut self, hours: usize) -> Self {
        self.config.horizon_hours = hours;
        self
    }

    pub fn with_stop_weekday(mut self, weekday: Weekday) -> Self {
        self.config.stop_weekday = weekday;
        self
    }

    pub fn with_default_seed(mut self, seed: NaiveDateTime) -> Self {
        self.config.default_seed = seed;
        self
    }

    pub fn with_model(mut self, model: MlpConfig) -> Self {
        self.config.model = model;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.config.model.epochs = epochs;
        self
    }

    pub fn with_patience(mut self, patience: usize) -> Self {
        self.config.model.patience = patience;
        self
    }

    pub fn with_validation_split(mut self, ratio: f64) -> Self {
        self.config.model.validation_split = ratio;
        self
    }

    /// 替换默认的 HTTP 数据源
    pub fn with_source(mut self, source: Arc<dyn SampleSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// 替换默认的 SQLite 存储
    pub fn with_store(mut self, store: Arc<dyn PersistenceGateway>) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn build(self) -> ETLResult<ForecastPipeline> {
        self.config.validate()?;

        let source: Arc<dyn SampleSource> = match self.source {
            Some(source) => source,
            None => Arc::new(HttpSampleSource::new(
                self.config.source_url.clone(),
                self.config.request_timeout_secs,
            )?),
        };

        let store: Arc<dyn PersistenceGateway> = match self.store {
            Some(store) => store,
            None => Arc::new(SqliteForecastStore::new(&self.config.database_url).await?),
        };

        Ok(ForecastPipeline {
            config: self.config,
            source,
            store,
        })
    }
}

impl Default for ForecastPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
