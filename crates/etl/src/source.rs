//! 历史样本数据源

use crate::types::{ETLError, ETLResult, RawSample};
use async_trait::async_trait;

/// 样本数据源接口：一次拉取全部历史样本
#[async_trait]
pub trait SampleSource: Send + Sync {
    /// 数据源描述，用于日志
    fn name(&self) -> String;

    /// 拉取全部原始样本
    async fn fetch_samples(&self) -> ETLResult<Vec<RawSample>>;
}

/// 通用 HTTP 客户端配置
pub fn create_http_client(timeout_secs: u64) -> ETLResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent("Mozilla/5.0 (compatible; AqiForecast/1.0)")
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(Into::into)
}

/// 通过 HTTP GET 返回 JSON 数组的数据源
pub struct HttpSampleSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSampleSource {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> ETLResult<Self> {
        Ok(Self {
            client: create_http_client(timeout_secs)?,
            url: url.into(),
        })
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl SampleSource for HttpSampleSource {
    fn name(&self) -> String {
        self.url.clone()
    }

    async fn fetch_samples(&self) -> ETLResult<Vec<RawSample>> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ETLError::DataSource(format!(
                "{} 返回状态码 {}",
                self.url, status
            )));
        }

        let body = response.bytes().await?;
        let samples = parse_samples(&body)?;

        tracing::info!("Fetched {} samples from {}", samples.len(), self.url);
        Ok(samples)
    }
}

/// 解析数据源返回体；必须是对象数组
pub fn parse_samples(body: &[u8]) -> ETLResult<Vec<RawSample>> {
    let samples: Vec<RawSample> = serde_json::from_slice(body)?;
    Ok(samples)
}

/// 内存数据源
pub struct StaticSampleSource {
    samples: Vec<RawSample>,
}

impl StaticSampleSource {
    pub fn new(samples: Vec<RawSample>) -> Self {
        Self { samples }
    }
}

#[async_trait]
impl SampleSource for StaticSampleSource {
    fn name(&self) -> String {
        format!("static ({} samples)", self.samples.len())
    }

    async fn fetch_samples(&self) -> ETLResult<Vec<RawSample>> {
        Ok(self.samples.clone())
    }
}
