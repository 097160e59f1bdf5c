use aqi_etl::{ForecastConfig, ForecastPipelineBuilder};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ForecastConfig::from_env();
    tracing::info!(
        "Starting forecast run: source {}, database {}",
        config.source_url,
        config.database_url
    );

    let summary = ForecastPipelineBuilder::new()
        .with_config(config)
        .build()
        .await?
        .run()
        .await?;

    let schedule = &summary.schedule;
    tracing::info!(
        "Done: {} forecasts persisted ({} rejected, {} failed), stopped because {}",
        schedule.persisted,
        schedule.rejected,
        schedule.failed,
        schedule.stop_reason
    );
    Ok(())
}
