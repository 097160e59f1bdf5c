//! 基础预测示例
//!
//! 用合成的传感器数据跑一遍完整流程，并从数据库读出生成的预测

use aqi_etl::{
    pipeline::ForecastPipelineBuilder, source::StaticSampleSource, storage::SqliteForecastStore,
    types::RawSample,
};
use chrono::{Duration, NaiveDate};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("=== AQI 预测示例 ===\n");

    // 1. 准备样本
    println!("1. 生成合成样本...");
    let samples = generate_mock_samples(24 * 14); // 两周的小时数据
    println!("   生成了 {} 条样本\n", samples.len());

    // 2. 创建管道
    println!("2. 创建预测管道...");
    let database_url = "sqlite:data/aqi_demo.db".to_string();
    let pipeline = ForecastPipelineBuilder::new()
        .with_source(Arc::new(StaticSampleSource::new(samples)))
        .with_database(database_url.clone())
        .with_epochs(500)
        .build()
        .await?;
    println!("   ✓ 管道创建完成\n");

    // 3. 运行
    println!("3. 训练模型并生成预测...");
    let summary = pipeline.run().await?;

    println!("   有效样本: {}", summary.validation.accepted);
    println!("   训练/测试: {}/{}", summary.train_rows, summary.test_rows);
    println!("   训练轮数: {}", summary.history.epochs_run());
    if let Some(metrics) = summary.test_metrics {
        println!("   测试集 MSE: {:.4}", metrics.mse);
        println!("   测试集 R2: {:.4}", metrics.r2_score);
    }
    println!(
        "   预测: 写入 {} 条, 跳过 {} 条, 失败 {} 条 ({})\n",
        summary.schedule.persisted,
        summary.schedule.rejected,
        summary.schedule.failed,
        summary.schedule.stop_reason
    );

    // 4. 读出预测
    println!("4. 数据库中的预测 (前 5 条):");
    let store = SqliteForecastStore::new(&database_url).await?;
    if let Some(last) = summary.schedule.last_slot {
        let rows = store.fetch_range(last - Duration::hours(24 * 7), last).await?;
        for (i, record) in rows.iter().take(5).enumerate() {
            println!("   {}. {}", i + 1, record);
        }
    }
    println!("\n   共 {} 条预测", store.count().await?);

    println!("\n=== 示例完成 ===");
    println!("\n提示:");
    println!("  - 预测已保存到 data/aqi_demo.db");
    println!("  - 再次运行会从最后一条预测的时间继续");

    Ok(())
}

fn generate_mock_samples(hours: usize) -> Vec<RawSample> {
    let start = NaiveDate::from_ymd_opt(2024, 4, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();

    (0..hours)
        .map(|i| {
            // 模拟日内波动
            let phase = (i % 24) as f64 / 24.0 * std::f64::consts::TAU;
            let pm2_5 = 15.0 + phase.sin() * 8.0;

            RawSample {
                co2_ppm: Some((420.0 + phase.cos() * 15.0).into()),
                co_ppb: Some((250.0 + pm2_5 * 3.0).into()),
                r_humidity: Some(format!("{:.1}", 55.0 - phase.sin() * 10.0).into()),
                pm2_5: Some(pm2_5.into()),
                pm10: Some((pm2_5 * 1.6).into()),
                pm1: Some((pm2_5 * 0.7).into()),
                pm100: Some((pm2_5 * 2.1).into()),
                temperature: Some((20.0 + phase.sin() * 4.0).into()),
                usaqi: Some((pm2_5 * 3.2 + 5.0).into()),
                todate: Some((start + Duration::hours(i as i64)).to_string().into()),
            }
        })
        .collect()
}
