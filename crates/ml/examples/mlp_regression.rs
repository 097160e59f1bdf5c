//! 前馈网络回归示例
//!
//! 在合成数据上训练 MLP，评估后保存并重新加载模型

use aqi_ml::{MinMaxScaler, MlpConfig, MlpRegressor, Model, TimeSeriesSplitter};
use ndarray::Array2;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== MLP 回归示例 ===\n");

    // 1. 生成模拟数据
    println!("1. 生成模拟数据...");
    let (features, targets) = generate_mock_data(600);
    println!("   数据量: {}, 特征数: {}", features.nrows(), features.ncols());

    // 2. 归一化
    println!("\n2. 最小-最大归一化...");
    let (scaler, features_norm) = MinMaxScaler::fit_transform(&features)?;
    println!("   常量特征: {:?}", scaler.degenerate_features());

    // 3. 分割数据集
    println!("\n3. 按时间顺序分割训练集和测试集...");
    let (x_train, x_test) = TimeSeriesSplitter::split_array2(&features_norm, 0.8)?;
    let (y_train, y_test) = TimeSeriesSplitter::split_array2(&targets, 0.8)?;
    println!("   训练集: {} 样本", x_train.nrows());
    println!("   测试集: {} 样本", x_test.nrows());

    // 4. 训练
    println!("\n4. 训练模型...");
    let config = MlpConfig {
        input_size: features.ncols(),
        epochs: 2000, // 为了演示，减少训练轮数
        learning_rate: 0.01,
        ..Default::default()
    };
    println!("   配置: {:?}", config);

    let mut model = MlpRegressor::new(config);
    let history = model.train(&x_train, &y_train).await?;
    println!(
        "   ✓ 训练完成: {} 轮, 早停: {}, 最优损失: {:.4}",
        history.epochs_run(),
        history.stopped_early,
        history.best_loss
    );

    // 5. 评估
    println!("\n5. 评估模型...");
    let metrics = model.evaluate(&x_test, &y_test).await?;
    println!("   MSE: {:.4}", metrics.mse);
    println!("   RMSE: {:.4}", metrics.rmse);
    println!("   MAE: {:.4}", metrics.mae);
    println!("   R2: {:.4}", metrics.r2_score);

    // 6. 保存与加载
    println!("\n6. 保存并重新加载模型...");
    let path = std::env::temp_dir().join("aqi_mlp_demo.json");
    let path = path.to_string_lossy().to_string();
    model.save(&path).await?;
    let restored = MlpRegressor::load(&path).await?;

    let original = model.predict(&x_test).await?;
    let reloaded = restored.predict(&x_test).await?;
    println!("   预测一致: {}", original == reloaded);

    println!("\n=== 示例完成 ===");
    Ok(())
}

fn generate_mock_data(n: usize) -> (Array2<f64>, Array2<f64>) {
    let features = Array2::from_shape_fn((n, 8), |(i, j)| {
        let t = i as f64 * 0.05;
        (t + j as f64).sin() * (j + 1) as f64 + 10.0
    });
    let targets = Array2::from_shape_fn((n, 1), |(i, _)| {
        2.0 * features[[i, 3]] + 0.5 * features[[i, 4]] + 5.0
    });

    (features, targets)
}
