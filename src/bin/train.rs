//! k分割交差検証で分類器を学習するバイナリ
//!
//! 引数は取りません。設定はカレントディレクトリの config.json（無ければ既定値）から読み込みます。

#[cfg(feature = "ml")]
fn run() -> anyhow::Result<()> {
    use cricket_ball_classifier_lib::backend;
    use cricket_ball_classifier_lib::model::AppConfig;

    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        anyhow::bail!("引数は不要です: {:?}\nUsage: train", args);
    }

    let config = AppConfig::load_or_default()?;
    config.validate()?;
    config.display();

    let summary = backend::train(&config)?;
    summary.print();

    println!("\n💾 モデル保存先: {}", config.training.models_dir);
    Ok(())
}

#[cfg(feature = "ml")]
fn main() {
    if let Err(e) = cricket_ball_classifier_lib::logging::init_default_logging() {
        eprintln!("ログ初期化エラー: {}", e);
    }

    if let Err(e) = run() {
        tracing::error!("学習に失敗しました: {:#}", e);
        eprintln!("❌ エラー: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "ml"))]
fn main() {
    eprintln!("This binary requires the `ml` feature");
    std::process::exit(1);
}
