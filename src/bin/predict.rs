//! 学習済みアンサンブルで1枚の画像を分類するバイナリ
//!
//! Usage: predict <image_path>

#[cfg(feature = "ml")]
fn run() -> anyhow::Result<()> {
    use cricket_ball_classifier_lib::backend::Predictor;
    use cricket_ball_classifier_lib::model::{AppConfig, EnsembleManifest};
    use std::path::{Path, PathBuf};

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() != 1 {
        anyhow::bail!("画像パスを1つだけ指定してください\nUsage: predict <image_path>");
    }
    let image_path = PathBuf::from(&args[0]);

    let config = AppConfig::load_or_default()?;
    config.validate()?;

    let manifest = EnsembleManifest::load_or_conventional(
        Path::new(&config.training.models_dir),
        config.model.class_names.clone(),
        config.training.k_folds,
    )?;

    let predictor = Predictor::load(&manifest, &config.device_type)?;
    let decision = predictor.predict(&image_path)?;

    println!("🖼️  画像: {}", image_path.display());
    decision.print(predictor.class_names());
    Ok(())
}

#[cfg(feature = "ml")]
fn main() {
    if let Err(e) = cricket_ball_classifier_lib::logging::init_default_logging() {
        eprintln!("ログ初期化エラー: {}", e);
    }

    if let Err(e) = run() {
        eprintln!("❌ エラー: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "ml"))]
fn main() {
    eprintln!("This binary requires the `ml` feature");
    std::process::exit(1);
}
