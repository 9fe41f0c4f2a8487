//! k分割交差検証による学習
//!
//! フォールドごとに新しいモデルを作り、検証精度が改善したエポックでチェックポイントを上書きします。
//! 全フォールド終了後にマニフェストを書き出します。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::{
    data::dataloader::batcher::Batcher,
    module::{AutodiffModule, Module},
    optim::{AdamWConfig, GradientsParams, Optimizer},
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    train::ClassificationOutput,
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::dataset::{BallDataset, Fold, FoldPartitioner, ImageRecord};
use crate::evaluation::{CrossValidationSummary, FoldOutcome, PassMetrics};
use crate::imaging::{EvalTransform, TrainTransform};
use crate::ml::{BallClassifier, ClassifierConfig};
use crate::model::config::AppConfig;
use crate::model::{checkpoint_path, save_checkpoint, EnsembleManifest, ModelMetadata};
use crate::schedule::FoldProgress;

/// 前処理済みの1サンプル
#[derive(Clone, Debug)]
pub struct ImageItem {
    /// 正規化済みピクセル（CHW順に平坦化）
    pub pixels: Vec<f32>,
    pub label: usize,
}

/// バッチデータ
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

/// バッチャー
#[derive(Clone, Debug)]
pub struct ImageBatcher {
    image_size: usize,
}

impl ImageBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;
        let mut all_pixels = Vec::with_capacity(batch_size * 3 * size * size);
        let mut targets_vec = Vec::with_capacity(batch_size);

        for item in items {
            all_pixels.extend_from_slice(&item.pixels);
            targets_vec.push(item.label as i64);
        }

        // 1回の転送でバッチ全体をデバイスへ
        let images = Tensor::<B, 1>::from_floats(all_pixels.as_slice(), device).reshape([batch_size, 3, size, size]);
        let targets = Tensor::<B, 1, Int>::from_ints(targets_vec.as_slice(), device);

        ImageBatch { images, targets }
    }
}

/// 1フォールド分の学習器
pub struct FoldTrainer<'a, B: AutodiffBackend> {
    config: &'a AppConfig,
    dataset: &'a BallDataset,
    models_dir: PathBuf,
    device: B::Device,
    train_transform: TrainTransform,
    eval_transform: EvalTransform,
    batcher: ImageBatcher,
}

impl<'a, B: AutodiffBackend> FoldTrainer<'a, B> {
    pub fn new(config: &'a AppConfig, dataset: &'a BallDataset, models_dir: &Path, device: B::Device) -> Self {
        let image_size = config.model.image_size;
        Self {
            config,
            dataset,
            models_dir: models_dir.to_path_buf(),
            device,
            train_transform: TrainTransform::new(config.augmentation.clone(), image_size as u32),
            eval_transform: EvalTransform::new(image_size as u32),
            batcher: ImageBatcher::new(image_size),
        }
    }

    /// 1フォールドを学習し、最良エポックのチェックポイントを保存
    pub fn train(&self, fold: &Fold, rng: &mut StdRng) -> Result<FoldOutcome> {
        let settings = &self.config.training;
        let train_records = self.select(&fold.train_indices);
        let test_records = self.select(&fold.test_indices);
        let output_path = checkpoint_path(&self.models_dir, fold.index);

        tracing::info!(
            "Fold {}: 学習 {} 枚 / 検証 {} 枚",
            fold.index,
            train_records.len(),
            test_records.len()
        );

        let weights = self.config.model.pretrained_weights.as_deref().map(Path::new);
        let mut model: BallClassifier<B> = ClassifierConfig::new(self.dataset.num_classes())
            .with_dropout(self.config.model.dropout)
            .init_for_training(weights, &self.device)?;

        let mut optimizer = AdamWConfig::new()
            .with_weight_decay(settings.weight_decay)
            .init();
        let mut progress = FoldProgress::new(settings);

        for epoch in 1..=settings.num_epochs {
            let learning_rate = progress.lr();

            // 学習
            let mut order = train_records.clone();
            order.shuffle(rng);

            let mut train_metrics = PassMetrics::new();
            for chunk in order.chunks(settings.batch_size) {
                let mut items = Vec::with_capacity(chunk.len());
                for record in chunk {
                    items.push(ImageItem {
                        pixels: self.train_transform.load(&record.path, rng)?,
                        label: record.label,
                    });
                }
                let batch: ImageBatch<B> = self.batcher.batch(items, &self.device);
                let batch_size = batch.targets.dims()[0];

                let output = model.forward_classification(batch.images, batch.targets);
                let (loss_value, batch_correct) = batch_stats(&output, batch_size);

                let grads = output.loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optimizer.step(learning_rate, model, grads);

                train_metrics.add_batch(loss_value, batch_correct, batch_size);
            }

            // 検証（ドロップアウトなし）
            let val_metrics = self.evaluate(&model.clone().valid(), &test_records)?;
            let val_accuracy = val_metrics.accuracy();

            tracing::info!(
                "Fold {} Epoch {}/{}: train loss {:.4}, train acc {:.4}, val loss {:.4}, val acc {:.4}, lr {:.2e}",
                fold.index,
                epoch,
                settings.num_epochs,
                train_metrics.loss(),
                train_metrics.accuracy(),
                val_metrics.loss(),
                val_accuracy,
                learning_rate
            );

            let decision = progress.end_epoch(epoch, val_accuracy);
            if decision.save_checkpoint {
                self.save(&model, fold.index, val_accuracy, epoch, &output_path)?;
                tracing::info!(
                    "Fold {}: 検証精度が改善しました ({:.4})。保存: {}",
                    fold.index,
                    val_accuracy,
                    output_path.display()
                );
            }
            if decision.stop {
                tracing::info!(
                    "Fold {}: {}エポック改善が無いため早期終了します",
                    fold.index,
                    progress.patience_counter()
                );
                break;
            }
            if decision.lr_reduced {
                tracing::info!("Fold {}: 学習率を {:.2e} に下げます", fold.index, progress.lr());
            }
        }

        let outcome = progress.outcome(fold.index);
        if outcome.best_epoch == 0 {
            anyhow::bail!(
                "Fold {}: 検証精度が一度も 0.0 を上回らなかったためチェックポイントがありません",
                fold.index
            );
        }
        Ok(outcome)
    }

    fn select(&self, indices: &[usize]) -> Vec<ImageRecord> {
        indices
            .iter()
            .filter_map(|&i| self.dataset.get(i).cloned())
            .collect()
    }

    /// 検証パス（損失と精度）
    fn evaluate(&self, model: &BallClassifier<B::InnerBackend>, records: &[ImageRecord]) -> Result<PassMetrics> {
        let device = model.devices().into_iter().next().unwrap_or_default();
        let mut metrics = PassMetrics::new();

        for chunk in records.chunks(self.config.training.batch_size) {
            let mut items = Vec::with_capacity(chunk.len());
            for record in chunk {
                items.push(ImageItem {
                    pixels: self.eval_transform.load(&record.path)?,
                    label: record.label,
                });
            }
            let batch: ImageBatch<B::InnerBackend> = self.batcher.batch(items, &device);

            let output = model.forward_classification(batch.images, batch.targets);
            let (loss_value, batch_correct) = batch_stats(&output, chunk.len());
            metrics.add_batch(loss_value, batch_correct, chunk.len());
        }

        Ok(metrics)
    }

    fn save(&self, model: &BallClassifier<B>, fold: usize, accuracy: f64, epoch: usize, path: &Path) -> Result<()> {
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let model_binary = recorder
            .record(model.clone().valid().into_record(), ())
            .map_err(|e| anyhow::anyhow!("モデル重みのシリアライズエラー: {:?}", e))?;

        let metadata = ModelMetadata::new(
            fold,
            self.dataset.class_names().to_vec(),
            self.config.model.image_size,
            accuracy,
            epoch,
            self.config.training.num_epochs,
            self.config.training.seed,
        );

        save_checkpoint(path, &metadata, &model_binary)
    }
}

/// バッチの平均損失と正解数
fn batch_stats<B: Backend>(output: &ClassificationOutput<B>, batch_size: usize) -> (f64, usize) {
    let loss_value: f64 = output.loss.clone().into_scalar().elem();
    let correct: i64 = output
        .output
        .clone()
        .argmax(1)
        .reshape([batch_size])
        .equal(output.targets.clone())
        .int()
        .sum()
        .into_scalar()
        .elem();
    (loss_value, correct as usize)
}

/// 交差検証を実行
///
/// データセットを読み込み、K個のフォールドを順に学習してマニフェストを書き出します。
pub fn run_cross_validation<B: AutodiffBackend>(config: &AppConfig, device: B::Device) -> Result<CrossValidationSummary> {
    config.validate()?;
    let settings = &config.training;

    B::seed(&device, settings.seed);
    let mut rng = StdRng::seed_from_u64(settings.seed);

    let dataset = BallDataset::from_directory(Path::new(&settings.dataset_dir), &config.model.class_names)?;
    tracing::info!("{} 枚の画像を読み込みました", dataset.len());
    for (name, count) in dataset.class_names().iter().zip(dataset.class_counts()) {
        tracing::info!("  クラス '{}': {} 枚", name, count);
    }

    let models_dir = PathBuf::from(&settings.models_dir);
    std::fs::create_dir_all(&models_dir)
        .with_context(|| format!("Failed to create models directory: {}", models_dir.display()))?;

    let folds = FoldPartitioner::new(settings.k_folds, settings.seed).split(dataset.len())?;
    let trainer = FoldTrainer::<B>::new(config, &dataset, &models_dir, device);

    let mut outcomes = Vec::with_capacity(folds.len());
    for fold in &folds {
        tracing::info!("=== Fold {}/{} ===", fold.index, folds.len());
        outcomes.push(trainer.train(fold, &mut rng)?);
    }

    let manifest = EnsembleManifest::conventional(&models_dir, dataset.class_names().to_vec(), folds.len())
        .with_seed(settings.seed);
    manifest.save()?;
    tracing::info!(
        "マニフェストを保存しました: {}",
        EnsembleManifest::manifest_path(&models_dir).display()
    );

    Ok(CrossValidationSummary::new(outcomes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::load_checkpoint;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn write_dataset(root: &Path, per_class: usize) {
        for (class_id, class_name) in ["match_ready", "not_match_ready"].iter().enumerate() {
            let dir = root.join(class_name);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..per_class {
                let shade = if class_id == 0 { 40 } else { 210 } + i as u8;
                let img = RgbImage::from_pixel(40, 40, Rgb([shade, shade / 2, 255 - shade]));
                img.save(dir.join(format!("ball_{}.png", i))).unwrap();
            }
        }
    }

    fn small_config(root: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.model.pretrained_weights = None;
        config.model.image_size = 32;
        config.augmentation.pre_crop_size = 36;
        config.training.dataset_dir = root.join("dataset").to_string_lossy().to_string();
        config.training.models_dir = root.join("models").to_string_lossy().to_string();
        config.training.k_folds = 2;
        config.training.num_epochs = 2;
        config.training.batch_size = 4;
        config
    }

    #[test]
    fn test_batcher_shapes() {
        let device = Default::default();
        let batcher = ImageBatcher::new(8);
        let items = vec![
            ImageItem { pixels: vec![0.0; 3 * 8 * 8], label: 0 },
            ImageItem { pixels: vec![1.0; 3 * 8 * 8], label: 1 },
        ];
        let batch: ImageBatch<NdArray<f32>> = batcher.batch(items, &device);

        assert_eq!(batch.images.dims(), [2, 3, 8, 8]);
        let targets: Vec<i64> = batch.targets.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(targets, vec![0, 1]);
    }

    #[test]
    fn test_cross_validation_writes_checkpoints_and_manifest() {
        let dir = tempdir().unwrap();
        write_dataset(&dir.path().join("dataset"), 6);
        let config = small_config(dir.path());

        let summary = run_cross_validation::<TestBackend>(&config, Default::default()).unwrap();

        assert_eq!(summary.folds.len(), 2);
        let models_dir = dir.path().join("models");
        for outcome in &summary.folds {
            assert!(outcome.best_accuracy > 0.0 && outcome.best_accuracy <= 1.0);
            assert!((1..=outcome.epochs_run).contains(&outcome.best_epoch));
            assert!(outcome.epochs_run <= 2);

            // 保存されているのは最良エポックのモデル
            let (metadata, binary) = load_checkpoint(&checkpoint_path(&models_dir, outcome.fold)).unwrap();
            assert_eq!(metadata.fold, outcome.fold);
            assert_eq!(metadata.best_epoch, outcome.best_epoch);
            assert_eq!(metadata.best_accuracy, outcome.best_accuracy);
            assert_eq!(metadata.num_epochs, 2);
            assert_eq!(metadata.class_names, config.model.class_names);
            assert!(!binary.is_empty());
        }

        let manifest = EnsembleManifest::load(&models_dir).unwrap();
        assert_eq!(manifest.checkpoints, vec!["model_1.tar.gz", "model_2.tar.gz"]);
        assert_eq!(manifest.seed, Some(42));
    }

    #[test]
    fn test_missing_dataset_directory() {
        let dir = tempdir().unwrap();
        let config = small_config(dir.path());

        let err = run_cross_validation::<TestBackend>(&config, Default::default()).unwrap_err();
        let err = err.downcast::<crate::error::ClassifierError>().unwrap();
        assert!(matches!(err, crate::error::ClassifierError::MissingPath { .. }));
        assert!(!dir.path().join("models").exists());
    }
}
