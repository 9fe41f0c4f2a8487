//! アンサンブル推論機能
//!
//! マニフェストに並んだ全チェックポイントを読み込み、1枚の画像について
//! 各モデルのクラス確率を平均して最終判定を出します。

use std::path::Path;

use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{backend::Backend, Tensor},
};

use crate::error::{ClassifierError, Result};
use crate::evaluation::EnsembleDecision;
use crate::imaging::EvalTransform;
use crate::ml::{BallClassifier, ClassifierConfig};
use crate::model::{load_checkpoint, EnsembleManifest};

/// アンサンブル推論エンジン
pub struct EnsemblePredictor<B: Backend> {
    models: Vec<BallClassifier<B>>,
    class_names: Vec<String>,
    transform: EvalTransform,
    device: B::Device,
}

impl<B: Backend> EnsemblePredictor<B> {
    /// マニフェストの全チェックポイントを読み込んで初期化
    ///
    /// 1つでも欠けていれば何も読み込まずにエラーを返します。
    pub fn load(manifest: &EnsembleManifest, device: B::Device) -> Result<Self> {
        manifest.verify_files()?;

        let mut models = Vec::with_capacity(manifest.len());
        let mut image_size = None;

        for path in manifest.checkpoint_paths() {
            let (metadata, model_binary) = load_checkpoint(&path)?;

            if metadata.class_names != manifest.class_names {
                return Err(ClassifierError::checkpoint_load(
                    &path,
                    format!(
                        "クラス順序が一致しません: {:?} (期待: {:?})",
                        metadata.class_names, manifest.class_names
                    ),
                ));
            }
            match image_size {
                Some(size) if size != metadata.image_size => {
                    return Err(ClassifierError::checkpoint_load(
                        &path,
                        format!("入力サイズが他のモデルと異なります: {} (期待: {})", metadata.image_size, size),
                    ));
                }
                _ => image_size = Some(metadata.image_size),
            }

            // 推論時はドロップアウトなし
            let model = ClassifierConfig::new(metadata.class_names.len())
                .with_dropout(0.0)
                .init::<B>(&device);

            let record = BinBytesRecorder::<FullPrecisionSettings>::default()
                .load(model_binary, &device)
                .map_err(|e| ClassifierError::checkpoint_load(&path, format!("モデル重みの読み込みエラー: {:?}", e)))?;

            models.push(model.load_record(record));
            tracing::info!(
                "モデルを読み込みました: {} (fold {}, val acc {:.4})",
                path.display(),
                metadata.fold,
                metadata.best_accuracy
            );
        }

        let image_size = image_size.unwrap_or(crate::model::IMAGE_SIZE);

        Ok(Self {
            models,
            class_names: manifest.class_names.clone(),
            transform: EvalTransform::new(image_size as u32),
            device,
        })
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn num_models(&self) -> usize {
        self.models.len()
    }

    /// 単一画像を分類
    pub fn predict(&self, image_path: &Path) -> Result<EnsembleDecision> {
        if !image_path.is_file() {
            return Err(ClassifierError::missing_path("画像ファイル", image_path));
        }

        // 画像読み込み・正規化
        let pixels = self.transform.load(image_path)?;
        let size = self.transform.image_size() as usize;
        let tensor = Tensor::<B, 1>::from_floats(pixels.as_slice(), &self.device).reshape([1, 3, size, size]);

        let mut member_probabilities = Vec::with_capacity(self.models.len());
        for model in &self.models {
            let probs = model
                .predict_probabilities(tensor.clone())
                .into_data()
                .convert::<f32>()
                .to_vec::<f32>()
                .map_err(|e| ClassifierError::checkpoint_load(image_path, format!("推論結果の取得エラー: {:?}", e)))?;
            member_probabilities.push(probs);
        }

        EnsembleDecision::from_member_probabilities(member_probabilities, &self.class_names).ok_or_else(|| {
            ClassifierError::Config(format!(
                "モデル出力とクラス数が一致しません (クラス: {:?})",
                self.class_names
            ))
        })
    }
}
