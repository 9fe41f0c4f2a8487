//! アプリケーション設定管理モジュール
//!
//! 計算デバイス、モデル、学習、データ拡張の設定をJSON形式で保存・読み込みします。
//! 設定ファイルが無い場合はコード内の既定値を使用します。

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// クラス名（インデックス = 出力層の並び順）
///
/// 学習と推論で同じ順序を使う必要があるため固定します。
pub const CLASS_NAMES: [&str; 2] = ["match_ready", "not_match_ready"];

/// クラス数
pub const NUM_CLASSES: usize = CLASS_NAMES.len();

/// モデル入力サイズ（正方形）
pub const IMAGE_SIZE: usize = 224;

/// 計算デバイスの種類
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド
    Wgpu,
    /// NdArray (CPU) バックエンド
    Cpu,
}

impl Default for DeviceType {
    fn default() -> Self {
        DeviceType::Wgpu
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
        }
    }
}

/// モデル設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// torchvision の ImageNet 学習済み ResNet-18 重み (.pth)
    ///
    /// `None` の場合はバックボーンをランダム初期化します。
    pub pretrained_weights: Option<String>,
    /// ヘッドのドロップアウト率
    pub dropout: f64,
    /// 入力画像サイズ
    pub image_size: usize,
    /// クラス名（出力層の並び順）
    pub class_names: Vec<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            pretrained_weights: Some("weights/resnet18-f37072fd.pth".to_string()),
            dropout: 0.5,
            image_size: IMAGE_SIZE,
            class_names: CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// トレーニング設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// データセットのルートディレクトリ（クラスごとのサブディレクトリ）
    pub dataset_dir: String,
    /// チェックポイントの出力先
    pub models_dir: String,
    /// バッチサイズ
    pub batch_size: usize,
    /// フォールドごとの最大エポック数
    pub num_epochs: usize,
    /// 学習率
    pub learning_rate: f64,
    /// AdamW の重み減衰
    pub weight_decay: f32,
    /// 交差検証のフォールド数
    pub k_folds: usize,
    /// ランダムシード
    pub seed: u64,
    /// 早期終了までの非改善エポック数
    pub early_stopping_patience: usize,
    /// 学習率を下げる倍率
    pub plateau_factor: f64,
    /// 学習率を下げるまでの非改善エポック数
    pub plateau_patience: usize,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            dataset_dir: "dataset".to_string(),
            models_dir: "models".to_string(),
            batch_size: 16,
            num_epochs: 15,
            learning_rate: 1e-3,
            weight_decay: 0.01,
            k_folds: 3,
            seed: 42,
            early_stopping_patience: 5,
            plateau_factor: 0.5,
            plateau_patience: 3,
        }
    }
}

/// 学習時のデータ拡張設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentationSettings {
    /// クロップ前のリサイズ（正方形）
    pub pre_crop_size: u32,
    /// ランダムクロップの面積比の範囲
    pub crop_scale: (f32, f32),
    /// ランダムクロップのアスペクト比の範囲
    pub crop_ratio: (f32, f32),
    /// 左右反転の確率
    pub horizontal_flip_p: f64,
    /// 最大回転角（度）
    pub rotation_degrees: f32,
    /// 上下反転の確率
    pub vertical_flip_p: f64,
    /// 明るさの変動幅
    pub brightness: f32,
    /// コントラストの変動幅
    pub contrast: f32,
    /// 平行移動の最大量（画像サイズに対する比率）
    pub translate: (f32, f32),
}

impl Default for AugmentationSettings {
    fn default() -> Self {
        Self {
            pre_crop_size: 256,
            crop_scale: (0.8, 1.0),
            crop_ratio: (3.0 / 4.0, 4.0 / 3.0),
            horizontal_flip_p: 0.5,
            rotation_degrees: 20.0,
            vertical_flip_p: 0.1,
            brightness: 0.1,
            contrast: 0.1,
            translate: (0.05, 0.05),
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// 計算デバイスの種類
    pub device_type: DeviceType,
    /// モデル設定
    pub model: ModelSettings,
    /// トレーニング設定
    pub training: TrainingSettings,
    /// データ拡張設定
    #[serde(default)]
    pub augmentation: AugmentationSettings,
}

impl AugmentationSettings {
    /// 乱数の範囲として使える値かを検証
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::ClassifierError;

        let invalid = |name: &str, value: String| {
            Err(ClassifierError::Config(format!("augmentation.{} が範囲外です: {}", name, value)))
        };

        if self.pre_crop_size == 0 {
            return invalid("pre_crop_size", self.pre_crop_size.to_string());
        }
        let (scale_lo, scale_hi) = self.crop_scale;
        if !(scale_lo > 0.0 && scale_lo <= scale_hi && scale_hi <= 1.0) {
            return invalid("crop_scale", format!("{:?}", self.crop_scale));
        }
        let (ratio_lo, ratio_hi) = self.crop_ratio;
        if !(ratio_lo > 0.0 && ratio_lo <= ratio_hi && ratio_hi.is_finite()) {
            return invalid("crop_ratio", format!("{:?}", self.crop_ratio));
        }
        if !(0.0..=1.0).contains(&self.horizontal_flip_p) {
            return invalid("horizontal_flip_p", self.horizontal_flip_p.to_string());
        }
        if !(0.0..=1.0).contains(&self.vertical_flip_p) {
            return invalid("vertical_flip_p", self.vertical_flip_p.to_string());
        }
        if !(self.rotation_degrees >= 0.0 && self.rotation_degrees.is_finite()) {
            return invalid("rotation_degrees", self.rotation_degrees.to_string());
        }
        if !(self.brightness >= 0.0 && self.brightness.is_finite()) {
            return invalid("brightness", self.brightness.to_string());
        }
        if !(self.contrast >= 0.0 && self.contrast.is_finite()) {
            return invalid("contrast", self.contrast.to_string());
        }
        let (tx, ty) = self.translate;
        if !((0.0..=1.0).contains(&tx) && (0.0..=1.0).contains(&ty)) {
            return invalid("translate", format!("{:?}", self.translate));
        }
        Ok(())
    }
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// デフォルトパスから設定を読み込む、存在しない場合はデフォルト設定を返す
    pub fn load_or_default() -> anyhow::Result<Self> {
        Self::load_or_default_from(Self::default_path())
    }

    /// 指定パスから設定を読み込む
    ///
    /// ファイルが無ければデフォルト設定、読めない・壊れている場合はエラーです。
    pub fn load_or_default_from<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("設定ファイルが存在しません。デフォルト設定を使用します");
            return Ok(Self::default());
        }

        let config = Self::load(path)
            .with_context(|| format!("設定ファイルの読み込みに失敗しました: {}", path.display()))?;
        tracing::info!("設定ファイルを読み込みました: {}", path.display());
        Ok(config)
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 設定値の整合性を検証
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::ClassifierError;

        if self.training.k_folds < 2 {
            return Err(ClassifierError::Config(format!(
                "フォールド数は2以上が必要です: {}",
                self.training.k_folds
            )));
        }
        if self.training.batch_size == 0 {
            return Err(ClassifierError::Config("バッチサイズが0です".to_string()));
        }
        if self.model.class_names.len() != NUM_CLASSES {
            return Err(ClassifierError::Config(format!(
                "クラス数は{}である必要があります: {:?}",
                NUM_CLASSES, self.model.class_names
            )));
        }
        if !(0.0..1.0).contains(&self.model.dropout) {
            return Err(ClassifierError::Config(format!(
                "ドロップアウト率が範囲外です: {}",
                self.model.dropout
            )));
        }
        if self.model.image_size == 0 {
            return Err(ClassifierError::Config("入力画像サイズが0です".to_string()));
        }
        self.augmentation.validate()
    }

    /// 設定情報を表示
    pub fn display(&self) {
        println!("=== アプリケーション設定 ===");
        println!("計算デバイス: {}", self.device_type);
        println!(
            "事前学習済み重み: {}",
            self.model.pretrained_weights.as_deref().unwrap_or("(なし)")
        );
        println!("クラス: {}", self.model.class_names.join(", "));
        println!("\n--- トレーニング設定 ---");
        println!("データセット: {}", self.training.dataset_dir);
        println!("モデル出力先: {}", self.training.models_dir);
        println!("フォールド数: {}", self.training.k_folds);
        println!("エポック数: {}", self.training.num_epochs);
        println!("バッチサイズ: {}", self.training.batch_size);
        println!("学習率: {}", self.training.learning_rate);
        println!("シード: {}", self.training.seed);
        println!("========================\n");
    }
}
