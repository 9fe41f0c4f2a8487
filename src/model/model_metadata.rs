//! チェックポイントのメタデータ定義
//!
//! tar.gz内の metadata.json として保存され、推論時にクラス順序と入力サイズの検証に使います。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// チェックポイントのメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: モデルの重み（バイナリ）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMetadata {
    /// フォールド番号（1始まり）
    pub fold: usize,

    /// クラス名（出力層の並び順）
    /// 例: ["match_ready", "not_match_ready"]
    pub class_names: Vec<String>,

    /// モデル入力サイズ（正方形、通常224）
    pub image_size: usize,

    /// このチェックポイント時点の検証精度
    pub best_accuracy: f64,

    /// 最良精度を記録したエポック（1始まり）
    pub best_epoch: usize,

    /// フォールドあたりの最大エポック数
    pub num_epochs: usize,

    /// フォールド分割と拡張に使ったシード
    #[serde(default)]
    pub seed: u64,

    /// モデルの学習時刻（ISO8601形式）
    pub trained_at: String,
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(
        fold: usize,
        class_names: Vec<String>,
        image_size: usize,
        best_accuracy: f64,
        best_epoch: usize,
        num_epochs: usize,
        seed: u64,
    ) -> Self {
        let trained_at = chrono::Local::now().to_rfc3339();

        Self {
            fold,
            class_names,
            image_size,
            best_accuracy,
            best_epoch,
            num_epochs,
            seed,
            trained_at,
        }
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }
}
