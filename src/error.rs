//! エラー型の定義
//!
//! 学習・推論の失敗を3系統に分類します。
//! - 依存物の欠如（事前学習済み重みなど）
//! - パスの欠如（データセット、モデルディレクトリ、画像、チェックポイント）
//! - デコード・読み込みエラー（壊れた画像、壊れたチェックポイント）

use std::path::PathBuf;
use thiserror::Error;

/// 分類器のエラー
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// 必要な外部ファイルが無い（導入手順を併記）
    #[error("依存ファイルが見つかりません: {path}\n  対処: {guidance}")]
    MissingDependency { path: PathBuf, guidance: String },

    /// 指定されたパスが存在しない
    #[error("{kind}が存在しません: {path}")]
    MissingPath { kind: &'static str, path: PathBuf },

    /// データセットの構成が不正
    #[error("データセットが不正です: {0}")]
    InvalidDataset(String),

    /// 画像のデコード失敗
    #[error("画像を読み込めません: {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// チェックポイントの読み込み失敗
    #[error("チェックポイントを読み込めません: {path}: {reason}")]
    CheckpointLoad { path: PathBuf, reason: String },

    /// 設定値が不正
    #[error("設定が不正です: {0}")]
    Config(String),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),
}

impl ClassifierError {
    pub fn missing_path(kind: &'static str, path: impl Into<PathBuf>) -> Self {
        Self::MissingPath {
            kind,
            path: path.into(),
        }
    }

    pub fn checkpoint_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::CheckpointLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClassifierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_path_message_names_the_path() {
        let err = ClassifierError::missing_path("モデルファイル", "models/model_3.tar.gz");
        let msg = err.to_string();
        assert!(msg.contains("モデルファイル"));
        assert!(msg.contains("models/model_3.tar.gz"));
    }

    #[test]
    fn test_missing_dependency_includes_guidance() {
        let err = ClassifierError::MissingDependency {
            path: PathBuf::from("weights/resnet18.pth"),
            guidance: "download it".to_string(),
        };
        assert!(err.to_string().contains("download it"));
    }
}
