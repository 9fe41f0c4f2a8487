//! アンサンブルのマニフェスト
//!
//! 学習済みチェックポイントの並び順とクラス名を models/manifest.json に記録します。
//! マニフェストが無い場合は model_1..model_K の規約名で組み立てます。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ClassifierError;
use crate::model::model_storage::checkpoint_file_name;

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// アンサンブルを構成するチェックポイントの一覧
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnsembleManifest {
    /// モデルディレクトリ（JSONには保存しない）
    #[serde(skip)]
    pub models_dir: PathBuf,
    /// クラス名（出力層の並び順）
    pub class_names: Vec<String>,
    /// チェックポイントのファイル名（フォールド順）
    pub checkpoints: Vec<String>,
    /// 学習時のシード
    #[serde(default)]
    pub seed: Option<u64>,
}

impl EnsembleManifest {
    pub fn new(models_dir: impl Into<PathBuf>, class_names: Vec<String>, checkpoints: Vec<String>) -> Self {
        Self {
            models_dir: models_dir.into(),
            class_names,
            checkpoints,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// 規約名（model_1.tar.gz .. model_K.tar.gz）でマニフェストを組み立てる
    pub fn conventional(models_dir: impl Into<PathBuf>, class_names: Vec<String>, k: usize) -> Self {
        let checkpoints = (1..=k).map(checkpoint_file_name).collect();
        Self::new(models_dir, class_names, checkpoints)
    }

    pub fn manifest_path(models_dir: &Path) -> PathBuf {
        models_dir.join(MANIFEST_FILE_NAME)
    }

    /// models_dir/manifest.json を読み込む
    pub fn load(models_dir: &Path) -> Result<Self> {
        let path = Self::manifest_path(models_dir);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let mut manifest: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;
        manifest.models_dir = models_dir.to_path_buf();
        Ok(manifest)
    }

    /// マニフェストがあれば読み込み、無ければ規約名で組み立てる
    pub fn load_or_conventional(models_dir: &Path, class_names: Vec<String>, k: usize) -> Result<Self> {
        if Self::manifest_path(models_dir).exists() {
            tracing::info!("マニフェストを読み込みます: {}", Self::manifest_path(models_dir).display());
            Self::load(models_dir)
        } else {
            tracing::info!(
                "マニフェストが無いため規約名を使用します: {} (K={})",
                models_dir.display(),
                k
            );
            Ok(Self::conventional(models_dir, class_names, k))
        }
    }

    /// models_dir/manifest.json に保存
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.models_dir)
            .with_context(|| format!("Failed to create models directory: {}", self.models_dir.display()))?;
        let path = Self::manifest_path(&self.models_dir);
        let json = serde_json::to_string_pretty(self).context("Failed to serialize manifest")?;
        fs::write(&path, json).with_context(|| format!("Failed to write manifest: {}", path.display()))?;
        Ok(())
    }

    /// チェックポイントのフルパス（マニフェスト順）
    pub fn checkpoint_paths(&self) -> Vec<PathBuf> {
        self.checkpoints.iter().map(|name| self.models_dir.join(name)).collect()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    /// モデルディレクトリと全チェックポイントの存在を確認
    ///
    /// 1つでも欠けていればエラー。何も読み込む前に呼びます。
    pub fn verify_files(&self) -> crate::error::Result<()> {
        if !self.models_dir.is_dir() {
            return Err(ClassifierError::missing_path("モデルディレクトリ", &self.models_dir));
        }
        if self.is_empty() {
            return Err(ClassifierError::Config("マニフェストにチェックポイントがありません".to_string()));
        }
        for path in self.checkpoint_paths() {
            if !path.is_file() {
                return Err(ClassifierError::missing_path("チェックポイント", path));
            }
        }
        Ok(())
    }
}
