//! 計算バックエンドの選択
//!
//! 設定の `device_type` に応じて WGPU (GPU) か NdArray (CPU) を使い分けます。

use std::path::Path;

use anyhow::Result;
use burn::backend::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};
use burn_wgpu::{Wgpu, WgpuDevice};

use crate::evaluation::{CrossValidationSummary, EnsembleDecision};
use crate::ml::{run_cross_validation, EnsemblePredictor};
use crate::model::config::{AppConfig, DeviceType};
use crate::model::EnsembleManifest;

pub type CpuBackend = NdArray<f32>;
pub type GpuBackend = Wgpu;
pub type CpuTrainingBackend = Autodiff<CpuBackend>;
pub type GpuTrainingBackend = Autodiff<GpuBackend>;

/// 設定のバックエンドで交差検証を実行
pub fn train(config: &AppConfig) -> Result<CrossValidationSummary> {
    tracing::info!("使用デバイス: {}", config.device_type);
    match config.device_type {
        DeviceType::Wgpu => run_cross_validation::<GpuTrainingBackend>(config, WgpuDevice::default()),
        DeviceType::Cpu => run_cross_validation::<CpuTrainingBackend>(config, NdArrayDevice::Cpu),
    }
}

/// バックエンドごとの推論エンジン
pub enum Predictor {
    Wgpu(EnsemblePredictor<GpuBackend>),
    NdArray(EnsemblePredictor<CpuBackend>),
}

impl Predictor {
    pub fn load(manifest: &EnsembleManifest, device_type: &DeviceType) -> crate::error::Result<Self> {
        tracing::info!("使用デバイス: {}", device_type);
        match device_type {
            DeviceType::Wgpu => Ok(Self::Wgpu(EnsemblePredictor::load(manifest, WgpuDevice::default())?)),
            DeviceType::Cpu => Ok(Self::NdArray(EnsemblePredictor::load(manifest, NdArrayDevice::Cpu)?)),
        }
    }

    pub fn predict(&self, image_path: &Path) -> crate::error::Result<EnsembleDecision> {
        match self {
            Self::Wgpu(predictor) => predictor.predict(image_path),
            Self::NdArray(predictor) => predictor.predict(image_path),
        }
    }

    pub fn class_names(&self) -> &[String] {
        match self {
            Self::Wgpu(predictor) => predictor.class_names(),
            Self::NdArray(predictor) => predictor.class_names(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_cpu_predictor_reports_missing_models_dir() {
        let dir = tempdir().unwrap();
        let manifest = EnsembleManifest::conventional(
            dir.path().join("models"),
            vec!["match_ready".to_string(), "not_match_ready".to_string()],
            3,
        );
        let result = Predictor::load(&manifest, &DeviceType::Cpu);
        assert!(matches!(result, Err(crate::error::ClassifierError::MissingPath { .. })));
    }
}
