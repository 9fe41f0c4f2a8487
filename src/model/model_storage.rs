//! チェックポイントの永続化
//!
//! Tar.gz形式でモデルとメタデータを1ファイルに統合して保存・読み込みします。
//!
//! ファイル構成（tar.gz内部）:
//! - metadata.json   - メタデータ（フォールド、クラス名、精度など）
//! - model.bin       - モデルの重み（バイナリ）

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};

use crate::error::ClassifierError;
use crate::model::model_metadata::ModelMetadata;

const METADATA_ENTRY: &str = "metadata.json";
const MODEL_ENTRY: &str = "model.bin";

/// フォールド番号からチェックポイントのファイル名を生成（例: model_1.tar.gz）
pub fn checkpoint_file_name(fold: usize) -> String {
    format!("model_{}.tar.gz", fold)
}

/// モデルディレクトリ内のチェックポイントパス
pub fn checkpoint_path(models_dir: &Path, fold: usize) -> PathBuf {
    models_dir.join(checkpoint_file_name(fold))
}

/// メタデータと共にモデルをTar.gz形式で保存
///
/// 既存のファイルは上書きします。
pub fn save_checkpoint(output_path: &Path, metadata: &ModelMetadata, model_binary: &[u8]) -> Result<()> {
    // 親ディレクトリが存在しない場合は作成
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)
            .context(format!("Failed to create parent directory: {:?}", parent))?;
    }

    let tar_gz_file = File::create(output_path)
        .context(format!("Failed to create tar.gz file: {:?}", output_path))?;

    // Gzip圧縮を設定
    let encoder = GzEncoder::new(tar_gz_file, Compression::default());
    let mut tar_builder = Builder::new(encoder);

    let json_str = metadata.to_json_string()?;
    append_entry(&mut tar_builder, METADATA_ENTRY, json_str.as_bytes())?;
    append_entry(&mut tar_builder, MODEL_ENTRY, model_binary)?;

    // gzipストリームまで閉じる
    let encoder = tar_builder
        .into_inner()
        .context("Failed to finalize tar.gz archive")?;
    encoder.finish().context("Failed to finish gzip stream")?;

    Ok(())
}

fn append_entry<W: std::io::Write>(builder: &mut Builder<W>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append(&header, data)
        .context(format!("Failed to add {} to tar", name))
}

/// メタデータとモデルバイナリを共に読み込む
pub fn load_checkpoint(tar_gz_path: &Path) -> crate::error::Result<(ModelMetadata, Vec<u8>)> {
    if !tar_gz_path.is_file() {
        return Err(ClassifierError::missing_path("チェックポイント", tar_gz_path));
    }

    let (metadata, binary) = read_archive(tar_gz_path)
        .map_err(|e| ClassifierError::checkpoint_load(tar_gz_path, format!("{:#}", e)))?;

    match (metadata, binary) {
        (Some(metadata), Some(binary)) => Ok((metadata, binary)),
        (None, _) => Err(ClassifierError::checkpoint_load(
            tar_gz_path,
            "metadata.json not found in tar.gz archive",
        )),
        (_, None) => Err(ClassifierError::checkpoint_load(
            tar_gz_path,
            "model.bin not found in tar.gz archive",
        )),
    }
}

fn read_archive(tar_gz_path: &Path) -> Result<(Option<ModelMetadata>, Option<Vec<u8>>)> {
    let tar_gz_file = File::open(tar_gz_path)
        .context(format!("Failed to open tar.gz file: {:?}", tar_gz_path))?;

    let decoder = GzDecoder::new(tar_gz_file);
    let mut archive = Archive::new(decoder);

    let mut metadata_opt: Option<ModelMetadata> = None;
    let mut model_binary_opt: Option<Vec<u8>> = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?;

        match path.to_str() {
            Some(METADATA_ENTRY) => {
                let mut json_str = String::new();
                entry.read_to_string(&mut json_str)?;
                metadata_opt = Some(ModelMetadata::from_json_string(&json_str)?);
            }
            Some(MODEL_ENTRY) => {
                let mut buffer = Vec::new();
                entry.read_to_end(&mut buffer)?;
                model_binary_opt = Some(buffer);
            }
            _ => {}
        }
    }

    Ok((metadata_opt, model_binary_opt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_metadata(fold: usize, accuracy: f64) -> ModelMetadata {
        ModelMetadata::new(
            fold,
            vec!["match_ready".to_string(), "not_match_ready".to_string()],
            224,
            accuracy,
            3,
            15,
            42,
        )
    }

    #[test]
    fn test_checkpoint_file_name() {
        assert_eq!(checkpoint_file_name(1), "model_1.tar.gz");
        assert_eq!(
            checkpoint_path(Path::new("models"), 3),
            PathBuf::from("models/model_3.tar.gz")
        );
    }

    #[test]
    fn test_save_and_load_checkpoint() {
        let dir = tempdir().unwrap();
        let path = checkpoint_path(dir.path(), 2);
        let metadata = sample_metadata(2, 0.9);

        save_checkpoint(&path, &metadata, &[1, 2, 3, 4]).unwrap();

        let (loaded, binary) = load_checkpoint(&path).unwrap();
        assert_eq!(loaded, metadata);
        assert_eq!(binary, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_save_overwrites_previous_checkpoint() {
        let dir = tempdir().unwrap();
        let path = checkpoint_path(dir.path(), 1);

        save_checkpoint(&path, &sample_metadata(1, 0.6), &[0; 8]).unwrap();
        save_checkpoint(&path, &sample_metadata(1, 0.8), &[9; 4]).unwrap();

        let (loaded, binary) = load_checkpoint(&path).unwrap();
        assert_eq!(loaded.best_accuracy, 0.8);
        assert_eq!(binary, vec![9; 4]);
    }

    #[test]
    fn test_save_creates_models_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("models").join(checkpoint_file_name(1));
        save_checkpoint(&path, &sample_metadata(1, 0.5), &[]).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn test_missing_checkpoint_is_missing_path() {
        let dir = tempdir().unwrap();
        let err = load_checkpoint(&dir.path().join("model_1.tar.gz")).unwrap_err();
        assert!(matches!(err, ClassifierError::MissingPath { .. }));
    }

    #[test]
    fn test_corrupt_checkpoint_is_load_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model_1.tar.gz");
        std::fs::write(&path, b"not a tarball").unwrap();

        let err = load_checkpoint(&path).unwrap_err();
        assert!(matches!(err, ClassifierError::CheckpointLoad { .. }));
    }
}
