//! クラスごとのサブディレクトリから画像レコードを列挙

use std::path::{Path, PathBuf};

use crate::error::{ClassifierError, Result};

/// 対象とする画像拡張子
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// 画像レコード（画像パス, クラスID）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub label: usize,
}

/// 学習データセット（パスのリストのみ保持）
#[derive(Clone, Debug)]
pub struct BallDataset {
    records: Vec<ImageRecord>,
    class_names: Vec<String>,
}

impl BallDataset {
    /// 指定された順序でディレクトリから学習データを読み込む
    ///
    /// クラスIDは `class_names` の並び順で割り当てます。
    /// クラス内のファイルはパス順に並べるため、ファイルシステムの列挙順に依存しません。
    pub fn from_directory(root: &Path, class_names: &[String]) -> Result<Self> {
        if !root.is_dir() {
            return Err(ClassifierError::missing_path("データセットディレクトリ", root));
        }

        let mut records = Vec::new();
        let mut empty_classes = Vec::new();

        for (class_id, class_name) in class_names.iter().enumerate() {
            let class_dir = root.join(class_name);
            if !class_dir.is_dir() {
                return Err(ClassifierError::missing_path("クラスディレクトリ", class_dir));
            }

            let mut paths = Vec::new();
            for entry in std::fs::read_dir(&class_dir)? {
                let path = entry?.path();
                if path.is_file() && is_image_file(&path) {
                    paths.push(path);
                }
            }
            paths.sort();

            if paths.is_empty() {
                empty_classes.push(class_name.clone());
            }

            records.extend(paths.into_iter().map(|path| ImageRecord {
                path,
                label: class_id,
            }));
        }

        if !empty_classes.is_empty() {
            return Err(ClassifierError::InvalidDataset(format!(
                "以下のクラスディレクトリに画像が1枚もありません: {}",
                empty_classes.join(", ")
            )));
        }

        Ok(Self {
            records,
            class_names: class_names.to_vec(),
        })
    }

    pub fn get(&self, index: usize) -> Option<&ImageRecord> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// クラスごとの画像枚数
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.class_names.len()];
        for record in &self.records {
            counts[record.label] += 1;
        }
        counts
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}
