//! 画像の読み込み・リサイズ・正規化（検証／推論用パイプライン）

use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::error::{ClassifierError, Result};

/// ImageNetの平均
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNetの標準偏差
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// 画像をRGBで読み込む
pub fn open_rgb(path: &Path) -> Result<RgbImage> {
    let img = image::open(path).map_err(|source| ClassifierError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_rgb8())
}

/// 正方形にリサイズ（バイリニア）
pub fn resize_square(img: &RgbImage, size: u32) -> RgbImage {
    if img.dimensions() == (size, size) {
        return img.clone();
    }
    imageops::resize(img, size, size, FilterType::Triangle)
}

/// ImageNetの平均と標準偏差で正規化
///
/// # 戻り値
/// - 正規化されたRGB画像データ (C, H, W) の順で平坦化
pub fn to_normalized_chw(img: &RgbImage) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let mut data = Vec::with_capacity(3 * width as usize * height as usize);

    for channel in 0..3 {
        for y in 0..height {
            for x in 0..width {
                let pixel = img.get_pixel(x, y);
                let value = pixel[channel] as f32 / 255.0;
                data.push((value - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel]);
            }
        }
    }

    data
}

/// 検証・推論用の前処理（リサイズ + 正規化のみ、乱数なし）
#[derive(Clone, Debug)]
pub struct EvalTransform {
    image_size: u32,
}

impl EvalTransform {
    pub fn new(image_size: u32) -> Self {
        Self { image_size }
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    pub fn apply(&self, img: &RgbImage) -> Vec<f32> {
        to_normalized_chw(&resize_square(img, self.image_size))
    }

    /// 画像ファイルを読み込んで前処理
    pub fn load(&self, path: &Path) -> Result<Vec<f32>> {
        Ok(self.apply(&open_rgb(path)?))
    }
}
