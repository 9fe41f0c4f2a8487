//! 学習用データ拡張パイプライン
//!
//! 適用順序:
//! 1. 256x256 にリサイズ
//! 2. ランダムクロップ（面積比 0.8-1.0）→ 224x224
//! 3. 左右反転 (p=0.5)
//! 4. 回転 (±20°)
//! 5. 上下反転 (p=0.1)
//! 6. 明るさ・コントラスト (±0.1、順序はランダム)
//! 7. 平行移動 (±5%)
//! 8. 224x224 にリサイズ + 正規化
//!
//! 乱数はすべて呼び出し側から渡されたRNGから引きます。

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::Result;
use crate::imaging::transform::{open_rgb, resize_square, to_normalized_chw};
use crate::model::config::AugmentationSettings;

/// ランダムクロップの試行回数
const CROP_ATTEMPTS: usize = 10;

const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// クロップ領域 (x, y, 幅, 高さ)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// 学習用の前処理
#[derive(Clone, Debug)]
pub struct TrainTransform {
    settings: AugmentationSettings,
    image_size: u32,
}

impl TrainTransform {
    pub fn new(settings: AugmentationSettings, image_size: u32) -> Self {
        Self {
            settings,
            image_size,
        }
    }

    /// 拡張を適用（正規化前の画像を返す）
    pub fn augment<R: Rng + ?Sized>(&self, img: &RgbImage, rng: &mut R) -> RgbImage {
        let s = &self.settings;

        let resized = resize_square(img, s.pre_crop_size);
        let crop = random_resized_crop_box(resized.width(), resized.height(), s.crop_scale, s.crop_ratio, rng);
        let cropped = imageops::crop_imm(&resized, crop.x, crop.y, crop.width, crop.height).to_image();
        let mut out = imageops::resize(&cropped, self.image_size, self.image_size, FilterType::Triangle);

        if rng.gen_bool(s.horizontal_flip_p) {
            out = imageops::flip_horizontal(&out);
        }

        let angle = rng.gen_range(-s.rotation_degrees..=s.rotation_degrees);
        out = rotate_about_center(&out, angle);

        if rng.gen_bool(s.vertical_flip_p) {
            out = imageops::flip_vertical(&out);
        }

        out = color_jitter(&out, s.brightness, s.contrast, rng);

        let max_dx = s.translate.0 * out.width() as f32;
        let max_dy = s.translate.1 * out.height() as f32;
        let dx = rng.gen_range(-max_dx..=max_dx).round() as i64;
        let dy = rng.gen_range(-max_dy..=max_dy).round() as i64;
        out = translate(&out, dx, dy);

        resize_square(&out, self.image_size)
    }

    /// 拡張 + 正規化
    pub fn apply<R: Rng + ?Sized>(&self, img: &RgbImage, rng: &mut R) -> Vec<f32> {
        to_normalized_chw(&self.augment(img, rng))
    }

    /// 画像ファイルを読み込んで前処理
    pub fn load<R: Rng + ?Sized>(&self, path: &Path, rng: &mut R) -> Result<Vec<f32>> {
        Ok(self.apply(&open_rgb(path)?, rng))
    }
}

/// ランダムクロップの領域を決める
///
/// 面積比とアスペクト比をサンプリングし、収まらなければ最大10回やり直します。
/// すべて失敗した場合は中央クロップにフォールバックします。
pub fn random_resized_crop_box<R: Rng + ?Sized>(
    width: u32,
    height: u32,
    scale: (f32, f32),
    ratio: (f32, f32),
    rng: &mut R,
) -> CropBox {
    let area = (width * height) as f32;
    let (log_lo, log_hi) = (ratio.0.ln(), ratio.1.ln());

    for _ in 0..CROP_ATTEMPTS {
        let target_area = area * rng.gen_range(scale.0..=scale.1);
        let aspect = rng.gen_range(log_lo..=log_hi).exp();

        let w = (target_area * aspect).sqrt().round() as u32;
        let h = (target_area / aspect).sqrt().round() as u32;

        if w > 0 && h > 0 && w <= width && h <= height {
            let x = rng.gen_range(0..=width - w);
            let y = rng.gen_range(0..=height - h);
            return CropBox { x, y, width: w, height: h };
        }
    }

    let in_ratio = width as f32 / height as f32;
    let (w, h) = if in_ratio < ratio.0 {
        (width, (width as f32 / ratio.0).round() as u32)
    } else if in_ratio > ratio.1 {
        ((height as f32 * ratio.1).round() as u32, height)
    } else {
        (width, height)
    };
    CropBox {
        x: (width - w) / 2,
        y: (height - h) / 2,
        width: w,
        height: h,
    }
}

/// 画像中心を軸に回転（反時計回りが正、最近傍補間、余白は黒）
pub fn rotate_about_center(img: &RgbImage, degrees: f32) -> RgbImage {
    if degrees == 0.0 {
        return img.clone();
    }

    let (width, height) = img.dimensions();
    let (sin, cos) = degrees.to_radians().sin_cos();
    let cx = width as f32 * 0.5;
    let cy = height as f32 * 0.5;

    RgbImage::from_fn(width, height, |x, y| {
        let dx = x as f32 + 0.5 - cx;
        let dy = y as f32 + 0.5 - cy;
        let sx = (dx * cos - dy * sin + cx).floor();
        let sy = (dx * sin + dy * cos + cy).floor();

        if sx >= 0.0 && sy >= 0.0 && (sx as u32) < width && (sy as u32) < height {
            *img.get_pixel(sx as u32, sy as u32)
        } else {
            BLACK
        }
    })
}

/// 平行移動（余白は黒）
pub fn translate(img: &RgbImage, dx: i64, dy: i64) -> RgbImage {
    if dx == 0 && dy == 0 {
        return img.clone();
    }

    let (width, height) = img.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let sx = x as i64 - dx;
        let sy = y as i64 - dy;
        if sx >= 0 && sy >= 0 && sx < width as i64 && sy < height as i64 {
            *img.get_pixel(sx as u32, sy as u32)
        } else {
            BLACK
        }
    })
}

/// 明るさ・コントラストの揺らぎ（適用順はランダム）
pub fn color_jitter<R: Rng + ?Sized>(img: &RgbImage, brightness: f32, contrast: f32, rng: &mut R) -> RgbImage {
    let mut order = [0usize, 1];
    order.shuffle(rng);

    let mut out = img.clone();
    for op in order {
        match op {
            0 if brightness > 0.0 => {
                let factor = rng.gen_range((1.0 - brightness).max(0.0)..=1.0 + brightness);
                out = adjust_brightness(&out, factor);
            }
            1 if contrast > 0.0 => {
                let factor = rng.gen_range((1.0 - contrast).max(0.0)..=1.0 + contrast);
                out = adjust_contrast(&out, factor);
            }
            _ => {}
        }
    }
    out
}

/// 明るさを調整（黒とのブレンド）
pub fn adjust_brightness(img: &RgbImage, factor: f32) -> RgbImage {
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        for c in pixel.0.iter_mut() {
            *c = (*c as f32 * factor).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// コントラストを調整（グレースケール平均とのブレンド）
pub fn adjust_contrast(img: &RgbImage, factor: f32) -> RgbImage {
    let total = (img.width() * img.height()).max(1) as f32;
    let mean = img
        .pixels()
        .map(|p| 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32)
        .sum::<f32>()
        / total;

    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        for c in pixel.0.iter_mut() {
            *c = (factor * *c as f32 + (1.0 - factor) * mean).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}
