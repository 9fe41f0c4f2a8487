//! 画像前処理（学習用の拡張パイプラインと検証用パイプライン）

pub mod transform;
pub mod augmentation;

pub use transform::{open_rgb, to_normalized_chw, EvalTransform, IMAGENET_MEAN, IMAGENET_STD};
pub use augmentation::TrainTransform;
