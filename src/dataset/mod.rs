pub mod image_folder;
pub mod folds;

pub use image_folder::{BallDataset, ImageRecord};
pub use folds::{Fold, FoldPartitioner};
