pub mod ml_model;
pub mod training;
pub mod inference;

pub use ml_model::{BallClassifier, ClassifierConfig, ResNet18Backbone, FEATURE_DIM};
pub use training::{run_cross_validation, FoldTrainer, ImageBatch, ImageBatcher, ImageItem};
pub use inference::EnsemblePredictor;
