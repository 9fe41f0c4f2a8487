pub mod model_metadata;
pub mod model_storage;
pub mod ensemble_manifest;
pub mod config;

pub use model_metadata::ModelMetadata;
pub use model_storage::{checkpoint_file_name, checkpoint_path, save_checkpoint, load_checkpoint};
pub use ensemble_manifest::EnsembleManifest;
pub use config::{AppConfig, AugmentationSettings, DeviceType, ModelSettings, TrainingSettings, CLASS_NAMES, IMAGE_SIZE, NUM_CLASSES};
