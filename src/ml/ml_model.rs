//! 機械学習モデルの共通定義
//!
//! ResNet-18 バックボーンに2クラスのヘッドを載せた転移学習モデルを提供します。
//!
//! # アーキテクチャ
//! - Conv 7x7 stride 2 + BN + ReLU + MaxPool 3x3 stride 2
//! - layer1..layer4（BasicBlock x 2、チャネル 64/128/256/512）
//! - Global Average Pooling → 512次元
//! - Dropout(0.5) → Linear(512 → num_classes)
//!
//! 学習時は layer4 とヘッドのみ更新し、それ以前の層は凍結します。

use std::path::Path;

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    record::{FullPrecisionSettings, Recorder},
    tensor::{activation::softmax, backend::Backend, Int, Tensor},
    train::ClassificationOutput,
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};

use crate::error::ClassifierError;

/// バックボーンの出力次元
pub const FEATURE_DIM: usize = 512;

/// torchvision の state_dict キーをこのモジュール構成に合わせる置換規則
const TORCHVISION_KEY_REMAPS: [(&str, &str); 3] = [
    ("layer([1-4])\\.([0-9])\\.", "layer$1.blocks.$2."),
    ("downsample\\.0", "downsample.conv"),
    ("downsample\\.1", "downsample.bn"),
];

fn conv3x3<B: Backend>(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [3, 3])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_bias(false)
        .init(device)
}

/// 残差接続のチャネル・解像度合わせ（1x1 Conv + BN）
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B>,
}

impl<B: Backend> Downsample<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_stride([stride, stride])
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// ResNet の BasicBlock
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B>,
    downsample: Option<Downsample<B>>,
    relu: Relu,
}

impl<B: Backend> BasicBlock<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let downsample = if stride != 1 || in_channels != out_channels {
            Some(Downsample::new(in_channels, out_channels, stride, device))
        } else {
            None
        };

        Self {
            conv1: conv3x3(in_channels, out_channels, stride, device),
            bn1: BatchNormConfig::new(out_channels).init(device),
            conv2: conv3x3(out_channels, out_channels, 1, device),
            bn2: BatchNormConfig::new(out_channels).init(device),
            downsample,
            relu: Relu::new(),
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.conv1.forward(input);
        let x = self.bn1.forward(x);
        let x = self.relu.forward(x);
        let x = self.conv2.forward(x);
        let x = self.bn2.forward(x);

        self.relu.forward(x.add(identity))
    }
}

/// BasicBlock 2個からなるステージ
#[derive(Module, Debug)]
pub struct ResidualStage<B: Backend> {
    blocks: Vec<BasicBlock<B>>,
}

impl<B: Backend> ResidualStage<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            blocks: vec![
                BasicBlock::new(in_channels, out_channels, stride, device),
                BasicBlock::new(out_channels, out_channels, 1, device),
            ],
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks.iter().fold(x, |x, block| block.forward(x))
    }
}

/// ResNet-18 の特徴抽出部（全結合層なし）
#[derive(Module, Debug)]
pub struct ResNet18Backbone<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B>,
    relu: Relu,
    maxpool: MaxPool2d,
    layer1: ResidualStage<B>,
    layer2: ResidualStage<B>,
    layer3: ResidualStage<B>,
    layer4: ResidualStage<B>,
    avgpool: AdaptiveAvgPool2d,
}

impl<B: Backend> ResNet18Backbone<B> {
    /// ランダム初期化
    pub fn new(device: &B::Device) -> Self {
        Self {
            conv1: Conv2dConfig::new([3, 64], [7, 7])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(3, 3))
                .with_bias(false)
                .init(device),
            bn1: BatchNormConfig::new(64).init(device),
            relu: Relu::new(),
            maxpool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            layer1: ResidualStage::new(64, 64, 1, device),
            layer2: ResidualStage::new(64, 128, 2, device),
            layer3: ResidualStage::new(128, 256, 2, device),
            layer4: ResidualStage::new(256, FEATURE_DIM, 2, device),
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
        }
    }

    /// torchvision の ImageNet 学習済み重み (.pth) を読み込む
    ///
    /// state_dict の fc.* はこのモジュールに対応が無いため使われません。
    pub fn pretrained(weights: &Path, device: &B::Device) -> crate::error::Result<Self> {
        if !weights.is_file() {
            return Err(ClassifierError::MissingDependency {
                path: weights.to_path_buf(),
                guidance: "torchvision の resnet18 ImageNet 重みを取得して配置してください \
                           (https://download.pytorch.org/models/resnet18-f37072fd.pth)"
                    .to_string(),
            });
        }

        let mut load_args = LoadArgs::new(weights.to_path_buf());
        for (pattern, replacement) in TORCHVISION_KEY_REMAPS {
            load_args = load_args.with_key_remap(pattern, replacement);
        }

        let record: ResNet18BackboneRecord<B> = PyTorchFileRecorder::<FullPrecisionSettings>::default()
            .load(load_args, device)
            .map_err(|e| ClassifierError::checkpoint_load(weights, e))?;

        tracing::info!("学習済み重みを読み込みました: {}", weights.display());
        Ok(Self::new(device).load_record(record))
    }

    /// layer4 以外を凍結
    pub fn freeze_early_stages(self) -> Self {
        Self {
            conv1: self.conv1.no_grad(),
            bn1: self.bn1.no_grad(),
            layer1: self.layer1.no_grad(),
            layer2: self.layer2.no_grad(),
            layer3: self.layer3.no_grad(),
            ..self
        }
    }

    /// 順伝播
    ///
    /// # 戻り値
    /// - 特徴ベクトル [batch_size, 512]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(images);
        let x = self.bn1.forward(x);
        let x = self.relu.forward(x);
        let x = self.maxpool.forward(x);

        let x = self.layer1.forward(x);
        let x = self.layer2.forward(x);
        let x = self.layer3.forward(x);
        let x = self.layer4.forward(x);

        let x = self.avgpool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        x.reshape([batch_size, channels])
    }
}

/// モデル設定
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// 分類クラス数
    pub num_classes: usize,
    /// ドロップアウト率
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl ClassifierConfig {
    /// ランダム初期化したモデルを作成（推論時のチェックポイント読み込み先）
    pub fn init<B: Backend>(&self, device: &B::Device) -> BallClassifier<B> {
        self.with_backbone(ResNet18Backbone::new(device), device)
    }

    /// 学習用モデルを作成
    ///
    /// 重みが指定されていれば読み込み、layer4 とヘッド以外を凍結します。
    pub fn init_for_training<B: Backend>(
        &self,
        pretrained_weights: Option<&Path>,
        device: &B::Device,
    ) -> crate::error::Result<BallClassifier<B>> {
        let backbone = match pretrained_weights {
            Some(path) => ResNet18Backbone::pretrained(path, device)?,
            None => {
                tracing::warn!("学習済み重みが指定されていないため、バックボーンをランダム初期化します");
                ResNet18Backbone::new(device)
            }
        };

        Ok(self.with_backbone(backbone.freeze_early_stages(), device))
    }

    fn with_backbone<B: Backend>(&self, backbone: ResNet18Backbone<B>, device: &B::Device) -> BallClassifier<B> {
        BallClassifier {
            backbone,
            dropout: DropoutConfig::new(self.dropout).init(),
            fc: LinearConfig::new(FEATURE_DIM, self.num_classes).init(device),
        }
    }
}

/// クリケットボール状態の分類モデル
#[derive(Module, Debug)]
pub struct BallClassifier<B: Backend> {
    backbone: ResNet18Backbone<B>,
    dropout: Dropout,
    fc: Linear<B>,
}

impl<B: Backend> BallClassifier<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, 3, size, size]
    ///
    /// # 戻り値
    /// - クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(images);
        let features = self.dropout.forward(features);
        self.fc.forward(features)
    }

    /// クラス確率 [batch_size, num_classes]
    pub fn predict_probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    /// 順伝播と損失計算（学習用）
    ///
    /// # 戻り値
    /// - ClassificationOutput（損失、出力、ターゲット）
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_forward_output_shape() {
        let device = Default::default();
        let model = ClassifierConfig::new(2).init::<TestBackend>(&device);

        let images = Tensor::<TestBackend, 4>::zeros([2, 3, 64, 64], &device);
        let logits = model.forward(images);

        assert_eq!(logits.dims(), [2, 2]);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let device = Default::default();
        let model = ClassifierConfig::new(2).init::<TestBackend>(&device);

        let images = Tensor::<TestBackend, 4>::ones([1, 3, 64, 64], &device);
        let probs: Vec<f32> = model.predict_probabilities(images).into_data().to_vec().unwrap();

        assert_eq!(probs.len(), 2);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_parameter_count_matches_resnet18() {
        let device = Default::default();
        let model = ClassifierConfig::new(2).init::<TestBackend>(&device);

        // torchvision resnet18 の fc を除いた 11,176,512 + ヘッド 512*2+2
        assert_eq!(model.num_params(), 11_176_512 + 1_026);
    }

    #[test]
    fn test_early_stages_frozen() {
        type AutodiffBackend = Autodiff<TestBackend>;
        let device = Default::default();
        let model = ClassifierConfig::new(2)
            .init_for_training::<AutodiffBackend>(None, &device)
            .unwrap();

        assert!(!model.backbone.conv1.weight.val().is_require_grad());
        assert!(!model.backbone.layer3.blocks[1].conv2.weight.val().is_require_grad());
        assert!(model.backbone.layer4.blocks[0].conv1.weight.val().is_require_grad());
        assert!(model.fc.weight.val().is_require_grad());
    }

    #[test]
    fn test_missing_pretrained_weights() {
        let device = Default::default();
        let result = ClassifierConfig::new(2)
            .init_for_training::<TestBackend>(Some(Path::new("no/such/resnet18.pth")), &device);

        assert!(matches!(result, Err(ClassifierError::MissingDependency { .. })));
    }
}
