//! 交差検証結果の集計

use serde::{Deserialize, Serialize};

/// 1フォールドの学習結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldOutcome {
    /// フォールド番号（1始まり）
    pub fold: usize,
    /// 最良の検証精度
    pub best_accuracy: f64,
    /// 最良値を記録したエポック（1始まり）
    pub best_epoch: usize,
    /// 実行したエポック数
    pub epochs_run: usize,
    /// 早期終了したか
    pub stopped_early: bool,
}

/// 全フォールドの集計
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossValidationSummary {
    pub folds: Vec<FoldOutcome>,
}

impl CrossValidationSummary {
    pub fn new(folds: Vec<FoldOutcome>) -> Self {
        Self { folds }
    }

    pub fn accuracies(&self) -> Vec<f64> {
        self.folds.iter().map(|f| f.best_accuracy).collect()
    }

    /// 平均精度
    pub fn mean(&self) -> f64 {
        if self.folds.is_empty() {
            return 0.0;
        }
        self.accuracies().iter().sum::<f64>() / self.folds.len() as f64
    }

    /// 標準偏差（母集団）
    pub fn std_dev(&self) -> f64 {
        if self.folds.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self
            .accuracies()
            .iter()
            .map(|a| (a - mean).powi(2))
            .sum::<f64>()
            / self.folds.len() as f64;
        variance.sqrt()
    }

    pub fn best(&self) -> Option<f64> {
        self.accuracies().into_iter().reduce(f64::max)
    }

    pub fn worst(&self) -> Option<f64> {
        self.accuracies().into_iter().reduce(f64::min)
    }

    /// 結果をコンソールに表示
    pub fn print(&self) {
        let rule = "=".repeat(50);
        println!("\n{}", rule);
        println!("📊 交差検証の結果");
        println!("{}", rule);
        for fold in &self.folds {
            println!(
                "   Fold {}: {:.4} ({:.2}%)  best epoch {} / {} epochs{}",
                fold.fold,
                fold.best_accuracy,
                fold.best_accuracy * 100.0,
                fold.best_epoch,
                fold.epochs_run,
                if fold.stopped_early { " (早期終了)" } else { "" }
            );
        }
        println!("{}", "-".repeat(50));
        println!("   平均精度: {:.4} ({:.2}%)", self.mean(), self.mean() * 100.0);
        println!("   標準偏差: {:.4}", self.std_dev());
        if let (Some(best), Some(worst)) = (self.best(), self.worst()) {
            println!("   最良フォールド: {:.4}", best);
            println!("   最悪フォールド: {:.4}", worst);
        }
        println!("{}", rule);
    }
}
