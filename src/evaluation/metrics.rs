//! 1パス（学習 or 検証）分の損失と精度の集計

/// バッチごとの平均損失と正解数を受け取り、サンプル数で重み付けして集計する
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PassMetrics {
    loss_sum: f64,
    correct: usize,
    seen: usize,
}

impl PassMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 1バッチ分を加算
    ///
    /// `mean_loss` はバッチ内の平均損失、`batch_size` はそのバッチのサンプル数です。
    pub fn add_batch(&mut self, mean_loss: f64, correct: usize, batch_size: usize) {
        self.loss_sum += mean_loss * batch_size as f64;
        self.correct += correct;
        self.seen += batch_size;
    }

    /// サンプル平均の損失（Σ loss_b·n_b / N）
    pub fn loss(&self) -> f64 {
        if self.seen == 0 {
            0.0
        } else {
            self.loss_sum / self.seen as f64
        }
    }

    /// 正解率（0.0〜1.0）
    pub fn accuracy(&self) -> f64 {
        if self.seen == 0 {
            0.0
        } else {
            self.correct as f64 / self.seen as f64
        }
    }
}
