//! アンサンブルの確率平均と判定

use serde::Serialize;

/// 確率ベクトルの要素ごとの算術平均
///
/// 空の入力や長さの異なるベクトルは `None` を返します。
pub fn average_probabilities(probabilities: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = probabilities.first()?;
    let num_classes = first.len();
    if num_classes == 0 || probabilities.iter().any(|p| p.len() != num_classes) {
        return None;
    }

    let mut sums = vec![0.0f64; num_classes];
    for probs in probabilities {
        for (sum, &p) in sums.iter_mut().zip(probs) {
            *sum += p as f64;
        }
    }

    let count = probabilities.len() as f64;
    Some(sums.into_iter().map(|s| (s / count) as f32).collect())
}

/// 最大値のインデックス（同値なら小さいほう）
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// アンサンブルの判定結果
#[derive(Debug, Clone, Serialize)]
pub struct EnsembleDecision {
    /// 予測クラスID
    pub class_index: usize,
    /// 予測クラス名
    pub label: String,
    /// 予測クラスの平均確率
    pub confidence: f32,
    /// クラスごとの平均確率
    pub mean_probabilities: Vec<f32>,
    /// モデルごとの確率（マニフェスト順）
    pub member_probabilities: Vec<Vec<f32>>,
}

impl EnsembleDecision {
    /// 各モデルの確率から判定
    pub fn from_member_probabilities(member_probabilities: Vec<Vec<f32>>, class_names: &[String]) -> Option<Self> {
        let mean_probabilities = average_probabilities(&member_probabilities)?;
        if mean_probabilities.len() != class_names.len() {
            return None;
        }
        let class_index = argmax(&mean_probabilities)?;

        Some(Self {
            class_index,
            label: class_names[class_index].clone(),
            confidence: mean_probabilities[class_index],
            mean_probabilities,
            member_probabilities,
        })
    }

    /// 結果をコンソールに表示
    pub fn print(&self, class_names: &[String]) {
        for (i, probs) in self.member_probabilities.iter().enumerate() {
            if let Some(idx) = argmax(probs) {
                println!("   Model {} prediction: {} ({:.4})", i + 1, class_names[idx], probs[idx]);
            }
        }

        let rule = "=".repeat(50);
        println!("\n{}", rule);
        println!("📊 アンサンブル予測結果");
        println!("{}", rule);
        println!("✅ 最終予測: {}", self.label);
        println!("📊 信頼度: {:.4} ({:.2}%)", self.confidence, self.confidence * 100.0);
        println!("📊 クラス確率:");
        for (name, p) in class_names.iter().zip(&self.mean_probabilities) {
            println!("   {}: {:.4} ({:.2}%)", name, p, p * 100.0);
        }
        println!("{}", rule);
    }
}
