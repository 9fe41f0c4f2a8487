//! 学習率スケジュールと早期終了の判定
//!
//! どちらも検証精度（大きいほど良い）を監視します。

use serde::{Deserialize, Serialize};

use crate::evaluation::FoldOutcome;
use crate::model::config::TrainingSettings;

/// 改善とみなす相対しきい値
const PLATEAU_THRESHOLD: f64 = 1e-4;

/// 検証精度が伸びなくなったら学習率を下げるスケジューラ
///
/// 非改善エポック数が `patience` を超えた時点で学習率に `factor` を掛け、
/// カウンタをリセットします。
#[derive(Debug, Clone)]
pub struct PlateauScheduler {
    current_lr: f64,
    factor: f64,
    patience: usize,
    best: Option<f64>,
    num_bad_epochs: usize,
}

impl PlateauScheduler {
    pub fn new(base_lr: f64, factor: f64, patience: usize) -> Self {
        Self {
            current_lr: base_lr,
            factor,
            patience,
            best: None,
            num_bad_epochs: 0,
        }
    }

    /// 現在の学習率
    pub fn lr(&self) -> f64 {
        self.current_lr
    }

    /// エポック終了時に検証精度を渡す
    ///
    /// 学習率を下げた場合は `true` を返します。
    pub fn step(&mut self, metric: f64) -> bool {
        let improved = match self.best {
            Some(best) => metric > best * (1.0 + PLATEAU_THRESHOLD),
            None => true,
        };

        if improved {
            self.best = Some(metric);
            self.num_bad_epochs = 0;
            return false;
        }

        self.num_bad_epochs += 1;
        if self.num_bad_epochs > self.patience {
            self.current_lr *= self.factor;
            self.num_bad_epochs = 0;
            return true;
        }
        false
    }
}

/// エポックごとの判定結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochOutcome {
    /// 最良値を更新（チェックポイントを保存する）
    Improved,
    /// 更新なし（まだ続行）
    Stalled,
    /// 更新なしが続いたため終了
    Exhausted,
}

/// フォールド内の最良精度と早期終了カウンタ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovementTracker {
    patience: usize,
    best_accuracy: f64,
    best_epoch: Option<usize>,
    patience_counter: usize,
}

impl ImprovementTracker {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best_accuracy: 0.0,
            best_epoch: None,
            patience_counter: 0,
        }
    }

    /// 検証精度を記録して判定
    ///
    /// 最良値の初期値は 0.0 で、厳密に上回った場合のみ改善です。
    pub fn observe(&mut self, epoch: usize, accuracy: f64) -> EpochOutcome {
        if accuracy > self.best_accuracy {
            self.best_accuracy = accuracy;
            self.best_epoch = Some(epoch);
            self.patience_counter = 0;
            EpochOutcome::Improved
        } else {
            self.patience_counter += 1;
            if self.patience_counter >= self.patience {
                EpochOutcome::Exhausted
            } else {
                EpochOutcome::Stalled
            }
        }
    }

    pub fn best_accuracy(&self) -> f64 {
        self.best_accuracy
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn patience_counter(&self) -> usize {
        self.patience_counter
    }
}

/// エポック終了時に学習ループが取る行動
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochDecision {
    /// このエポックのモデルでチェックポイントを上書きする
    pub save_checkpoint: bool,
    /// フォールドの学習を打ち切る
    pub stop: bool,
    /// 次のエポックから学習率が下がる
    pub lr_reduced: bool,
}

/// 1フォールドの進行状況
///
/// 早期終了の判定を先に行い、続行する場合だけスケジューラを進めます。
#[derive(Debug, Clone)]
pub struct FoldProgress {
    tracker: ImprovementTracker,
    scheduler: PlateauScheduler,
    epochs_run: usize,
    stopped_early: bool,
}

impl FoldProgress {
    pub fn new(settings: &TrainingSettings) -> Self {
        Self {
            tracker: ImprovementTracker::new(settings.early_stopping_patience),
            scheduler: PlateauScheduler::new(settings.learning_rate, settings.plateau_factor, settings.plateau_patience),
            epochs_run: 0,
            stopped_early: false,
        }
    }

    /// 次のエポックで使う学習率
    pub fn lr(&self) -> f64 {
        self.scheduler.lr()
    }

    pub fn patience_counter(&self) -> usize {
        self.tracker.patience_counter()
    }

    /// エポックの検証精度を記録し、次の行動を返す
    pub fn end_epoch(&mut self, epoch: usize, val_accuracy: f64) -> EpochDecision {
        self.epochs_run = epoch;
        match self.tracker.observe(epoch, val_accuracy) {
            EpochOutcome::Exhausted => {
                self.stopped_early = true;
                EpochDecision {
                    save_checkpoint: false,
                    stop: true,
                    lr_reduced: false,
                }
            }
            outcome => EpochDecision {
                save_checkpoint: outcome == EpochOutcome::Improved,
                stop: false,
                lr_reduced: self.scheduler.step(val_accuracy),
            },
        }
    }

    /// フォールドの結果
    ///
    /// 一度も改善しなかった場合 `best_epoch` は 0 です。
    pub fn outcome(&self, fold: usize) -> FoldOutcome {
        FoldOutcome {
            fold,
            best_accuracy: self.tracker.best_accuracy(),
            best_epoch: self.tracker.best_epoch().unwrap_or(0),
            epochs_run: self.epochs_run,
            stopped_early: self.stopped_early,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plateau_halves_after_patience_exceeded() {
        let mut scheduler = PlateauScheduler::new(0.001, 0.5, 3);

        assert!(!scheduler.step(0.70));
        assert!(!scheduler.step(0.75));
        // 3エポック非改善ではまだ下げない
        assert!(!scheduler.step(0.75));
        assert!(!scheduler.step(0.74));
        assert!(!scheduler.step(0.70));
        assert_eq!(scheduler.lr(), 0.001);
        // 4エポック目で半減
        assert!(scheduler.step(0.72));
        assert!((scheduler.lr() - 0.0005).abs() < 1e-12);
    }

    #[test]
    fn test_plateau_requires_relative_margin() {
        let mut scheduler = PlateauScheduler::new(0.01, 0.5, 0);
        scheduler.step(0.5);
        // 0.5 * (1 + 1e-4) = 0.50005 を超えないので非改善
        assert!(scheduler.step(0.50001));
        assert!((scheduler.lr() - 0.005).abs() < 1e-12);
    }

    #[test]
    fn test_zero_accuracy_is_not_improvement() {
        let mut tracker = ImprovementTracker::new(5);
        assert_eq!(tracker.observe(1, 0.0), EpochOutcome::Stalled);
        assert_eq!(tracker.best_epoch(), None);
        assert_eq!(tracker.patience_counter(), 1);
        assert_eq!(tracker.observe(2, 0.25), EpochOutcome::Improved);
        assert_eq!(tracker.best_epoch(), Some(2));
        assert_eq!(tracker.patience_counter(), 0);
    }

    #[test]
    fn test_equal_accuracy_is_not_improvement() {
        let mut tracker = ImprovementTracker::new(5);
        tracker.observe(1, 0.8);
        assert_eq!(tracker.observe(2, 0.8), EpochOutcome::Stalled);
        assert_eq!(tracker.patience_counter(), 1);
        assert_eq!(tracker.best_epoch(), Some(1));
    }

    #[test]
    fn test_exhausted_after_five_stalls() {
        let mut tracker = ImprovementTracker::new(5);
        tracker.observe(1, 0.9);
        for epoch in 2..6 {
            assert_eq!(tracker.observe(epoch, 0.5), EpochOutcome::Stalled);
        }
        assert_eq!(tracker.observe(6, 0.5), EpochOutcome::Exhausted);
        assert_eq!(tracker.best_accuracy(), 0.9);
    }

    #[test]
    fn test_improvement_resets_counter() {
        let mut tracker = ImprovementTracker::new(2);
        tracker.observe(1, 0.6);
        assert_eq!(tracker.observe(2, 0.5), EpochOutcome::Stalled);
        assert_eq!(tracker.observe(3, 0.7), EpochOutcome::Improved);
        assert_eq!(tracker.patience_counter(), 0);
        assert_eq!(tracker.observe(4, 0.7), EpochOutcome::Stalled);
        assert_eq!(tracker.observe(5, 0.1), EpochOutcome::Exhausted);
    }

    fn settings(patience: usize, plateau_patience: usize) -> TrainingSettings {
        TrainingSettings {
            early_stopping_patience: patience,
            plateau_patience,
            learning_rate: 0.001,
            plateau_factor: 0.5,
            ..TrainingSettings::default()
        }
    }

    /// 精度列を流し、チェックポイントを保存したエポックを返す
    fn run_scripted(progress: &mut FoldProgress, accuracies: &[f64]) -> Vec<usize> {
        let mut saved = Vec::new();
        for (i, &accuracy) in accuracies.iter().enumerate() {
            let epoch = i + 1;
            let decision = progress.end_epoch(epoch, accuracy);
            if decision.save_checkpoint {
                saved.push(epoch);
            }
            if decision.stop {
                break;
            }
        }
        saved
    }

    #[test]
    fn test_fold_stops_after_patience_and_keeps_best_epoch() {
        let mut progress = FoldProgress::new(&settings(5, 3));
        let saved = run_scripted(&mut progress, &[0.6, 0.8, 0.7, 0.7, 0.75, 0.8, 0.79, 0.95, 0.99]);

        assert_eq!(saved, vec![1, 2]);
        let outcome = progress.outcome(3);
        assert_eq!(outcome.fold, 3);
        assert_eq!(outcome.best_epoch, 2);
        assert_eq!(outcome.best_accuracy, 0.8);
        // 3〜7 の5エポックで改善なし
        assert_eq!(outcome.epochs_run, 7);
        assert!(outcome.stopped_early);
    }

    #[test]
    fn test_fold_runs_full_budget_without_stopping() {
        let mut progress = FoldProgress::new(&settings(5, 3));
        let saved = run_scripted(&mut progress, &[0.5, 0.6, 0.55, 0.7]);

        assert_eq!(saved, vec![1, 2, 4]);
        let outcome = progress.outcome(1);
        assert_eq!(outcome.best_epoch, 4);
        assert_eq!(outcome.best_accuracy, 0.7);
        assert_eq!(outcome.epochs_run, 4);
        assert!(!outcome.stopped_early);
    }

    #[test]
    fn test_scheduler_not_stepped_on_stopping_epoch() {
        // 早期終了の忍耐 2、プラトーの忍耐 0: 非改善1回目で学習率が下がる
        let mut progress = FoldProgress::new(&settings(2, 0));
        let first = progress.end_epoch(1, 0.9);
        assert!(first.save_checkpoint && !first.lr_reduced);

        let second = progress.end_epoch(2, 0.8);
        assert!(second.lr_reduced && !second.stop);
        assert!((progress.lr() - 0.0005).abs() < 1e-12);

        let third = progress.end_epoch(3, 0.8);
        assert!(third.stop && !third.lr_reduced && !third.save_checkpoint);
        assert!((progress.lr() - 0.0005).abs() < 1e-12);
        assert_eq!(progress.patience_counter(), 2);
    }

    #[test]
    fn test_fold_without_improvement_has_no_best_epoch() {
        let mut progress = FoldProgress::new(&settings(5, 3));
        let saved = run_scripted(&mut progress, &[0.0, 0.0]);
        assert!(saved.is_empty());
        assert_eq!(progress.outcome(1).best_epoch, 0);
    }
}
