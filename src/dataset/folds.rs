//! k分割交差検証のフォールド分割
//!
//! インデックスをシードで固定したRNGでシャッフルし、K個の連続した区間に分けます。
//! 先頭の `N mod K` 個のフォールドは1件多くなります。

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{ClassifierError, Result};

/// 1つのフォールド
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fold {
    /// フォールド番号（1始まり、チェックポイント名に使用）
    pub index: usize,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// フォールド分割器
#[derive(Clone, Debug)]
pub struct FoldPartitioner {
    k: usize,
    seed: u64,
}

impl FoldPartitioner {
    pub fn new(k: usize, seed: u64) -> Self {
        Self { k, seed }
    }

    /// `n` 件のレコードをK個のフォールドに分割
    pub fn split(&self, n: usize) -> Result<Vec<Fold>> {
        if self.k < 2 {
            return Err(ClassifierError::Config(format!(
                "フォールド数は2以上が必要です: {}",
                self.k
            )));
        }
        if n < self.k {
            return Err(ClassifierError::InvalidDataset(format!(
                "画像が{}枚しかありません（フォールド数{}以上が必要）",
                n, self.k
            )));
        }

        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        indices.shuffle(&mut rng);

        let base = n / self.k;
        let remainder = n % self.k;

        let mut folds = Vec::with_capacity(self.k);
        let mut start = 0;
        for fold_idx in 0..self.k {
            let size = base + usize::from(fold_idx < remainder);
            let mut test_indices = indices[start..start + size].to_vec();
            test_indices.sort_unstable();

            let mut in_test = vec![false; n];
            for &i in &test_indices {
                in_test[i] = true;
            }
            let train_indices = (0..n).filter(|&i| !in_test[i]).collect();

            folds.push(Fold {
                index: fold_idx + 1,
                train_indices,
                test_indices,
            });
            start += size;
        }

        Ok(folds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn assert_partition(folds: &[Fold], n: usize) {
        let mut seen = vec![0usize; n];
        for fold in folds {
            for &i in &fold.test_indices {
                seen[i] += 1;
            }
            let train: HashSet<_> = fold.train_indices.iter().copied().collect();
            let test: HashSet<_> = fold.test_indices.iter().copied().collect();
            assert!(train.is_disjoint(&test));
            assert_eq!(train.len() + test.len(), n);
        }
        assert!(seen.iter().all(|&count| count == 1));
    }

    #[test]
    fn test_sixty_images_three_folds() {
        let folds = FoldPartitioner::new(3, 42).split(60).unwrap();
        assert_eq!(folds.len(), 3);
        for (i, fold) in folds.iter().enumerate() {
            assert_eq!(fold.index, i + 1);
            assert_eq!(fold.test_indices.len(), 20);
            assert_eq!(fold.train_indices.len(), 40);
        }
        assert_partition(&folds, 60);
    }

    #[test]
    fn test_uneven_sizes_front_loaded() {
        let folds = FoldPartitioner::new(3, 7).split(11).unwrap();
        let sizes: Vec<_> = folds.iter().map(|f| f.test_indices.len()).collect();
        assert_eq!(sizes, vec![4, 4, 3]);
        assert_partition(&folds, 11);
    }

    #[test]
    fn test_partition_holds_across_sizes() {
        for n in 3..40 {
            for k in 2..=n.min(6) {
                let folds = FoldPartitioner::new(k, n as u64).split(n).unwrap();
                assert_eq!(folds.len(), k);
                assert_partition(&folds, n);
            }
        }
    }

    #[test]
    fn test_same_seed_same_split() {
        let a = FoldPartitioner::new(3, 42).split(30).unwrap();
        let b = FoldPartitioner::new(3, 42).split(30).unwrap();
        assert_eq!(a, b);

        let c = FoldPartitioner::new(3, 43).split(30).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_fewer_images_than_folds() {
        let err = FoldPartitioner::new(3, 42).split(2).unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidDataset(_)));
    }

    #[test]
    fn test_single_fold_rejected() {
        assert!(FoldPartitioner::new(1, 42).split(10).is_err());
    }
}
