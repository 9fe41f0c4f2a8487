#![recursion_limit = "256"]
//! クリケットボールの状態分類（match_ready / not_match_ready）
//!
//! ResNet-18 の転移学習モデルを k分割交差検証で学習し、
//! フォールドごとのチェックポイントをアンサンブルして推論します。

pub mod error;
pub mod logging;
pub mod model;
pub mod dataset;
pub mod imaging;
pub mod schedule;
pub mod evaluation;
#[cfg(feature = "ml")]
pub mod ml;
#[cfg(feature = "ml")]
pub mod backend;

pub use error::{ClassifierError, Result};
