//! ログ出力の初期化
//!
//! `tracing` のサブスクライバを一度だけ設定します。
//! レベルは `RUST_LOG` 環境変数で上書きでき、既定は `info` です。

use tracing_subscriber::{fmt, EnvFilter};

/// ログ設定
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 既定のフィルタ（`RUST_LOG` 未設定時に使用）
    pub default_filter: String,
    /// ターゲット（モジュールパス）を表示するか
    pub include_target: bool,
    /// ANSIカラーを使うか
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            include_target: false,
            ansi_colors: true,
        }
    }
}

/// ログを初期化
///
/// 二重初期化はエラーとして返します（テストから複数回呼ばれる場合を考慮）。
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(config.include_target)
        .with_ansi(config.ansi_colors)
        .compact()
        .try_init()
        .map_err(|e| anyhow::anyhow!("ログの初期化に失敗しました: {}", e))
}

/// 既定設定でログを初期化
pub fn init_default_logging() -> anyhow::Result<()> {
    init_logging(&LogConfig::default())
}
