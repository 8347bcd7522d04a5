use anyhow::{Error, Result};
use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use super::structured_log::StructuredLogLayer;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Tracing サブスクライバを一度だけ初期化する。
///
/// `RUST_LOG` が未設定の場合は `info` レベルで出力する。
/// 標準出力は結果JSON専用のため、ログはすべて標準エラーへ書き出す。
///
/// # Errors
/// サブスクライバの初期化に失敗した場合はエラーを返す。
pub fn init() -> Result<()> {
    TRACING_INIT.get_or_try_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .json();

        // LABEL_CONSENSUS_STRUCTURED_LOG=1 で重要イベントの構造化ログを追加
        let structured = std::env::var("LABEL_CONSENSUS_STRUCTURED_LOG")
            .is_ok_and(|value| matches!(value.as_str(), "1" | "true" | "TRUE"));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(structured.then_some(StructuredLogLayer))
            .try_init()
            .map_err(|e: tracing_subscriber::util::TryInitError| Error::msg(e.to_string()))?;
        info!(structured_log = structured, "tracing initialized");

        Ok::<(), Error>(())
    })?;
    Ok(())
}
