use std::{collections::BTreeMap, env, num::NonZeroUsize};

use thiserror::Error;

use crate::pipeline::executor::{DEFAULT_MAX_POINTS_PER_CATEGORY, EngineSettings};
use crate::pipeline::mode::{ModeResolver, RunMode, RunModeKind};
use crate::schema::thresholds::DEFAULT_THRESHOLD_KM;
use crate::schema::{AnnotatorId, Category};

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

/// 並列実行するカテゴリ数の上限。カテゴリ数より多いワーカーは使われない。
const MAX_DEFAULT_WORKERS: usize = 8;
/// 距離行列を構築できる最小の点数。
const MIN_POINT_CEILING: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    mode: RunModeKind,
    user_id: Option<String>,
    annotators: NonZeroUsize,
    threshold_km: f64,
    threshold_overrides: BTreeMap<Category, f64>,
    workers: NonZeroUsize,
    max_points_per_category: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// 環境変数からクラスタリング実行の設定値を読み込み、検証する。
    ///
    /// すべての値は任意だが、`single` モードでは `LABEL_CLUSTER_USER_ID` が必須となる。
    ///
    /// # Errors
    /// 数値やモード名のパースに失敗した場合、閾値が負または非有限の場合、
    /// `single` モードで対象ユーザーが未設定の場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let mode = parse_mode("LABEL_CLUSTER_MODE", RunModeKind::Route)?;
        let user_id = env::var("LABEL_CLUSTER_USER_ID")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        if mode == RunModeKind::Single && user_id.is_none() {
            return Err(ConfigError::Missing("LABEL_CLUSTER_USER_ID"));
        }
        let annotators = parse_non_zero_usize("LABEL_CLUSTER_ANNOTATORS", 1)?;

        // 距離閾値 (km)
        let threshold_km = parse_threshold("LABEL_CLUSTER_THRESHOLD_KM", DEFAULT_THRESHOLD_KM)?;
        let threshold_overrides = parse_threshold_overrides("LABEL_CLUSTER_THRESHOLDS")?;

        // 実行リソース
        let default_workers = num_cpus::get().clamp(1, MAX_DEFAULT_WORKERS);
        let workers = parse_non_zero_usize("LABEL_CLUSTER_WORKERS", default_workers)?;
        let max_points_per_category =
            parse_usize("LABEL_CLUSTER_MAX_POINTS", DEFAULT_MAX_POINTS_PER_CATEGORY)?;
        if max_points_per_category < MIN_POINT_CEILING {
            return Err(ConfigError::Invalid {
                name: "LABEL_CLUSTER_MAX_POINTS",
                source: anyhow::anyhow!("must be at least {MIN_POINT_CEILING}"),
            });
        }

        Ok(Self {
            mode,
            user_id,
            annotators,
            threshold_km,
            threshold_overrides,
            workers,
            max_points_per_category,
        })
    }

    #[must_use]
    pub fn mode(&self) -> RunModeKind {
        self.mode
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    #[must_use]
    pub fn annotators(&self) -> NonZeroUsize {
        self.annotators
    }

    #[must_use]
    pub fn threshold_km(&self) -> f64 {
        self.threshold_km
    }

    #[must_use]
    pub fn threshold_overrides(&self) -> &BTreeMap<Category, f64> {
        &self.threshold_overrides
    }

    #[must_use]
    pub fn workers(&self) -> NonZeroUsize {
        self.workers
    }

    #[must_use]
    pub fn max_points_per_category(&self) -> usize {
        self.max_points_per_category
    }

    /// 設定されたモード名から [`RunMode`] を組み立てる。
    #[must_use]
    pub fn run_mode(&self) -> RunMode {
        match self.mode {
            RunModeKind::Single => RunMode::SingleAnnotator {
                annotator: self.user_id.clone().map(AnnotatorId::new),
            },
            RunModeKind::Route => RunMode::Route {
                annotators: self.annotators,
            },
            RunModeKind::GroundTruth => RunMode::GroundTruth,
            RunModeKind::Region => RunMode::RegionWide,
        }
    }

    #[must_use]
    pub fn mode_resolver(&self) -> ModeResolver {
        ModeResolver::new(self.threshold_km, self.threshold_overrides.clone())
    }

    #[must_use]
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            workers: self.workers,
            max_points_per_category: self.max_points_per_category,
        }
    }
}

fn parse_mode(name: &'static str, default: RunModeKind) -> Result<RunModeKind, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse::<RunModeKind>()
        .map_err(|error| ConfigError::Invalid {
            name,
            source: anyhow::anyhow!(error),
        })
}

fn parse_non_zero_usize(name: &'static str, default: usize) -> Result<NonZeroUsize, ConfigError> {
    let parsed = parse_usize(name, default)?;
    NonZeroUsize::new(parsed).ok_or_else(|| ConfigError::Invalid {
        name,
        source: anyhow::anyhow!("must be greater than zero"),
    })
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse::<usize>()
        .map_err(|error| ConfigError::Invalid {
            name,
            source: anyhow::Error::new(error),
        })
}

fn parse_threshold(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|error| ConfigError::Invalid {
            name,
            source: anyhow::Error::new(error),
        })?;
    check_threshold(name, value)
}

fn check_threshold(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("threshold must be a finite, non-negative distance: {value}"),
        })
    }
}

/// `CurbRamp=0.0035,Problem=0.01` 形式のカテゴリ別閾値を読み込む。
fn parse_threshold_overrides(name: &'static str) -> Result<BTreeMap<Category, f64>, ConfigError> {
    let raw = env::var(name).unwrap_or_default();
    let mut overrides = BTreeMap::new();

    for entry in parse_csv(&raw) {
        let Some((category, value)) = entry.split_once('=') else {
            return Err(ConfigError::Invalid {
                name,
                source: anyhow::anyhow!("expected Category=km, got {entry}"),
            });
        };
        let category = category
            .trim()
            .parse::<Category>()
            .map_err(|error| ConfigError::Invalid {
                name,
                source: anyhow::anyhow!(error),
            })?;
        let value = value
            .trim()
            .parse::<f64>()
            .map_err(|error| ConfigError::Invalid {
                name,
                source: anyhow::Error::new(error),
            })?;
        overrides.insert(category, check_threshold(name, value)?);
    }

    Ok(overrides)
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
