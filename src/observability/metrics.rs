/// Prometheusメトリクス定義。
use prometheus::{
    Counter, Histogram, HistogramOpts, Registry, register_counter_with_registry,
    register_histogram_with_registry,
};

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub labels_ingested: Counter,
    pub labels_dropped: Counter,
    pub clusters_created: Counter,
    pub categories_rejected: Counter,

    // ヒストグラム
    pub category_duration: Histogram,
    pub run_duration: Histogram,
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成する。
    ///
    /// # Errors
    /// 同名のメトリクスが既に登録済みの場合はエラーを返す。
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            labels_ingested: register_counter_with_registry!(
                "label_consensus_labels_ingested_total",
                "Total number of raw label rows received",
                registry
            )?,
            labels_dropped: register_counter_with_registry!(
                "label_consensus_labels_dropped_total",
                "Total number of label rows dropped before clustering",
                registry
            )?,
            clusters_created: register_counter_with_registry!(
                "label_consensus_clusters_created_total",
                "Total number of consensus clusters emitted",
                registry
            )?,
            categories_rejected: register_counter_with_registry!(
                "label_consensus_categories_rejected_total",
                "Categories skipped because their point set exceeded the ceiling",
                registry
            )?,
            category_duration: register_histogram_with_registry!(
                HistogramOpts::new(
                    "label_consensus_category_duration_seconds",
                    "Time spent clustering a single category"
                )
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
                registry
            )?,
            run_duration: register_histogram_with_registry!(
                HistogramOpts::new(
                    "label_consensus_run_duration_seconds",
                    "Time spent on a full clustering run"
                )
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
                registry
            )?,
        })
    }
}
