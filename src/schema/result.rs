//! Output rows handed to the transport layer.

use serde::{Deserialize, Serialize};

use super::label::{Category, LabelType};
use super::thresholds::ThresholdTable;

/// One agreed-upon feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusRecord {
    pub label_type: Category,
    pub cluster: u32,
    pub lat: f64,
    pub lng: f64,
    pub severity: Option<u8>,
    pub temporary: Option<bool>,
}

impl ConsensusRecord {
    /// Shifts the cluster id into the global id space.
    #[must_use]
    pub fn offset_by(mut self, offset: u32) -> Self {
        self.cluster += offset;
        self
    }
}

/// Which consensus cluster a raw label ended up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelAssignment {
    pub label_id: i64,
    pub label_type: LabelType,
    pub cluster: u32,
}

/// Per-category outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub category: Category,
    pub point_count: usize,
    pub cluster_count: usize,
    /// Clusters with at least the mode's minimum agreement count of points.
    pub agreement_count: usize,
    pub disagreement_count: usize,
    pub threshold_km: f64,
    pub cluster_offset: u32,
}

/// Category skipped because its point set exceeded the configured ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedCategory {
    pub category: Category,
    pub point_count: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub input_rows: usize,
    pub dropped_invalid_coordinate: usize,
    pub dropped_unknown_type: usize,
    pub dropped_out_of_scope: usize,
    pub categories: Vec<CategoryStats>,
    pub rejected_categories: Vec<RejectedCategory>,
}

impl RunReport {
    #[must_use]
    pub fn dropped_total(&self) -> usize {
        self.dropped_invalid_coordinate + self.dropped_unknown_type + self.dropped_out_of_scope
    }
}

/// Final output of one engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalResult {
    pub labels: Vec<LabelAssignment>,
    pub clusters: Vec<ConsensusRecord>,
    pub thresholds: ThresholdTable,
    pub report: RunReport,
}

impl GlobalResult {
    /// Highest cluster id handed out, 0 when nothing was clustered.
    #[must_use]
    pub fn max_cluster_id(&self) -> u32 {
        self.clusters
            .iter()
            .map(|record| record.cluster)
            .max()
            .unwrap_or(0)
    }
}
