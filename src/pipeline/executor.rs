//! Per-category clustering on a bounded worker pool, followed by the
//! cluster id reconciliation fold.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::ClusteringError;
use crate::observability::Metrics;
use crate::schema::{
    Category, CategoryStats, ConsensusRecord, GlobalResult, LabelAssignment, Point, RawLabel,
    RejectedCategory, RunReport,
};

use super::consensus::{ConsensusReducer, agreement_counts};
use super::hierarchy::{ClusterAssignment, Clusterer};
use super::ingest::{IngestStage, IngestedPoints, LabelValidationStage};
use super::mode::RunPlan;
use super::partition::{PointSet, partition};

/// Default ceiling on points per category before the O(n²) matrix is built.
/// At 5000 points the condensed matrix stays just under 100 MB.
pub const DEFAULT_MAX_POINTS_PER_CATEGORY: usize = 5_000;
/// Number of categories a run can produce; the pool never needs more workers.
const MAX_CATEGORY_WORKERS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub workers: NonZeroUsize,
    pub max_points_per_category: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            workers: NonZeroUsize::new(num_cpus::get().clamp(1, MAX_CATEGORY_WORKERS))
                .unwrap_or(NonZeroUsize::MIN),
            max_points_per_category: DEFAULT_MAX_POINTS_PER_CATEGORY,
        }
    }
}

/// Clustering result of one category, ids still local (`1..=k`).
#[derive(Debug, Clone)]
struct CategoryResult {
    category: Category,
    point_count: usize,
    threshold_km: f64,
    records: Vec<ConsensusRecord>,
    labels: Vec<LabelAssignment>,
    agreement_count: usize,
    disagreement_count: usize,
}

impl CategoryResult {
    fn empty(category: Category, threshold_km: f64) -> Self {
        Self {
            category,
            point_count: 0,
            threshold_km,
            records: Vec::new(),
            labels: Vec::new(),
            agreement_count: 0,
            disagreement_count: 0,
        }
    }

    fn cluster_count(&self) -> u32 {
        self.records.iter().map(|record| record.cluster).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
enum CategoryOutcome {
    Clustered(CategoryResult),
    Rejected(RejectedCategory),
}

/// Accumulator threaded through the reconciliation fold.
#[derive(Debug, Default)]
struct Reconciled {
    offset: u32,
    labels: Vec<LabelAssignment>,
    clusters: Vec<ConsensusRecord>,
    categories: Vec<CategoryStats>,
    rejected: Vec<RejectedCategory>,
}

impl Reconciled {
    fn absorb(mut self, outcome: CategoryOutcome) -> Self {
        let result = match outcome {
            CategoryOutcome::Clustered(result) => result,
            CategoryOutcome::Rejected(rejected) => {
                self.rejected.push(rejected);
                return self;
            }
        };

        let offset = self.offset;
        let cluster_count = result.cluster_count();
        self.categories.push(CategoryStats {
            category: result.category,
            point_count: result.point_count,
            cluster_count: result.records.len(),
            agreement_count: result.agreement_count,
            disagreement_count: result.disagreement_count,
            threshold_km: result.threshold_km,
            cluster_offset: offset,
        });
        self.clusters.extend(
            result
                .records
                .into_iter()
                .map(|record| record.offset_by(offset)),
        );
        self.labels
            .extend(result.labels.into_iter().map(|mut label| {
                label.cluster += offset;
                label
            }));
        self.offset = offset + cluster_count;
        self
    }
}

/// Runs the whole clustering pipeline for one batch of labels.
pub struct ConsensusEngine {
    plan: RunPlan,
    settings: EngineSettings,
    ingest: Arc<dyn IngestStage>,
    metrics: Option<Arc<Metrics>>,
}

impl ConsensusEngine {
    #[must_use]
    pub fn new(plan: RunPlan, settings: EngineSettings) -> Self {
        Self {
            plan,
            settings,
            ingest: Arc::new(LabelValidationStage::new()),
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validates raw rows, then clusters them.
    ///
    /// # Errors
    /// Fails only on worker pool construction or a broken clustering
    /// precondition; malformed rows are dropped and counted instead.
    pub fn run(&self, rows: Vec<RawLabel>) -> Result<GlobalResult, ClusteringError> {
        let input_rows = rows.len();
        let ingested = self.ingest.ingest(rows, &self.plan.scope);
        if let Some(metrics) = &self.metrics {
            metrics.labels_ingested.inc_by(as_count(input_rows));
            metrics
                .labels_dropped
                .inc_by(as_count(input_rows - ingested.points.len()));
        }
        self.run_ingested(input_rows, ingested)
    }

    /// Clusters points that were validated elsewhere.
    ///
    /// # Errors
    /// See [`ConsensusEngine::run`].
    pub fn run_points(&self, points: Vec<Point>) -> Result<GlobalResult, ClusteringError> {
        let input_rows = points.len();
        self.run_ingested(
            input_rows,
            IngestedPoints {
                points,
                ..IngestedPoints::default()
            },
        )
    }

    fn run_ingested(
        &self,
        input_rows: usize,
        ingested: IngestedPoints,
    ) -> Result<GlobalResult, ClusteringError> {
        let started = Instant::now();
        let IngestedPoints {
            points,
            dropped_invalid_coordinate,
            dropped_unknown_type,
            dropped_out_of_scope,
        } = ingested;

        info!(
            mode = %self.plan.kind,
            input_rows,
            point_count = points.len(),
            dropped_invalid_coordinate,
            "starting label clustering run"
        );

        let sets = partition(points, &self.plan.categories);
        let outcomes = self.cluster_categories(sets)?;

        // Barrier passed: every category is done. Fold in enumeration order.
        let reconciled = outcomes
            .into_iter()
            .fold(Reconciled::default(), Reconciled::absorb);

        if let Some(metrics) = &self.metrics {
            metrics
                .clusters_created
                .inc_by(as_count(reconciled.clusters.len()));
            metrics
                .categories_rejected
                .inc_by(as_count(reconciled.rejected.len()));
            metrics
                .run_duration
                .observe(started.elapsed().as_secs_f64());
        }

        info!(
            mode = %self.plan.kind,
            cluster_count = reconciled.clusters.len(),
            label_count = reconciled.labels.len(),
            rejected_categories = reconciled.rejected.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "label clustering run completed"
        );

        Ok(GlobalResult {
            labels: reconciled.labels,
            clusters: reconciled.clusters,
            thresholds: self.plan.thresholds.clone(),
            report: RunReport {
                input_rows,
                dropped_invalid_coordinate,
                dropped_unknown_type,
                dropped_out_of_scope,
                categories: reconciled.categories,
                rejected_categories: reconciled.rejected,
            },
        })
    }

    /// Clusters every category as an independent task. Output order matches
    /// input order regardless of completion order.
    fn cluster_categories(
        &self,
        sets: Vec<PointSet>,
    ) -> Result<Vec<CategoryOutcome>, ClusteringError> {
        let busy = sets.iter().filter(|set| set.len() > 1).count().max(1);
        let threads = self.settings.workers.get().min(busy);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("label-cluster-{index}"))
            .build()
            .map_err(|error| ClusteringError::WorkerPool(error.to_string()))?;

        debug!(
            categories = sets.len(),
            threads, "dispatching category clustering"
        );

        pool.install(|| {
            sets.into_par_iter()
                .map(|set| self.cluster_category(set))
                .collect::<Result<Vec<_>, _>>()
        })
    }

    fn cluster_category(&self, set: PointSet) -> Result<CategoryOutcome, ClusteringError> {
        let started = Instant::now();
        let category = set.category;
        let threshold_km = self.plan.thresholds.get(category);
        let point_count = set.len();

        if point_count > self.settings.max_points_per_category {
            warn!(
                category = %category,
                point_count,
                limit = self.settings.max_points_per_category,
                "category exceeds point ceiling, skipping"
            );
            return Ok(CategoryOutcome::Rejected(RejectedCategory {
                category,
                point_count,
                limit: self.settings.max_points_per_category,
            }));
        }

        let result = match point_count {
            0 => CategoryResult::empty(category, threshold_km),
            1 => singleton_result(
                category,
                threshold_km,
                &set.points[0],
                self.plan.min_agreement,
            ),
            _ => {
                let assignment = Clusterer.cluster(
                    &set.points,
                    self.plan.policy.metric(),
                    threshold_km,
                )?;
                self.reduce(category, threshold_km, &set.points, &assignment)
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics
                .category_duration
                .observe(started.elapsed().as_secs_f64());
        }
        debug!(
            category = %category,
            point_count,
            cluster_count = result.records.len(),
            agreement_count = result.agreement_count,
            disagreement_count = result.disagreement_count,
            threshold_km,
            "category clustered"
        );

        Ok(CategoryOutcome::Clustered(result))
    }

    fn reduce(
        &self,
        category: Category,
        threshold_km: f64,
        points: &[Point],
        assignment: &ClusterAssignment,
    ) -> CategoryResult {
        let records = ConsensusReducer.reduce(category, points, assignment);
        let labels = points
            .iter()
            .zip(assignment.ids())
            .map(|(point, cluster)| LabelAssignment {
                label_id: point.id,
                label_type: point.label_type,
                cluster: *cluster,
            })
            .collect();
        let (agreement_count, disagreement_count) =
            agreement_counts(assignment, self.plan.min_agreement);

        CategoryResult {
            category,
            point_count: points.len(),
            threshold_km,
            records,
            labels,
            agreement_count,
            disagreement_count,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_count(value: usize) -> f64 {
    value as f64
}

/// A lone point is its own cluster and its own consensus.
fn singleton_result(
    category: Category,
    threshold_km: f64,
    point: &Point,
    min_agreement: usize,
) -> CategoryResult {
    let agreed = usize::from(min_agreement <= 1);
    CategoryResult {
        category,
        point_count: 1,
        threshold_km,
        records: vec![ConsensusRecord {
            label_type: category,
            cluster: 1,
            lat: point.coordinate.lat(),
            lng: point.coordinate.lng(),
            severity: point.severity,
            temporary: point.temporary,
        }],
        labels: vec![LabelAssignment {
            label_id: point.id,
            label_type: point.label_type,
            cluster: 1,
        }],
        agreement_count: agreed,
        disagreement_count: 1 - agreed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::mode::{ModeResolver, RunMode};
    use crate::schema::LabelType;

    fn row(label_id: i64, label_type: &str, annotator: &str, lat: f64, lng: f64) -> RawLabel {
        RawLabel {
            label_id,
            label_type: label_type.to_string(),
            lat: Some(lat),
            lng: Some(lng),
            annotator_id: annotator.to_string(),
            severity: None,
            temporary: None,
        }
    }

    fn ground_truth_engine(settings: EngineSettings) -> ConsensusEngine {
        let plan = ModeResolver::default()
            .resolve(&RunMode::GroundTruth)
            .expect("plan");
        ConsensusEngine::new(plan, settings)
    }

    #[test]
    fn offsets_follow_category_order() {
        let rows = vec![
            // Problem: two clusters
            row(10, "Obstacle", "a", 38.90, -77.03),
            row(11, "SurfaceProblem", "b", 38.95, -77.03),
            // CurbRamp: two annotators agree, one far away
            row(1, "CurbRamp", "a", 38.90, -77.03),
            row(2, "CurbRamp", "b", 38.90, -77.03),
            row(3, "CurbRamp", "c", 39.90, -77.03),
            // Other: singleton
            row(20, "Other", "a", 38.90, -77.03),
        ];

        let result = ground_truth_engine(EngineSettings::default())
            .run(rows)
            .expect("run");

        let cluster_of = |label_id: i64| {
            result
                .labels
                .iter()
                .find(|label| label.label_id == label_id)
                .map(|label| label.cluster)
                .expect("assigned")
        };
        assert_eq!(cluster_of(1), 1);
        assert_eq!(cluster_of(2), 1);
        assert_eq!(cluster_of(3), 2);
        assert_eq!(cluster_of(10), 3);
        assert_eq!(cluster_of(11), 4);
        assert_eq!(cluster_of(20), 5);
        assert_eq!(result.clusters.len(), 5);
        assert_eq!(result.max_cluster_id(), 5);

        let problem = result
            .clusters
            .iter()
            .filter(|record| record.label_type == Category::Problem)
            .count();
        assert_eq!(problem, 2);
    }

    #[test]
    fn labels_keep_their_own_type_inside_problem() {
        let rows = vec![
            row(1, "Obstacle", "a", 38.90, -77.03),
            row(2, "NoCurbRamp", "b", 38.90, -77.03),
        ];

        let result = ground_truth_engine(EngineSettings::default())
            .run(rows)
            .expect("run");

        assert_eq!(result.clusters.len(), 1);
        assert_eq!(result.clusters[0].label_type, Category::Problem);
        let types: Vec<_> = result.labels.iter().map(|l| l.label_type).collect();
        assert_eq!(types, vec![LabelType::Obstacle, LabelType::NoCurbRamp]);
    }

    #[test]
    fn oversized_category_is_rejected_and_reported() {
        let rows = vec![
            row(1, "CurbRamp", "a", 38.90, -77.03),
            row(2, "CurbRamp", "b", 38.90, -77.03),
            row(3, "CurbRamp", "c", 38.90, -77.03),
            row(4, "Other", "a", 38.90, -77.03),
        ];
        let settings = EngineSettings {
            workers: NonZeroUsize::MIN,
            max_points_per_category: 2,
        };

        let result = ground_truth_engine(settings).run(rows).expect("run");

        assert_eq!(result.report.rejected_categories.len(), 1);
        assert_eq!(
            result.report.rejected_categories[0].category,
            Category::Label(LabelType::CurbRamp)
        );
        assert_eq!(result.clusters.len(), 1);
        assert_eq!(result.clusters[0].cluster, 1);
    }

    #[test]
    fn default_ceiling_bounds_matrix_memory() {
        let n = EngineSettings::default().max_points_per_category;
        let matrix_bytes = n * (n - 1) / 2 * std::mem::size_of::<f64>();

        assert_eq!(n, 5_000);
        assert!(matrix_bytes < 100 * 1024 * 1024, "{matrix_bytes} bytes");
    }

    #[test]
    fn empty_input_produces_empty_result() {
        let result = ground_truth_engine(EngineSettings::default())
            .run(vec![])
            .expect("run");

        assert!(result.clusters.is_empty());
        assert!(result.labels.is_empty());
        assert_eq!(result.report.input_rows, 0);
        assert!(
            result
                .report
                .categories
                .iter()
                .all(|stats| stats.cluster_count == 0)
        );
    }

    #[test]
    fn agreement_statistics_follow_mode_minimum() {
        let rows = vec![
            row(1, "CurbRamp", "a", 38.90, -77.03),
            row(2, "CurbRamp", "b", 38.90, -77.03),
            row(3, "CurbRamp", "c", 39.90, -77.03),
        ];

        let result = ground_truth_engine(EngineSettings::default())
            .run(rows)
            .expect("run");

        let stats = result
            .report
            .categories
            .iter()
            .find(|stats| stats.category == Category::Label(LabelType::CurbRamp))
            .expect("curb ramp stats");
        assert_eq!(stats.agreement_count, 1);
        assert_eq!(stats.disagreement_count, 1);
        assert_eq!(stats.cluster_offset, 0);
    }

    #[test]
    fn metrics_count_rows_and_clusters() {
        let telemetry = crate::observability::Telemetry::without_tracing().expect("telemetry");
        let rows = vec![
            row(1, "CurbRamp", "a", 38.90, -77.03),
            row(2, "CurbRamp", "b", 38.90, 1.0e14),
        ];

        let result = ground_truth_engine(EngineSettings::default())
            .with_metrics(telemetry.metrics())
            .run(rows)
            .expect("run");

        assert_eq!(result.report.dropped_invalid_coordinate, 1);
        let metrics = telemetry.metrics();
        assert!((metrics.labels_ingested.get() - 2.0).abs() < f64::EPSILON);
        assert!((metrics.labels_dropped.get() - 1.0).abs() < f64::EPSILON);
        assert!((metrics.clusters_created.get() - 1.0).abs() < f64::EPSILON);
    }
}
