use std::sync::Arc;

use crate::{config::Config, error::ClusteringError, observability::Metrics};

pub mod consensus;
pub mod distance;
pub mod executor;
pub mod hierarchy;
pub mod ingest;
pub mod mode;
pub mod partition;

pub use consensus::ConsensusReducer;
pub use distance::{AnnotatorPolicy, DistanceMetric, ExclusiveAnnotator, SingleAnnotator};
pub use executor::{ConsensusEngine, EngineSettings};
pub use hierarchy::{ClusterAssignment, Clusterer, Dendrogram, DistanceMatrix};
pub use ingest::{IngestStage, LabelValidationStage};
pub use mode::{CategoryConfig, ModeResolver, RunMode, RunModeKind, RunPlan};
pub use partition::{PointSet, partition};

/// Resolves the configured run mode and wires an engine for it.
///
/// # Errors
/// Returns [`ClusteringError::InvalidThreshold`] when the resolved threshold
/// table is unusable.
pub fn engine_from_config(
    config: &Config,
    metrics: Option<Arc<Metrics>>,
) -> Result<ConsensusEngine, ClusteringError> {
    let plan = config.mode_resolver().resolve(&config.run_mode())?;
    tracing::debug!(
        mode = %plan.kind,
        policy = ?plan.policy,
        min_agreement = plan.min_agreement,
        "run plan resolved"
    );

    let engine = ConsensusEngine::new(plan, config.engine_settings());
    Ok(match metrics {
        Some(metrics) => engine.with_metrics(metrics),
        None => engine,
    })
}
