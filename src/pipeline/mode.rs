//! Run mode resolution: which points are in scope, which distance policy
//! applies, how `Problem` is composed and which thresholds are used.

use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ClusteringError;
use crate::schema::{AnnotatorId, Category, LabelType, ThresholdTable};

use super::distance::AnnotatorPolicy;

/// Region-wide threshold for curb ramp style labels.
const REGION_CURB_THRESHOLD_KM: f64 = 0.0035;
/// Region-wide threshold for every other category.
const REGION_DEFAULT_THRESHOLD_KM: f64 = 0.01;
/// Agreement count used for ground truth HITs and region-wide runs.
const PAIR_AGREEMENT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunModeKind {
    Single,
    Route,
    GroundTruth,
    Region,
}

impl fmt::Display for RunModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunModeKind::Single => write!(f, "single"),
            RunModeKind::Route => write!(f, "route"),
            RunModeKind::GroundTruth => write!(f, "ground_truth"),
            RunModeKind::Region => write!(f, "region"),
        }
    }
}

impl FromStr for RunModeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" | "single_annotator" | "user" => Ok(RunModeKind::Single),
            "route" | "multi" | "multi_annotator" => Ok(RunModeKind::Route),
            "ground_truth" | "gt" | "hit" => Ok(RunModeKind::GroundTruth),
            "region" | "region_wide" => Ok(RunModeKind::Region),
            _ => Err(format!("unknown run mode: {s}")),
        }
    }
}

/// What the caller selected the input points by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Labels of one annotator. Optional id further restricts the input.
    SingleAnnotator { annotator: Option<AnnotatorId> },
    /// One route walked by `annotators` independent annotators.
    Route { annotators: NonZeroUsize },
    /// Researcher ground truth for one route and HIT.
    GroundTruth,
    /// Every label in a region, any number of annotators.
    RegionWide,
}

impl RunMode {
    #[must_use]
    pub fn kind(&self) -> RunModeKind {
        match self {
            RunMode::SingleAnnotator { .. } => RunModeKind::Single,
            RunMode::Route { .. } => RunModeKind::Route,
            RunMode::GroundTruth => RunModeKind::GroundTruth,
            RunMode::RegionWide => RunModeKind::Region,
        }
    }
}

/// Which base label types are folded into the `Problem` meta-category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryConfig {
    problem: Vec<LabelType>,
}

impl CategoryConfig {
    #[must_use]
    pub fn new(problem: Vec<LabelType>) -> Self {
        Self { problem }
    }

    #[must_use]
    pub fn multi_annotator() -> Self {
        Self::new(vec![
            LabelType::NoCurbRamp,
            LabelType::Obstacle,
            LabelType::SurfaceProblem,
        ])
    }

    #[must_use]
    pub fn single_annotator() -> Self {
        Self::new(vec![LabelType::Obstacle, LabelType::SurfaceProblem])
    }

    /// Category a label of `label_type` is clustered under.
    #[must_use]
    pub fn category_of(&self, label_type: LabelType) -> Category {
        if self.problem.contains(&label_type) {
            Category::Problem
        } else {
            Category::from(label_type)
        }
    }

    /// Categories that can receive points, in enumeration order.
    #[must_use]
    pub fn categories(&self) -> Vec<Category> {
        Category::ORDER
            .into_iter()
            .filter(|category| match category {
                Category::Problem => !self.problem.is_empty(),
                Category::Label(label_type) => !self.problem.contains(label_type),
            })
            .collect()
    }
}

/// Input restriction applied at ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointScope {
    All,
    Annotator(AnnotatorId),
}

impl PointScope {
    #[must_use]
    pub fn admits(&self, annotator: &AnnotatorId) -> bool {
        match self {
            PointScope::All => true,
            PointScope::Annotator(expected) => expected == annotator,
        }
    }
}

/// Everything the engine needs to know about one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub kind: RunModeKind,
    pub policy: AnnotatorPolicy,
    pub categories: CategoryConfig,
    pub thresholds: ThresholdTable,
    /// Cluster size counted as agreement in the run report.
    pub min_agreement: usize,
    pub scope: PointScope,
}

/// Turns a [`RunMode`] plus externally configured thresholds into a [`RunPlan`].
#[derive(Debug, Clone)]
pub struct ModeResolver {
    base_threshold_km: f64,
    overrides: BTreeMap<Category, f64>,
}

impl ModeResolver {
    #[must_use]
    pub fn new(base_threshold_km: f64, overrides: BTreeMap<Category, f64>) -> Self {
        Self {
            base_threshold_km,
            overrides,
        }
    }

    /// # Errors
    /// Returns [`ClusteringError::InvalidThreshold`] when the resolved table
    /// contains a negative or non-finite threshold.
    pub fn resolve(&self, mode: &RunMode) -> Result<RunPlan, ClusteringError> {
        let (policy, categories, min_agreement, scope) = match mode {
            RunMode::SingleAnnotator { annotator } => (
                AnnotatorPolicy::Single,
                CategoryConfig::single_annotator(),
                1,
                annotator
                    .clone()
                    .map_or(PointScope::All, PointScope::Annotator),
            ),
            RunMode::Route { annotators } => (
                AnnotatorPolicy::Exclusive,
                CategoryConfig::multi_annotator(),
                annotators.get().div_ceil(2),
                PointScope::All,
            ),
            RunMode::GroundTruth | RunMode::RegionWide => (
                AnnotatorPolicy::Exclusive,
                CategoryConfig::multi_annotator(),
                PAIR_AGREEMENT,
                PointScope::All,
            ),
        };

        let base_table = match mode {
            RunMode::RegionWide => ThresholdTable::uniform(REGION_DEFAULT_THRESHOLD_KM)
                .with_override(
                    Category::Label(LabelType::CurbRamp),
                    REGION_CURB_THRESHOLD_KM,
                )
                .with_override(
                    Category::Label(LabelType::NoCurbRamp),
                    REGION_CURB_THRESHOLD_KM,
                ),
            _ => ThresholdTable::uniform(self.base_threshold_km),
        };
        let thresholds = base_table.merged(&self.overrides);
        thresholds.validate()?;

        Ok(RunPlan {
            kind: mode.kind(),
            policy,
            categories,
            thresholds,
            min_agreement,
            scope,
        })
    }
}

impl Default for ModeResolver {
    fn default() -> Self {
        Self::new(crate::schema::thresholds::DEFAULT_THRESHOLD_KM, BTreeMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_annotator_folds_problem_types() {
        let config = CategoryConfig::multi_annotator();

        assert_eq!(config.category_of(LabelType::Obstacle), Category::Problem);
        assert_eq!(config.category_of(LabelType::NoCurbRamp), Category::Problem);
        assert_eq!(
            config.category_of(LabelType::CurbRamp),
            Category::Label(LabelType::CurbRamp)
        );
        assert_eq!(
            config.categories(),
            vec![
                Category::Label(LabelType::CurbRamp),
                Category::Problem,
                Category::Label(LabelType::Occlusion),
                Category::Label(LabelType::NoSidewalk),
                Category::Label(LabelType::Other),
            ]
        );
    }

    #[test]
    fn single_annotator_keeps_no_curb_ramp_separate() {
        let config = CategoryConfig::single_annotator();

        assert_eq!(
            config.category_of(LabelType::NoCurbRamp),
            Category::Label(LabelType::NoCurbRamp)
        );
        assert!(config.categories().contains(&Category::Problem));
        assert!(
            !config
                .categories()
                .contains(&Category::Label(LabelType::SurfaceProblem))
        );
    }

    #[test]
    fn empty_problem_group_disables_meta_category() {
        let config = CategoryConfig::new(vec![]);
        assert_eq!(config.categories().len(), LabelType::ALL.len());
        assert!(!config.categories().contains(&Category::Problem));
    }

    #[test]
    fn route_agreement_is_half_of_annotators_rounded_up() {
        let resolver = ModeResolver::default();
        let plan = resolver
            .resolve(&RunMode::Route {
                annotators: NonZeroUsize::new(5).expect("non-zero"),
            })
            .expect("plan");

        assert_eq!(plan.min_agreement, 3);
        assert_eq!(plan.policy, AnnotatorPolicy::Exclusive);
        assert_eq!(plan.scope, PointScope::All);
    }

    #[test]
    fn single_mode_scopes_to_annotator() {
        let plan = ModeResolver::default()
            .resolve(&RunMode::SingleAnnotator {
                annotator: Some(AnnotatorId::new("u-1")),
            })
            .expect("plan");

        assert_eq!(plan.policy, AnnotatorPolicy::Single);
        assert_eq!(plan.min_agreement, 1);
        assert!(plan.scope.admits(&AnnotatorId::new("u-1")));
        assert!(!plan.scope.admits(&AnnotatorId::new("u-2")));
    }

    #[test]
    fn region_mode_uses_tighter_curb_threshold_unless_overridden() {
        let mut overrides = BTreeMap::new();
        overrides.insert(Category::Problem, 0.02);
        let plan = ModeResolver::new(0.0075, overrides)
            .resolve(&RunMode::RegionWide)
            .expect("plan");

        let curb = plan.thresholds.get(Category::Label(LabelType::CurbRamp));
        let other = plan.thresholds.get(Category::Label(LabelType::Other));
        let problem = plan.thresholds.get(Category::Problem);
        assert!((curb - REGION_CURB_THRESHOLD_KM).abs() < f64::EPSILON);
        assert!((other - REGION_DEFAULT_THRESHOLD_KM).abs() < f64::EPSILON);
        assert!((problem - 0.02).abs() < f64::EPSILON);
    }

    #[test]
    fn resolve_rejects_invalid_override() {
        let mut overrides = BTreeMap::new();
        overrides.insert(Category::Label(LabelType::Other), f64::NAN);

        let error = ModeResolver::new(0.0075, overrides)
            .resolve(&RunMode::GroundTruth)
            .expect_err("nan threshold");

        assert!(matches!(error, ClusteringError::InvalidThreshold { .. }));
    }

    #[test]
    fn mode_kind_parses_aliases() {
        assert_eq!("HIT".parse::<RunModeKind>(), Ok(RunModeKind::GroundTruth));
        assert_eq!("user".parse::<RunModeKind>(), Ok(RunModeKind::Single));
        assert!("everything".parse::<RunModeKind>().is_err());
    }
}
