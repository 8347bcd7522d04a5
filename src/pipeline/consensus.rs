//! Majority-vote reduction of flat clusters into consensus records.

use std::collections::BTreeMap;

use crate::schema::{Category, ConsensusRecord, Point};

use super::hierarchy::ClusterAssignment;

/// Collapses every flat cluster into one [`ConsensusRecord`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsensusReducer;

impl ConsensusReducer {
    /// Records come out ordered by ascending cluster id. Every cluster yields a
    /// record regardless of its size.
    #[must_use]
    pub fn reduce(
        &self,
        category: Category,
        points: &[Point],
        assignment: &ClusterAssignment,
    ) -> Vec<ConsensusRecord> {
        group_by_cluster(points, assignment)
            .into_iter()
            .map(|(cluster, members)| consensus_of(category, cluster, &members))
            .collect()
    }
}

/// Members of each cluster keyed by cluster id.
pub(crate) fn group_by_cluster<'a>(
    points: &'a [Point],
    assignment: &ClusterAssignment,
) -> BTreeMap<u32, Vec<&'a Point>> {
    let mut clusters: BTreeMap<u32, Vec<&Point>> = BTreeMap::new();
    for (point, cluster) in points.iter().zip(assignment.ids()) {
        clusters.entry(*cluster).or_default().push(point);
    }
    clusters
}

/// Splits clusters into those reaching `min_agreement` members and the rest.
/// Informational only: no cluster is dropped because of it.
#[must_use]
pub fn agreement_counts(assignment: &ClusterAssignment, min_agreement: usize) -> (usize, usize) {
    let mut sizes = vec![0_usize; assignment.cluster_count()];
    for id in assignment.ids() {
        sizes[*id as usize - 1] += 1;
    }
    let agreed = sizes.iter().filter(|size| **size >= min_agreement).count();
    (agreed, sizes.len() - agreed)
}

fn consensus_of(category: Category, cluster: u32, members: &[&Point]) -> ConsensusRecord {
    #[allow(clippy::cast_precision_loss)]
    let count = members.len() as f64;
    let lat = members.iter().map(|p| p.coordinate.lat()).sum::<f64>() / count;
    let lng = members.iter().map(|p| p.coordinate.lng()).sum::<f64>() / count;

    ConsensusRecord {
        label_type: category,
        cluster,
        lat,
        lng,
        severity: median_severity(members.iter().filter_map(|p| p.severity)),
        temporary: temporary_vote(members.iter().filter_map(|p| p.temporary)),
    }
}

/// Median of the present severities, halves rounded up. `None` when every
/// member lacks a severity.
#[must_use]
pub fn median_severity(values: impl Iterator<Item = u8>) -> Option<u8> {
    let mut values: Vec<u8> = values.collect();
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();

    let mid = values.len() / 2;
    let median = if values.len() % 2 == 0 {
        // Sum of the middle pair; odd sums are the .5 case.
        let sum = u16::from(values[mid - 1]) + u16::from(values[mid]);
        sum.div_ceil(2)
    } else {
        u16::from(values[mid])
    };
    u8::try_from(median).ok()
}

/// Majority vote over the present flags. The mean of the {0,1}-encoded values
/// is rounded as `round(1 - round(1 - mean))` with ties to even, so an exact
/// 50/50 split resolves to `true`.
#[must_use]
pub fn temporary_vote(values: impl Iterator<Item = bool>) -> Option<bool> {
    let (total, trues) = values.fold((0_usize, 0_usize), |(total, trues), value| {
        (total + 1, trues + usize::from(value))
    });
    if total == 0 {
        return None;
    }

    #[allow(clippy::cast_precision_loss)]
    let mean = trues as f64 / total as f64;
    let inner = (1.0 - mean).round_ties_even();
    Some((1.0 - inner).round_ties_even() >= 1.0)
}
