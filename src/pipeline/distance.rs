//! Pairwise distance policies over validated points.

use geo::{Distance, Haversine};

use crate::schema::{Coordinate, Point};

/// Distance assigned to a pair that must never share a cluster.
pub const NEVER_MERGE: f64 = f64::MAX;

/// Great-circle distance between two coordinates in kilometers, on the mean
/// Earth radius.
#[must_use]
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let from = geo::Point::new(a.lng(), a.lat());
    let to = geo::Point::new(b.lng(), b.lat());
    Haversine::distance(from, to) / 1000.0
}

/// Distance between two points, in the unit of the threshold table (km).
pub trait DistanceMetric: Send + Sync {
    fn distance(&self, a: &Point, b: &Point) -> f64;
}

/// Points contributed by the same annotator are infinitely far apart.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExclusiveAnnotator;

impl DistanceMetric for ExclusiveAnnotator {
    fn distance(&self, a: &Point, b: &Point) -> f64 {
        if a.annotator == b.annotator {
            NEVER_MERGE
        } else {
            haversine_km(a.coordinate, b.coordinate)
        }
    }
}

/// Every point comes from one annotator, so only geometry matters.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleAnnotator;

impl DistanceMetric for SingleAnnotator {
    fn distance(&self, a: &Point, b: &Point) -> f64 {
        haversine_km(a.coordinate, b.coordinate)
    }
}

/// How annotator identity participates in the distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotatorPolicy {
    Exclusive,
    Single,
}

impl AnnotatorPolicy {
    #[must_use]
    pub fn metric(self) -> &'static dyn DistanceMetric {
        match self {
            AnnotatorPolicy::Exclusive => &ExclusiveAnnotator,
            AnnotatorPolicy::Single => &SingleAnnotator,
        }
    }
}
