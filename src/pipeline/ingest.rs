//! Validation of raw label rows before any clustering happens.

use tracing::{debug, warn};

use crate::error::ClusteringError;
use crate::schema::{AnnotatorId, Coordinate, LabelType, Point, RawLabel};

use super::mode::PointScope;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestedPoints {
    pub points: Vec<Point>,
    pub dropped_invalid_coordinate: usize,
    pub dropped_unknown_type: usize,
    pub dropped_out_of_scope: usize,
}

pub trait IngestStage: Send + Sync {
    fn ingest(&self, rows: Vec<RawLabel>, scope: &PointScope) -> IngestedPoints;
}

/// Drops rows with unusable coordinates, unknown label types or annotators
/// outside of the run scope. Drops are counted, never fatal.
#[derive(Debug, Default, Clone)]
pub struct LabelValidationStage;

impl LabelValidationStage {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl IngestStage for LabelValidationStage {
    fn ingest(&self, rows: Vec<RawLabel>, scope: &PointScope) -> IngestedPoints {
        let mut outcome = IngestedPoints {
            points: Vec::with_capacity(rows.len()),
            ..IngestedPoints::default()
        };

        for row in rows {
            let Ok(label_type) = row.label_type.parse::<LabelType>() else {
                outcome.dropped_unknown_type += 1;
                continue;
            };

            let annotator = AnnotatorId::new(row.annotator_id);
            if !scope.admits(&annotator) {
                outcome.dropped_out_of_scope += 1;
                continue;
            }

            match validate_coordinate(row.label_id, row.lat, row.lng) {
                Ok(coordinate) => outcome.points.push(Point {
                    id: row.label_id,
                    label_type,
                    coordinate,
                    annotator,
                    severity: row.severity,
                    temporary: row.temporary,
                }),
                Err(error) => {
                    debug!(error = %error, "dropping label");
                    outcome.dropped_invalid_coordinate += 1;
                }
            }
        }

        if outcome.dropped_invalid_coordinate > 0 {
            warn!(
                dropped = outcome.dropped_invalid_coordinate,
                "removed labels with invalid coordinates"
            );
        }
        if outcome.dropped_unknown_type > 0 {
            debug!(
                dropped = outcome.dropped_unknown_type,
                "removed labels with unsupported label types"
            );
        }

        outcome
    }
}

fn validate_coordinate(
    label_id: i64,
    lat: Option<f64>,
    lng: Option<f64>,
) -> Result<Coordinate, ClusteringError> {
    Coordinate::try_new(lat, lng).map_err(|issue| ClusteringError::InvalidCoordinate {
        label_id,
        issue,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(label_id: i64, label_type: &str, lng: Option<f64>, annotator: &str) -> RawLabel {
        RawLabel {
            label_id,
            label_type: label_type.to_string(),
            lat: Some(38.9),
            lng,
            annotator_id: annotator.to_string(),
            severity: Some(3),
            temporary: None,
        }
    }

    #[test]
    fn drops_invalid_longitude_and_counts_it() {
        let rows = vec![
            row(1, "CurbRamp", Some(-77.03), "a"),
            row(2, "CurbRamp", Some(1.2e14), "b"),
            row(3, "Obstacle", None, "c"),
        ];

        let outcome = LabelValidationStage::new().ingest(rows, &PointScope::All);

        assert_eq!(outcome.points.len(), 1);
        assert_eq!(outcome.points[0].id, 1);
        assert_eq!(outcome.dropped_invalid_coordinate, 2);
    }

    #[test]
    fn drops_unknown_types_separately() {
        let rows = vec![
            row(1, "Crosswalk", Some(-77.03), "a"),
            row(2, "Other", Some(-77.03), "a"),
        ];

        let outcome = LabelValidationStage::new().ingest(rows, &PointScope::All);

        assert_eq!(outcome.points.len(), 1);
        assert_eq!(outcome.dropped_unknown_type, 1);
        assert_eq!(outcome.dropped_invalid_coordinate, 0);
    }

    #[test]
    fn scope_filters_other_annotators() {
        let rows = vec![
            row(1, "CurbRamp", Some(-77.03), "me"),
            row(2, "CurbRamp", Some(-77.03), "someone-else"),
        ];

        let outcome = LabelValidationStage::new()
            .ingest(rows, &PointScope::Annotator(AnnotatorId::new("me")));

        assert_eq!(outcome.points.len(), 1);
        assert_eq!(outcome.dropped_out_of_scope, 1);
    }

    #[test]
    fn keeps_severity_and_temporariness() {
        let mut raw = row(5, "SurfaceProblem", Some(-77.0), "a");
        raw.temporary = Some(true);

        let outcome = LabelValidationStage::new().ingest(vec![raw], &PointScope::All);

        let point = &outcome.points[0];
        assert_eq!(point.label_type, LabelType::SurfaceProblem);
        assert_eq!(point.severity, Some(3));
        assert_eq!(point.temporary, Some(true));
    }
}
