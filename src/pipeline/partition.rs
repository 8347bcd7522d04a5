//! Splits validated points into per-category point sets.

use rustc_hash::FxHashMap;

use crate::schema::{Category, Point};

use super::mode::CategoryConfig;

/// Points of one category, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSet {
    pub category: Category,
    pub points: Vec<Point>,
}

impl PointSet {
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// One [`PointSet`] per clusterable category, in enumeration order. Empty
/// categories are kept so that reporting covers them.
#[must_use]
pub fn partition(points: Vec<Point>, config: &CategoryConfig) -> Vec<PointSet> {
    let mut buckets: FxHashMap<Category, Vec<Point>> = FxHashMap::default();
    for point in points {
        buckets
            .entry(config.category_of(point.label_type))
            .or_default()
            .push(point);
    }

    config
        .categories()
        .into_iter()
        .map(|category| PointSet {
            category,
            points: buckets.remove(&category).unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AnnotatorId, Coordinate, LabelType};

    fn point(id: i64, label_type: LabelType) -> Point {
        Point {
            id,
            label_type,
            coordinate: Coordinate::try_new(Some(38.9), Some(-77.0)).expect("valid coordinate"),
            annotator: AnnotatorId::new("a"),
            severity: None,
            temporary: None,
        }
    }

    #[test]
    fn problem_collects_constituents_in_input_order() {
        let points = vec![
            point(1, LabelType::Obstacle),
            point(2, LabelType::CurbRamp),
            point(3, LabelType::SurfaceProblem),
            point(4, LabelType::NoCurbRamp),
        ];

        let sets = partition(points, &CategoryConfig::multi_annotator());

        let problem = sets
            .iter()
            .find(|set| set.category == Category::Problem)
            .expect("problem set");
        assert_eq!(
            problem.points.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![1, 3, 4]
        );
        assert!(
            sets.iter()
                .all(|set| set.category != Category::Label(LabelType::Obstacle))
        );
    }

    #[test]
    fn keeps_empty_categories_in_order() {
        let sets = partition(vec![], &CategoryConfig::multi_annotator());

        assert!(sets.iter().all(PointSet::is_empty));
        assert_eq!(
            sets.iter().map(|set| set.category).collect::<Vec<_>>(),
            CategoryConfig::multi_annotator().categories()
        );
    }
}
