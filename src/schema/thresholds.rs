//! Per-category clustering distance thresholds, in kilometers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ClusteringError;

use super::label::Category;

/// Base threshold used when nothing else is configured.
pub const DEFAULT_THRESHOLD_KM: f64 = 0.0075;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    default_km: f64,
    #[serde(default)]
    overrides: BTreeMap<Category, f64>,
}

impl ThresholdTable {
    #[must_use]
    pub fn uniform(default_km: f64) -> Self {
        Self {
            default_km,
            overrides: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_override(mut self, category: Category, km: f64) -> Self {
        self.overrides.insert(category, km);
        self
    }

    /// Applies every entry of `other` on top of this table.
    #[must_use]
    pub fn merged(mut self, other: &BTreeMap<Category, f64>) -> Self {
        self.overrides
            .extend(other.iter().map(|(category, km)| (*category, *km)));
        self
    }

    #[must_use]
    pub fn default_km(&self) -> f64 {
        self.default_km
    }

    #[must_use]
    pub fn get(&self, category: Category) -> f64 {
        self.overrides
            .get(&category)
            .copied()
            .unwrap_or(self.default_km)
    }

    /// Resolved threshold for every category in enumeration order.
    #[must_use]
    pub fn resolved(&self) -> BTreeMap<Category, f64> {
        Category::ORDER
            .iter()
            .map(|category| (*category, self.get(*category)))
            .collect()
    }

    /// Checks that every threshold can be used as a dendrogram cut height.
    ///
    /// # Errors
    /// Returns [`ClusteringError::InvalidThreshold`] for the first negative or
    /// non-finite entry.
    pub fn validate(&self) -> Result<(), ClusteringError> {
        for (category, value) in self.resolved() {
            if !value.is_finite() || value < 0.0 {
                return Err(ClusteringError::InvalidThreshold { category, value });
            }
        }
        Ok(())
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self::uniform(DEFAULT_THRESHOLD_KM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::LabelType;

    #[test]
    fn override_wins_over_default() {
        let table = ThresholdTable::uniform(0.01)
            .with_override(Category::Label(LabelType::CurbRamp), 0.0035);

        assert!((table.get(Category::Label(LabelType::CurbRamp)) - 0.0035).abs() < f64::EPSILON);
        assert!((table.get(Category::Problem) - 0.01).abs() < f64::EPSILON);
    }

    #[test]
    fn validate_rejects_negative_threshold() {
        let table = ThresholdTable::default().with_override(Category::Problem, -1.0);

        let error = table.validate().expect_err("negative threshold");

        assert!(matches!(
            error,
            ClusteringError::InvalidThreshold {
                category: Category::Problem,
                ..
            }
        ));
    }

    #[test]
    fn resolved_lists_every_category() {
        let resolved = ThresholdTable::default().resolved();
        assert_eq!(resolved.len(), Category::ORDER.len());
    }
}
