//! Raw annotation rows and the validated points built from them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoordinateIssue;

/// Largest longitude magnitude accepted at ingestion.
pub const MAX_LONGITUDE_DEGREES: f64 = 360.0;

/// Accessibility label type as recorded by an annotator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LabelType {
    CurbRamp,
    NoCurbRamp,
    Obstacle,
    SurfaceProblem,
    Occlusion,
    NoSidewalk,
    Other,
}

impl LabelType {
    pub const ALL: [LabelType; 7] = [
        LabelType::CurbRamp,
        LabelType::NoCurbRamp,
        LabelType::Obstacle,
        LabelType::SurfaceProblem,
        LabelType::Occlusion,
        LabelType::NoSidewalk,
        LabelType::Other,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LabelType::CurbRamp => "CurbRamp",
            LabelType::NoCurbRamp => "NoCurbRamp",
            LabelType::Obstacle => "Obstacle",
            LabelType::SurfaceProblem => "SurfaceProblem",
            LabelType::Occlusion => "Occlusion",
            LabelType::NoSidewalk => "NoSidewalk",
            LabelType::Other => "Other",
        }
    }
}

impl fmt::Display for LabelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LabelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LabelType::ALL
            .into_iter()
            .find(|label_type| label_type.as_str() == s)
            .ok_or_else(|| format!("unknown label type: {s}"))
    }
}

/// Unit the engine clusters over: a single label type or the merged `Problem`
/// meta-category whose constituents depend on the run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Label(LabelType),
    Problem,
}

impl Category {
    /// Fixed enumeration order. Cluster id offsets are assigned in this order.
    pub const ORDER: [Category; 8] = [
        Category::Label(LabelType::CurbRamp),
        Category::Label(LabelType::NoCurbRamp),
        Category::Label(LabelType::Obstacle),
        Category::Label(LabelType::SurfaceProblem),
        Category::Problem,
        Category::Label(LabelType::Occlusion),
        Category::Label(LabelType::NoSidewalk),
        Category::Label(LabelType::Other),
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Label(label_type) => label_type.as_str(),
            Category::Problem => "Problem",
        }
    }
}

impl From<LabelType> for Category {
    fn from(label_type: LabelType) -> Self {
        Category::Label(label_type)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "Problem" {
            return Ok(Category::Problem);
        }
        s.parse::<LabelType>()
            .map(Category::Label)
            .map_err(|_| format!("unknown category: {s}"))
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Opaque annotator identity. Compared for equality only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotatorId(String);

impl AnnotatorId {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnnotatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Input row as delivered by the label store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLabel {
    pub label_id: i64,
    pub label_type: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(alias = "turker_id", alias = "user_id")]
    pub annotator_id: String,
    #[serde(default)]
    pub severity: Option<u8>,
    #[serde(default)]
    pub temporary: Option<bool>,
}

/// Latitude/longitude in degrees. Only constructible from values the
/// distance metric is defined on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    lat: f64,
    lng: f64,
}

impl Coordinate {
    /// Validates a raw coordinate pair.
    ///
    /// # Errors
    /// Returns the [`CoordinateIssue`] when either value is missing, not finite,
    /// or the longitude magnitude exceeds [`MAX_LONGITUDE_DEGREES`].
    pub fn try_new(lat: Option<f64>, lng: Option<f64>) -> Result<Self, CoordinateIssue> {
        let lng = lng.ok_or(CoordinateIssue::MissingLongitude)?;
        let lat = lat.ok_or(CoordinateIssue::MissingLatitude)?;
        if !lat.is_finite() || !lng.is_finite() {
            return Err(CoordinateIssue::NonFinite);
        }
        if lng.abs() > MAX_LONGITUDE_DEGREES {
            return Err(CoordinateIssue::LongitudeOutOfRange(lng));
        }
        Ok(Self { lat, lng })
    }

    #[must_use]
    pub fn lat(&self) -> f64 {
        self.lat
    }

    #[must_use]
    pub fn lng(&self) -> f64 {
        self.lng
    }
}

/// Validated annotation. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub id: i64,
    pub label_type: LabelType,
    pub coordinate: Coordinate,
    pub annotator: AnnotatorId,
    pub severity: Option<u8>,
    pub temporary: Option<bool>,
}
