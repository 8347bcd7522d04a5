pub mod label;
pub mod result;
pub mod thresholds;

pub use label::{AnnotatorId, Category, Coordinate, LabelType, Point, RawLabel};
pub use result::{
    CategoryStats, ConsensusRecord, GlobalResult, LabelAssignment, RejectedCategory, RunReport,
};
pub use thresholds::ThresholdTable;
