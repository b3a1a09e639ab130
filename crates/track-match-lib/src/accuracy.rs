//! Projection quality statistics
//!
//! Compares how far each point had to be moved onto the road with how
//! accurate the device claimed the fix was.

use crate::matching::MatchResult;
use crate::TrackPoint;
use std::collections::HashMap;
use std::fmt;

/// Ratio of reported accuracy to projection length
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ProjectionAccuracy {
    /// `accuracy / projection_length`
    Ratio(f64),
    /// The point is unmatched or sits exactly on its edge
    Undefined,
    /// The device did not report an accuracy
    Unavailable,
}

impl ProjectionAccuracy {
    /// The ratio, when one was computed
    #[inline]
    pub fn ratio(&self) -> Option<f64> {
        match self {
            ProjectionAccuracy::Ratio(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for ProjectionAccuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionAccuracy::Ratio(value) => write!(f, "{value:.3}"),
            ProjectionAccuracy::Undefined => f.write_str("undefined"),
            ProjectionAccuracy::Unavailable => f.write_str("unavailable"),
        }
    }
}

/// Accuracy statistics of one matched point
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AccuracyStats {
    pub index: usize,
    /// Distance from the raw point to its edge; `None` when unmatched
    pub projection_length: Option<f64>,
    pub projection_accuracy: ProjectionAccuracy,
}

impl AccuracyStats {
    /// Statistics of one point given its match
    pub fn of(point: &TrackPoint, result: &MatchResult) -> Self {
        if !result.is_matched() {
            return Self {
                index: point.index,
                projection_length: None,
                projection_accuracy: ProjectionAccuracy::Undefined,
            };
        }

        let length = result.projection_length;
        let projection_accuracy = match point.accuracy {
            None => ProjectionAccuracy::Unavailable,
            Some(_) if length <= 0.0 => ProjectionAccuracy::Undefined,
            Some(accuracy) => ProjectionAccuracy::Ratio(accuracy / length),
        };

        Self {
            index: point.index,
            projection_length: Some(length),
            projection_accuracy,
        }
    }
}

/// Score every point that has a match result, joined on the point index.
///
/// Points without a result are skipped; output follows the order of `points`.
pub fn score(points: &[TrackPoint], results: &[MatchResult]) -> Vec<AccuracyStats> {
    let by_index: HashMap<usize, &MatchResult> = results.iter().map(|r| (r.index, r)).collect();
    points
        .iter()
        .filter_map(|point| by_index.get(&point.index).map(|result| AccuracyStats::of(point, result)))
        .collect()
}
