//! Per-track diagnostics
//!
//! Recoverable per-point issues are collected here instead of being raised,
//! so a single bad sample never aborts the rest of its track.

use crate::MatchError;

/// Numeric column of a track that can be interpolated
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Column {
    Latitude,
    Longitude,
    Accuracy,
}

/// Why a gap could not be filled
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum InterpolationFailure {
    /// The column has fewer valid samples than the quadratic fit needs
    InsufficientSamples { valid: usize },
    /// The gap touches the start or the end of the track
    OpenGap,
    /// The gap is longer than the configured maximum
    GapTooLong { len: usize },
    /// The neighbouring samples do not define a usable curve
    DegenerateFit,
}

/// A recoverable issue found while correcting a track
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum TrackWarning {
    /// Interpolation failed for a whole column (`gap` is `None`) or one gap
    /// (first and last missing sample index, inclusive)
    InterpolationFailed {
        column: Column,
        gap: Option<(usize, usize)>,
        reason: InterpolationFailure,
    },
    /// Rows without a category marker were removed
    DroppedUntagged { indices: Vec<usize> },
    /// Tagged rows still lacking a coordinate after interpolation were removed
    DroppedUnpositioned { indices: Vec<usize> },
    /// Points without a reported accuracy; their accuracy ratio is omitted
    MissingAccuracy { count: usize },
    /// Points for which no road edge lies within the search radius
    Unmatched { indices: Vec<usize> },
}

/// A record that could not be assembled
#[derive(Debug)]
pub struct RejectedRecord {
    /// Index of the point whose record was rejected
    pub point_index: usize,
    /// Why the record was rejected
    pub error: MatchError,
}

/// Everything that went wrong, but not fatally, for one track
#[derive(Debug, Default)]
pub struct TrackReport {
    /// Recoverable issues, in the order they were found
    pub warnings: Vec<TrackWarning>,
    /// Records dropped because of a per-record fatal error
    pub rejected: Vec<RejectedRecord>,
}

impl TrackReport {
    /// True when nothing was reported
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty() && self.rejected.is_empty()
    }
}
