//! Track cleaning before matching
//!
//! Missing latitude, longitude and accuracy values are filled with a local
//! quadratic fit through neighbouring valid samples, then rows that carry no
//! category marker (non-positional rows of the source stream) are dropped.
//! Nothing here fails: every problem becomes a [`TrackWarning`].

use crate::report::{Column, InterpolationFailure, TrackWarning};
use crate::{TrackPoint, TrackSample};

/// Number of valid samples a quadratic fit goes through
const FIT_POINTS: usize = 3;

/// Configuration for track preprocessing
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PreprocessConfig {
    /// Fill gaps in numeric columns before filtering.
    /// Default: true
    pub interpolate: bool,
    /// Longest run of consecutive missing values that is filled.
    /// Default: None (no limit)
    pub max_gap: Option<usize>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            interpolate: true,
            max_gap: None,
        }
    }
}

impl PreprocessConfig {
    /// Builder-style setter for the maximum gap length
    pub fn with_max_gap(mut self, max_gap: usize) -> Self {
        self.max_gap = Some(max_gap);
        self
    }
}

/// Output of [`prepare`]
#[derive(Clone, Debug, Default)]
pub struct Prepared {
    /// Cleaned points in input order
    pub points: Vec<TrackPoint>,
    /// Issues found while cleaning
    pub warnings: Vec<TrackWarning>,
}

/// Clean a raw track: interpolate gaps, then keep only tagged, positioned rows
pub fn prepare(samples: &[TrackSample], config: &PreprocessConfig) -> Prepared {
    #[cfg(feature = "profiling")]
    profiling::scope!("preprocess::prepare");

    let mut samples: Vec<TrackSample> = samples.iter().cloned().map(TrackSample::sanitized).collect();
    let mut warnings = Vec::new();

    if config.interpolate {
        let xs: Vec<f64> = samples.iter().map(|s| s.index as f64).collect();
        let indices: Vec<usize> = samples.iter().map(|s| s.index).collect();

        for column in [Column::Latitude, Column::Longitude, Column::Accuracy] {
            let mut values: Vec<Option<f64>> = samples.iter().map(|s| read(s, column)).collect();
            interpolate_column(&xs, &indices, &mut values, column, config, &mut warnings);
            for (sample, value) in samples.iter_mut().zip(values) {
                write(sample, column, value);
            }
        }
    }

    let mut untagged = Vec::new();
    let mut unpositioned = Vec::new();
    let mut points = Vec::with_capacity(samples.len());

    for sample in samples {
        let Some(kind) = sample.kind else {
            untagged.push(sample.index);
            continue;
        };
        match (sample.latitude, sample.longitude) {
            (Some(latitude), Some(longitude)) => points.push(TrackPoint {
                index: sample.index,
                latitude,
                longitude,
                accuracy: sample.accuracy,
                kind,
            }),
            _ => unpositioned.push(sample.index),
        }
    }

    if !untagged.is_empty() {
        tracing::debug!("Dropped {} rows without a category marker", untagged.len());
        warnings.push(TrackWarning::DroppedUntagged { indices: untagged });
    }
    if !unpositioned.is_empty() {
        tracing::warn!(
            "Dropped {} tagged rows that still lack a coordinate",
            unpositioned.len()
        );
        warnings.push(TrackWarning::DroppedUnpositioned {
            indices: unpositioned,
        });
    }

    Prepared { points, warnings }
}

fn read(sample: &TrackSample, column: Column) -> Option<f64> {
    match column {
        Column::Latitude => sample.latitude,
        Column::Longitude => sample.longitude,
        Column::Accuracy => sample.accuracy,
    }
}

fn write(sample: &mut TrackSample, column: Column, value: Option<f64>) {
    match column {
        Column::Latitude => sample.latitude = value,
        Column::Longitude => sample.longitude = value,
        Column::Accuracy => sample.accuracy = value,
    }
}

/// Fill the interior gaps of one column in place.
///
/// Fits only ever use values that were present before interpolation started.
fn interpolate_column(
    xs: &[f64],
    indices: &[usize],
    values: &mut [Option<f64>],
    column: Column,
    config: &PreprocessConfig,
    warnings: &mut Vec<TrackWarning>,
) {
    let n = values.len();
    let valid = values.iter().filter(|v| v.is_some()).count();
    if valid == n || valid == 0 {
        return;
    }
    if valid < FIT_POINTS {
        tracing::warn!(
            "Interpolation of {:?} failed: only {} valid samples",
            column,
            valid
        );
        warnings.push(TrackWarning::InterpolationFailed {
            column,
            gap: None,
            reason: InterpolationFailure::InsufficientSamples { valid },
        });
        return;
    }

    let original = values.to_vec();
    let mut i = 0;
    while i < n {
        if original[i].is_some() {
            i += 1;
            continue;
        }
        let start = i;
        while i < n && original[i].is_none() {
            i += 1;
        }
        let end = i;
        let gap = Some((indices[start], indices[end - 1]));

        let failure = if start == 0 || end == n {
            Some(InterpolationFailure::OpenGap)
        } else if let Some(max_gap) = config.max_gap
            && end - start > max_gap
        {
            Some(InterpolationFailure::GapTooLong { len: end - start })
        } else {
            fill_gap(xs, &original, values, start, end).err()
        };

        if let Some(reason) = failure {
            tracing::warn!(
                "Gap in {:?} at samples {:?} left unresolved: {:?}",
                column,
                gap,
                reason
            );
            warnings.push(TrackWarning::InterpolationFailed {
                column,
                gap,
                reason,
            });
        }
    }
}

/// Fill `values[start..end]` from a quadratic through the closest valid
/// neighbours: one on each side, plus the nearer second neighbour.
fn fill_gap(
    xs: &[f64],
    original: &[Option<f64>],
    values: &mut [Option<f64>],
    start: usize,
    end: usize,
) -> Result<(), InterpolationFailure> {
    let before = start - 1;
    let after = end;
    let second_before = (0..before).rev().find(|&k| original[k].is_some());
    let second_after = (after + 1..original.len()).find(|&k| original[k].is_some());

    let third = match (second_before, second_after) {
        (Some(p), Some(q)) => {
            if xs[before] - xs[p] <= xs[q] - xs[after] {
                p
            } else {
                q
            }
        }
        (Some(p), None) => p,
        (None, Some(q)) => q,
        (None, None) => return Err(InterpolationFailure::DegenerateFit),
    };

    let knots = [before, after, third].map(|k| (xs[k], original[k].unwrap_or(f64::NAN)));
    for k in start..end {
        let value = lagrange(&knots, xs[k]).ok_or(InterpolationFailure::DegenerateFit)?;
        values[k] = Some(value);
    }
    Ok(())
}

/// Evaluate the interpolating polynomial through `knots` at `x`.
///
/// Returns `None` when two knots share an abscissa or the result is not finite.
fn lagrange(knots: &[(f64, f64)], x: f64) -> Option<f64> {
    let mut sum = 0.0;
    for (i, &(xi, yi)) in knots.iter().enumerate() {
        let mut term = yi;
        for (j, &(xj, _)) in knots.iter().enumerate() {
            if i == j {
                continue;
            }
            let denominator = xi - xj;
            if denominator == 0.0 {
                return None;
            }
            term *= (x - xj) / denominator;
        }
        sum += term;
    }
    sum.is_finite().then_some(sum)
}
