//! Track point storage
//!
//! This module provides the raw [`TrackSample`] rows produced by ingestion and
//! the cleaned [`TrackPoint`]s that every later stage consumes. The sample
//! `index` is the stable join key across all derived data.

use crate::utils;
use geo::{Coord, Point, Rect};

/// A raw, possibly incomplete row of a GPS track
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackSample {
    /// Position of the row in the original track
    pub index: usize,
    /// Latitude in degrees, `None` when the device did not report a fix
    pub latitude: Option<f64>,
    /// Longitude in degrees
    pub longitude: Option<f64>,
    /// Reported horizontal accuracy in meters
    pub accuracy: Option<f64>,
    /// Category marker; rows without one are not positional
    pub kind: Option<String>,
}

impl TrackSample {
    /// Create a positional sample with a category marker
    pub fn new(index: usize, latitude: f64, longitude: f64, kind: impl Into<String>) -> Self {
        Self {
            index,
            latitude: Some(latitude),
            longitude: Some(longitude),
            accuracy: None,
            kind: Some(kind.into()),
        }
    }

    /// Builder-style setter for the reported accuracy
    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Drop coordinates that cannot be a GPS fix (non-finite or out of range)
    pub fn sanitized(mut self) -> Self {
        if let Some(lat) = self.latitude
            && !utils::is_valid_latitude(lat)
        {
            tracing::warn!("Discarding invalid latitude {} at index {}", lat, self.index);
            self.latitude = None;
        }
        if let Some(lon) = self.longitude
            && !utils::is_valid_longitude(lon)
        {
            tracing::warn!("Discarding invalid longitude {} at index {}", lon, self.index);
            self.longitude = None;
        }
        if self.accuracy.is_some_and(|v| !v.is_finite()) {
            self.accuracy = None;
        }
        self
    }
}

/// A cleaned track point ready for matching
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackPoint {
    /// Position of the point in the original track
    pub index: usize,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Reported horizontal accuracy in meters
    pub accuracy: Option<f64>,
    /// Category marker carried over from the sample
    pub kind: String,
}

impl TrackPoint {
    /// Create a point without accuracy information
    pub fn new(index: usize, latitude: f64, longitude: f64) -> Self {
        Self {
            index,
            latitude,
            longitude,
            accuracy: None,
            kind: String::from("point"),
        }
    }

    /// Builder-style setter for the reported accuracy
    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Geographic position (x = longitude, y = latitude)
    #[inline]
    pub fn position(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// Bounding rectangle of a track in geographic coordinates (x = lon, y = lat)
///
/// Returns `None` for an empty track.
pub fn extent(points: &[TrackPoint]) -> Option<Rect<f64>> {
    let first = points.first()?;
    let (mut min_x, mut min_y) = (first.longitude, first.latitude);
    let (mut max_x, mut max_y) = (min_x, min_y);

    for point in &points[1..] {
        min_x = min_x.min(point.longitude);
        min_y = min_y.min(point.latitude);
        max_x = max_x.max(point.longitude);
        max_y = max_y.max(point.latitude);
    }

    Some(Rect::new(
        Coord { x: min_x, y: min_y },
        Coord { x: max_x, y: max_y },
    ))
}

/// Great-circle length of the raw track in meters
pub fn path_length(points: &[TrackPoint]) -> f64 {
    points
        .windows(2)
        .map(|pair| utils::haversine_distance(pair[0].position(), pair[1].position()))
        .sum()
}
