//! Track readers
//!
//! Turns GeoJSON point collections and GPX files into raw [`TrackSample`]s.
//! Rows are numbered in file order; that number is the point index carried
//! through every later stage.

use crate::track::TrackSample;
use crate::{MatchError, Result};
use geojson::{Feature, GeoJson, JsonValue};
use std::io::Read;

/// Category given to every GPX track point
pub const GPX_KIND: &str = "trkpt";

/// Read a GeoJSON `FeatureCollection` of `Point` features.
///
/// `properties.accuracy` becomes the sample accuracy and `properties.type`
/// its category. Features with a null or non-point geometry become samples
/// without coordinates, to be interpolated or dropped later.
///
/// # Errors
/// [`MatchError::Json`] for malformed JSON or GeoJSON and
/// [`MatchError::InvalidTrack`] when the document is not a feature collection.
pub fn read_geojson<R: Read>(reader: R) -> Result<Vec<TrackSample>> {
    let document: GeoJson = serde_json::from_reader(reader)?;
    let GeoJson::FeatureCollection(collection) = document else {
        return Err(MatchError::InvalidTrack(
            "expected a GeoJSON FeatureCollection".to_string(),
        ));
    };

    Ok(collection
        .features
        .iter()
        .enumerate()
        .map(|(index, feature)| sample_from_feature(index, feature))
        .collect())
}

fn sample_from_feature(index: usize, feature: &Feature) -> TrackSample {
    let (longitude, latitude) = match feature.geometry.as_ref().map(|g| &g.value) {
        Some(geojson::Value::Point(position)) => (position.first().copied(), position.get(1).copied()),
        Some(_) => {
            tracing::warn!("Feature {} is not a point, only points are supported", index);
            (None, None)
        }
        None => (None, None),
    };

    let accuracy = feature.property("accuracy").and_then(JsonValue::as_f64);
    let kind = match feature.property("type") {
        None | Some(JsonValue::Null) => None,
        Some(JsonValue::String(kind)) => Some(kind.clone()),
        Some(other) => Some(other.to_string()),
    };

    TrackSample {
        index,
        latitude,
        longitude,
        accuracy,
        kind,
    }
}

/// Read every track point of a GPX file, all segments flattened in order
///
/// # Errors
/// [`MatchError::GpxParse`] when the file is not valid GPX.
pub fn read_gpx<R: Read>(reader: R) -> Result<Vec<TrackSample>> {
    let gpx = gpx::read(reader)?;
    Ok(samples_from_gpx(&gpx))
}

/// Flatten the tracks of a parsed GPX document into samples
pub fn samples_from_gpx(gpx: &gpx::Gpx) -> Vec<TrackSample> {
    gpx.tracks
        .iter()
        .flat_map(|track| &track.segments)
        .flat_map(|segment| &segment.points)
        .enumerate()
        .map(|(index, waypoint)| {
            let point = waypoint.point();
            TrackSample::new(index, point.y(), point.x(), GPX_KIND)
        })
        .collect()
}
