//! Planar projection of points onto segments and polylines
//!
//! All functions here work in a metric plane; callers convert from
//! geographic coordinates first (see [`crate::utils::LocalProjection`]).

use geo::{Coord, LineString};

/// Foot of the perpendicular from a point onto a polyline
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Projection {
    /// Projected point on the polyline (metric)
    pub point: Coord<f64>,
    /// Perpendicular distance from the query point to `point`
    pub distance: f64,
    /// Distance along the polyline from its first vertex to `point`
    pub offset: f64,
    /// Index of the polyline segment holding `point`
    pub segment: usize,
}

/// Project `p` onto the segment `a`-`b`.
///
/// Returns the projected point and the segment parameter `t` in `[0, 1]`.
/// A zero-length segment projects everything onto `a`.
#[inline]
pub fn project_onto_segment(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> (Coord<f64>, f64) {
    let d = b - a;
    let len_sq = d.x * d.x + d.y * d.y;
    if len_sq <= f64::EPSILON {
        return (a, 0.0);
    }
    let t = (((p.x - a.x) * d.x + (p.y - a.y) * d.y) / len_sq).clamp(0.0, 1.0);
    (a + d * t, t)
}

/// Planar distance between two coordinates
#[inline]
pub fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}

/// Project `p` onto every segment of `line` and keep the closest one.
///
/// Ties between segments keep the earliest segment. Returns `None` for a
/// polyline without any vertex.
pub fn project_onto_polyline(p: Coord<f64>, line: &LineString<f64>) -> Option<Projection> {
    let coords = &line.0;
    match coords.len() {
        0 => return None,
        1 => {
            return Some(Projection {
                point: coords[0],
                distance: distance(p, coords[0]),
                offset: 0.0,
                segment: 0,
            });
        }
        _ => {}
    }

    let mut best: Option<Projection> = None;
    let mut walked = 0.0;
    for (segment, pair) in coords.windows(2).enumerate() {
        let (a, b) = (pair[0], pair[1]);
        let segment_length = distance(a, b);
        let (point, t) = project_onto_segment(p, a, b);
        let d = distance(p, point);
        if best.is_none_or(|current| d < current.distance) {
            best = Some(Projection {
                point,
                distance: d,
                offset: walked + t * segment_length,
                segment,
            });
        }
        walked += segment_length;
    }
    best
}

/// Total planar length of a polyline
pub fn polyline_length(line: &LineString<f64>) -> f64 {
    line.0.windows(2).map(|pair| distance(pair[0], pair[1])).sum()
}
