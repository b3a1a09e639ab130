//! Map matching strategies
//!
//! Both strategies share candidate generation: every point is projected into
//! the graph's metric plane and paired with the edges inside the search
//! radius. They differ only in how a candidate is chosen per point:
//!
//! - [`NearestEdgeMatcher`] picks the closest candidate independently per point
//! - [`HmmMatcher`] decodes the most likely candidate sequence with Viterbi

mod hmm;
mod nearest;

pub use hmm::{HmmConfig, HmmMatcher, match_hmm};
pub use nearest::{NearestEdgeMatcher, match_nearest};

use crate::graph::{EdgeRef, MatchCandidate, RoadGraph};
use crate::{MatchError, TrackPoint};
use geo::{Coord, Point};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// Candidate set of one point; most points see only a handful of edges
pub(crate) type CandidateSet = SmallVec<[MatchCandidate; 8]>;

/// Outcome of matching a single track point
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MatchResult {
    /// Index of the track point this result belongs to
    pub index: usize,
    /// Matched edge, `None` when the point is unmatched
    pub edge: Option<EdgeRef>,
    /// Corrected position (x = lon, y = lat); the raw position when unmatched
    pub position: Point<f64>,
    /// Perpendicular distance from the raw point to the edge; 0 when unmatched
    pub projection_length: f64,
    /// Distance along the edge from its start to the corrected position
    pub offset: f64,
    /// Route length travelled since the start of the decode segment
    pub traveled: Option<f64>,
}

impl MatchResult {
    /// The unmatched sentinel for a point
    pub fn unmatched(point: &TrackPoint) -> Self {
        Self {
            index: point.index,
            edge: None,
            position: point.position(),
            projection_length: 0.0,
            offset: 0.0,
            traveled: None,
        }
    }

    pub(crate) fn matched(index: usize, graph: &RoadGraph, candidate: &MatchCandidate) -> Self {
        Self {
            index,
            edge: Some(candidate.edge),
            position: graph.to_geographic(candidate.projection.point),
            projection_length: candidate.projection.distance,
            offset: candidate.projection.offset,
            traveled: None,
        }
    }

    #[inline]
    pub fn is_matched(&self) -> bool {
        self.edge.is_some()
    }
}

/// A matching strategy
pub trait Matcher: Send + Sync {
    /// Match every point; the output has one result per input point, in order
    fn match_points(&self, graph: &RoadGraph, points: &[TrackPoint]) -> Vec<MatchResult>;
}

/// Selects one of the two matching strategies
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MatchMethod {
    /// Closest edge per point, no temporal consistency
    Nearest,
    /// Hidden-Markov sequence decoding
    #[default]
    Hmm,
}

impl MatchMethod {
    /// Build the matcher for this method
    pub fn matcher(&self, search_radius: f64, hmm: &HmmConfig) -> Box<dyn Matcher> {
        match self {
            MatchMethod::Nearest => Box::new(NearestEdgeMatcher::new(search_radius)),
            MatchMethod::Hmm => Box::new(HmmMatcher::new(search_radius, hmm.clone())),
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMethod::Nearest => f.write_str("nearest"),
            MatchMethod::Hmm => f.write_str("hmm"),
        }
    }
}

impl FromStr for MatchMethod {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(MatchMethod::Nearest),
            "hmm" => Ok(MatchMethod::Hmm),
            other => Err(MatchError::InvalidConfig(format!(
                "unknown matching method '{other}'"
            ))),
        }
    }
}

/// Per-point matching output of a whole track
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatchedTrack {
    pub results: Vec<MatchResult>,
}

impl MatchedTrack {
    /// Corrected positions, one per point
    pub fn corrected_points(&self) -> Vec<Point<f64>> {
        self.results.iter().map(|r| r.position).collect()
    }

    /// Matched edges, one per point
    pub fn edges(&self) -> Vec<Option<EdgeRef>> {
        self.results.iter().map(|r| r.edge).collect()
    }

    /// Number of points that received an edge
    pub fn matched_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_matched()).count()
    }

    /// Split into corrected positions, edges and the full per-point results
    pub fn into_parts(self) -> (Vec<Point<f64>>, Vec<Option<EdgeRef>>, Vec<MatchResult>) {
        (self.corrected_points(), self.edges(), self.results)
    }
}

/// Match a track with the selected method
pub fn map_match(
    graph: &RoadGraph,
    points: &[TrackPoint],
    method: MatchMethod,
    search_radius: f64,
    hmm: &HmmConfig,
) -> MatchedTrack {
    #[cfg(feature = "profiling")]
    profiling::scope!("matching::map_match");

    let results = method.matcher(search_radius, hmm).match_points(graph, points);
    tracing::debug!(
        "Matched {} points with the {} method",
        results.len(),
        method
    );
    MatchedTrack { results }
}

/// Metric positions and candidate sets of a track
pub(crate) struct CandidateLayers {
    pub(crate) metric: Vec<Coord<f64>>,
    pub(crate) layers: Vec<CandidateSet>,
}

/// Project every point and gather its candidates, closest first.
///
/// `limit` keeps only that many closest candidates per point.
pub(crate) fn candidate_layers(
    graph: &RoadGraph,
    points: &[TrackPoint],
    radius: f64,
    limit: Option<usize>,
) -> CandidateLayers {
    let metric: Vec<Coord<f64>> = points
        .iter()
        .map(|p| graph.projection().to_metric(p.position().0))
        .collect();
    let layers = metric
        .iter()
        .map(|&m| {
            let candidates = graph.edges_within_metric(m, radius);
            let keep = limit.unwrap_or(candidates.len());
            candidates.into_iter().take(keep).collect()
        })
        .collect();
    CandidateLayers { metric, layers }
}
