//! Greedy per-point projection onto the closest edge

use super::{CandidateSet, MatchResult, Matcher, candidate_layers};
use crate::graph::{MatchCandidate, RoadGraph};
use crate::TrackPoint;

/// Distances closer than this (meters) are treated as equal
const TIE_EPSILON: f64 = 1e-6;

/// Matches each point independently to the closest candidate edge.
///
/// Consecutive points may land on disconnected edges; no route plausibility
/// is considered. Points without any edge inside the search radius are left
/// unmatched rather than forced onto a distant road.
#[derive(Clone, Debug)]
pub struct NearestEdgeMatcher {
    search_radius: f64,
}

impl NearestEdgeMatcher {
    pub fn new(search_radius: f64) -> Self {
        Self { search_radius }
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Matcher for NearestEdgeMatcher {
    fn match_points(&self, graph: &RoadGraph, points: &[TrackPoint]) -> Vec<MatchResult> {
        let layers = candidate_layers(graph, points, self.search_radius, None);
        points
            .iter()
            .zip(&layers.layers)
            .map(|(point, candidates)| match closest(candidates) {
                Some(best) => MatchResult::matched(point.index, graph, best),
                None => MatchResult::unmatched(point),
            })
            .collect()
    }
}

/// Strictly closest candidate; near-equal distances go to the lowest edge identifier
fn closest(candidates: &CandidateSet) -> Option<&MatchCandidate> {
    candidates.iter().reduce(|best, candidate| {
        let delta = candidate.projection.distance - best.projection.distance;
        if delta < -TIE_EPSILON || (delta.abs() <= TIE_EPSILON && candidate.edge < best.edge) {
            candidate
        } else {
            best
        }
    })
}

/// Match every point of a track to its nearest edge
pub fn match_nearest(graph: &RoadGraph, points: &[TrackPoint], search_radius: f64) -> Vec<MatchResult> {
    NearestEdgeMatcher::new(search_radius).match_points(graph, points)
}
