//! Hidden-Markov map matching with Viterbi decoding
//!
//! States are the candidate edges of each point. The emission score favours
//! candidates close to the raw fix; the transition score favours pairs whose
//! route distance through the graph agrees with the straight-line distance
//! between the two fixes. Everything is computed in log space.
//!
//! A point without candidates cannot take part in any transition, so the
//! track is cut there and every run of matchable points is decoded on its
//! own. A run is also cut when no candidate pair of two consecutive points is
//! connected by a plausible route.

use super::{CandidateLayers, CandidateSet, MatchResult, Matcher, candidate_layers};
use crate::geometry;
use crate::graph::{MatchCandidate, RoadGraph};
use crate::TrackPoint;
use geo::Coord;
use petgraph::graph::NodeIndex;
use std::collections::HashMap;
use std::ops::Range;

/// Scores closer than this are treated as equal when picking a final state
const SCORE_EPSILON: f64 = 1e-9;

/// Parameters of the sequence model
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct HmmConfig {
    /// Standard deviation of the GPS measurement noise in meters.
    /// Default: 10.0
    pub sigma: f64,
    /// Scale of the route/straight-line discrepancy penalty in meters.
    /// Default: 20.0
    pub beta: f64,
    /// Closest candidates kept per point; bounds the decoding cost.
    /// Default: 8
    pub max_candidates: usize,
    /// Routes longer than this multiple of the straight-line distance (plus
    /// twice the search radius) are not considered.
    /// Default: 5.0
    pub max_route_factor: f64,
    /// Backward movement along the same edge tolerated as GPS jitter, in meters.
    /// Default: 5.0
    pub backward_tolerance: f64,
    /// Longest run of points decoded jointly; longer runs are chunked.
    /// Default: None (no limit)
    pub max_segment_len: Option<usize>,
}

impl Default for HmmConfig {
    fn default() -> Self {
        Self {
            sigma: 10.0,
            beta: 20.0,
            max_candidates: 8,
            max_route_factor: 5.0,
            backward_tolerance: 5.0,
            max_segment_len: None,
        }
    }
}

impl HmmConfig {
    /// Builder-style setter for the measurement noise
    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = sigma;
        self
    }

    /// Builder-style setter for the transition scale
    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    /// Builder-style setter for the segment length cap
    pub fn with_max_segment_len(mut self, max_segment_len: usize) -> Self {
        self.max_segment_len = Some(max_segment_len);
        self
    }
}

/// Viterbi map matcher
#[derive(Clone, Debug)]
pub struct HmmMatcher {
    search_radius: f64,
    config: HmmConfig,
}

impl HmmMatcher {
    pub fn new(search_radius: f64, config: HmmConfig) -> Self {
        Self {
            search_radius,
            config,
        }
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Matcher for HmmMatcher {
    fn match_points(&self, graph: &RoadGraph, points: &[TrackPoint]) -> Vec<MatchResult> {
        let layers = candidate_layers(
            graph,
            points,
            self.search_radius,
            Some(self.config.max_candidates.max(1)),
        );
        let mut results: Vec<MatchResult> = points.iter().map(MatchResult::unmatched).collect();

        let decoder = Decoder {
            graph,
            points,
            layers: &layers,
            radius: self.search_radius,
            config: &self.config,
        };
        for segment in segments(&layers.layers, self.config.max_segment_len) {
            tracing::debug!(
                "Decoding points {}..{} ({} states at most per point)",
                segment.start,
                segment.end,
                layers.layers[segment.clone()]
                    .iter()
                    .map(|l| l.len())
                    .max()
                    .unwrap_or(0)
            );
            decoder.decode(segment, &mut results);
        }

        results
    }
}

/// Match a track with the sequence decoder
pub fn match_hmm(
    graph: &RoadGraph,
    points: &[TrackPoint],
    config: &HmmConfig,
    search_radius: f64,
) -> Vec<MatchResult> {
    HmmMatcher::new(search_radius, config.clone()).match_points(graph, points)
}

/// Runs of consecutive points that all have candidates, at most `max_len` long
fn segments(layers: &[CandidateSet], max_len: Option<usize>) -> Vec<Range<usize>> {
    let max_len = max_len.unwrap_or(usize::MAX).max(1);
    let mut segments = Vec::new();
    let mut start: Option<usize> = None;

    for (t, layer) in layers.iter().enumerate() {
        match (start, layer.is_empty()) {
            (None, false) => start = Some(t),
            (Some(s), true) => {
                segments.push(s..t);
                start = None;
            }
            (Some(s), false) if t - s == max_len => {
                segments.push(s..t);
                start = Some(t);
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        segments.push(s..layers.len());
    }
    segments
}

/// Best predecessor and route length for every state of one layer
type Step = Vec<(usize, f64)>;

struct Decoder<'a> {
    graph: &'a RoadGraph,
    points: &'a [TrackPoint],
    layers: &'a CandidateLayers,
    radius: f64,
    config: &'a HmmConfig,
}

impl Decoder<'_> {
    /// Log-likelihood of observing a fix `distance` meters from its candidate
    #[inline]
    fn emission(&self, distance: f64) -> f64 {
        let z = distance / self.config.sigma;
        -0.5 * z * z
    }

    /// Log-likelihood of a move whose route and straight-line lengths differ
    #[inline]
    fn transition(&self, route: f64, straight: f64) -> f64 {
        -(route - straight).abs() / self.config.beta
    }

    fn emissions(&self, t: usize) -> Vec<f64> {
        self.layers.layers[t]
            .iter()
            .map(|c| self.emission(c.projection.distance))
            .collect()
    }

    fn metric(&self, t: usize) -> Coord<f64> {
        self.layers.metric[t]
    }

    /// Viterbi over `range`, writing the decoded states into `results`
    fn decode(&self, range: Range<usize>, results: &mut [MatchResult]) {
        let mut start = range.start;
        let mut scores = self.emissions(start);
        let mut steps: Vec<Step> = Vec::new();

        for t in range.start + 1..range.end {
            let (next, step) = self.step(t, &scores);
            if next.iter().all(|s| *s == f64::NEG_INFINITY) {
                tracing::warn!(
                    "No plausible route between points {} and {}, decoding both sides separately",
                    self.points[t - 1].index,
                    self.points[t].index
                );
                self.backtrack(start, &scores, &steps, results);
                start = t;
                scores = self.emissions(t);
                steps.clear();
            } else {
                scores = next;
                steps.push(step);
            }
        }

        self.backtrack(start, &scores, &steps, results);
    }

    /// Extend the cumulative scores from layer `t - 1` to layer `t`
    fn step(&self, t: usize, scores: &[f64]) -> (Vec<f64>, Step) {
        let previous = &self.layers.layers[t - 1];
        let current = &self.layers.layers[t];
        let straight = geometry::distance(self.metric(t - 1), self.metric(t));
        let limit = straight * self.config.max_route_factor + 2.0 * self.radius;

        let mut reach: HashMap<NodeIndex, HashMap<NodeIndex, f64>> = HashMap::new();
        for candidate in previous {
            let node = self.graph.edge_at(candidate.slot).target;
            reach
                .entry(node)
                .or_insert_with(|| self.graph.distances_from(node, limit));
        }

        let mut next = Vec::with_capacity(current.len());
        let mut step = Vec::with_capacity(current.len());

        for candidate in current {
            let mut best = (f64::NEG_INFINITY, 0, 0.0);
            for (i, from) in previous.iter().enumerate() {
                if scores[i] == f64::NEG_INFINITY {
                    continue;
                }
                let node = self.graph.edge_at(from.slot).target;
                let Some(route) = self.route_distance(from, candidate, &reach[&node]) else {
                    continue;
                };
                if route > limit {
                    continue;
                }
                let score = scores[i] + self.transition(route, straight);
                if score > best.0 {
                    best = (score, i, route);
                }
            }
            let (score, from, route) = best;
            next.push(if score == f64::NEG_INFINITY {
                score
            } else {
                score + self.emission(candidate.projection.distance)
            });
            step.push((from, route));
        }

        (next, step)
    }

    /// Route length from one projected candidate to the next.
    ///
    /// `reach` holds shortest distances from the end node of `from`. Offsets
    /// are measured on the metric geometry and converted to routing length so
    /// the partial edges add up with the graph distances.
    fn route_distance(
        &self,
        from: &MatchCandidate,
        to: &MatchCandidate,
        reach: &HashMap<NodeIndex, f64>,
    ) -> Option<f64> {
        let from_edge = self.graph.edge_at(from.slot);
        if from.slot == to.slot {
            let delta = to.projection.offset - from.projection.offset;
            if delta >= -self.config.backward_tolerance {
                return Some(from_edge.routed(delta.abs()));
            }
        }
        let to_edge = self.graph.edge_at(to.slot);
        let to_end = (from_edge.metric_length - from.projection.offset).max(0.0);
        let between = reach.get(&to_edge.source)?;
        Some(from_edge.routed(to_end) + between + to_edge.routed(to.projection.offset))
    }

    /// Walk the backpointers from the best final state and store the run
    fn backtrack(&self, start: usize, scores: &[f64], steps: &[Step], results: &mut [MatchResult]) {
        let last = start + steps.len();
        let layer = &self.layers.layers[last];
        let Some(mut state) = best_state(scores, layer) else {
            return;
        };

        let mut chosen = vec![0; steps.len() + 1];
        chosen[steps.len()] = state;
        for k in (0..steps.len()).rev() {
            state = steps[k][state].0;
            chosen[k] = state;
        }

        let mut traveled = 0.0;
        for (k, &state) in chosen.iter().enumerate() {
            let t = start + k;
            if k > 0 {
                traveled += steps[k - 1][state].1;
            }
            let mut result =
                MatchResult::matched(self.points[t].index, self.graph, &self.layers.layers[t][state]);
            result.traveled = Some(traveled);
            results[t] = result;
        }
    }
}

/// Index of the highest score; near-equal scores go to the lowest edge identifier
fn best_state(scores: &[f64], layer: &CandidateSet) -> Option<usize> {
    (0..scores.len())
        .filter(|&i| scores[i] > f64::NEG_INFINITY)
        .reduce(|best, i| {
            let delta = scores[i] - scores[best];
            if delta > SCORE_EPSILON || (delta.abs() <= SCORE_EPSILON && layer[i].edge < layer[best].edge) {
                i
            } else {
                best
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::graph::{EdgeData, EdgeRef, GraphData};

    fn hmm(graph: &RoadGraph, points: &[TrackPoint]) -> Vec<MatchResult> {
        match_hmm(graph, points, &HmmConfig::default(), 50.0)
    }

    #[test]
    fn test_straight_road_decodes_onto_single_edge() {
        let graph = fixtures::straight_road();
        let points = fixtures::points_along(10, 12.0);
        let results = hmm(&graph, &points);

        assert_eq!(results.len(), 10);
        for result in &results {
            assert_eq!(result.edge, Some(EdgeRef::new(1, 2, 0)));
            assert!((result.projection_length - 12.0).abs() < 0.1);
        }
    }

    #[test]
    fn test_traveled_length_accumulates() {
        let graph = fixtures::straight_road();
        let points = fixtures::points_along(5, 3.0);
        let results = hmm(&graph, &points);

        assert_eq!(results[0].traveled, Some(0.0));
        let total = results[4].traveled.unwrap();
        let expected = 0.8 * fixtures::straight_road_length();
        assert!((total - expected).abs() < 1.0);
        for pair in results.windows(2) {
            assert!(pair[1].traveled.unwrap() > pair[0].traveled.unwrap());
        }
    }

    #[test]
    fn test_traveled_length_uses_supplied_edge_length() {
        let mut data = GraphData::new();
        data.add_node(1, fixtures::BASE_LAT, fixtures::BASE_LON)
            .add_node(2, fixtures::BASE_LAT, fixtures::BASE_LON + 0.01);
        data.add_two_way(EdgeData::new(1, 2, 100).with_length(2.0 * fixtures::straight_road_length()));
        let graph = RoadGraph::new(data).unwrap();

        let points = fixtures::points_along(5, 3.0);
        let doubled = hmm(&graph, &points)[4].traveled.unwrap();
        let plain = hmm(&fixtures::straight_road(), &points)[4].traveled.unwrap();
        assert!((doubled / plain - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_route_through_node_uses_supplied_edge_length() {
        // 1 -> 2 -> 3 with supplied lengths twice the geometric ones
        let mut data = GraphData::new();
        data.add_node(1, fixtures::BASE_LAT, fixtures::BASE_LON)
            .add_node(2, fixtures::BASE_LAT, fixtures::BASE_LON + 0.005)
            .add_node(3, fixtures::BASE_LAT, fixtures::BASE_LON + 0.01);
        let half = fixtures::straight_road_length() / 2.0;
        data.add_edge(EdgeData::new(1, 2, 1).with_length(2.0 * half))
            .add_edge(EdgeData::new(2, 3, 2).with_length(2.0 * half));
        let graph = RoadGraph::new(data).unwrap();

        let points: Vec<TrackPoint> = [0.25, 0.75]
            .iter()
            .enumerate()
            .map(|(i, &fraction)| {
                let p = fixtures::offset_point(fraction, 2.0);
                TrackPoint::new(i, p.y(), p.x())
            })
            .collect();
        let results = hmm(&graph, &points);
        assert_eq!(results[0].edge, Some(EdgeRef::new(1, 2, 0)));
        assert_eq!(results[1].edge, Some(EdgeRef::new(2, 3, 0)));
        let traveled = results[1].traveled.unwrap();
        let expected = 2.0 * 0.5 * fixtures::straight_road_length();
        assert!((traveled - expected).abs() < 1e-6 * expected);
    }

    #[test]
    fn test_sequence_beats_greedy_on_noisy_fix() {
        let graph = fixtures::parallel_roads();
        let mut points = fixtures::points_along(5, 5.0);
        let noisy = fixtures::offset_point(0.5, 28.0);
        points[2].latitude = noisy.y();
        points[2].longitude = noisy.x();

        let results = hmm(&graph, &points);
        for result in &results {
            assert_eq!(result.edge, Some(EdgeRef::new(1, 2, 0)));
        }
    }

    #[test]
    fn test_unmatchable_point_splits_decoding() {
        let graph = fixtures::straight_road();
        let mut points = fixtures::points_along(9, 6.0);
        let far = fixtures::offset_point(0.5, 300.0);
        points[4].latitude = far.y();
        points[4].longitude = far.x();

        let results = hmm(&graph, &points);

        assert!(!results[4].is_matched());
        assert_eq!(results[4].traveled, None);
        assert_eq!(results[4].position, points[4].position());
        for (i, result) in results.iter().enumerate() {
            if i != 4 {
                assert_eq!(result.edge, Some(EdgeRef::new(1, 2, 0)), "point {i}");
            }
        }
        // both sides start their own run
        assert_eq!(results[0].traveled, Some(0.0));
        assert_eq!(results[5].traveled, Some(0.0));
        assert!(results[3].traveled.unwrap() > 0.0);
    }

    #[test]
    fn test_infeasible_transition_splits_decoding() {
        let graph = fixtures::one_way_pair();
        let north = fixtures::BASE_LAT + 0.01;
        let points: Vec<TrackPoint> = (0..6)
            .map(|i| {
                let lat = if i < 3 { fixtures::BASE_LAT } else { north } + 0.00005;
                TrackPoint::new(i, lat, fixtures::BASE_LON + 0.002 + i as f64 * 0.001)
            })
            .collect();

        let results = hmm(&graph, &points);
        assert!(results.iter().all(|r| r.is_matched()));
        assert_eq!(results[2].edge, Some(EdgeRef::new(1, 2, 0)));
        assert_eq!(results[3].edge, Some(EdgeRef::new(3, 4, 0)));
        assert_eq!(results[3].traveled, Some(0.0));
    }

    #[test]
    fn test_turn_at_grid_corner() {
        let graph = fixtures::grid_graph();
        let path = [
            (0.25, 0.02),
            (0.75, 0.02),
            (1.25, 0.02),
            (1.75, 0.02),
            (1.98, 0.25),
            (1.98, 0.75),
            (1.98, 1.25),
            (1.98, 1.75),
        ];
        let points: Vec<TrackPoint> = path
            .iter()
            .enumerate()
            .map(|(i, &(col, row))| {
                let p = fixtures::grid_point(col, row);
                TrackPoint::new(i, p.y(), p.x())
            })
            .collect();

        let edges: Vec<Option<EdgeRef>> = hmm(&graph, &points).iter().map(|r| r.edge).collect();
        let expected = [(1, 2), (1, 2), (2, 3), (2, 3), (3, 6), (3, 6), (6, 9), (6, 9)];
        for (edge, (u, v)) in edges.iter().zip(expected) {
            assert_eq!(*edge, Some(EdgeRef::new(u, v, 0)));
        }
    }

    #[test]
    fn test_projected_points_lie_on_assigned_edges() {
        let graph = fixtures::grid_graph();
        let points: Vec<TrackPoint> = [(0.25, 0.03), (0.8, -0.02), (1.4, 0.04), (1.97, 0.5), (2.03, 1.3)]
            .iter()
            .enumerate()
            .map(|(i, &(col, row))| {
                let p = fixtures::grid_point(col, row);
                TrackPoint::new(i, p.y(), p.x())
            })
            .collect();

        let results = hmm(&graph, &points);
        for result in &results {
            let edge = result.edge.expect("every point is near the grid");
            let metric: geo::LineString<f64> = graph
                .geometry_of(edge)
                .unwrap()
                .0
                .iter()
                .map(|&c| graph.projection().to_metric(c))
                .collect();
            let position = graph.projection().to_metric(result.position.0);
            let onto = geometry::project_onto_polyline(position, &metric).unwrap();
            assert!(onto.distance < 1e-6, "point {} is {} m off {}", result.index, onto.distance, edge);
        }
    }

    #[test]
    fn test_max_segment_len_chunks_runs() {
        let graph = fixtures::straight_road();
        let points = fixtures::points_along(7, 4.0);
        let config = HmmConfig::default().with_max_segment_len(3);
        let results = match_hmm(&graph, &points, &config, 50.0);

        assert!(results.iter().all(|r| r.is_matched()));
        assert_eq!(results[3].traveled, Some(0.0));
        assert_eq!(results[6].traveled, Some(0.0));
        assert!(results[5].traveled.unwrap() > 0.0);
    }

    #[test]
    fn test_segments() {
        let graph = fixtures::straight_road();
        let mut points = fixtures::points_along(6, 4.0);
        let far = fixtures::offset_point(0.5, 500.0);
        for i in [0, 3] {
            points[i].latitude = far.y();
            points[i].longitude = far.x();
        }
        let layers = candidate_layers(&graph, &points, 50.0, None);
        assert_eq!(segments(&layers.layers, None), vec![1..3, 4..6]);
        assert_eq!(segments(&layers.layers, Some(1)), vec![1..2, 2..3, 4..5, 5..6]);
    }

    #[test]
    fn test_empty_track() {
        let graph = fixtures::straight_road();
        assert!(hmm(&graph, &[]).is_empty());
    }
}
