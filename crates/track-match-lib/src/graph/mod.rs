//! Immutable routable road graph
//!
//! A [`RoadGraph`] is built once per track extent from [`GraphData`] and only
//! queried afterwards. It keeps three read-only views over a single edge
//! store:
//!
//! - a directed `petgraph` graph for shortest-path distances,
//! - an R-tree over edge envelopes for radius queries,
//! - an [`UndirectedView`] for way-identifier lookups.
//!
//! Geometry is held both in geographic coordinates (x = lon, y = lat) and in
//! a local metric plane centred on the graph, so all distances are meters.

mod data;
mod provider;

pub use data::{EdgeData, EdgeRef, GraphData, NodeData};
pub use provider::{GraphProvider, NetworkType, StaticGraph};

use crate::geometry::{self, Projection};
use crate::utils::LocalProjection;
use crate::{MatchError, Result};
use geo::{Coord, LineString, Point, Rect};
use ordered_float::OrderedFloat;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef as _;
use rstar::{AABB, RTree, RTreeObject};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// A road edge that may receive a track point
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchCandidate {
    /// The candidate edge
    pub edge: EdgeRef,
    /// Foot of the perpendicular on the edge, in the graph's metric plane
    pub projection: Projection,
    /// Position of the edge in the graph's edge store
    pub(crate) slot: usize,
}

/// Indexed edge with both geometries and its routing endpoints
#[derive(Clone, Debug)]
pub(crate) struct RoadEdge {
    pub(crate) id: EdgeRef,
    pub(crate) way_id: i64,
    pub(crate) length: f64,
    pub(crate) highway: Option<String>,
    pub(crate) geometry: LineString<f64>,
    pub(crate) metric: LineString<f64>,
    pub(crate) metric_length: f64,
    pub(crate) source: NodeIndex,
    pub(crate) target: NodeIndex,
}

impl RoadEdge {
    /// Convert a distance measured along the metric geometry into the edge's
    /// routing length, which may be supplied by the caller
    #[inline]
    pub(crate) fn routed(&self, metric_distance: f64) -> f64 {
        if self.metric_length > 0.0 {
            metric_distance * self.length / self.metric_length
        } else {
            metric_distance
        }
    }
}

/// R-tree entry pointing into the edge store
#[derive(Clone, Debug)]
struct IndexedEdge {
    slot: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedEdge {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Read-only road network used by every matching operation
#[derive(Clone, Debug)]
pub struct RoadGraph {
    graph: DiGraph<NodeData, usize>,
    nodes: HashMap<i64, NodeIndex>,
    edges: Vec<RoadEdge>,
    lookup: HashMap<EdgeRef, usize>,
    index: RTree<IndexedEdge>,
    projection: LocalProjection,
    bounding_box: Rect<f64>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RoadGraph {
    /// Build and index a graph
    ///
    /// # Errors
    /// - [`MatchError::InvalidGraph`] for an empty node set, non-finite
    ///   coordinates or a geometry with fewer than two vertices
    /// - [`MatchError::UnknownNode`] when an edge references a missing node
    /// - [`MatchError::DuplicateEdge`] when `(u, v, key)` appears twice
    pub fn new(data: GraphData) -> Result<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("graph::new");

        let GraphData {
            nodes: node_data,
            edges: edge_data,
        } = data;

        let bounding_box = Self::compute_bounds(&node_data)?;
        let center = bounding_box.center();
        let projection = LocalProjection::new(center.y, center.x);

        let mut graph = DiGraph::with_capacity(node_data.len(), edge_data.len());
        let mut nodes = HashMap::with_capacity(node_data.len());
        for node in node_data {
            if nodes.contains_key(&node.id) {
                return Err(MatchError::InvalidGraph(format!(
                    "node {} declared twice",
                    node.id
                )));
            }
            let id = node.id;
            nodes.insert(id, graph.add_node(node));
        }

        let mut edges = Vec::with_capacity(edge_data.len());
        let mut lookup = HashMap::with_capacity(edge_data.len());
        let mut indexed = Vec::with_capacity(edge_data.len());

        for data in edge_data {
            let id = data.id();
            let source = *nodes.get(&data.u).ok_or(MatchError::UnknownNode(data.u))?;
            let target = *nodes.get(&data.v).ok_or(MatchError::UnknownNode(data.v))?;
            if lookup.contains_key(&id) {
                return Err(MatchError::DuplicateEdge { edge: id });
            }

            let geometry = match data.geometry {
                Some(line) => line,
                None => {
                    let (a, b) = (&graph[source], &graph[target]);
                    LineString::from(vec![(a.longitude, a.latitude), (b.longitude, b.latitude)])
                }
            };
            if geometry.0.len() < 2 || geometry.0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
                return Err(MatchError::InvalidGraph(format!(
                    "edge {id} needs at least two finite vertices"
                )));
            }

            let metric: LineString<f64> = geometry
                .0
                .iter()
                .map(|&c| projection.to_metric(c))
                .collect();
            let metric_length = geometry::polyline_length(&metric);
            let length = data.length.filter(|l| l.is_finite() && *l >= 0.0).unwrap_or(metric_length);

            let slot = edges.len();
            graph.add_edge(source, target, slot);
            indexed.push(IndexedEdge {
                slot,
                envelope: envelope_of(&metric),
            });
            lookup.insert(id, slot);
            edges.push(RoadEdge {
                id,
                way_id: data.way_id,
                length,
                highway: data.highway,
                geometry,
                metric,
                metric_length,
                source,
                target,
            });
        }

        tracing::debug!(
            "Built road graph with {} nodes and {} edges",
            graph.node_count(),
            edges.len()
        );

        Ok(Self {
            graph,
            nodes,
            edges,
            lookup,
            index: RTree::bulk_load(indexed),
            projection,
            bounding_box,
        })
    }

    fn compute_bounds(nodes: &[NodeData]) -> Result<Rect<f64>> {
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;

        for node in nodes {
            if !node.latitude.is_finite() || !node.longitude.is_finite() {
                return Err(MatchError::InvalidGraph(format!(
                    "node {} has a non-finite coordinate",
                    node.id
                )));
            }
            min_x = min_x.min(node.longitude);
            min_y = min_y.min(node.latitude);
            max_x = max_x.max(node.longitude);
            max_y = max_y.max(node.latitude);
        }

        if nodes.is_empty() {
            return Err(MatchError::InvalidGraph("graph has no nodes".to_string()));
        }

        Ok(Rect::new(
            Coord { x: min_x, y: min_y },
            Coord { x: max_x, y: max_y },
        ))
    }

    /// Candidate edges within `radius` meters of a geographic point.
    ///
    /// Each candidate carries the closest projection onto its polyline.
    /// Results are sorted by distance, then by edge identifier.
    pub fn edges_within(&self, point: Point<f64>, radius: f64) -> Vec<MatchCandidate> {
        self.edges_within_metric(self.projection.to_metric(point.0), radius)
    }

    /// Same as [`RoadGraph::edges_within`] for a point already in the metric plane
    pub(crate) fn edges_within_metric(&self, point: Coord<f64>, radius: f64) -> Vec<MatchCandidate> {
        let search = AABB::from_corners(
            [point.x - radius, point.y - radius],
            [point.x + radius, point.y + radius],
        );

        let mut candidates: Vec<MatchCandidate> = self
            .index
            .locate_in_envelope_intersecting(&search)
            .filter_map(|entry| {
                let edge = &self.edges[entry.slot];
                let projection = geometry::project_onto_polyline(point, &edge.metric)?;
                (projection.distance <= radius).then_some(MatchCandidate {
                    edge: edge.id,
                    projection,
                    slot: entry.slot,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.projection
                .distance
                .total_cmp(&b.projection.distance)
                .then_with(|| a.edge.cmp(&b.edge))
        });
        candidates
    }

    /// Geographic polyline of an edge (x = lon, y = lat)
    #[inline]
    pub fn geometry_of(&self, edge: EdgeRef) -> Option<&LineString<f64>> {
        self.lookup.get(&edge).map(|&slot| &self.edges[slot].geometry)
    }

    /// Length of an edge in meters
    #[inline]
    pub fn edge_length(&self, edge: EdgeRef) -> Option<f64> {
        self.lookup.get(&edge).map(|&slot| self.edges[slot].length)
    }

    /// Shortest-path length from the end of `from` to the start of `to`.
    ///
    /// Zero when both are the same edge or directly connected; `None` when
    /// either edge is unknown or `to` cannot be reached.
    pub fn graph_distance(&self, from: EdgeRef, to: EdgeRef) -> Option<f64> {
        let from_slot = *self.lookup.get(&from)?;
        let to_slot = *self.lookup.get(&to)?;
        if from_slot == to_slot {
            return Some(0.0);
        }

        let start = self.edges[from_slot].target;
        let goal = self.edges[to_slot].source;
        let distances = petgraph::algo::dijkstra(&self.graph, start, Some(goal), |e| {
            self.edges[*e.weight()].length
        });
        distances.get(&goal).copied()
    }

    /// Shortest-path lengths from `from` to every node reachable within `limit` meters
    pub(crate) fn distances_from(&self, from: NodeIndex, limit: f64) -> HashMap<NodeIndex, f64> {
        let mut distances = HashMap::new();
        let mut heap = BinaryHeap::new();
        distances.insert(from, 0.0);
        heap.push(Reverse((OrderedFloat(0.0), from)));

        while let Some(Reverse((OrderedFloat(cost), node))) = heap.pop() {
            if distances.get(&node).is_some_and(|&best| cost > best) {
                continue;
            }
            for edge in self.graph.edges(node) {
                let next = cost + self.edges[*edge.weight()].length;
                if next > limit {
                    continue;
                }
                let target = edge.target();
                if distances.get(&target).is_none_or(|&best| next < best) {
                    distances.insert(target, next);
                    heap.push(Reverse((OrderedFloat(next), target)));
                }
            }
        }

        distances
    }

    /// Undirected projection of the same edge store
    #[inline]
    pub fn to_undirected(&self) -> UndirectedView<'_> {
        UndirectedView { graph: self }
    }

    /// A graph restricted to the given network type
    ///
    /// `All` returns an identical graph; `Drive` drops every edge whose
    /// `highway` tag is a non-drivable class.
    pub fn for_network(&self, network: NetworkType) -> Result<RoadGraph> {
        let nodes = self.graph.node_weights().copied().collect();
        let edges = self
            .edges
            .iter()
            .filter(|edge| network.admits(edge.highway.as_deref()))
            .map(|edge| EdgeData {
                u: edge.id.u,
                v: edge.id.v,
                key: edge.id.key,
                way_id: edge.way_id,
                length: Some(edge.length),
                geometry: Some(edge.geometry.clone()),
                highway: edge.highway.clone(),
            })
            .collect();
        RoadGraph::new(GraphData { nodes, edges })
    }

    /// Convert a point of the metric plane back to geographic coordinates
    #[inline]
    pub fn to_geographic(&self, metric: Coord<f64>) -> Point<f64> {
        Point::from(self.projection.to_geographic(metric))
    }

    /// The local metric projection used by this graph
    #[inline]
    pub fn projection(&self) -> &LocalProjection {
        &self.projection
    }

    /// Geographic bounding box of all nodes
    #[inline]
    pub fn bounding_box(&self) -> Rect<f64> {
        self.bounding_box
    }

    /// Whether a node id exists
    #[inline]
    pub fn contains_node(&self, id: i64) -> bool {
        self.nodes.contains_key(&id)
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All edge identifiers, in insertion order
    pub fn edges(&self) -> impl Iterator<Item = EdgeRef> + '_ {
        self.edges.iter().map(|edge| edge.id)
    }

    #[inline]
    pub(crate) fn edge_at(&self, slot: usize) -> &RoadEdge {
        &self.edges[slot]
    }
}

/// Undirected view of a [`RoadGraph`], used to resolve way identifiers
///
/// An edge `(u, v, key)` is found whether it was stored as `u -> v` or `v -> u`.
#[derive(Clone, Copy, Debug)]
pub struct UndirectedView<'a> {
    graph: &'a RoadGraph,
}

impl UndirectedView<'_> {
    fn slot(&self, edge: EdgeRef) -> Option<usize> {
        self.graph
            .lookup
            .get(&edge)
            .or_else(|| self.graph.lookup.get(&edge.reversed()))
            .copied()
    }

    /// Whether the edge exists in either direction
    pub fn contains(&self, edge: EdgeRef) -> bool {
        self.slot(edge).is_some()
    }

    /// Way identifier of an edge in either direction
    ///
    /// # Errors
    /// [`MatchError::GraphLookup`] when neither direction exists.
    pub fn way_id(&self, edge: EdgeRef) -> Result<i64> {
        self.slot(edge)
            .map(|slot| self.graph.edges[slot].way_id)
            .ok_or(MatchError::GraphLookup { edge })
    }

    /// Number of distinct undirected edges
    pub fn edge_count(&self) -> usize {
        self.graph
            .lookup
            .keys()
            .filter(|edge| {
                let reverse = edge.reversed();
                // count a two-way pair once, from its smaller identifier
                !self.graph.lookup.contains_key(&reverse) || **edge <= reverse
            })
            .count()
    }
}

fn envelope_of(line: &LineString<f64>) -> AABB<[f64; 2]> {
    let mut min = [f64::INFINITY, f64::INFINITY];
    let mut max = [f64::NEG_INFINITY, f64::NEG_INFINITY];
    for c in &line.0 {
        min[0] = min[0].min(c.x);
        min[1] = min[1].min(c.y);
        max[0] = max[0].max(c.x);
        max[1] = max[1].max(c.y);
    }
    AABB::from_corners(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_graph_creation() {
        let graph = fixtures::grid_graph();
        assert_eq!(graph.node_count(), 9);
        // 12 two-way streets
        assert_eq!(graph.edge_count(), 24);
        assert_eq!(graph.to_undirected().edge_count(), 12);
        assert!(graph.contains_node(1));
        assert!(graph.contains_node(9));
        assert!(!graph.contains_node(42));
    }

    #[test]
    fn test_routed_distance_follows_supplied_length() {
        let mut data = GraphData::new();
        data.add_node(1, 47.2, -1.56).add_node(2, 47.2, -1.55);
        data.add_edge(EdgeData::new(1, 2, 7).with_length(2000.0));
        data.add_edge(EdgeData::new(2, 1, 7));
        let graph = RoadGraph::new(data).unwrap();

        let supplied = graph.edge_at(0);
        let half = supplied.metric_length / 2.0;
        assert!((supplied.routed(half) - 1000.0).abs() < 1e-9);
        let computed = graph.edge_at(1);
        assert!((computed.routed(half) - half).abs() < 1e-9);
    }

    #[test]
    fn test_empty_graph_fails() {
        assert!(matches!(
            RoadGraph::new(GraphData::new()),
            Err(MatchError::InvalidGraph(_))
        ));
    }

    #[test]
    fn test_unknown_node_fails() {
        let mut data = GraphData::new();
        data.add_node(1, 47.0, -1.5);
        data.add_edge(EdgeData::new(1, 2, 7));
        assert!(matches!(RoadGraph::new(data), Err(MatchError::UnknownNode(2))));
    }

    #[test]
    fn test_duplicate_edge_fails() {
        let mut data = GraphData::new();
        data.add_node(1, 47.0, -1.5).add_node(2, 47.001, -1.5);
        data.add_edge(EdgeData::new(1, 2, 7));
        data.add_edge(EdgeData::new(1, 2, 8));
        assert!(matches!(
            RoadGraph::new(data),
            Err(MatchError::DuplicateEdge { .. })
        ));
    }

    #[test]
    fn test_parallel_edges_with_distinct_keys() {
        let mut data = GraphData::new();
        data.add_node(1, 47.0, -1.5).add_node(2, 47.001, -1.5);
        data.add_edge(EdgeData::new(1, 2, 7));
        data.add_edge(EdgeData::new(1, 2, 8).with_key(1));
        let graph = RoadGraph::new(data).unwrap();
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_default_length_is_metric_length() {
        let graph = fixtures::straight_road();
        let length = graph.edge_length(EdgeRef::new(1, 2, 0)).unwrap();
        // 0.01 degree of longitude at 47 degrees north
        assert!((length - fixtures::straight_road_length()).abs() < 1.0);
    }

    #[test]
    fn test_edges_within_radius() {
        let graph = fixtures::straight_road();
        let near = fixtures::offset_point(0.5, 10.0);
        let candidates = graph.edges_within(near, 50.0);
        assert!(!candidates.is_empty());
        assert!(candidates.iter().all(|c| c.projection.distance <= 50.0));
        assert!((candidates[0].projection.distance - 10.0).abs() < 0.1);

        let far = fixtures::offset_point(0.5, 200.0);
        assert!(graph.edges_within(far, 50.0).is_empty());
    }

    #[test]
    fn test_edges_within_sorted() {
        let graph = fixtures::grid_graph();
        let point = fixtures::grid_point(0.3, 0.1);
        let candidates = graph.edges_within(point, 400.0);
        assert!(candidates.len() > 2);
        for pair in candidates.windows(2) {
            assert!(pair[0].projection.distance <= pair[1].projection.distance);
        }
    }

    #[test]
    fn test_geometry_of() {
        let graph = fixtures::straight_road();
        let line = graph.geometry_of(EdgeRef::new(1, 2, 0)).unwrap();
        assert_eq!(line.0.len(), 2);
        assert!(graph.geometry_of(EdgeRef::new(9, 9, 0)).is_none());
    }

    #[test]
    fn test_graph_distance() {
        let graph = fixtures::grid_graph();
        // (1 -> 2) then (2 -> 3): directly connected
        let a = EdgeRef::new(1, 2, 0);
        let b = EdgeRef::new(2, 3, 0);
        assert_eq!(graph.graph_distance(a, b), Some(0.0));
        assert_eq!(graph.graph_distance(a, a), Some(0.0));

        // (1 -> 2) to (6 -> 9): 2 -> 3 -> 6, two blocks
        let c = EdgeRef::new(6, 9, 0);
        let distance = graph.graph_distance(a, c).unwrap();
        let block = graph.edge_length(b).unwrap();
        let down = graph.edge_length(EdgeRef::new(3, 6, 0)).unwrap();
        assert!((distance - (block + down)).abs() < 1e-6);
    }

    #[test]
    fn test_graph_distance_unreachable() {
        let graph = fixtures::one_way_pair();
        // the second road cannot be reached from the first
        assert!(graph
            .graph_distance(EdgeRef::new(1, 2, 0), EdgeRef::new(3, 4, 0))
            .is_none());
    }

    #[test]
    fn test_distances_from_respects_limit() {
        let graph = fixtures::grid_graph();
        let start = graph.edge_at(0).source;
        let block = graph.edge_at(0).length;
        let near = graph.distances_from(start, block * 1.5);
        let all = graph.distances_from(start, f64::INFINITY);
        assert!(near.len() < all.len());
        assert_eq!(all.len(), graph.node_count());
        assert!(near.values().all(|&d| d <= block * 1.5));
    }

    #[test]
    fn test_undirected_way_lookup() {
        let graph = fixtures::one_way_pair();
        let undirected = graph.to_undirected();
        assert_eq!(undirected.way_id(EdgeRef::new(1, 2, 0)).unwrap(), 100);
        // stored only as 1 -> 2, still found the other way round
        assert_eq!(undirected.way_id(EdgeRef::new(2, 1, 0)).unwrap(), 100);
        assert!(matches!(
            undirected.way_id(EdgeRef::new(1, 4, 0)),
            Err(MatchError::GraphLookup { .. })
        ));
    }

    #[test]
    fn test_for_network_drive() {
        let graph = fixtures::mixed_network();
        let drive = graph.for_network(NetworkType::Drive).unwrap();
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(drive.edge_count(), 2);
        assert_eq!(drive.node_count(), graph.node_count());
        assert_eq!(drive.projection(), graph.projection());

        let all = graph.for_network(NetworkType::All).unwrap();
        assert_eq!(all.edge_count(), 4);
    }

    #[test]
    fn test_to_geographic_roundtrip() {
        let graph = fixtures::straight_road();
        let point = fixtures::offset_point(0.25, 0.0);
        let metric = graph.projection().to_metric(point.0);
        let back = graph.to_geographic(metric);
        assert!((back.x() - point.x()).abs() < 1e-9);
        assert!((back.y() - point.y()).abs() < 1e-9);
    }
}
