//! Plain input records a [`RoadGraph`](super::RoadGraph) is built from

use geo::LineString;
use std::fmt;

/// Identity of a directed edge: endpoints plus a key for parallel edges
///
/// The derived ordering (by `u`, then `v`, then `key`) is what "lowest edge
/// identifier" means wherever ties are broken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeRef {
    pub u: i64,
    pub v: i64,
    pub key: u32,
}

impl EdgeRef {
    pub fn new(u: i64, v: i64, key: u32) -> Self {
        Self { u, v, key }
    }

    /// Same edge travelled the other way
    #[inline]
    pub fn reversed(&self) -> Self {
        Self {
            u: self.v,
            v: self.u,
            key: self.key,
        }
    }
}

impl fmt::Display for EdgeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.u, self.v, self.key)
    }
}

/// A graph node in geographic coordinates
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeData {
    pub id: i64,
    pub latitude: f64,
    pub longitude: f64,
}

/// A directed road edge as delivered by the graph source
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeData {
    pub u: i64,
    pub v: i64,
    /// Distinguishes parallel edges between the same endpoints
    #[cfg_attr(feature = "serde", serde(default))]
    pub key: u32,
    /// Identifier of the real-world way ("osmid")
    pub way_id: i64,
    /// Length in meters; computed from the geometry when absent
    #[cfg_attr(feature = "serde", serde(default))]
    pub length: Option<f64>,
    /// Polyline from `u` to `v` (x = lon, y = lat); straight when absent
    #[cfg_attr(feature = "serde", serde(default))]
    pub geometry: Option<LineString<f64>>,
    /// Road class tag, used to derive the drivable network
    #[cfg_attr(feature = "serde", serde(default))]
    pub highway: Option<String>,
}

impl EdgeData {
    pub fn new(u: i64, v: i64, way_id: i64) -> Self {
        Self {
            u,
            v,
            key: 0,
            way_id,
            length: None,
            geometry: None,
            highway: None,
        }
    }

    pub fn with_key(mut self, key: u32) -> Self {
        self.key = key;
        self
    }

    pub fn with_length(mut self, length: f64) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_geometry(mut self, geometry: LineString<f64>) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_highway(mut self, highway: impl Into<String>) -> Self {
        self.highway = Some(highway.into());
        self
    }

    #[inline]
    pub fn id(&self) -> EdgeRef {
        EdgeRef::new(self.u, self.v, self.key)
    }

    /// The opposite direction of this edge, with the geometry reversed
    pub fn reversed(&self) -> Self {
        let geometry = self.geometry.as_ref().map(|line| {
            let mut coords = line.0.clone();
            coords.reverse();
            LineString::new(coords)
        });
        Self {
            u: self.v,
            v: self.u,
            geometry,
            ..self.clone()
        }
    }
}

/// Nodes and edges of a road network, before indexing
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GraphData {
    pub nodes: Vec<NodeData>,
    pub edges: Vec<EdgeData>,
}

impl GraphData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: i64, latitude: f64, longitude: f64) -> &mut Self {
        self.nodes.push(NodeData {
            id,
            latitude,
            longitude,
        });
        self
    }

    pub fn add_edge(&mut self, edge: EdgeData) -> &mut Self {
        self.edges.push(edge);
        self
    }

    /// Add an edge and its reverse, as a two-way street appears in a routable graph
    pub fn add_two_way(&mut self, edge: EdgeData) -> &mut Self {
        let reverse = edge.reversed();
        self.edges.push(edge);
        self.edges.push(reverse);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_ref_ordering() {
        let a = EdgeRef::new(1, 5, 0);
        let b = EdgeRef::new(1, 5, 1);
        let c = EdgeRef::new(2, 0, 0);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(a.reversed(), EdgeRef::new(5, 1, 0));
    }

    #[test]
    fn test_edge_ref_display() {
        assert_eq!(EdgeRef::new(3, 4, 0).to_string(), "(3, 4, 0)");
    }

    #[test]
    fn test_two_way_reverses_geometry() {
        let mut data = GraphData::new();
        data.add_two_way(
            EdgeData::new(1, 2, 10)
                .with_geometry(LineString::from(vec![(0.0, 0.0), (0.5, 0.1), (1.0, 0.0)])),
        );
        assert_eq!(data.edges.len(), 2);
        let reverse = &data.edges[1];
        assert_eq!(reverse.id(), EdgeRef::new(2, 1, 0));
        assert_eq!(reverse.way_id, 10);
        let coords = &reverse.geometry.as_ref().unwrap().0;
        assert_eq!(coords[0].x, 1.0);
        assert_eq!(coords[2].x, 0.0);
    }
}
