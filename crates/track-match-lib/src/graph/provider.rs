//! Sources of road graphs for a track extent

use super::RoadGraph;
use crate::Result;
use geo::{Coord, Intersects, Rect};
use std::sync::Arc;

/// Road classes excluded from the drivable network
const NON_DRIVABLE: &[&str] = &[
    "bridleway",
    "corridor",
    "cycleway",
    "footway",
    "path",
    "pedestrian",
    "steps",
    "track",
];

/// Slack around the graph bounds when testing coverage, in degrees (about 500 m)
const COVERAGE_MARGIN: f64 = 0.005;

/// Which roads a graph should contain
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum NetworkType {
    /// Every public road and path
    #[default]
    All,
    /// Roads open to motor vehicles
    Drive,
}

impl NetworkType {
    /// Whether an edge with the given `highway` tag belongs to this network
    pub fn admits(&self, highway: Option<&str>) -> bool {
        match self {
            NetworkType::All => true,
            NetworkType::Drive => highway.is_none_or(|tag| !NON_DRIVABLE.contains(&tag)),
        }
    }
}

/// Supplies the road graph covering a track
pub trait GraphProvider: Send + Sync {
    /// Graph covering `extent` (geographic, x = lon, y = lat), or `None` when
    /// no graph is available for it
    fn graph_for(&self, extent: Rect<f64>, network: NetworkType) -> Option<Arc<RoadGraph>>;
}

/// A provider over one preloaded graph
#[derive(Clone, Debug)]
pub struct StaticGraph {
    all: Arc<RoadGraph>,
    drive: Arc<RoadGraph>,
}

impl StaticGraph {
    /// Wrap a graph; its drivable projection is derived once, up front
    pub fn new(graph: RoadGraph) -> Result<Self> {
        let drive = Arc::new(graph.for_network(NetworkType::Drive)?);
        Ok(Self {
            all: Arc::new(graph),
            drive,
        })
    }
}

impl GraphProvider for StaticGraph {
    fn graph_for(&self, extent: Rect<f64>, network: NetworkType) -> Option<Arc<RoadGraph>> {
        let bounds = self.all.bounding_box();
        let covered = Rect::new(
            Coord {
                x: bounds.min().x - COVERAGE_MARGIN,
                y: bounds.min().y - COVERAGE_MARGIN,
            },
            Coord {
                x: bounds.max().x + COVERAGE_MARGIN,
                y: bounds.max().y + COVERAGE_MARGIN,
            },
        );
        if !covered.intersects(&extent) {
            tracing::warn!("Track extent {:?} lies outside the loaded graph", extent);
            return None;
        }
        Some(match network {
            NetworkType::All => Arc::clone(&self.all),
            NetworkType::Drive => Arc::clone(&self.drive),
        })
    }
}
