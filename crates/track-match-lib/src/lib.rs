//! Track Match Library - Map Matching of Noisy GPS Tracks
//!
//! This library snaps sparsely sampled GPS tracks onto a routable road graph.
//! Every surviving point gets a corrected position on its road, the matched
//! edge and way, projection accuracy statistics and a hexagonal grid cell for
//! downstream aggregation.
//!
//! # Architecture
//!
//! - **[`prepare`]**: interpolates gaps and drops non-positional rows
//! - **[`RoadGraph`]**: immutable road network with an R-tree edge index
//! - **[`NearestEdgeMatcher`]** / **[`HmmMatcher`]**: the two matching strategies
//! - **[`score`]**: per-point projection accuracy
//! - **[`HexGrid`]**: axial hex-grid indexing in a metric CRS
//! - **[`assemble`]**: joins everything into [`OutputRecord`]s
//! - **[`TrackCorrector`]**: runs the whole pipeline, one track or many in parallel
//!
//! # Performance Characteristics
//!
//! - **Candidate search**: O(log E + K) per point, E = edges, K = candidates
//! - **Viterbi decoding**: O(N × K²) per track plus bounded Dijkstra searches
//! - **Tracks**: independent, corrected in parallel against one shared graph

mod accuracy;
mod assemble;
pub mod geometry;
mod graph;
pub mod hex;
pub mod ingest;
mod matching;
mod pipeline;
mod preprocess;
mod report;
pub mod track;
pub mod utils;

#[cfg(test)]
mod fixtures;

// Public API exports
pub use accuracy::{AccuracyStats, ProjectionAccuracy, score};
pub use assemble::{Assembly, OutputRecord, assemble};
pub use graph::{
    EdgeData, EdgeRef, GraphData, GraphProvider, MatchCandidate, NetworkType, NodeData, RoadGraph,
    StaticGraph, UndirectedView,
};
pub use hex::{Epsg, HexCell, HexConfig, HexGrid, Reproject, WebMercator, hex_of};
pub use matching::{
    HmmConfig, HmmMatcher, MatchMethod, MatchResult, MatchedTrack, Matcher, NearestEdgeMatcher,
    map_match, match_hmm, match_nearest,
};
pub use pipeline::{Config, CorrectedTrack, TrackCorrector, correct_track};
pub use preprocess::{PreprocessConfig, Prepared, prepare};
pub use report::{Column, InterpolationFailure, RejectedRecord, TrackReport, TrackWarning};
pub use track::{TrackPoint, TrackSample};

/// Error types for map matching
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("Track has no usable point")]
    EmptyTrack,

    #[error("No road graph available for the track extent")]
    MissingGraph,

    #[error("Edge {edge} not found in the road graph")]
    GraphLookup { edge: EdgeRef },

    #[error("Invalid road graph: {0}")]
    InvalidGraph(String),

    #[error("Edge references unknown node {0}")]
    UnknownNode(i64),

    #[error("Edge {edge} declared twice")]
    DuplicateEdge { edge: EdgeRef },

    #[error("Unsupported reprojection from {from} to {to}")]
    UnsupportedCrs { from: Epsg, to: Epsg },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("GPX parsing error: {0}")]
    GpxParse(#[from] gpx::errors::GpxError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid track: {0}")]
    InvalidTrack(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MatchError>;
