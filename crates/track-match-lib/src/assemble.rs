//! Joins the per-point outputs of every stage into durable records

use crate::accuracy::{AccuracyStats, ProjectionAccuracy};
use crate::graph::{EdgeRef, RoadGraph};
use crate::hex::HexCell;
use crate::matching::MatchResult;
use crate::report::RejectedRecord;
use crate::TrackPoint;
use std::collections::HashMap;

/// One corrected track point
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutputRecord {
    pub track_id: String,
    /// Index of the point in the original track
    pub point_index: usize,
    /// Corrected latitude (the raw one when unmatched)
    pub latitude: f64,
    /// Corrected longitude (the raw one when unmatched)
    pub longitude: f64,
    pub edge: Option<EdgeRef>,
    /// Way identifier of `edge`
    pub way_id: Option<i64>,
    pub hex: HexCell,
    pub projection_length: Option<f64>,
    pub projection_accuracy: ProjectionAccuracy,
}

/// Assembled records of a track and the records that could not be built
#[derive(Debug, Default)]
pub struct Assembly {
    pub records: Vec<OutputRecord>,
    pub rejected: Vec<RejectedRecord>,
}

/// Inner join of points, match results, accuracy statistics and hex cells on
/// the point index.
///
/// Points missing from any input are left out. A matched edge whose way
/// cannot be resolved rejects that record only. Records follow the order of
/// `points`.
pub fn assemble(
    track_id: &str,
    points: &[TrackPoint],
    results: &[MatchResult],
    accuracy: &[AccuracyStats],
    hex_cells: &[(usize, HexCell)],
    graph: &RoadGraph,
) -> Assembly {
    #[cfg(feature = "profiling")]
    profiling::scope!("assemble::assemble");

    let results: HashMap<usize, &MatchResult> = results.iter().map(|r| (r.index, r)).collect();
    let accuracy: HashMap<usize, &AccuracyStats> = accuracy.iter().map(|a| (a.index, a)).collect();
    let hex_cells: HashMap<usize, HexCell> = hex_cells.iter().copied().collect();
    let undirected = graph.to_undirected();

    let mut assembly = Assembly::default();
    for point in points {
        let index = point.index;
        let (Some(result), Some(stats), Some(&hex)) =
            (results.get(&index), accuracy.get(&index), hex_cells.get(&index))
        else {
            continue;
        };

        let way_id = match result.edge {
            Some(edge) => match undirected.way_id(edge) {
                Ok(way) => Some(way),
                Err(error) => {
                    tracing::warn!("Rejecting record {} of track {}: {}", index, track_id, error);
                    assembly.rejected.push(RejectedRecord {
                        point_index: index,
                        error,
                    });
                    continue;
                }
            },
            None => None,
        };

        assembly.records.push(OutputRecord {
            track_id: track_id.to_string(),
            point_index: index,
            latitude: result.position.y(),
            longitude: result.position.x(),
            edge: result.edge,
            way_id,
            hex,
            projection_length: stats.projection_length,
            projection_accuracy: stats.projection_accuracy,
        });
    }

    assembly
}
