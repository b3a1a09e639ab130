//! Synthetic road networks shared by the unit tests

use crate::graph::{EdgeData, GraphData, RoadGraph};
use crate::utils::EARTH_RADIUS_M;
use crate::{TrackPoint, TrackSample};
use geo::Point;

pub const BASE_LAT: f64 = 47.2;
pub const BASE_LON: f64 = -1.56;

/// Longitude span of the straight road
const ROAD_SPAN: f64 = 0.01;

/// Meters north of the straight road where the parallel road runs
pub const PARALLEL_GAP: f64 = 40.0;

fn meters_to_lat(meters: f64) -> f64 {
    (meters / EARTH_RADIUS_M).to_degrees()
}

/// Length of the straight road in meters
pub fn straight_road_length() -> f64 {
    ROAD_SPAN.to_radians() * EARTH_RADIUS_M * BASE_LAT.to_radians().cos()
}

/// A point `fraction` of the way along the straight road, `offset` meters north of it
pub fn offset_point(fraction: f64, offset: f64) -> Point<f64> {
    Point::new(
        BASE_LON + ROAD_SPAN * fraction,
        BASE_LAT + meters_to_lat(offset),
    )
}

/// Track points evenly spread along the straight road, all `offset` meters north
pub fn points_along(count: usize, offset: f64) -> Vec<TrackPoint> {
    (0..count)
        .map(|i| {
            let fraction = 0.1 + 0.8 * i as f64 / (count.max(2) - 1) as f64;
            let p = offset_point(fraction, offset);
            TrackPoint::new(i, p.y(), p.x())
        })
        .collect()
}

/// Same as [`points_along`], as raw tagged samples with an accuracy
pub fn samples_along(count: usize, offset: f64, accuracy: f64) -> Vec<TrackSample> {
    points_along(count, offset)
        .into_iter()
        .map(|p| TrackSample::new(p.index, p.latitude, p.longitude, "Feature").with_accuracy(accuracy))
        .collect()
}

/// One two-way street running east from node 1 to node 2 (way 100)
pub fn straight_road() -> RoadGraph {
    let mut data = GraphData::new();
    data.add_node(1, BASE_LAT, BASE_LON)
        .add_node(2, BASE_LAT, BASE_LON + ROAD_SPAN);
    data.add_two_way(EdgeData::new(1, 2, 100).with_highway("residential"));
    RoadGraph::new(data).unwrap()
}

/// Two two-way streets [`PARALLEL_GAP`] meters apart, linked only at their ends
///
/// South road 1-2 (way 100), north road 3-4 (way 200), links 1-3 and 2-4.
pub fn parallel_roads() -> RoadGraph {
    let north = BASE_LAT + meters_to_lat(PARALLEL_GAP);
    let mut data = GraphData::new();
    data.add_node(1, BASE_LAT, BASE_LON)
        .add_node(2, BASE_LAT, BASE_LON + ROAD_SPAN)
        .add_node(3, north, BASE_LON)
        .add_node(4, north, BASE_LON + ROAD_SPAN);
    data.add_two_way(EdgeData::new(1, 2, 100))
        .add_two_way(EdgeData::new(3, 4, 200))
        .add_two_way(EdgeData::new(1, 3, 300))
        .add_two_way(EdgeData::new(2, 4, 400));
    RoadGraph::new(data).unwrap()
}

/// 3x3 grid of two-way streets; node `row * 3 + col + 1`, rows going south
///
/// Horizontal streets carry way `100 + row`, vertical ones `200 + col`.
pub fn grid_graph() -> RoadGraph {
    let mut data = GraphData::new();
    for row in 0..3 {
        for col in 0..3 {
            let p = grid_point(col as f64, row as f64);
            data.add_node(grid_node(row, col), p.y(), p.x());
        }
    }
    for row in 0..3 {
        for col in 0..2 {
            data.add_two_way(EdgeData::new(
                grid_node(row, col),
                grid_node(row, col + 1),
                100 + row,
            ));
        }
    }
    for col in 0..3 {
        for row in 0..2 {
            data.add_two_way(EdgeData::new(
                grid_node(row, col),
                grid_node(row + 1, col),
                200 + col,
            ));
        }
    }
    RoadGraph::new(data).unwrap()
}

fn grid_node(row: i64, col: i64) -> i64 {
    row * 3 + col + 1
}

/// Geographic point at fractional grid coordinates (column, row)
pub fn grid_point(col: f64, row: f64) -> Point<f64> {
    Point::new(BASE_LON + col * 0.003, BASE_LAT - row * 0.002)
}

/// Two disconnected one-way streets: 1 -> 2 (way 100) and 3 -> 4 (way 200)
pub fn one_way_pair() -> RoadGraph {
    let mut data = GraphData::new();
    data.add_node(1, BASE_LAT, BASE_LON)
        .add_node(2, BASE_LAT, BASE_LON + ROAD_SPAN)
        .add_node(3, BASE_LAT + 0.01, BASE_LON)
        .add_node(4, BASE_LAT + 0.01, BASE_LON + ROAD_SPAN);
    data.add_edge(EdgeData::new(1, 2, 100))
        .add_edge(EdgeData::new(3, 4, 200));
    RoadGraph::new(data).unwrap()
}

/// A residential street 1-2 followed by a footway 2-3, both two-way
pub fn mixed_network() -> RoadGraph {
    let mut data = GraphData::new();
    data.add_node(1, BASE_LAT, BASE_LON)
        .add_node(2, BASE_LAT, BASE_LON + 0.005)
        .add_node(3, BASE_LAT, BASE_LON + 0.01);
    data.add_two_way(EdgeData::new(1, 2, 100).with_highway("residential"))
        .add_two_way(EdgeData::new(2, 3, 101).with_highway("footway"));
    RoadGraph::new(data).unwrap()
}
