//! Performance benchmarks for track-match-lib
//!
//! Run with: cargo bench --package track-match-lib

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use geo::{Coord, Point};
use std::hint::black_box;
use track_match_lib::{
    EdgeData, GraphData, HexConfig, HexGrid, HmmConfig, MatchMethod, RoadGraph, TrackPoint, map_match,
};

const BASE_LAT: f64 = 47.2;
const BASE_LON: f64 = -1.56;
/// Block size of the synthetic grid in degrees (roughly 150 m)
const BLOCK: f64 = 0.0015;

/// A `size` x `size` grid of two-way streets
fn generate_grid(size: i64) -> RoadGraph {
    let node = |row: i64, col: i64| row * size + col;
    let mut data = GraphData::new();
    for row in 0..size {
        for col in 0..size {
            data.add_node(
                node(row, col),
                BASE_LAT - row as f64 * BLOCK,
                BASE_LON + col as f64 * BLOCK,
            );
        }
    }
    for row in 0..size {
        for col in 0..size {
            if col + 1 < size {
                data.add_two_way(EdgeData::new(node(row, col), node(row, col + 1), 1000 + row));
            }
            if row + 1 < size {
                data.add_two_way(EdgeData::new(node(row, col), node(row + 1, col), 2000 + col));
            }
        }
    }
    RoadGraph::new(data).expect("valid grid")
}

/// A staircase walk through the grid with a few meters of jitter
fn generate_track(num_points: usize, size: i64) -> Vec<TrackPoint> {
    let span = (size - 1) as f64 * BLOCK;
    (0..num_points)
        .map(|i| {
            let t = i as f64 / num_points as f64;
            let step = (t * 8.0).floor();
            let within = t * 8.0 - step;
            let (east, south) = if step as i64 % 2 == 0 {
                ((step / 2.0 + within) / 4.0, step / 2.0 / 4.0)
            } else {
                (((step + 1.0) / 2.0) / 4.0, ((step - 1.0) / 2.0 + within) / 4.0)
            };
            let jitter = (i as f64 * 1.7).sin() * 0.00004;
            TrackPoint::new(
                i,
                BASE_LAT - south * span + jitter,
                BASE_LON + east * span - jitter,
            )
        })
        .collect()
}

fn bench_matching(c: &mut Criterion) {
    let graph = generate_grid(20);
    let hmm = HmmConfig::default();
    let mut group = c.benchmark_group("map_match");

    for num_points in [100, 1000] {
        let track = generate_track(num_points, 20);
        group.throughput(Throughput::Elements(num_points as u64));
        for method in [MatchMethod::Nearest, MatchMethod::Hmm] {
            group.bench_with_input(
                BenchmarkId::new(method.to_string(), num_points),
                &track,
                |b, track| b.iter(|| map_match(black_box(&graph), black_box(track), method, 50.0, &hmm)),
            );
        }
    }

    group.finish();
}

fn bench_graph_build(c: &mut Criterion) {
    c.bench_function("graph_build_40x40", |b| b.iter(|| generate_grid(black_box(40))));
}

fn bench_hex(c: &mut Criterion) {
    let grid = HexGrid::new(&HexConfig::default()).expect("valid hex config");
    let points: Vec<Point<f64>> = (0..10_000)
        .map(|i| {
            let t = i as f64 / 10_000.0;
            Point::new(BASE_LON + t * 0.05, BASE_LAT + (t * 40.0).sin() * 0.01)
        })
        .collect();

    let mut group = c.benchmark_group("hex");
    group.throughput(Throughput::Elements(points.len() as u64));
    group.bench_function("hex_of_geographic", |b| {
        b.iter(|| {
            points
                .iter()
                .filter_map(|p| grid.hex_of(black_box(*p)).ok())
                .count()
        })
    });
    group.bench_function("cell_of_metric", |b| {
        b.iter(|| {
            points
                .iter()
                .map(|p| grid.cell_of_metric(black_box(Coord { x: p.x() * 1e5, y: p.y() * 1e5 })))
                .count()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_matching, bench_graph_build, bench_hex);
criterion_main!(benches);
