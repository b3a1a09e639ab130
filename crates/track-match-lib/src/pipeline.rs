//! End-to-end track correction
//!
//! Runs every stage on one track: preprocessing, matching, accuracy scoring,
//! hex indexing and record assembly. Tracks are independent, so batches are
//! corrected in parallel against one shared, read-only graph.

use crate::accuracy;
use crate::assemble::{OutputRecord, assemble};
use crate::graph::{GraphProvider, NetworkType, RoadGraph};
use crate::hex::{HexCell, HexConfig, HexGrid, Reproject, WebMercator};
use crate::matching::{HmmConfig, MatchMethod, map_match};
use crate::preprocess::{PreprocessConfig, Prepared, prepare};
use crate::report::{RejectedRecord, TrackReport, TrackWarning};
use crate::track::{self, TrackSample};
use crate::{MatchError, Result};
use geo::Coord;
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration of the whole correction pipeline
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Radius around each point searched for candidate edges, in meters.
    /// Default: 50.0
    pub search_radius: f64,
    /// Matching strategy.
    /// Default: Hmm
    pub method: MatchMethod,
    /// Road network requested from a graph provider.
    /// Default: All
    pub network: NetworkType,
    pub preprocess: PreprocessConfig,
    pub hmm: HmmConfig,
    pub hex: HexConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search_radius: 50.0,
            method: MatchMethod::default(),
            network: NetworkType::default(),
            preprocess: PreprocessConfig::default(),
            hmm: HmmConfig::default(),
            hex: HexConfig::default(),
        }
    }
}

impl Config {
    pub fn with_search_radius(mut self, search_radius: f64) -> Self {
        self.search_radius = search_radius;
        self
    }

    pub fn with_method(mut self, method: MatchMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_network(mut self, network: NetworkType) -> Self {
        self.network = network;
        self
    }

    pub fn with_preprocess(mut self, preprocess: PreprocessConfig) -> Self {
        self.preprocess = preprocess;
        self
    }

    pub fn with_hmm(mut self, hmm: HmmConfig) -> Self {
        self.hmm = hmm;
        self
    }

    pub fn with_hex(mut self, hex: HexConfig) -> Self {
        self.hex = hex;
        self
    }

    /// Check every numeric parameter
    ///
    /// # Errors
    /// [`MatchError::InvalidConfig`] naming the first offending parameter.
    pub fn validate(&self) -> Result<()> {
        positive("search_radius", self.search_radius)?;
        positive("hmm.sigma", self.hmm.sigma)?;
        positive("hmm.beta", self.hmm.beta)?;
        positive("hmm.max_route_factor", self.hmm.max_route_factor)?;
        positive("hex.side_length", self.hex.side_length)?;
        if !(self.hmm.backward_tolerance.is_finite() && self.hmm.backward_tolerance >= 0.0) {
            return Err(MatchError::InvalidConfig(format!(
                "hmm.backward_tolerance must be non-negative, got {}",
                self.hmm.backward_tolerance
            )));
        }
        if self.hmm.max_candidates == 0 {
            return Err(MatchError::InvalidConfig(
                "hmm.max_candidates must be at least 1".to_string(),
            ));
        }
        if self.hmm.max_segment_len == Some(0) {
            return Err(MatchError::InvalidConfig(
                "hmm.max_segment_len must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(MatchError::InvalidConfig(format!(
            "{name} must be a positive number, got {value}"
        )))
    }
}

/// Records and diagnostics of one corrected track
#[derive(Debug)]
pub struct CorrectedTrack {
    pub track_id: String,
    pub records: Vec<OutputRecord>,
    pub report: TrackReport,
}

/// Corrects tracks with a fixed configuration
#[derive(Debug, Clone)]
pub struct TrackCorrector<R = WebMercator> {
    config: Config,
    grid: HexGrid<R>,
}

impl TrackCorrector<WebMercator> {
    /// Corrector with the bundled Web Mercator reprojection
    pub fn new(config: Config) -> Result<Self> {
        Self::with_reprojection(config, WebMercator)
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<R: Reproject> TrackCorrector<R> {
    /// Corrector with a custom reprojection
    ///
    /// # Errors
    /// [`MatchError::InvalidConfig`] for an invalid configuration and
    /// [`MatchError::UnsupportedCrs`] when `reproject` cannot handle the
    /// configured hex CRS pair.
    pub fn with_reprojection(config: Config, reproject: R) -> Result<Self> {
        config.validate()?;
        reproject.reproject(Coord { x: 0.0, y: 0.0 }, config.hex.source, config.hex.metric)?;
        let grid = HexGrid::with_reprojection(&config.hex, reproject)?;
        Ok(Self { config, grid })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Correct one track against a known graph
    ///
    /// # Errors
    /// [`MatchError::EmptyTrack`] when no point survives preprocessing.
    pub fn correct(&self, graph: &RoadGraph, samples: &[TrackSample], track_id: &str) -> Result<CorrectedTrack> {
        let prepared = self.prepare(samples, track_id)?;
        self.run(graph, prepared, track_id)
    }

    /// Correct one track against the graph a provider returns for its extent
    ///
    /// # Errors
    /// [`MatchError::EmptyTrack`] when no point survives preprocessing and
    /// [`MatchError::MissingGraph`] when the provider has no graph for it.
    pub fn correct_with_provider(
        &self,
        provider: &dyn GraphProvider,
        samples: &[TrackSample],
        track_id: &str,
    ) -> Result<CorrectedTrack> {
        let prepared = self.prepare(samples, track_id)?;
        let extent = track::extent(&prepared.points).ok_or(MatchError::EmptyTrack)?;
        let graph = provider
            .graph_for(extent, self.config.network)
            .ok_or(MatchError::MissingGraph)?;
        self.run(&graph, prepared, track_id)
    }

    /// Correct many tracks in parallel; one result per input track, in order
    pub fn correct_many(
        &self,
        provider: &dyn GraphProvider,
        tracks: Vec<(String, Vec<TrackSample>)>,
    ) -> Vec<Result<CorrectedTrack>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("pipeline::correct_many");

        tracks
            .into_par_iter()
            .map(|(track_id, samples)| {
                let corrected = self.correct_with_provider(provider, &samples, &track_id);
                if let Err(e) = &corrected {
                    tracing::warn!("Failed to correct track {}: {}", track_id, e);
                }
                corrected
            })
            .collect()
    }

    fn prepare(&self, samples: &[TrackSample], track_id: &str) -> Result<Prepared> {
        if samples.is_empty() {
            return Err(MatchError::EmptyTrack);
        }
        let prepared = prepare(samples, &self.config.preprocess);
        if prepared.points.is_empty() {
            tracing::warn!("Track {} has no positional point left after cleaning", track_id);
            return Err(MatchError::EmptyTrack);
        }
        Ok(prepared)
    }

    fn run(&self, graph: &RoadGraph, prepared: Prepared, track_id: &str) -> Result<CorrectedTrack> {
        let Prepared { points, warnings } = prepared;
        let mut report = TrackReport {
            warnings,
            rejected: Vec::new(),
        };

        let matched = map_match(
            graph,
            &points,
            self.config.method,
            self.config.search_radius,
            &self.config.hmm,
        );

        let unmatched: Vec<usize> = matched
            .results
            .iter()
            .filter(|r| !r.is_matched())
            .map(|r| r.index)
            .collect();
        if !unmatched.is_empty() {
            tracing::warn!(
                "{} points of track {} have no road within {} m",
                unmatched.len(),
                track_id,
                self.config.search_radius
            );
            report.warnings.push(TrackWarning::Unmatched { indices: unmatched });
        }

        let missing_accuracy = points.iter().filter(|p| p.accuracy.is_none()).count();
        if missing_accuracy > 0 {
            tracing::debug!(
                "{} points of track {} report no accuracy",
                missing_accuracy,
                track_id
            );
            report.warnings.push(TrackWarning::MissingAccuracy {
                count: missing_accuracy,
            });
        }

        let stats = accuracy::score(&points, &matched.results);
        let mut hex_cells: Vec<(usize, HexCell)> = Vec::with_capacity(matched.results.len());
        for result in &matched.results {
            match self.grid.hex_of(result.position) {
                Ok(cell) => hex_cells.push((result.index, cell)),
                Err(error) => {
                    tracing::warn!(
                        "No hex cell for point {} of track {}: {}",
                        result.index,
                        track_id,
                        error
                    );
                    report.rejected.push(RejectedRecord {
                        point_index: result.index,
                        error,
                    });
                }
            }
        }

        let assembly = assemble(track_id, &points, &matched.results, &stats, &hex_cells, graph);
        report.rejected.extend(assembly.rejected);

        tracing::info!(
            "Corrected track {}: {} records, {} of {} points matched over {:.0} m",
            track_id,
            assembly.records.len(),
            matched.matched_count(),
            points.len(),
            track::path_length(&points)
        );

        Ok(CorrectedTrack {
            track_id: track_id.to_string(),
            records: assembly.records,
            report,
        })
    }
}

/// Correct one track with the default configuration and the given method
pub fn correct_track(
    provider: &dyn GraphProvider,
    samples: &[TrackSample],
    track_id: &str,
    method: MatchMethod,
) -> Result<CorrectedTrack> {
    TrackCorrector::new(Config::default().with_method(method))?.correct_with_provider(provider, samples, track_id)
}
