use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use track_match_lib::{
    Config, GraphData, MatchMethod, NetworkType, RoadGraph, StaticGraph, TrackCorrector, TrackSample,
    ingest,
};

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Track Match - Snap noisy GPS tracks onto a road graph
pub struct Settings {
    /// Road graph as JSON ({"nodes": [...], "edges": [...]})
    #[clap(short, long, value_name = "FILE")]
    pub graph: PathBuf,

    /// Tracks to correct (.gpx or GeoJSON)
    #[clap(short, long, value_name = "FILE", required = true)]
    pub track: Vec<PathBuf>,

    /// JSON pipeline configuration; the flags below override it
    #[clap(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Matching strategy
    #[clap(short, long, value_enum)]
    pub method: Option<MethodArg>,

    /// Road network used for matching
    #[clap(short, long, value_enum)]
    pub network: Option<NetworkArg>,

    /// Candidate search radius in meters
    #[clap(long)]
    pub search_radius: Option<f64>,

    /// Hex cell side length in meters
    #[clap(long)]
    pub side_length: Option<f64>,

    /// Output file for JSON-lines records (stdout if omitted)
    #[clap(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum MethodArg {
    Nearest,
    Hmm,
}

impl From<MethodArg> for MatchMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Nearest => MatchMethod::Nearest,
            MethodArg::Hmm => MatchMethod::Hmm,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum NetworkArg {
    All,
    Drive,
}

impl From<NetworkArg> for NetworkType {
    fn from(arg: NetworkArg) -> Self {
        match arg {
            NetworkArg::All => NetworkType::All,
            NetworkArg::Drive => NetworkType::Drive,
        }
    }
}

impl Settings {
    /// Configuration file (or defaults) with the command-line overrides applied
    fn pipeline_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("opening config {}", path.display()))?;
                serde_json::from_reader(BufReader::new(file))
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Config::default(),
        };
        if let Some(method) = self.method {
            config.method = method.into();
        }
        if let Some(network) = self.network {
            config.network = network.into();
        }
        if let Some(radius) = self.search_radius {
            config.search_radius = radius;
        }
        if let Some(side_length) = self.side_length {
            config.hex.side_length = side_length;
        }
        Ok(config)
    }
}

fn setup_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_graph(path: &Path) -> anyhow::Result<RoadGraph> {
    let file = File::open(path).with_context(|| format!("opening graph {}", path.display()))?;
    let data: GraphData = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing graph {}", path.display()))?;
    RoadGraph::new(data).with_context(|| format!("building graph from {}", path.display()))
}

fn load_track(path: &Path) -> anyhow::Result<(String, Vec<TrackSample>)> {
    let file = File::open(path).with_context(|| format!("opening track {}", path.display()))?;
    let reader = BufReader::new(file);
    let is_gpx = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gpx"));
    let samples = if is_gpx {
        ingest::read_gpx(reader)
    } else {
        ingest::read_geojson(reader)
    }
    .with_context(|| format!("reading track {}", path.display()))?;

    let track_id = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok((track_id, samples))
}

fn main() -> anyhow::Result<()> {
    setup_logging();
    let settings = Settings::parse();

    let config = settings.pipeline_config()?;
    let corrector = TrackCorrector::new(config)?;
    let graph = load_graph(&settings.graph)?;
    tracing::info!(
        "Loaded graph with {} nodes and {} edges",
        graph.node_count(),
        graph.edge_count()
    );
    let provider = StaticGraph::new(graph)?;

    let tracks = settings
        .track
        .iter()
        .map(|path| load_track(path))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let track_count = tracks.len();

    let mut out: Box<dyn Write> = match &settings.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };

    let mut failed = 0;
    for result in corrector.correct_many(&provider, tracks) {
        let corrected = match result {
            Ok(corrected) => corrected,
            Err(_) => {
                failed += 1;
                continue;
            }
        };
        for warning in &corrected.report.warnings {
            tracing::debug!("Track {}: {:?}", corrected.track_id, warning);
        }
        for rejected in &corrected.report.rejected {
            tracing::warn!(
                "Track {}: point {} rejected: {}",
                corrected.track_id,
                rejected.point_index,
                rejected.error
            );
        }
        for record in &corrected.records {
            serde_json::to_writer(&mut out, record)?;
            out.write_all(b"\n")?;
        }
    }
    out.flush()?;

    tracing::info!(
        "Corrected {} of {} tracks",
        track_count - failed,
        track_count
    );
    if failed == track_count {
        anyhow::bail!("no track could be corrected");
    }
    Ok(())
}
