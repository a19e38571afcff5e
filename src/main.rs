//! CLI entry point for the SoilGrids tool.
//!
//! Provides subcommands for querying points from the SoilGrids REST API,
//! sampling random points, and aggregating, ranking and correlating saved
//! measurements.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use soilgrids::analyzers::aggregate::{AggregationRequest, MissingPolicy, aggregate_with};
use soilgrids::analyzers::correlate::correlate;
use soilgrids::analyzers::rank::rank;
use soilgrids::config::ClientConfig;
use soilgrids::infra::soilgrids::SoilGridsClient;
use soilgrids::model::{Measurement, SoilProperty, Statistic};
use soilgrids::query::{QueryOptions, SampleRequest};
use soilgrids::{
    SoilGrids,
    fetch::{BasicClient, fetch_bytes},
    output::{append_record, print_json, read_measurements, write_measurements, write_ranked},
    parser::parse_response,
    stats::BatchStats,
};
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::Path;
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "soilgrids")]
#[command(about = "A tool to query and analyze SoilGrids soil data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// What to request for every point.
#[derive(Args)]
struct Selection {
    /// Soil properties to request (default: all)
    #[arg(short, long = "property", value_name = "PROPERTY")]
    properties: Vec<String>,

    /// Depth labels to request, e.g. 0-5cm (default: all)
    #[arg(short, long = "depth", value_name = "DEPTH")]
    depths: Vec<String>,

    /// Statistics to request, e.g. Q0.5 (default: all; mean is always included)
    #[arg(long = "value", value_name = "VALUE")]
    values: Vec<String>,
}

/// Where fetched measurements go.
#[derive(Args)]
struct FetchOutput {
    /// CSV file to write measurements to
    #[arg(short, long, default_value = "soilgrids.csv")]
    output: String,

    /// Gzip compress the CSV file
    #[arg(long, default_value_t = false)]
    gzip: bool,

    /// Optional: CSV file to append a batch summary row to
    #[arg(long)]
    stats: Option<String>,

    /// Optional: JSON client config (defaults to SOILGRIDS_* environment variables)
    #[arg(long)]
    config: Option<String>,
}

/// Depth range to aggregate over.
#[derive(Args)]
struct DepthRange {
    /// Upper bound of the target depth range in cm
    #[arg(long, default_value_t = 0.0)]
    top: f64,

    /// Lower bound of the target depth range in cm
    #[arg(long, default_value_t = 30.0)]
    bottom: f64,

    /// Mark an aggregate missing if any overlapping band is missing
    #[arg(long, default_value_t = false)]
    propagate_missing: bool,
}

impl DepthRange {
    fn request(&self) -> Result<AggregationRequest> {
        let policy = if self.propagate_missing {
            MissingPolicy::Propagate
        } else {
            MissingPolicy::DropAndRenormalize
        };
        Ok(AggregationRequest::new(self.top, self.bottom)?.with_missing_policy(policy))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a saved SoilGrids response from a file or URL
    Parse {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        /// CSV file to write measurements to
        #[arg(short, long, default_value = "soilgrids.csv")]
        output: String,

        /// Gzip compress the CSV file
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Query SoilGrids for specific coordinates
    Query {
        /// Latitudes; a single value pairs with every longitude
        #[arg(long, num_args = 1.., required = true, allow_negative_numbers = true)]
        lat: Vec<f64>,

        /// Longitudes; a single value pairs with every latitude
        #[arg(long, num_args = 1.., required = true, allow_negative_numbers = true)]
        lon: Vec<f64>,

        #[command(flatten)]
        selection: Selection,

        #[command(flatten)]
        output: FetchOutput,
    },
    /// Query SoilGrids for uniformly sampled random points
    Sample {
        /// Number of points to draw
        #[arg(short, default_value_t = 5)]
        n: usize,

        #[arg(long, default_value_t = -90.0, allow_negative_numbers = true)]
        lat_min: f64,

        #[arg(long, default_value_t = 90.0, allow_negative_numbers = true)]
        lat_max: f64,

        #[arg(long, default_value_t = -180.0, allow_negative_numbers = true)]
        lon_min: f64,

        #[arg(long, default_value_t = 180.0, allow_negative_numbers = true)]
        lon_max: f64,

        /// Seed for reproducible sampling
        #[arg(long)]
        seed: Option<u64>,

        #[command(flatten)]
        selection: Selection,

        #[command(flatten)]
        output: FetchOutput,
    },
    /// Depth-weighted means over a target depth range
    Aggregate {
        /// Measurement CSV written by `query`, `sample` or `parse`
        #[arg(short, long)]
        input: String,

        #[command(flatten)]
        range: DepthRange,

        /// CSV file to write aggregated measurements to
        #[arg(short, long, default_value = "aggregated.csv")]
        output: String,

        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Rank properties per location by aggregated mean
    Rank {
        #[arg(short, long)]
        input: String,

        #[command(flatten)]
        range: DepthRange,

        /// Properties to rank (default: sand, silt, clay)
        #[arg(short, long = "property", value_name = "PROPERTY")]
        properties: Vec<String>,

        /// Keep only the N highest properties per location
        #[arg(long)]
        top_n: Option<usize>,

        #[arg(short, long, default_value = "ranked.csv")]
        output: String,

        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Fit a linear model between aggregated properties
    Correlate {
        #[arg(short, long)]
        input: String,

        #[command(flatten)]
        range: DepthRange,

        /// Response property
        #[arg(long, default_value = "ocs")]
        response: String,

        /// Predictor properties (default: sand, silt, clay)
        #[arg(long = "predictor", value_name = "PROPERTY")]
        predictors: Vec<String>,

        /// Print the summary as JSON instead of text
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/soilgrids.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("soilgrids.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Parse {
            source,
            output,
            gzip,
        } => {
            let bytes = fetcher(&source).await?;
            let measurements = parse_response(&bytes)?;
            write_measurements(&output, &measurements, gzip)?;
        }
        Commands::Query {
            lat,
            lon,
            selection,
            output,
        } => {
            let options = selection.options()?;
            let mut session = session(output.config.as_deref())?;
            let result = session.get_points(&lat, &lon, &options).await;
            save_batch("query", result, &output)?;
        }
        Commands::Sample {
            n,
            lat_min,
            lat_max,
            lon_min,
            lon_max,
            seed,
            selection,
            output,
        } => {
            let options = selection.options()?;
            let request = SampleRequest {
                n,
                lat_min,
                lat_max,
                lon_min,
                lon_max,
            };
            let mut rng = match seed {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_entropy(),
            };
            let mut session = session(output.config.as_deref())?;
            let result = session
                .get_points_sample(&request, &options, &mut rng)
                .await;
            save_batch("sample", result, &output)?;
        }
        Commands::Aggregate {
            input,
            range,
            output,
            gzip,
        } => {
            let measurements = read_measurements(&input)?;
            let aggregated = aggregate_with(&measurements, &range.request()?);

            let missing = aggregated.iter().filter(|m| m.is_missing()).count();
            if missing > 0 {
                warn!(missing, "Some aggregates have no value");
            }
            write_measurements(&output, &aggregated, gzip)?;
        }
        Commands::Rank {
            input,
            range,
            properties,
            top_n,
            output,
            gzip,
        } => {
            let properties: BTreeSet<SoilProperty> = if properties.is_empty() {
                SoilProperty::TEXTURE.into_iter().collect()
            } else {
                parse_properties(&properties)?.into_iter().collect()
            };

            let aggregated = aggregate_means(&input, &range)?;
            let mut table = rank(&aggregated, &properties);
            if let Some(n) = top_n {
                table = table.top(n);
            }

            info!(locations = table.len(), "Ranked locations");
            write_ranked(&output, &table, gzip)?;
        }
        Commands::Correlate {
            input,
            range,
            response,
            predictors,
            json,
        } => {
            let response: SoilProperty = response.parse()?;
            let predictors = if predictors.is_empty() {
                SoilProperty::TEXTURE.to_vec()
            } else {
                parse_properties(&predictors)?
            };

            let aggregated = aggregate_means(&input, &range)?;
            let summary = correlate(&aggregated, response, &predictors)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{summary}");
            }
        }
    }

    Ok(())
}

impl Selection {
    fn options(&self) -> Result<QueryOptions> {
        Ok(QueryOptions::parse(
            &self.properties,
            &self.depths,
            &self.values,
        )?)
    }
}

fn parse_properties(names: &[String]) -> Result<Vec<SoilProperty>> {
    Ok(names
        .iter()
        .map(|p| p.parse())
        .collect::<Result<Vec<SoilProperty>, _>>()?)
}

fn session(config: Option<&str>) -> Result<SoilGrids<SoilGridsClient>> {
    let config = match config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::from_env()?,
    };
    info!(
        base_url = %config.base_url,
        request_interval_secs = config.request_interval.as_secs(),
        "SoilGrids client configured"
    );
    Ok(SoilGrids::new(SoilGridsClient::new(&config)?))
}

/// Reads measurements and aggregates their means over `range`.
fn aggregate_means(input: &str, range: &DepthRange) -> Result<Vec<Measurement>> {
    let means: Vec<Measurement> = read_measurements(input)?
        .into_iter()
        .filter(|m| m.statistic == Statistic::Mean)
        .collect();
    Ok(aggregate_with(&means, &range.request()?))
}

/// Writes a fetched batch and its summary, or records the failure.
fn save_batch(source: &str, result: Result<&[Measurement]>, output: &FetchOutput) -> Result<()> {
    let measurements = match result {
        Ok(measurements) => measurements,
        Err(e) => {
            error!(error = %format!("{e:#}"), "SoilGrids fetch failed");
            if let Some(stats_path) = &output.stats {
                let stats = BatchStats::from_error("fetch_error", &format!("{e:#}"))
                    .with_source(source);
                append_record(stats_path, &stats)?;
            }
            return Err(e);
        }
    };

    let stats = BatchStats::from_measurements(measurements).with_source(source);
    if stats.missing > 0 {
        warn!(
            missing = stats.missing,
            missing_pct = stats.missing_pct(),
            "Batch contains missing values"
        );
    }
    print_json(&stats)?;
    if let Some(stats_path) = &output.stats {
        append_record(stats_path, &stats)?;
    }

    write_measurements(&output.output, measurements, output.gzip)?;
    Ok(())
}

/// Loads a response from a local file path or fetches it over HTTP.
#[tracing::instrument(fields(source = %url))]
async fn fetcher(url: &str) -> Result<Vec<u8>> {
    let bytes = if url.starts_with("http") {
        let client = BasicClient::new();
        fetch_bytes(&client, url).await?
    } else {
        std::fs::read(url)?
    };
    Ok(bytes)
}
