//! `era5`: cached, range-sliced subsets of the ARCO ERA5 store.
//!
//! Every command works against the same local state directory, so a
//! download repeated from the shell is served from the cache.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use era5_common::{Dataset, Era5Source, TimeInput};
use era5_source::{open_remote, HttpZarrStorage, SourceConfig, ZarrEra5Source};
use era5_subset::{Era5Client, Era5Config, LevelSelection, LonConvention, QueryRequest};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "era5")]
#[command(about = "Cached subsets of the ARCO ERA5 reanalysis")]
struct Cli {
    /// Root directory for the cache and domain snapshot
    #[arg(long, global = true, env = "ERA5_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Cache directory (default: <data-dir>/cache/era5)
    #[arg(long, global = true, env = "ERA5_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Base URL of the remote Zarr store
    #[arg(long, global = true, env = "ERA5_STORE_URL")]
    store_url: Option<String>,

    /// Log level
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the variables of the remote dataset
    Variables,

    /// Fetch a subset, from the cache when possible
    Download(DownloadArgs),

    /// Write one variable/level/time of a saved subset as a GeoTIFF
    Geotiff(GeotiffArgs),

    /// Remove expired cache entries
    Evict,
}

#[derive(Args, Debug)]
struct DownloadArgs {
    /// Variable to fetch (repeatable)
    #[arg(long = "var", required = true)]
    variables: Vec<String>,

    /// First time step, RFC 3339
    #[arg(long)]
    from: String,

    /// Last time step, RFC 3339
    #[arg(long)]
    to: String,

    /// Hours between selected time steps
    #[arg(long, default_value = "1")]
    interval: i64,

    /// Single pressure level
    #[arg(long, conflicts_with = "levels")]
    level: Option<f64>,

    /// Pressure level range, as A,B
    #[arg(long, value_parser = parse_pair, allow_hyphen_values = true)]
    levels: Option<(f64, f64)>,

    /// Latitude range, as A,B
    #[arg(long, value_parser = parse_pair, allow_hyphen_values = true)]
    lat: Option<(f64, f64)>,

    /// Longitude range, as A,B
    #[arg(long, value_parser = parse_pair, allow_hyphen_values = true)]
    lon: Option<(f64, f64)>,

    /// Use -180..180 longitudes for the range and the result
    #[arg(long)]
    shifted: bool,

    /// Also write the subset to this netCDF file
    #[arg(long)]
    netcdf: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct GeotiffArgs {
    /// netCDF subset written by `download --netcdf`
    #[arg(long)]
    input: PathBuf,

    /// Variable to rasterize
    #[arg(long = "var")]
    variable: String,

    /// Pressure level (required for variables with a level dimension)
    #[arg(long)]
    level: Option<f64>,

    /// Time step, RFC 3339 (UTC if no offset is given)
    #[arg(long)]
    time: String,

    /// Output .tif/.tiff path
    #[arg(long)]
    out: PathBuf,
}

fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json)?;
    era5_netcdf::silence_hdf5_errors();

    match &cli.command {
        Command::Geotiff(args) => geotiff(args),
        Command::Variables => {
            let client = open_client(&cli)?;
            for name in client.list_variables()? {
                println!("{}", name);
            }
            Ok(())
        }
        Command::Download(args) => download(&open_client(&cli)?, args),
        Command::Evict => {
            let client = open_client(&cli)?;
            let removed = client.evict_expired_cache()?;
            println!("Removed {} expired cache entries", removed);
            Ok(())
        }
    }
}

fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Build a client from the environment, overlaid with command line flags.
fn open_client(cli: &Cli) -> Result<Era5Client<ZarrEra5Source<HttpZarrStorage>>> {
    // --data-dir (or ERA5_DATA_DIR) roots the cache and the snapshot.
    let env = Era5Config::from_env();
    let mut config = match &cli.data_dir {
        Some(dir) => Era5Config {
            expire_days: env.expire_days,
            ..Era5Config::with_data_dir(dir)
        },
        None => env,
    };
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = dir.clone();
    }

    let mut source_config = SourceConfig::from_env();
    if let Some(url) = &cli.store_url {
        source_config.base_url = url.clone();
    }

    info!(
        data_dir = %config.data_dir.display(),
        cache_dir = %config.cache_dir.display(),
        store = %source_config.base_url,
        "Opening ERA5 store"
    );

    let source = open_remote(&source_config).context("failed to open the remote store")?;
    Ok(Era5Client::new(source, config)?)
}

fn download<S: Era5Source>(client: &Era5Client<S>, args: &DownloadArgs) -> Result<()> {
    let from: TimeInput = args.from.parse().context("invalid --from")?;
    let to: TimeInput = args.to.parse().context("invalid --to")?;

    let level = match (args.level, args.levels) {
        (Some(level), _) => LevelSelection::Single(level),
        (None, Some((a, b))) => LevelSelection::Range(a, b),
        (None, None) => LevelSelection::All,
    };
    let convention = if args.shifted {
        LonConvention::Shifted
    } else {
        LonConvention::Native
    };
    let (lon_a, lon_b) = args.lon.unwrap_or(convention.bounds());
    let (lat_a, lat_b) = args.lat.unwrap_or((-90.0, 90.0));

    let request = QueryRequest::new(args.variables.iter().cloned(), from, to)
        .time_interval(args.interval)
        .level(level)
        .latitude(lat_a, lat_b)
        .longitude(lon_a, lon_b)
        .convention(convention);

    let subset = client.download(&request)?;
    print_summary(&subset);

    if let Some(path) = &args.netcdf {
        era5_export::to_netcdf(&subset, path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn geotiff(args: &GeotiffArgs) -> Result<()> {
    let time: TimeInput = args.time.parse().context("invalid --time")?;
    let subset = era5_netcdf::read_dataset(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    era5_export::to_geotiff(&subset, &args.variable, args.level, time, &args.out)?;
    println!("Wrote {}", args.out.display());
    Ok(())
}

fn print_summary(subset: &Dataset) {
    match (subset.time.first(), subset.time.last()) {
        (Some(first), Some(last)) => println!(
            "time: {} steps, {} .. {}",
            subset.time.len(),
            first.to_rfc3339(),
            last.to_rfc3339()
        ),
        _ => println!("time: 0 steps"),
    }
    if let Some(levels) = &subset.level {
        println!("level: {:?}", levels);
    }
    println!(
        "latitude: {} points, longitude: {} points",
        subset.latitude.len(),
        subset.longitude.len()
    );
    for (name, var) in &subset.variables {
        let dims: Vec<&str> = var.dims.iter().map(|d| d.name()).collect();
        println!("{} ({}) {:?}", name, dims.join(", "), var.data.shape());
    }
}

fn parse_pair(s: &str) -> Result<(f64, f64), String> {
    let Some((a, b)) = s.split_once(',') else {
        return bail_pair(s);
    };
    match (a.trim().parse(), b.trim().parse()) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        _ => bail_pair(s),
    }
}

fn bail_pair<T>(s: &str) -> Result<T, String> {
    Err(format!("expected two numbers as A,B, got {:?}", s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(parse_pair("-10,10").unwrap(), (-10.0, 10.0));
        assert_eq!(parse_pair(" 500 , 850").unwrap(), (500.0, 850.0));
        assert!(parse_pair("10").is_err());
        assert!(parse_pair("a,b").is_err());
    }

    #[test]
    fn test_download_args() {
        let cli = Cli::try_parse_from([
            "era5",
            "download",
            "--var",
            "temperature",
            "--var",
            "2m_temperature",
            "--from",
            "2023-01-01T00:00:00Z",
            "--to",
            "2023-01-01T06:00:00Z",
            "--levels",
            "500,850",
            "--lon",
            "-10,40",
            "--shifted",
        ])
        .unwrap();

        let Command::Download(args) = cli.command else {
            panic!("expected download");
        };
        assert_eq!(args.variables, vec!["temperature", "2m_temperature"]);
        assert_eq!(args.levels, Some((500.0, 850.0)));
        assert_eq!(args.lon, Some((-10.0, 40.0)));
        assert!(args.shifted);
        assert_eq!(args.interval, 1);
    }

    #[test]
    fn test_level_conflicts_with_levels() {
        let result = Cli::try_parse_from([
            "era5", "download", "--var", "t", "--from", "x", "--to", "y", "--level", "500",
            "--levels", "500,850",
        ]);
        assert!(result.is_err());
    }
}
