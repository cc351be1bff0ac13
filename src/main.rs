use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use nldas2::{
    Client, ConfigOverrides, Crs, ForcingQuery, Geometry, SnowParams, T_RAIN, T_SNOW, Variable,
    get_grid_mask, parse_coord,
};

#[derive(Parser, Debug)]
#[command(name = "nldas2", version, about = "Fetch hourly NLDAS2 forcing data")]
struct Cli {
    /// Service URL (overrides NLDAS2_URL and .nldas2rc)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Number of concurrent requests
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    insecure: bool,

    /// Hide the progress bar
    #[arg(long, global = true)]
    no_progress: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Forcing at one or more lon,lat coordinates
    Coords {
        /// Coordinate as lon,lat (repeatable)
        #[arg(long = "coord", required = true, allow_hyphen_values = true)]
        coords: Vec<String>,

        /// Write a (time, lat, lon) grid instead of one row per coordinate and hour
        #[arg(long)]
        grid: bool,

        #[command(flatten)]
        query: QueryArgs,
    },
    /// Forcing for every cell touched by a bounding box
    Geom {
        /// west,south,east,north
        #[arg(long, allow_hyphen_values = true)]
        bbox: String,

        /// CRS of the bounding box, e.g. EPSG:4326 or EPSG:3857
        #[arg(long, default_value = "EPSG:4326")]
        crs: String,

        #[command(flatten)]
        query: QueryArgs,
    },
    /// Summarize the grid cells touched by a bounding box
    Mask {
        /// west,south,east,north
        #[arg(long, allow_hyphen_values = true)]
        bbox: String,

        #[arg(long, default_value = "EPSG:4326")]
        crs: String,
    },
    /// List the available variables
    Variables,
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Start date, e.g. 2000-01-01 or 2000-01-01T06
    #[arg(long)]
    start: String,

    /// End date (inclusive)
    #[arg(long)]
    end: String,

    /// Variables to fetch (default: all)
    #[arg(long = "var", value_delimiter = ',')]
    variables: Vec<String>,

    /// Add a snow column partitioned from prcp by temperature
    #[arg(long)]
    snow: bool,

    /// Rain threshold in degC
    #[arg(long, default_value_t = T_RAIN, allow_hyphen_values = true)]
    t_rain: f64,

    /// Snow threshold in degC
    #[arg(long, default_value_t = T_SNOW, allow_hyphen_values = true)]
    t_snow: f64,

    /// Report temperature in degC
    #[arg(long)]
    celsius: bool,

    /// Output CSV file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl QueryArgs {
    fn to_query(&self) -> Result<ForcingQuery> {
        let mut query = ForcingQuery::new(&self.start, &self.end).celsius(self.celsius);
        if !self.variables.is_empty() {
            query = query.variables(self.variables.iter().cloned());
        }
        if self.snow {
            query = query.snow(SnowParams::new(self.t_rain, self.t_snow)?);
        }
        Ok(query)
    }

    fn writer(&self) -> Result<Box<dyn Write>> {
        Ok(match &self.output {
            Some(path) => Box::new(BufWriter::new(
                File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
            )),
            None => Box::new(io::stdout().lock()),
        })
    }
}

fn parse_bbox(s: &str) -> Result<Geometry> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("invalid bbox '{}'", s))?;
    let &[west, south, east, north] = parts.as_slice() else {
        anyhow::bail!("bbox needs four values: west,south,east,north");
    };
    Ok(Geometry::from_bbox(west, south, east, north))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let overrides = ConfigOverrides {
        url: cli.url.clone(),
        verify: cli.insecure.then_some(false),
        max_workers: cli.workers,
        timeout: cli.timeout.map(Duration::from_secs),
        ..Default::default()
    };

    match &cli.command {
        Command::Variables => {
            let vars: Vec<_> = Variable::all()
                .iter()
                .map(|v| serde_json::json!({ "name": v.name(), "attrs": v.attrs() }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&vars)?);
        }
        Command::Mask { bbox, crs } => {
            let crs: Crs = crs.parse()?;
            let mask = get_grid_mask(&parse_bbox(bbox)?, crs)?;
            println!("{}", serde_json::to_string_pretty(&mask.summary())?);
        }
        Command::Coords {
            coords,
            grid,
            query,
        } => {
            let coords = coords
                .iter()
                .map(|c| parse_coord(c))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let client = Client::new(overrides)?.with_progress(!cli.no_progress);
            let frame = client.get_bycoords(&coords, &query.to_query()?)?;
            log::info!("retrieved {} rows", frame.len());
            if *grid {
                frame.to_dataset().write_csv(query.writer()?)?;
            } else {
                frame.write_csv(query.writer()?)?;
            }
        }
        Command::Geom { bbox, crs, query } => {
            let crs: Crs = crs.parse()?;
            let geometry = parse_bbox(bbox)?;
            let client = Client::new(overrides)?.with_progress(!cli.no_progress);
            let ds = client.get_bygeom(&geometry, crs, &query.to_query()?)?;
            let (nt, ny, nx) = ds.shape();
            log::info!("retrieved dataset with {} x {} x {} cells", nt, ny, nx);
            ds.write_csv(query.writer()?)?;
        }
    }

    Ok(())
}
