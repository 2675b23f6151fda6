use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use foundation::math::Vec3;
use layers::Viewpoint;
use runtime::Frame;
use streaming::HttpFetcher;
use tracing::info;
use tracing_subscriber::EnvFilter;
use viewer::{Viewer, ViewerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Streams 3D map tiles along a simulated walk")]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tile server base URL (e.g. https://example.org/cache/ddd_http/)
    #[arg(long)]
    tile_url_base: Option<String>,

    /// Base URL of the catalog assets
    #[arg(long)]
    assets_url_base: Option<String>,

    /// Draw distance in tiles
    #[arg(long)]
    draw_distance: Option<u32>,

    /// Concurrent tile fetches
    #[arg(long)]
    concurrency: Option<usize>,

    /// Start position: lon,lat (defaults to the projection origin)
    #[arg(long)]
    start: Option<String>,

    /// Walk heading in degrees from north
    #[arg(long, default_value_t = 0.0)]
    heading: f64,

    /// Walk speed in meters per second
    #[arg(long, default_value_t = 10.0)]
    speed: f64,

    /// Eye height above ground in meters
    #[arg(long, default_value_t = 40.0)]
    height: f64,

    /// Number of simulated frames
    #[arg(long, default_value_t = 600)]
    frames: u64,

    /// Simulated frames per second
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// Skip the catalog downloads
    #[arg(long)]
    no_catalog: bool,

    /// Print final statistics as JSON
    #[arg(long)]
    json: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = real_main(Args::parse()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn real_main(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::default(),
    };
    if let Some(base) = args.tile_url_base.clone() {
        config.tile_url_base = base;
    }
    if let Some(base) = args.assets_url_base.clone() {
        config.assets_url_base = base;
    }
    if let Some(d) = args.draw_distance {
        config.tile_draw_distance = d;
    }
    if let Some(n) = args.concurrency {
        config.concurrent_tasks = n;
    }
    if args.fps <= 0.0 {
        return Err("--fps must be positive".into());
    }

    let fetcher = HttpFetcher::new(config.concurrent_tasks)?;
    let mut viewer = Viewer::new(config, fetcher)?;
    if !args.no_catalog {
        viewer.load_default_catalogs();
    }

    let mut position = match &args.start {
        Some(s) => start_position(&viewer, s, args.height)?,
        None => Vec3::new(0.0, args.height, 0.0),
    };
    let heading = args.heading.to_radians();
    // Scene x is east, scene z is north.
    let forward = Vec3::new(heading.sin(), -0.3, heading.cos());
    let step = Vec3::new(heading.sin(), 0.0, heading.cos()) * (args.speed / args.fps);
    let dt = 1.0 / args.fps;

    info!(frames = args.frames, heading = args.heading, speed = args.speed, "starting walk");
    let mut frame = Frame::first();
    for _ in 0..args.frames {
        let view = Viewpoint::new(position, forward, 45.8_f64.to_radians());
        viewer.update(&frame, &view, Some(args.height));
        viewer.fetcher_mut().wait(Duration::from_secs_f64(dt));
        position = position + step;
        frame = frame.advance(dt);
    }

    // Let outstanding loads finish.
    loop {
        viewer.poll_loads();
        if viewer.queue().is_idle() || !viewer.fetcher_mut().wait(Duration::from_secs(10)) {
            break;
        }
    }

    let stats = viewer.stats();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!(
            "tiles: {} loaded, {} not found, {} failed, {} loading",
            stats.tiles_loaded, stats.tiles_not_found, stats.tiles_error, stats.tiles_loading
        );
        println!(
            "catalog: {} geometries, {} materials; {} instance roots with {} placements",
            stats.catalog.geometries.len(),
            stats.catalog.materials.len(),
            stats.instance_roots,
            stats.instance_placements
        );
        println!(
            "pending dependencies: {}, queued jobs: {}",
            stats.pending_dependencies, stats.jobs
        );
        for job in viewer.take_job_statuses() {
            println!("job: {job}");
        }
    }
    Ok(())
}

fn start_position<F: streaming::Fetcher>(
    viewer: &Viewer<F>,
    s: &str,
    height: f64,
) -> Result<Vec3, Box<dyn std::error::Error>> {
    use foundation::math::{Projection, Vec2};

    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()?;
    let [lon, lat] = parts[..] else {
        return Err(format!("--start expects lon,lat, got {s}").into());
    };
    let local = viewer.config().projection().forward(Vec2::new(lon, lat));
    Ok(Vec3::new(local.x, height, local.y))
}
