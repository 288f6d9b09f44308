use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use stereomatch::{
    load_raster, normalize_disparity, save_raster, ExecutionBackend, FillStrategy, Raster,
    StereoConfig, StereoPipeline,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "ZNCC stereo disparity estimation")]
struct Cli {
    /// Left image of the rectified pair.
    left: PathBuf,
    /// Right image of the rectified pair.
    right: PathBuf,
    /// Optional JSON configuration file; flags override its values.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Correlation window size (odd).
    #[arg(short, long)]
    window: Option<usize>,
    /// Largest disparity searched, in downscaled pixels.
    #[arg(short = 'd', long)]
    max_disparity: Option<usize>,
    /// Cross-check threshold.
    #[arg(short, long)]
    threshold: Option<u32>,
    /// Integer downscale factor applied before matching.
    #[arg(short = 's', long)]
    downscale: Option<usize>,
    /// Execution backend.
    #[arg(short, long, value_enum)]
    backend: Option<BackendKind>,
    /// Worker count for the thread-pool backend.
    #[arg(long)]
    workers: Option<usize>,
    /// Occlusion fill strategy.
    #[arg(long, value_enum)]
    fill: Option<FillKind>,
    /// Directory for the stage artifacts.
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
    /// Stretch saved disparity maps to the full 0-255 range.
    #[arg(long)]
    normalize: bool,
    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,
    /// Enable tracing output for performance profiling.
    #[arg(long)]
    trace: bool,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
enum BackendKind {
    Sequential,
    ThreadPool,
    KernelDispatch,
    Gpu,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
enum FillKind {
    Left,
    Nearest,
}

impl From<FillKind> for FillStrategy {
    fn from(value: FillKind) -> Self {
        match value {
            FillKind::Left => FillStrategy::Left,
            FillKind::Nearest => FillStrategy::Nearest,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
struct Config {
    window_size: usize,
    max_search_distance: usize,
    cross_check_threshold: u32,
    downscale_factor: usize,
    fill: FillKind,
    backend: BackendKind,
    workers: usize,
    output_dir: PathBuf,
    normalize: bool,
}

impl Default for Config {
    fn default() -> Self {
        let cfg = StereoConfig::default();
        Self {
            window_size: cfg.window_size,
            max_search_distance: cfg.max_search_distance,
            cross_check_threshold: cfg.cross_check_threshold,
            downscale_factor: cfg.downscale_factor,
            fill: FillKind::Left,
            backend: BackendKind::ThreadPool,
            workers: 4,
            output_dir: PathBuf::from("img"),
            normalize: false,
        }
    }
}

impl Config {
    fn apply_flags(mut self, cli: &Cli) -> Self {
        if let Some(v) = cli.window {
            self.window_size = v;
        }
        if let Some(v) = cli.max_disparity {
            self.max_search_distance = v;
        }
        if let Some(v) = cli.threshold {
            self.cross_check_threshold = v;
        }
        if let Some(v) = cli.downscale {
            self.downscale_factor = v;
        }
        if let Some(v) = cli.backend {
            self.backend = v;
        }
        if let Some(v) = cli.workers {
            self.workers = v;
        }
        if let Some(v) = cli.fill {
            self.fill = v;
        }
        if let Some(v) = &cli.output_dir {
            self.output_dir = v.clone();
        }
        self.normalize |= cli.normalize;
        self
    }

    fn stereo_config(&self) -> StereoConfig {
        StereoConfig {
            window_size: self.window_size,
            max_search_distance: self.max_search_distance,
            cross_check_threshold: self.cross_check_threshold,
            downscale_factor: self.downscale_factor,
            fill: self.fill.into(),
        }
    }

    fn backend(&self) -> Result<ExecutionBackend, Box<dyn Error>> {
        let backend = match self.backend {
            BackendKind::Sequential => ExecutionBackend::sequential(),
            BackendKind::ThreadPool => ExecutionBackend::thread_pool(self.workers)?,
            BackendKind::KernelDispatch => ExecutionBackend::cpu_device(),
            BackendKind::Gpu => ExecutionBackend::gpu()?,
        };
        Ok(backend)
    }
}

fn save(raster: &Raster, dir: &Path, name: &str, normalize: bool) -> Result<(), Box<dyn Error>> {
    let path = dir.join(name);
    if normalize {
        save_raster(&normalize_disparity(raster)?, &path)?;
    } else {
        save_raster(raster, &path)?;
    }
    tracing::info!(path = %path.display(), "saved artifact");
    Ok(())
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = match &cli.config {
        Some(path) => serde_json::from_str::<Config>(&fs::read_to_string(path)?)?,
        None => Config::default(),
    }
    .apply_flags(&cli);

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let left = load_raster(&cli.left).map_err(|e| format!("loading {}: {e}", cli.left.display()))?;
    let right =
        load_raster(&cli.right).map_err(|e| format!("loading {}: {e}", cli.right.display()))?;

    let pipeline = StereoPipeline::new(config.stereo_config(), config.backend()?);
    let output = pipeline.run(left, right)?;

    let dir = &config.output_dir;
    fs::create_dir_all(dir)?;
    save(&output.gray_left, dir, "1-gray-l.png", false)?;
    save(&output.gray_right, dir, "1-gray-r.png", false)?;
    let normalize = config.normalize;
    save(&output.disparity_left, dir, "2-disparity-l.png", normalize)?;
    save(&output.disparity_right, dir, "2-disparity-r.png", normalize)?;
    save(&output.cross_checked, dir, "3-cross-checked.png", normalize)?;
    save(&output.filled, dir, "4-occlusion-filled.png", normalize)?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.trace {
        let filter = match "stereomatch=info".parse() {
            Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
            Err(_) => EnvFilter::from_default_env(),
        };
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
