//! asef-eyes CLI: inspect filter files and locate eyes on face rectangles.

use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use asef::core::PixelRect;
use asef::detect::{self, DetectError};
use asef::eyes::{read_filter_file_with_order, EyeFilterModel, EyeLocator, FilterStoreError};
use asef::io::{EyeIoError, EyeLocateConfig, EyeLocateReport};
use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Filters(#[from] FilterStoreError),
    #[error("failed to read image {path}")]
    Image {
        path: PathBuf,
        #[source]
        source: DetectError,
    },
    #[error(transparent)]
    Io(#[from] EyeIoError),
    #[error("failed to print report: {0}")]
    Json(#[from] serde_json::Error),
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "asef-eyes")]
#[command(about = "Locate eyes in face rectangles with ASEF correlation filters")]
#[command(version)]
struct Cli {
    /// Raise the log level (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the header of a filter file.
    Inspect {
        /// Path to the `.cfel` filter file.
        file: PathBuf,
    },

    /// Locate eyes for face rectangles given on the command line.
    Locate(LocateArgs),

    /// Locate eyes as described by a JSON config.
    Run {
        /// Path to the JSON config.
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct LocateArgs {
    /// Path to the `.cfel` filter file.
    #[arg(long)]
    filters: PathBuf,

    /// Path to the input image.
    #[arg(long)]
    image: PathBuf,

    /// Face rectangle as `x,y,width,height`. May be repeated.
    #[arg(long = "face", required = true, allow_hyphen_values = true)]
    faces: Vec<PixelRect>,

    /// Print the report as JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Write the JSON report to this path.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let res = match &cli.command {
        Commands::Inspect { file } => run_inspect(file),
        Commands::Locate(args) => run_locate(args),
        Commands::Run { config } => run_config(config),
    };

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            let mut source = err.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "tracing")]
fn init_logging(_verbose: u8) {
    asef::core::init_tracing(false);
}

#[cfg(not(feature = "tracing"))]
fn init_logging(verbose: u8) {
    let level = asef::core::level_for_verbosity(verbose);
    if let Err(err) = asef::core::init_with_level(level) {
        eprintln!("warning: logger already installed: {err}");
    }
}

fn run_inspect(path: &Path) -> CliResult<()> {
    let load_err = |source| FilterStoreError::Load {
        path: path.to_path_buf(),
        source,
    };
    let f = File::open(path).map_err(|e| load_err(e.into()))?;
    let (file, order) = read_filter_file_with_order(BufReader::new(f)).map_err(load_err)?;

    println!("file:        {}", path.display());
    println!("comment:     {}", file.comment);
    println!("attribution: {}", file.attribution);
    println!(
        "filters:     {} rows x {} cols",
        file.filters.rows(),
        file.filters.cols()
    );
    println!("left roi:    {}", file.left_roi);
    println!("right roi:   {}", file.right_roi);
    println!("byte order:  {order:?}");
    Ok(())
}

fn locate_report(
    filter_path: &Path,
    image_path: &Path,
    faces: &[PixelRect],
) -> CliResult<EyeLocateReport> {
    let model = Arc::new(EyeFilterModel::load(filter_path)?);
    let img = detect::load_gray(image_path).map_err(|source| CliError::Image {
        path: image_path.to_path_buf(),
        source,
    })?;
    log::info!(
        "locating eyes for {} face(s) in {}x{} image",
        faces.len(),
        img.width(),
        img.height()
    );

    let mut locator = EyeLocator::new(Arc::clone(&model));
    let results = detect::locate_eyes(&mut locator, &img, faces);
    Ok(EyeLocateReport::new(
        image_path.display().to_string(),
        filter_path.display().to_string(),
        &model,
        faces,
        &results,
    ))
}

fn print_text(report: &EyeLocateReport) {
    for f in &report.faces {
        match (&f.error, f.left_eye, f.right_eye) {
            (None, Some(l), Some(r)) => println!(
                "face {}: left ({:.1}, {:.1}) right ({:.1}, {:.1})",
                f.face, l.x, l.y, r.x, r.y
            ),
            (Some(err), _, _) => println!("face {}: error: {err}", f.face),
            _ => println!("face {}: no result", f.face),
        }
    }
}

fn emit(report: &EyeLocateReport, json: bool, output: Option<&Path>) -> CliResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print_text(report);
    }
    if let Some(out) = output {
        report.write_json(out)?;
        log::info!("report written to {}", out.display());
    }
    Ok(())
}

fn run_locate(args: &LocateArgs) -> CliResult<()> {
    let report = locate_report(&args.filters, &args.image, &args.faces)?;
    emit(&report, args.json, args.output.as_deref())
}

fn run_config(path: &Path) -> CliResult<()> {
    let cfg = EyeLocateConfig::load_json(path)?;
    let report = locate_report(
        Path::new(&cfg.filter_path),
        Path::new(&cfg.image_path),
        &cfg.faces,
    )?;
    let out = cfg.output_path();
    report.write_json(&out)?;
    println!(
        "located eyes for {}/{} face(s), report written to {}",
        report.located(),
        report.faces.len(),
        out.display()
    );
    Ok(())
}
