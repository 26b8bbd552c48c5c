//! Yolopost: post-processing for YOLO-family model outputs.
//!
//! Yolopost turns the raw output tensor of a detection, segmentation,
//! classification, pose or oriented-box model into structured results laid
//! out on the destination image, with camera rotation and front-camera
//! mirroring applied consistently to every piece of geometry.
//!
//! # Modules
//!
//! - [`tensor`]: Raw output buffers and per-task layouts
//! - [`decode`]: Anchor decoding into candidates
//! - [`nms`]: Greedy non-maximum suppression
//! - [`transform`]: Model space to destination space mapping
//! - [`mask`]: Instance mask reconstruction
//! - [`result`]: The assembled per-frame result
//! - [`predictor`]: The pipeline that ties them together
//! - [`config`], [`labels`]: Model configuration and class names
//! - [`geom`]: Typed coordinates, boxes and polygons
//! - [`error`]: Error types for yolopost operations
//!
//! # Example
//!
//! ```
//! use yolopost::{Predictor, PredictorConfig, RawTensorOutput, Task};
//!
//! // One class, two anchors, feature-major: [cx, cy, w, h, score] per anchor.
//! let config = PredictorConfig::new(Task::Detect, 1);
//! let mut predictor = Predictor::new(config, &[1, 5, 2], None)?;
//! let output = RawTensorOutput::new(
//!     vec![1, 5, 2],
//!     vec![0.5, 0.2, 0.5, 0.2, 0.2, 0.1, 0.2, 0.1, 0.9, 0.1],
//! )?;
//! let frame = predictor.frame(640, 480)?;
//! let result = predictor.predict(&output, None, &frame)?;
//! assert_eq!(result.len(), 1);
//! # Ok::<(), yolopost::YoloError>(())
//! ```

pub mod config;
pub mod decode;
pub mod error;
pub mod geom;
pub mod labels;
pub mod mask;
pub mod nms;
pub mod predictor;
pub mod result;
pub mod tensor;
pub mod transform;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub use config::{BoxUnits, MaskMode, ObbIou, PredictorConfig, Thresholds};
pub use error::YoloError;
pub use labels::Labels;
pub use predictor::{FpsMeter, Predictor};
pub use result::{DetectionResult, TaskResult};
pub use tensor::{RawTensorOutput, Task, TensorSpec};
pub use transform::{FrameContext, FrameTransform, Rotation};

/// The yolopost CLI application.
#[derive(Parser)]
#[command(name = "yolopost")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline on a tensor stored as JSON.
    Run(RunArgs),
    /// Check a declared output shape against a model configuration.
    Check(CheckArgs),
}

/// Arguments for the run subcommand.
#[derive(clap::Args)]
struct RunArgs {
    /// Model configuration (.yaml, .yml or .json).
    #[arg(long)]
    config: PathBuf,

    /// Output tensor as {"shape": [...], "data": [...]}.
    #[arg(long)]
    tensor: PathBuf,

    /// Prototype tensor (segmentation models).
    #[arg(long)]
    protos: Option<PathBuf>,

    /// Destination image width in pixels.
    #[arg(long)]
    width: u32,

    /// Destination image height in pixels.
    #[arg(long)]
    height: u32,

    /// Rotate results for a camera sensor.
    #[arg(long)]
    rotate: bool,

    /// Rotation applied with --rotate (90 or 270).
    #[arg(long, default_value_t = 90)]
    rotation: u32,

    /// Mirror results horizontally (front camera).
    #[arg(long)]
    mirror: bool,

    /// Model metadata YAML with a `names` table.
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Override the configured confidence threshold.
    #[arg(long)]
    confidence: Option<f32>,

    /// Override the configured IoU threshold.
    #[arg(long)]
    iou: Option<f32>,

    /// Output format ('text' or 'json').
    #[arg(long, default_value = "text")]
    output: String,
}

/// Arguments for the check subcommand.
#[derive(clap::Args)]
struct CheckArgs {
    /// Model configuration (.yaml, .yml or .json).
    #[arg(long)]
    config: PathBuf,

    /// Declared output shape, e.g. 1,84,8400.
    #[arg(long)]
    shape: String,

    /// Declared prototype shape for segmentation, e.g. 1,160,160,32.
    #[arg(long)]
    proto_shape: Option<String>,

    /// Output format ('text' or 'json').
    #[arg(long, default_value = "text")]
    output: String,
}

/// Installs a stderr `tracing` subscriber filtered by `RUST_LOG`, falling
/// back to `default_filter`. Does nothing if one is already installed.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Run the yolopost CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), YoloError> {
    let cli = Cli::parse();
    init_tracing("warn");

    match cli.command {
        Some(Commands::Run(args)) => run_pipeline(args),
        Some(Commands::Check(args)) => run_check(args),
        None => {
            println!("yolopost {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Post-processing for YOLO-family model outputs.");
            println!();
            println!("Run 'yolopost --help' for usage information.");
            Ok(())
        }
    }
}

fn check_output_format(output: &str) -> Result<(), YoloError> {
    match output {
        "text" | "json" => Ok(()),
        other => Err(YoloError::UnsupportedFormat(format!(
            "output '{}' (supported: text, json)",
            other
        ))),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), YoloError> {
    let text = serde_json::to_string_pretty(value).map_err(|source| YoloError::JsonWrite {
        path: "<stdout>".into(),
        source,
    })?;
    println!("{}", text);
    Ok(())
}

/// Execute the run subcommand.
fn run_pipeline(args: RunArgs) -> Result<(), YoloError> {
    check_output_format(&args.output)?;
    let mut config = PredictorConfig::load(&args.config)?;
    if let Some(c) = args.confidence {
        config.confidence_threshold = c;
    }
    if let Some(iou) = args.iou {
        config.iou_threshold = iou;
    }

    let output = RawTensorOutput::load(&args.tensor)?;
    let protos = args
        .protos
        .as_deref()
        .map(RawTensorOutput::load)
        .transpose()?;

    let mut predictor = Predictor::new(
        config,
        output.shape(),
        protos.as_ref().map(RawTensorOutput::shape),
    )?;
    if let Some(path) = &args.labels {
        predictor = predictor.with_labels(Labels::load(path)?);
    }

    let frame = predictor
        .frame(args.width, args.height)?
        .rotated_for_camera(args.rotate)
        .with_camera_rotation(Rotation::from_degrees(args.rotation)?)
        .mirrored(args.mirror);
    let result = predictor.predict(&output, protos.as_ref(), &frame)?;

    match args.output.as_str() {
        "json" => print_json(&result),
        _ => {
            print!("{}", result);
            Ok(())
        }
    }
}

fn parse_shape(s: &str) -> Result<Vec<usize>, YoloError> {
    s.split(|c: char| c == ',' || c == 'x')
        .map(|part| {
            part.trim().parse::<usize>().map_err(|_| {
                YoloError::InvalidConfig(format!("'{}' is not a valid tensor shape", s))
            })
        })
        .collect()
}

/// Execute the check subcommand.
fn run_check(args: CheckArgs) -> Result<(), YoloError> {
    check_output_format(&args.output)?;
    let config = PredictorConfig::load(&args.config)?;
    let shape = parse_shape(&args.shape)?;
    let proto_shape = args.proto_shape.as_deref().map(parse_shape).transpose()?;
    let spec = TensorSpec::resolve(
        config.task,
        config.num_classes,
        &shape,
        proto_shape.as_deref(),
    )?;

    match args.output.as_str() {
        "json" => print_json(&spec),
        _ => {
            println!("Layout OK: {} model", spec.task);
            println!("  features per anchor: {}", spec.features);
            println!("  anchors:             {}", spec.anchors);
            println!("  orientation:         {:?}", spec.orientation);
            if let Some(p) = spec.protos {
                println!("  mask coefficients:   {}", spec.mask_coefficients);
                println!(
                    "  prototypes:          {}x{} {:?}",
                    p.width, p.height, p.layout
                );
            }
            Ok(())
        }
    }
}
