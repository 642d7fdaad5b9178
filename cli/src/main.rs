mod config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use config::Config;
use dddd_ocr::{DetBox, OcrEngine, draw_boxes};
use image::Rgb;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Captcha recognition and text-region detection with ddddocr models
#[derive(Parser, Debug)]
#[command(name = "dddd", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    models: ModelArgs,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Recognition model (.onnx), overrides DDDD_MODEL_PATH
    #[arg(long, global = true, value_name = "FILE")]
    model: Option<PathBuf>,

    /// Detection model (.onnx), overrides DDDD_DET_MODEL_PATH
    #[arg(long, global = true, value_name = "FILE")]
    det_model: Option<PathBuf>,

    /// Recognition dictionary, overrides DDDD_DICT_PATH
    #[arg(long, global = true, value_name = "FILE")]
    dict: Option<PathBuf>,

    /// Use the custom-model (index output) recognition variant
    #[arg(long, global = true)]
    custom: bool,

    /// Inference thread count, overrides DDDD_THREADS
    #[arg(long, global = true, value_name = "N")]
    threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Recognize the text of one or more captcha images
    Classify {
        /// Input images
        #[arg(required = true, value_name = "IMAGE")]
        images: Vec<PathBuf>,
    },

    /// Detect text regions in an image
    Detect {
        /// Input image
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Write a copy of the image with the boxes drawn
        #[arg(long, value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Score threshold (0.0 - 1.0)
        #[arg(long, default_value = "0.1", value_name = "THRESHOLD")]
        score_threshold: f32,

        /// NMS IOU threshold (0.0 - 1.0)
        #[arg(long, default_value = "0.45", value_name = "THRESHOLD")]
        nms_threshold: f32,
    },
}

#[derive(Serialize)]
struct ClassifyRow {
    image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct BoxRow {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

impl From<&DetBox> for BoxRow {
    fn from(b: &DetBox) -> Self {
        Self {
            x1: b.x1,
            y1: b.y1,
            x2: b.x2,
            y2: b.y2,
            score: b.score,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = merge_config(Config::from_env(), &cli.models);

    match cli.command {
        Commands::Classify { images } => classify(&config, &images, cli.json),
        Commands::Detect {
            image,
            output,
            score_threshold,
            nms_threshold,
        } => detect(
            &config,
            &image,
            output.as_deref(),
            score_threshold,
            nms_threshold,
            cli.json,
        ),
    }
}

fn merge_config(mut config: Config, args: &ModelArgs) -> Config {
    if let Some(path) = &args.model {
        config.model_path = Some(path.clone());
    }
    if let Some(path) = &args.det_model {
        config.det_model_path = Some(path.clone());
    }
    if let Some(path) = &args.dict {
        config.dict_path = Some(path.clone());
    }
    if args.custom {
        config.custom_model = true;
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    config
}

fn classify(config: &Config, images: &[PathBuf], json: bool) -> Result<()> {
    if config.model_path.is_none() {
        bail!("no recognition model given (use --model or DDDD_MODEL_PATH)");
    }

    let mut engine_config = config.engine_config();
    engine_config.det_model_path = None;
    let engine = OcrEngine::new(engine_config).context("failed to load recognition model")?;

    let decoded: Vec<_> = images
        .iter()
        .map(|path| image::open(path).with_context(|| format!("failed to open {}", path.display())))
        .collect();

    let mut rows = Vec::with_capacity(images.len());
    let mut failures = 0;
    for (path, image) in images.iter().zip(decoded) {
        let result = image.and_then(|img| engine.classification(&img).map_err(Into::into));
        let (text, error) = match result {
            Ok(text) => (Some(text), None),
            Err(e) => {
                failures += 1;
                tracing::error!("{}: {:#}", path.display(), e);
                (None, Some(format!("{:#}", e)))
            }
        };
        rows.push(ClassifyRow {
            image: path.display().to_string(),
            text,
            error,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for row in &rows {
            if let Some(text) = &row.text {
                if images.len() > 1 {
                    println!("{}\t{}", row.image, text);
                } else {
                    println!("{}", text);
                }
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} images failed", failures, images.len());
    }
    Ok(())
}

fn detect(
    config: &Config,
    image_path: &Path,
    output: Option<&Path>,
    score_threshold: f32,
    nms_threshold: f32,
    json: bool,
) -> Result<()> {
    if config.det_model_path.is_none() {
        bail!("no detection model given (use --det-model or DDDD_DET_MODEL_PATH)");
    }

    let mut engine_config = config.engine_config();
    engine_config.model_path = None;
    engine_config.dict_path = None;
    engine_config.det_options = engine_config
        .det_options
        .with_score_threshold(score_threshold)
        .with_nms_threshold(nms_threshold);
    let engine = OcrEngine::new(engine_config).context("failed to load detection model")?;

    let image = image::open(image_path)
        .with_context(|| format!("failed to open {}", image_path.display()))?;
    let boxes = engine.detect(&image).context("detection failed")?;
    tracing::info!("{} boxes in {}", boxes.len(), image_path.display());

    if json {
        let rows: Vec<BoxRow> = boxes.iter().map(BoxRow::from).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for b in &boxes {
            println!(
                "{:.0}\t{:.0}\t{:.0}\t{:.0}\t{:.3}",
                b.x1, b.y1, b.x2, b.y2, b.score
            );
        }
    }

    if let Some(output) = output {
        let canvas = draw_boxes(&image, &boxes, 2, Rgb([255, 0, 0]));
        canvas
            .save(output)
            .with_context(|| format!("failed to write {}", output.display()))?;
        tracing::info!("wrote {}", output.display());
    }

    Ok(())
}
