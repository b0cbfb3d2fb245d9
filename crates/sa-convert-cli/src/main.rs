// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use sa_convert::{
    BatchReport, ConvertConfig, ConvertOptions, DatasetFormat, Error, Progress, Task,
    annotation::ProjectType,
    coco::{CocoReadOptions, SegmentationEncoding},
    mask::{self, generate_colors, generate_rgb},
    sa,
};
use std::{path::PathBuf, str::FromStr};
use tokio::{sync::mpsc, task::JoinHandle};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to config.toml in the user config
    /// directory)
    #[clap(long, env = "SA_CONVERT_CONFIG")]
    config: Option<PathBuf>,

    /// Items converted concurrently, overrides the configuration
    #[clap(long)]
    workers: Option<usize>,

    /// Pretty-print written JSON
    #[clap(long)]
    pretty: bool,

    /// Converter Command
    #[command(subcommand)]
    cmd: Command,
}

/// clap parser for the library's `FromStr` types.
fn parse<T: FromStr<Err = Error>>(s: &str) -> Result<T, String> {
    s.parse().map_err(|err: Error| err.to_string())
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Command {
    /// Convert a foreign dataset into a project.
    Import {
        /// Dataset format: coco, voc or yolo
        #[clap(long, value_parser = parse::<DatasetFormat>)]
        format: DatasetFormat,

        /// instance-segmentation, object-detection or panoptic-segmentation
        #[clap(long, value_parser = parse::<Task>)]
        task: Task,

        /// Project type to create: vector or pixel
        #[clap(long, default_value = "vector", value_parser = parse::<ProjectType>)]
        project_type: ProjectType,

        /// Reject COCO input whose annotations reference missing images or
        /// categories, or whose bboxes fall outside the image
        #[clap(long)]
        validate: bool,

        /// Only import COCO categories with this name (repeatable)
        #[clap(long = "category", value_name = "NAME")]
        categories: Vec<String>,

        /// COCO JSON/ZIP file, VOC root or YOLO directory
        input: PathBuf,

        /// Project directory to write
        output: PathBuf,
    },
    /// Convert a project into a foreign dataset.
    Export {
        /// Dataset format: coco or yolo
        #[clap(long, value_parser = parse::<DatasetFormat>)]
        format: DatasetFormat,

        /// instance-segmentation, object-detection or panoptic-segmentation
        #[clap(long, value_parser = parse::<Task>)]
        task: Task,

        /// Project type being read: vector or pixel
        #[clap(long, default_value = "vector", value_parser = parse::<ProjectType>)]
        project_type: ProjectType,

        /// How pixel masks are written into COCO: polygon or rle
        #[clap(long, default_value = "polygon", value_parser = parse::<SegmentationEncoding>)]
        segmentation: SegmentationEncoding,

        /// Project directory to read
        input: PathBuf,

        /// COCO JSON file or YOLO labels directory to write
        output: PathBuf,
    },
    /// Trace a pixel project into a vector project, keeping holes.
    PixelToVector { input: PathBuf, output: PathBuf },
    /// Paint a vector project into a pixel project.
    VectorToPixel { input: PathBuf, output: PathBuf },
    /// Print the first N blue-mask palette colors as JSON.
    Colors {
        n: usize,

        /// Print [r, g, b] triples instead of #rrggbb strings
        #[clap(long)]
        rgb: bool,
    },
    /// Decode a compressed COCO RLE string and print its runs, area and bbox
    /// as JSON.
    RleDecode {
        counts: String,

        #[clap(long)]
        height: u32,

        #[clap(long)]
        width: u32,
    },
}

/// Progress channel drawing an indicatif bar until the sender side closes.
///
/// The returned handle completes once the bar has drawn its final state.
fn progress_bar(message: &'static str) -> (mpsc::Sender<Progress>, JoinHandle<()>) {
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template(
        "[{elapsed_precise} ETA: {eta}] {msg}: {wide_bar:.yellow} {human_pos}/{human_len}",
    ) {
        bar.set_style(style.progress_chars("█▇▆▅▄▃▂▁  "));
    }
    bar.set_message(message);

    let (tx, mut rx) = mpsc::channel::<Progress>(1);

    let handle = tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            if progress.total > 0 {
                bar.set_length(progress.total as u64);
                bar.set_position(progress.current as u64);
            }
        }
        bar.finish();
    });

    (tx, handle)
}

/// Waits for the progress bar before surfacing the conversion result.
async fn finish(
    bar: JoinHandle<()>,
    report: Result<BatchReport<()>, Error>,
) -> Result<BatchReport<()>, Error> {
    bar.await?;
    report
}

fn print_report(report: &BatchReport<()>) {
    println!(
        "Converted: {}, not converted: {}",
        report.converted.len(),
        report.not_converted.len()
    );
    for name in &report.not_converted {
        println!("  not converted: {}", name);
    }
}

fn handle_colors(n: usize, rgb: bool) -> Result<(), Error> {
    let json = if rgb {
        serde_json::to_string(&generate_rgb(n))?
    } else {
        serde_json::to_string(&generate_colors(n))?
    };
    println!("{}", json);
    Ok(())
}

fn handle_rle_decode(counts: &str, height: u32, width: u32) -> Result<(), Error> {
    let decoded = mask::rle_from_string(counts, height, width)?;
    let runs = mask::string_to_counts(counts)?;
    let bbox = mask::bbox(&decoded).ok();

    let json = serde_json::json!({
        "size": [height, width],
        "counts": runs,
        "area": mask::area(&decoded),
        "bbox": bbox,
    });
    println!("{}", serde_json::to_string(&json)?);
    Ok(())
}

fn init_logging() {
    #[cfg(feature = "profiling")]
    {
        use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .init();
    }

    #[cfg(not(feature = "profiling"))]
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_logging();

    let args = Args::parse();
    let config_path = args.config.clone().or_else(sa_convert::default_config_path);
    let config = ConvertConfig::load_from(config_path.as_deref())?;
    let mut options = ConvertOptions::from(&config);
    if let Some(workers) = args.workers {
        options.max_workers = workers;
    }
    options.pretty |= args.pretty;
    log::debug!("Settings from {:?}: {:?}", config_path, options);

    #[cfg(feature = "profiling")]
    let _span = tracing::info_span!("sa-convert", workers = options.max_workers).entered();

    let report = match args.cmd {
        Command::Colors { n, rgb } => return handle_colors(n, rgb),
        Command::RleDecode {
            counts,
            height,
            width,
        } => return handle_rle_decode(&counts, height, width),
        Command::Import {
            format,
            task,
            project_type,
            validate,
            categories,
            input,
            output,
        } => {
            options.coco = CocoReadOptions {
                validate,
                category_filter: categories,
            };
            let (tx, bar) = progress_bar("Importing");
            let report = sa_convert::import_annotations(
                format,
                task,
                project_type,
                &input,
                &output,
                &options,
                Some(tx),
            )
            .await;
            finish(bar, report).await?
        }
        Command::Export {
            format,
            task,
            project_type,
            segmentation,
            input,
            output,
        } => {
            options.segmentation = segmentation;
            let (tx, bar) = progress_bar("Exporting");
            let report = sa_convert::export_annotations(
                format,
                task,
                project_type,
                &input,
                &output,
                &options,
                Some(tx),
            )
            .await;
            finish(bar, report).await?
        }
        Command::PixelToVector { input, output } => {
            let (tx, bar) = progress_bar("Tracing");
            let report = sa::pixel_project_to_vector(&input, &output, &options, Some(tx)).await;
            finish(bar, report).await?
        }
        Command::VectorToPixel { input, output } => {
            let (tx, bar) = progress_bar("Painting");
            let report = sa::vector_project_to_pixel(&input, &output, &options, Some(tx)).await;
            finish(bar, report).await?
        }
    };

    print_report(&report);
    Ok(())
}
