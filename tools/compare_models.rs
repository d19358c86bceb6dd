//! Model Comparison Tool
//!
//! Runs every catalog model on one image, with and without test-time
//! augmentation, prints a comparison table and writes a JSON report.

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Parser;
use saccharum_vision::{
    config::{AppConfig, ModelConfig},
    models::{loader::ModelLoader, Classifier, TtaAggregator},
    policy::{method_label, DecisionPolicy},
    types::{PredictionResponse, PredictionStatus, RankedProbabilities},
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "compare_models", about = "Compare classifier accuracy with and without TTA")]
struct Args {
    /// Image to classify
    image: PathBuf,

    /// Configuration file with the model catalog
    #[arg(short, long, default_value = "config/config.toml")]
    config: PathBuf,

    /// Augmented variants per TTA prediction
    #[arg(short = 'n', long, default_value_t = 8)]
    augmentations: usize,

    /// Minimum probability for a confident result
    #[arg(short, long, default_value_t = 0.70)]
    threshold: f64,

    /// Directory for the JSON report
    #[arg(short, long, default_value = "reports")]
    output_dir: PathBuf,
}

/// Result of one model on the test image, for one method
#[derive(Debug, Serialize)]
struct ComparisonRun {
    model: String,
    use_tta: bool,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    predicted_class: Option<String>,
    confidence: f64,
    status: PredictionStatus,
    method: String,
    all_probabilities: RankedProbabilities,
    load_time: f64,
    prediction_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ComparisonRun {
    fn from_response(model: &str, use_tta: bool, response: PredictionResponse, load: Duration, elapsed: Duration) -> Self {
        let error = (response.status == PredictionStatus::Error).then(|| response.message.clone());
        Self {
            model: model.to_string(),
            use_tta,
            success: error.is_none(),
            predicted_class: response.label,
            confidence: response.confidence,
            status: response.status,
            method: response.method,
            all_probabilities: response.probabilities,
            load_time: load.as_secs_f64(),
            prediction_time: elapsed.as_secs_f64(),
            error,
        }
    }

    fn load_failure(model: &str, use_tta: bool, k: usize, message: String) -> Self {
        Self {
            model: model.to_string(),
            use_tta,
            success: false,
            predicted_class: None,
            confidence: 0.0,
            status: PredictionStatus::Error,
            method: method_label(k),
            all_probabilities: RankedProbabilities::default(),
            load_time: 0.0,
            prediction_time: 0.0,
            error: Some(message),
        }
    }
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    timestamp: String,
    test_image: &'a Path,
    threshold: f64,
    augmentations: usize,
    results: &'a [ComparisonRun],
}

fn run_model(
    config: &ModelConfig,
    loader: &ModelLoader,
    image: &Path,
    args: &Args,
) -> [ComparisonRun; 2] {
    let start = Instant::now();
    let classifier = match Classifier::load(config, loader) {
        Ok(classifier) => classifier,
        Err(e) => {
            error!(model = %config.name, error = %e, "Failed to load model");
            return [
                ComparisonRun::load_failure(&config.name, false, 0, e.to_string()),
                ComparisonRun::load_failure(&config.name, true, args.augmentations, e.to_string()),
            ];
        }
    };
    let load_time = start.elapsed();
    info!(model = %config.name, load_ms = load_time.as_millis() as u64, "Model loaded");

    let policy = DecisionPolicy::new(args.threshold);
    let aggregator = TtaAggregator::default();
    let mut rng = rand::thread_rng();

    [0, args.augmentations].map(|k| {
        let start = Instant::now();
        let response = policy.evaluate(&classifier, &aggregator, image, k, &mut rng);
        ComparisonRun::from_response(&config.name, k > 0, response, load_time, start.elapsed())
    })
}

fn print_header(text: &str) {
    println!("\n{}", "=".repeat(70));
    println!("  {}", text);
    println!("{}", "=".repeat(70));
}

fn print_run(run: &ComparisonRun) {
    match &run.predicted_class {
        Some(class) if run.success => {
            println!(
                "{:<20} {:<10} {:<12} {:>7.2}%  {:>7.2}s  [{}]",
                run.model,
                if run.use_tta { "TTA" } else { "direct" },
                class,
                run.confidence,
                run.prediction_time,
                run.status.as_str()
            );
            for (label, probability) in run.all_probabilities.iter() {
                let bar = "█".repeat((probability * 50.0) as usize);
                println!("    {:<10} {:>6.2}% {}", label, probability * 100.0, bar);
            }
        }
        _ => println!(
            "{:<20} {:<10} error: {}",
            run.model,
            if run.use_tta { "TTA" } else { "direct" },
            run.error.as_deref().unwrap_or("unknown")
        ),
    }
}

fn print_comparison(results: &[ComparisonRun]) {
    print_header("TTA IMPROVEMENT");
    println!("{:<20} {:<15} {:<15} {:<15}", "Model", "Δ Confidence", "Δ Time", "Label changed");
    println!("{}", "-".repeat(70));

    for pair in results.chunks(2) {
        let [direct, tta] = pair else { continue };
        if !(direct.success && tta.success) {
            continue;
        }
        let changed = if direct.predicted_class != tta.predicted_class { "yes" } else { "no" };
        println!(
            "{:<20} {:<15} {:<15} {:<15}",
            direct.model,
            format!("{:+.2}%", tta.confidence - direct.confidence),
            format!("{:+.2}s", tta.prediction_time - direct.prediction_time),
            changed
        );
    }
}

fn save_report(args: &Args, results: &[ComparisonRun]) -> Result<PathBuf> {
    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Failed to create {}", args.output_dir.display()))?;

    let now = Local::now();
    let path = args
        .output_dir
        .join(format!("comparison_{}.json", now.format("%Y%m%d_%H%M%S")));
    let report = Report {
        timestamp: now.to_rfc3339(),
        test_image: &args.image,
        threshold: args.threshold,
        augmentations: args.augmentations,
        results,
    };

    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("saccharum_vision=warn".parse()?)
                .add_directive("compare_models=info".parse()?),
        )
        .init();

    let args = Args::parse();
    if !args.image.exists() {
        bail!("Test image not found: {}", args.image.display());
    }

    let config = AppConfig::load_from_path(&args.config)?;
    let loader = ModelLoader::with_threads(config.models.onnx_threads.max(1))?;

    print_header("SACCHARUMVISION - MODEL COMPARISON");
    println!("Date: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    println!("Image: {}", args.image.display());
    println!(
        "Threshold: {:.0}%  Augmentations: {}  ({})",
        args.threshold * 100.0,
        args.augmentations,
        method_label(args.augmentations)
    );

    let mut results = Vec::new();
    for model in config.models.catalog.values() {
        print_header(&format!("{} - {}", model.name, model.description));
        let runs = run_model(model, &loader, &args.image, &args);
        for run in &runs {
            print_run(run);
        }
        results.extend(runs);
    }

    print_comparison(&results);

    let path = save_report(&args, &results)?;
    println!("\nReport saved to {}", path.display());
    Ok(())
}
