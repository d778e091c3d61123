//! Vehicle Health Agent CLI
//!
//! On-device OBD-II telemetry labeling and diagnosis.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use vehicle_health_agent::{
    collector::{ReplayCollector, ReplayConfig, SyntheticCollector},
    config::Config,
    core::{assess, BatchAccumulator, SessionContext},
    model::{
        dataset::{self, missing_critical_count, TrainingRecord},
        predictor::{predict_with, spawn_inference_worker, InferenceRequest},
        train::{evaluate, train},
        ForestParams, InferenceService, ModelArtifact,
    },
    stats::SessionStats,
    HealthLabel, VERSION,
};

#[derive(Parser)]
#[command(name = "vehicle-health")]
#[command(version = VERSION)]
#[command(about = "On-device vehicle telemetry labeling and health diagnosis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect frames, label them, and store training records
    Collect {
        /// Replay frames from a JSONL capture instead of generating them
        #[arg(long)]
        input: Option<PathBuf>,

        /// Seed for the synthetic generator
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Stop after this many frames (0 = run until Ctrl+C)
        #[arg(long, default_value = "0")]
        limit: u64,

        /// Emit frames as fast as possible instead of at the poll interval
        #[arg(long)]
        no_delay: bool,
    },

    /// Summarize the quality of the stored training records
    Analyze {
        /// Record store to analyze (defaults to the configured one)
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Write a quality-filtered copy of the record store for training
    Extract {
        /// Record store to filter (defaults to the configured one)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Where to write the filtered records
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Train a model from the stored training records
    Train {
        /// Record store to train from (defaults to the configured one)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Directory to publish the model artifact into
        #[arg(long)]
        model_dir: Option<PathBuf>,

        /// Number of trees in the ensemble
        #[arg(long, default_value = "200")]
        trees: usize,
    },

    /// Predict health for recorded frames using the trained model
    Predict {
        /// Labeled records to predict over (defaults to the configured store)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Directory holding the model artifact
        #[arg(long)]
        model_dir: Option<PathBuf>,

        /// How many of the most recent records to display
        #[arg(long, default_value = "10")]
        last: usize,
    },

    /// Show current agent status
    Status,

    /// Show configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Collect {
            input,
            seed,
            limit,
            no_delay,
        } => {
            cmd_collect(input, seed, limit, no_delay);
        }
        Commands::Analyze { input } => {
            cmd_analyze(input);
        }
        Commands::Extract { input, output } => {
            cmd_extract(input, output);
        }
        Commands::Train {
            input,
            model_dir,
            trees,
        } => {
            cmd_train(input, model_dir, trees);
        }
        Commands::Predict {
            input,
            model_dir,
            last,
        } => {
            cmd_predict(input, model_dir, last);
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

fn cmd_collect(input: Option<PathBuf>, seed: u64, limit: u64, no_delay: bool) {
    println!("Vehicle Health Agent v{VERSION}");
    println!();

    let config = Config::load().unwrap_or_default();
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let interval = if no_delay {
        None
    } else {
        Some(config.poll_interval)
    };

    // Pick a frame source; both feed the same channel interface.
    let mut replay: Option<ReplayCollector> = None;
    let mut synthetic: Option<SyntheticCollector> = None;
    let receiver = match &input {
        Some(path) => {
            println!("Source: replay from {path:?}");
            let mut collector = ReplayCollector::new(ReplayConfig {
                path: path.clone(),
                interval,
            });
            if let Err(e) = collector.start() {
                eprintln!("Error starting replay: {e}");
                std::process::exit(1);
            }
            let receiver = collector.receiver().clone();
            replay = Some(collector);
            receiver
        }
        None => {
            println!("Source: synthetic generator (seed {seed})");
            let mut collector = SyntheticCollector::new(
                seed,
                interval.unwrap_or(Duration::from_millis(1)),
            );
            if let Err(e) = collector.start() {
                eprintln!("Error starting generator: {e}");
                std::process::exit(1);
            }
            let receiver = collector.receiver().clone();
            synthetic = Some(collector);
            receiver
        }
    };

    println!("  Records: {:?}", config.records_path);
    println!("  Model dir: {:?}", config.model_dir);
    println!(
        "  Batch size: {} (inference every {} batches)",
        config.batch_size, config.infer_every_batches
    );
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let stats = Arc::new(SessionStats::with_persistence(
        config.data_path.join("stats.json"),
    ));

    let service = Arc::new(InferenceService::new(config.model_dir.clone()));
    let (infer_tx, infer_rx) = crossbeam_channel::bounded::<InferenceRequest>(64);
    let worker = spawn_inference_worker(Arc::clone(&service), infer_rx, Arc::clone(&stats));

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let mut context: Option<SessionContext> = None;
    let mut accumulator: BatchAccumulator<TrainingRecord> =
        BatchAccumulator::new(config.batch_size, config.infer_every_batches);
    let mut frames_seen: u64 = 0;

    while running.load(Ordering::SeqCst) {
        let frame = match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(frame) => frame,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                println!("Frame source finished.");
                break;
            }
        };

        stats.record_frame();
        frames_seen += 1;

        // A new connection session closes out the partial batch; the
        // context resets its own per-session state on the next derive.
        if let Some(ref ctx) = context {
            if ctx.session_id() != frame.session_id {
                println!("Session changed, flushing partial batch.");
                if let Some(batch) = accumulator.flush() {
                    store_batch(&config, &batch.records, &stats);
                }
            }
        }
        let ctx = context.get_or_insert_with(|| SessionContext::new(frame.session_id.clone()));

        let derived = ctx.derive(&frame);
        let report = assess(&frame, &derived);
        stats.record_labeled();

        println!(
            "[{}] rpm {:>6} | load {:>5} | coolant {:>6} | score {:>2} | {}",
            frame.timestamp.format("%H:%M:%S"),
            display(frame.rpm, 0),
            display(frame.engine_load, 1),
            display(frame.coolant_temp, 1),
            report.score,
            report.label
        );
        if let Some(id) = report.override_id {
            println!("          !! critical override: {id}");
        }

        let record = TrainingRecord {
            frame,
            derived,
            engine_stress_score: report.score,
            health_status: report.label,
        };

        if let Some(batch) = accumulator.push(record) {
            let newest = batch.records.last().cloned();
            store_batch(&config, &batch.records, &stats);

            if batch.trigger_inference {
                if let Some(record) = newest {
                    let request = InferenceRequest {
                        frame: record.frame,
                        derived: record.derived,
                        stress_score: record.engine_stress_score,
                    };
                    // Inference must never stall collection; a full queue
                    // just skips this round.
                    let _ = infer_tx.try_send(request);
                }
            }
        }

        if limit > 0 && frames_seen >= limit {
            println!("Frame limit reached.");
            break;
        }
    }

    println!();
    println!("Stopping collection...");
    if let Some(ref mut collector) = replay {
        collector.stop();
    }
    if let Some(ref mut collector) = synthetic {
        collector.stop();
    }

    if let Some(batch) = accumulator.flush() {
        store_batch(&config, &batch.records, &stats);
    }

    drop(infer_tx);
    if worker.join().is_err() {
        eprintln!("Warning: inference worker panicked");
    }

    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save session stats: {e}");
    }

    println!();
    println!("{}", stats.summary());
}

fn store_batch(config: &Config, records: &[TrainingRecord], stats: &SessionStats) {
    if records.is_empty() {
        return;
    }
    match dataset::append_records(&config.records_path, records) {
        Ok(()) => stats.record_batch_stored(),
        Err(e) => eprintln!("Error storing batch: {e}"),
    }
}

fn cmd_analyze(input: Option<PathBuf>) {
    let config = Config::load().unwrap_or_default();
    let path = input.unwrap_or_else(|| config.records_path.clone());

    let records = match dataset::read_records(&path) {
        Ok(records) => records,
        Err(e) => {
            eprintln!("Error reading records: {e}");
            std::process::exit(1);
        }
    };

    println!("Training Data Quality");
    println!("=====================");
    println!();
    println!("Store: {path:?}");
    println!("Total records: {}", records.len());
    if records.is_empty() {
        println!();
        println!("Run 'vehicle-health collect' to gather data.");
        return;
    }

    let usable = records
        .iter()
        .filter(|r| dataset::passes_quality_filter(r))
        .count();
    println!(
        "Usable records: {} ({:.1}%)",
        usable,
        100.0 * usable as f64 / records.len() as f64
    );
    println!();

    println!("Label distribution:");
    for label in HealthLabel::ALL {
        let count = records.iter().filter(|r| r.health_status == label).count();
        println!(
            "  {:<9} {:>7} ({:.1}%)",
            label.as_str(),
            count,
            100.0 * count as f64 / records.len() as f64
        );
    }
    println!();

    println!("Missing critical channels per record:");
    for missing in 0..=6usize {
        let count = records
            .iter()
            .filter(|r| missing_critical_count(&r.frame) == missing)
            .count();
        if count > 0 {
            println!("  {missing} missing: {count}");
        }
    }

    let sessions: std::collections::HashSet<&str> = records
        .iter()
        .map(|r| r.frame.session_id.as_str())
        .collect();
    println!();
    println!("Sessions: {}", sessions.len());
}

fn cmd_extract(input: Option<PathBuf>, output: Option<PathBuf>) {
    let config = Config::load().unwrap_or_default();
    let path = input.unwrap_or_else(|| config.records_path.clone());
    let output = output.unwrap_or_else(|| config.data_path.join("training.jsonl"));

    let records = match dataset::read_records(&path) {
        Ok(records) => records,
        Err(e) => {
            eprintln!("Error reading records: {e}");
            std::process::exit(1);
        }
    };

    let total = records.len();
    let usable: Vec<_> = records
        .into_iter()
        .filter(dataset::passes_quality_filter)
        .collect();

    if let Err(e) = dataset::write_records(&output, &usable) {
        eprintln!("Error writing filtered records: {e}");
        std::process::exit(1);
    }
    println!(
        "Extracted {} of {} records to {:?}",
        usable.len(),
        total,
        output
    );
}

fn cmd_train(input: Option<PathBuf>, model_dir: Option<PathBuf>, trees: usize) {
    let config = Config::load().unwrap_or_default();
    let path = input.unwrap_or_else(|| config.records_path.clone());
    let model_dir = model_dir.unwrap_or_else(|| config.model_dir.clone());

    println!("Training from {path:?}");

    let records = match dataset::read_records(&path) {
        Ok(records) => records,
        Err(e) => {
            eprintln!("Error reading records: {e}");
            std::process::exit(1);
        }
    };

    let params = ForestParams {
        n_trees: trees.max(1),
        ..ForestParams::default()
    };
    let (artifact, report) = match train(&records, params) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Training failed: {e}");
            std::process::exit(1);
        }
    };

    println!();
    println!("Training Report");
    println!("===============");
    println!("Total records:  {}", report.total_records);
    println!("Usable records: {}", report.usable_records);
    println!(
        "Split: {} train / {} test",
        report.training_records, report.testing_records
    );
    for (label, count) in &report.class_counts {
        println!("  {:<9} {count}", label.as_str());
    }
    if !report.excluded_classes.is_empty() {
        let excluded: Vec<&str> = report
            .excluded_classes
            .iter()
            .map(|l| l.as_str())
            .collect();
        println!("Excluded (too few samples): {}", excluded.join(", "));
    }
    println!("Hold-out accuracy: {:.4}", report.accuracy);

    if let Err(e) = artifact.save(&model_dir) {
        eprintln!("Error saving model: {e}");
        std::process::exit(1);
    }
    println!();
    println!("Model published to {model_dir:?}");
}

fn cmd_predict(input: Option<PathBuf>, model_dir: Option<PathBuf>, last: usize) {
    let config = Config::load().unwrap_or_default();
    let path = input.unwrap_or_else(|| config.records_path.clone());
    let model_dir = model_dir.unwrap_or_else(|| config.model_dir.clone());

    let artifact = match ModelArtifact::load(&model_dir) {
        Ok(artifact) => artifact,
        Err(e) => {
            eprintln!("Error loading model from {model_dir:?}: {e}");
            eprintln!("Run 'vehicle-health train' first.");
            std::process::exit(1);
        }
    };
    println!(
        "Model: {} ({} trees, trained {})",
        artifact.metadata.model_type,
        artifact.forest.n_trees(),
        artifact.metadata.trained_at.format("%Y-%m-%d %H:%M:%S"),
    );

    let records = match dataset::read_records(&path) {
        Ok(records) => records,
        Err(e) => {
            eprintln!("Error reading records: {e}");
            std::process::exit(1);
        }
    };
    if records.is_empty() {
        println!("No records to predict over.");
        return;
    }

    println!();
    let start = records.len().saturating_sub(last.max(1));
    for record in &records[start..] {
        let result = predict_with(
            &artifact,
            &record.frame,
            &record.derived,
            record.engine_stress_score,
        );
        let agreement = if result.label == record.health_status {
            "agrees"
        } else {
            "differs"
        };
        println!(
            "[{}] predicted {:<9} ({:.0}% confident) | labeled {:<9} ({agreement})",
            record.frame.timestamp.format("%H:%M:%S"),
            result.label.as_str(),
            100.0 * result.confidence,
            record.health_status.as_str(),
        );
    }

    println!();
    println!(
        "Agreement with rule labels over {} records: {:.1}%",
        records.len(),
        100.0 * evaluate(&artifact, &records)
    );
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Vehicle Health Agent Status");
    println!("===========================");
    println!();

    println!("Configuration:");
    println!("  Poll interval: {}s", config.poll_interval.as_secs());
    println!("  Batch size: {}", config.batch_size);
    println!("  Inference every: {} batches", config.infer_every_batches);
    println!("  Records: {:?}", config.records_path);
    println!("  Model dir: {:?}", config.model_dir);
    println!();

    match ModelArtifact::load(&config.model_dir) {
        Ok(artifact) => {
            println!("Model:");
            println!(
                "  Trained: {}",
                artifact.metadata.trained_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!("  Accuracy: {:.4}", artifact.metadata.accuracy);
            let classes: Vec<&str> = artifact
                .metadata
                .classes
                .iter()
                .map(|l| l.as_str())
                .collect();
            println!("  Classes: {}", classes.join(", "));
        }
        Err(_) => {
            println!("Model: none trained yet");
        }
    }
    println!();

    let stats_path = config.data_path.join("stats.json");
    if stats_path.exists() {
        if let Ok(content) = std::fs::read_to_string(&stats_path) {
            if let Ok(stats) = serde_json::from_str::<serde_json::Value>(&content) {
                println!("Cumulative Statistics:");
                if let Some(frames) = stats.get("frames_read") {
                    println!("  Frames read: {frames}");
                }
                if let Some(labeled) = stats.get("records_labeled") {
                    println!("  Records labeled: {labeled}");
                }
                if let Some(batches) = stats.get("batches_stored") {
                    println!("  Batches stored: {batches}");
                }
                if let Some(predictions) = stats.get("predictions_made") {
                    println!("  Predictions made: {predictions}");
                }
            }
        }
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn display(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{v:.decimals$}"),
        None => "-".to_string(),
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");
}
