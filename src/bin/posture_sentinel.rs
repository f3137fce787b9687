//! Sentinel CLI - Command-line interface for Posture Sentinel
//!
//! Commands:
//! - monitor: Classify live serial frames and drive the haptic actuator
//! - replay: Run the live loop over recorded frames (commands to stdout)
//! - fit-stats: Compute normalization statistics from a labelled dataset
//! - evaluate: Report classifier accuracy on a labelled dataset
//! - doctor: Diagnose artifacts and serial setup

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use posture_sentinel::channel::{self, LineChannel, TimeoutReader};
use posture_sentinel::dataset::Dataset;
use posture_sentinel::evaluate::{evaluate, EvaluationReport};
use posture_sentinel::monitor::{CancellationToken, InferenceLoop, LoopExit, SimulatedClock};
use posture_sentinel::normalizer::{NormalizationStats, Normalizer, DEFAULT_CLIP};
use posture_sentinel::{DenseModel, MonitorConfig, MonitorError, SENTINEL_VERSION};

/// Sentinel - Live posture classification with haptic alerts
#[derive(Parser)]
#[command(name = "posture-sentinel")]
#[command(version = SENTINEL_VERSION)]
#[command(about = "Classify posture from serial sensor frames", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify live serial frames and drive the haptic actuator
    Monitor {
        /// Serial device (e.g. /dev/ttyUSB0 or COM5)
        #[arg(short, long)]
        port: String,

        /// Baud rate
        #[arg(long, default_value = "115200")]
        baud_rate: u32,

        /// Per-read timeout in milliseconds
        #[arg(long, default_value = "1000")]
        read_timeout_ms: u64,

        /// Wait after opening the port before reading, in milliseconds
        #[arg(long, default_value = "2000")]
        settle_delay_ms: u64,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Run the live loop over recorded frames, writing commands to stdout
    Replay {
        /// Frame file, one frame per line (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Treat each recorded line as sampled at this interval instead of
        /// using the wall clock, so recorded sessions reach the dwell threshold
        #[arg(long)]
        frame_interval_ms: Option<i64>,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Compute normalization statistics from a labelled CSV dataset
    FitStats {
        /// Dataset CSV (header row, 12 feature columns, label column)
        #[arg(short, long)]
        input: PathBuf,

        /// Stats JSON output (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Report classifier accuracy on a labelled CSV dataset
    Evaluate {
        /// Dataset CSV (header row, 12 feature columns, label column)
        #[arg(short, long)]
        input: PathBuf,

        /// Normalization stats JSON
        #[arg(long)]
        stats: PathBuf,

        /// Classifier model JSON
        #[arg(long)]
        model: PathBuf,

        /// Scores above this are good posture
        #[arg(long, default_value = "0.5")]
        threshold: f32,

        /// Clip bound for standardized features
        #[arg(long, default_value_t = DEFAULT_CLIP)]
        clip: f64,

        /// Output report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose artifacts and serial setup
    Doctor {
        /// Normalization stats JSON to check
        #[arg(long)]
        stats: Option<PathBuf>,

        /// Classifier model JSON to check
        #[arg(long)]
        model: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Artifacts and decision settings shared by the live and replay loops
#[derive(Args)]
struct PipelineArgs {
    /// Normalization stats JSON
    #[arg(long)]
    stats: PathBuf,

    /// Classifier model JSON
    #[arg(long)]
    model: PathBuf,

    /// Continuous bad posture before vibrating, in seconds
    #[arg(long, default_value = "60")]
    dwell_secs: i64,

    /// Scores above this are good posture
    #[arg(long, default_value = "0.5")]
    threshold: f32,

    /// Clip bound for standardized features
    #[arg(long, default_value_t = DEFAULT_CLIP)]
    clip: f64,
}

impl PipelineArgs {
    fn apply(&self, config: &mut MonitorConfig) {
        config.dwell_secs = self.dwell_secs;
        config.threshold = self.threshold;
        config.clip = self.clip;
    }
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "posture_sentinel=info".into()),
        )
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), SentinelCliError> {
    match cli.command {
        Commands::Monitor {
            port,
            baud_rate,
            read_timeout_ms,
            settle_delay_ms,
            pipeline,
        } => {
            let mut config = MonitorConfig {
                port,
                baud_rate,
                read_timeout_ms,
                settle_delay_ms,
                ..Default::default()
            };
            pipeline.apply(&mut config);
            cmd_monitor(&config, &pipeline.stats, &pipeline.model)
        }

        Commands::Replay {
            input,
            frame_interval_ms,
            pipeline,
        } => {
            let mut config = MonitorConfig::default();
            pipeline.apply(&mut config);
            cmd_replay(&input, frame_interval_ms, &config, &pipeline.stats, &pipeline.model)
        }

        Commands::FitStats { input, output } => cmd_fit_stats(&input, &output),

        Commands::Evaluate {
            input,
            stats,
            model,
            threshold,
            clip,
            json,
        } => cmd_evaluate(&input, &stats, &model, threshold, clip, json),

        Commands::Doctor { stats, model, json } => {
            cmd_doctor(stats.as_deref(), model.as_deref(), json)
        }
    }
}

fn cmd_monitor(
    config: &MonitorConfig,
    stats_path: &Path,
    model_path: &Path,
) -> Result<(), SentinelCliError> {
    config.validate()?;
    let (normalizer, model) = load_artifacts(stats_path, model_path, config.clip)?;

    let link = channel::open_serial(&config.serial_settings())?;
    let cancel = install_interrupt_handler();
    // Boards that reset on open need a moment before they stream frames
    std::thread::sleep(Duration::from_millis(config.settle_delay_ms));
    if cancel.is_cancelled() {
        // The loop sees the token before its first read and only sends STOP
        tracing::info!("Interrupted during settle delay");
    } else {
        eprintln!("Monitoring {} (Press Ctrl+C to stop)", config.port);
    }

    let mut inference = InferenceLoop::new(link, model, normalizer, config).with_cancellation(cancel);
    inference.run()?;
    Ok(())
}

fn cmd_replay(
    input: &Path,
    frame_interval_ms: Option<i64>,
    config: &MonitorConfig,
    stats_path: &Path,
    model_path: &Path,
) -> Result<(), SentinelCliError> {
    config.validate()?;
    let clock = frame_interval_ms
        .map(|ms| SimulatedClock::from_interval_ms(Utc::now(), ms))
        .transpose()?;
    let (normalizer, model) = load_artifacts(stats_path, model_path, config.clip)?;

    // stdin has no read timeout; without one a Ctrl-C would wait for input
    let reader: Box<dyn Read> = if input.to_string_lossy() == "-" {
        Box::new(TimeoutReader::spawn(
            io::stdin(),
            Duration::from_millis(config.read_timeout_ms),
        )?)
    } else {
        Box::new(fs::File::open(input)?)
    };
    let link = LineChannel::new(reader, io::stdout());

    let cancel = install_interrupt_handler();
    let mut inference = InferenceLoop::new(link, model, normalizer, config).with_cancellation(cancel);

    let exit = match clock {
        Some(clock) => inference.with_clock(clock).run()?,
        None => inference.run()?,
    };

    match exit {
        LoopExit::EndOfInput => tracing::info!("Replay finished"),
        LoopExit::Cancelled => tracing::info!("Replay interrupted"),
    }
    Ok(())
}

fn cmd_fit_stats(input: &Path, output: &Path) -> Result<(), SentinelCliError> {
    let dataset = Dataset::from_path(input)?;
    let stats = NormalizationStats::fit(&dataset.features)?;
    let json = stats.to_json()?;

    if output.to_string_lossy() == "-" {
        println!("{}", json);
    } else {
        fs::write(output, json)?;
        eprintln!(
            "Wrote stats for {} rows ({} dropped) to {}",
            dataset.len(),
            dataset.dropped_rows,
            output.display()
        );
    }

    Ok(())
}

fn cmd_evaluate(
    input: &Path,
    stats_path: &Path,
    model_path: &Path,
    threshold: f32,
    clip: f64,
    json: bool,
) -> Result<(), SentinelCliError> {
    MonitorConfig {
        threshold,
        clip,
        ..Default::default()
    }
    .validate()?;

    let (normalizer, model) = load_artifacts(stats_path, model_path, clip)?;
    let dataset = Dataset::from_path(input)?;
    let report = evaluate(&model, &normalizer, &dataset, threshold);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_evaluation(&report, dataset.dropped_rows);
    }

    Ok(())
}

fn print_evaluation(report: &EvaluationReport, dropped_rows: usize) {
    println!("Evaluation Report");
    println!("=================");
    println!("Rows evaluated: {}", report.total);
    println!("Rows dropped:   {}", dropped_rows);
    println!("Threshold:      {}", report.threshold);
    println!("Model accuracy: {:.2}%", report.accuracy * 100.0);
    println!("\nConfusion (good = positive):");
    println!("  true good:  {}", report.confusion.true_good);
    println!("  false good: {}", report.confusion.false_good);
    println!("  true bad:   {}", report.confusion.true_bad);
    println!("  false bad:  {}", report.confusion.false_bad);
}

fn cmd_doctor(stats: Option<&Path>, model: Option<&Path>, json: bool) -> Result<(), SentinelCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "sentinel_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Sentinel version {}", SENTINEL_VERSION),
    });

    if let Some(stats_path) = stats {
        let check = match read_artifact(stats_path).and_then(|s| NormalizationStats::from_json(&s)) {
            Ok(stats) => {
                let guarded = stats
                    .scale()
                    .iter()
                    .filter(|s| **s == posture_sentinel::normalizer::SCALE_EPSILON)
                    .count();
                if guarded > 0 {
                    DoctorCheck {
                        name: "stats".to_string(),
                        status: CheckStatus::Warning,
                        message: format!("Stats valid, {} constant channel(s) use epsilon scale", guarded),
                    }
                } else {
                    DoctorCheck {
                        name: "stats".to_string(),
                        status: CheckStatus::Ok,
                        message: "Stats valid".to_string(),
                    }
                }
            }
            Err(e) => DoctorCheck {
                name: "stats".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            },
        };
        checks.push(check);
    }

    if let Some(model_path) = model {
        let check = match read_artifact(model_path).and_then(|s| DenseModel::from_json(&s)) {
            Ok(model) => DoctorCheck {
                name: "model".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Model valid ({} layers, {} parameters)",
                    model.layer_count(),
                    model.parameter_count()
                ),
            },
            Err(e) => DoctorCheck {
                name: "model".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            },
        };
        checks.push(check);
    }

    let ports_check = match channel::available_ports() {
        Ok(ports) if ports.is_empty() => DoctorCheck {
            name: "serial_ports".to_string(),
            status: CheckStatus::Warning,
            message: "No serial ports found".to_string(),
        },
        Ok(ports) => DoctorCheck {
            name: "serial_ports".to_string(),
            status: CheckStatus::Ok,
            message: format!("Available: {}", ports.join(", ")),
        },
        Err(e) => DoctorCheck {
            name: "serial_ports".to_string(),
            status: CheckStatus::Warning,
            message: e.to_string(),
        },
    };
    checks.push(ports_check);

    // `replay -i -` expects recorded frames piped in, not typed
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Warning,
            message: "stdin is a terminal; `replay -i -` would wait for typed frames".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is piped; `replay -i -` will read it".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        version: SENTINEL_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Sentinel Doctor Report");
        println!("======================");
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(SentinelCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn read_artifact(path: &Path) -> Result<String, MonitorError> {
    Ok(fs::read_to_string(path)?)
}

fn load_artifacts(
    stats_path: &Path,
    model_path: &Path,
    clip: f64,
) -> Result<(Normalizer, DenseModel), MonitorError> {
    let stats = NormalizationStats::from_json(&read_artifact(stats_path)?)?;
    let model = DenseModel::from_json(&read_artifact(model_path)?)?;
    tracing::info!(
        "Loaded stats from {} and a {}-layer model from {}",
        stats_path.display(),
        model.layer_count(),
        model_path.display()
    );
    Ok((Normalizer::with_clip(stats, clip)?, model))
}

fn install_interrupt_handler() -> CancellationToken {
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nExiting...");
        handler_token.cancel();
    }) {
        tracing::warn!("Ctrl+C handler not installed: {}", e);
    }
    cancel
}

// Error types

#[derive(Debug)]
enum SentinelCliError {
    Io(io::Error),
    Monitor(MonitorError),
    Json(serde_json::Error),
    DoctorFailed,
}

impl From<io::Error> for SentinelCliError {
    fn from(e: io::Error) -> Self {
        SentinelCliError::Io(e)
    }
}

impl From<MonitorError> for SentinelCliError {
    fn from(e: MonitorError) -> Self {
        SentinelCliError::Monitor(e)
    }
}

impl From<serde_json::Error> for SentinelCliError {
    fn from(e: serde_json::Error) -> Self {
        SentinelCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<SentinelCliError> for CliError {
    fn from(e: SentinelCliError) -> Self {
        match e {
            SentinelCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            SentinelCliError::Monitor(e) => {
                let (code, hint) = match &e {
                    MonitorError::SerialOpen { .. } => {
                        ("SERIAL_ERROR", "Run 'posture-sentinel doctor' to list serial ports")
                    }
                    MonitorError::Channel(_) => ("LINK_ERROR", "Check the sensor cable and restart"),
                    MonitorError::InvalidConfig(_) => ("CONFIG_ERROR", "Check command-line options"),
                    MonitorError::DatasetError(_) => {
                        ("DATASET_ERROR", "Expect a header row, 12 feature columns and a label")
                    }
                    _ => ("ARTIFACT_ERROR", "Run 'posture-sentinel doctor --stats <file> --model <file>'"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            SentinelCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            SentinelCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
