//! Load CLI - Command-line interface for Synheart Load
//!
//! Commands:
//! - replay: Replay a recorded session and emit one reading per tick
//! - classify: Classify a score with the configured boundaries
//! - weights: Generate seeded scorer weights
//! - doctor: Diagnose configuration and weights

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{fmt, EnvFilter};

use synheart_load::classifier::classify;
use synheart_load::encoder::ReadingEncoder;
use synheart_load::schema::{parse_array, parse_ndjson, ReplaySession};
use synheart_load::scorer::{LoadScorer, ScorerWeights, DEFAULT_WEIGHT_SEED};
use synheart_load::{EngineConfig, EngineError, LOAD_VERSION, PRODUCER_NAME};

/// Load - On-device cognitive load engine
#[derive(Parser)]
#[command(name = "load")]
#[command(author = "Synheart AI Inc")]
#[command(version = LOAD_VERSION)]
#[command(about = "Score cognitive load from recorded interaction sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded session through the engine
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Engine configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Scorer weights (JSON); seeded weights are used otherwise
        #[arg(long)]
        weights: Option<PathBuf>,

        /// Seed for generated weights
        #[arg(long, default_value_t = DEFAULT_WEIGHT_SEED)]
        seed: u64,
    },

    /// Classify a score
    Classify {
        /// Score in [0, 100]
        score: u8,

        /// Engine configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Generate seeded scorer weights
    Weights {
        /// Weight seed
        #[arg(long, default_value_t = DEFAULT_WEIGHT_SEED)]
        seed: u64,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Diagnose configuration and weights
    Doctor {
        /// Check a configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Check a weights file
        #[arg(long)]
        weights: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one reading per line)
    Ndjson,
    /// JSON array of readings
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), LoadCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            input_format,
            output_format,
            config,
            weights,
            seed,
        } => cmd_replay(
            &input,
            &output,
            input_format,
            output_format,
            config.as_deref(),
            weights.as_deref(),
            seed,
        ),

        Commands::Classify { score, config } => cmd_classify(score, config.as_deref()),

        Commands::Weights { seed, output } => cmd_weights(seed, &output),

        Commands::Doctor {
            config,
            weights,
            json,
        } => cmd_doctor(config.as_deref(), weights.as_deref(), json),
    }
}

fn read_input(input: &Path) -> Result<String, LoadCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), LoadCliError> {
    if output.to_string_lossy() == "-" {
        print!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, LoadCliError> {
    match path {
        Some(path) => Ok(EngineConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(EngineConfig::default()),
    }
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    config: Option<&Path>,
    weights: Option<&Path>,
    seed: u64,
) -> Result<(), LoadCliError> {
    let input_data = read_input(input)?;
    let events = match input_format {
        InputFormat::Ndjson => parse_ndjson(&input_data)?,
        InputFormat::Json => parse_array(&input_data)?,
    };
    if events.is_empty() {
        return Err(LoadCliError::NoEvents);
    }

    let config = load_config(config)?;
    let weights = match weights {
        Some(path) => ScorerWeights::from_json(&fs::read_to_string(path)?)?,
        None => ScorerWeights::seeded(seed),
    };
    let scorer = LoadScorer::with_weights(weights)?;

    let outcome = ReplaySession::new(config, scorer)?.run(&events)?;
    tracing::info!(
        readings = outcome.readings.len(),
        face_events = outcome.face_events.len(),
        "replay complete"
    );

    let encoder = ReadingEncoder::new();
    let payloads: Vec<_> = outcome.readings.iter().map(|r| encoder.encode(r)).collect();
    write_output(output, &format_output(&payloads, &output_format)?)
}

fn cmd_classify(score: u8, config: Option<&Path>) -> Result<(), LoadCliError> {
    if score > 100 {
        return Err(LoadCliError::ScoreOutOfRange(score));
    }
    let config = load_config(config)?;
    let classification = classify(score, &config.classifier);
    let report = serde_json::json!({
        "score": score,
        "classification": classification,
    });
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

fn cmd_weights(seed: u64, output: &Path) -> Result<(), LoadCliError> {
    let json = ScorerWeights::seeded(seed).to_json()?;
    write_output(output, &(json + "\n"))
}

fn cmd_doctor(
    config: Option<&Path>,
    weights: Option<&Path>,
    json: bool,
) -> Result<(), LoadCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "load_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Load version {}", LOAD_VERSION),
    });

    if let Some(path) = config {
        checks.push(check_file(path, "config", |content| {
            EngineConfig::from_json(content).map(|c| {
                format!(
                    "Configuration valid (tick {} ms, calibration {:?})",
                    c.tick_interval_ms, c.calibration
                )
            })
        }));
    } else {
        checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "Using built-in defaults".to_string(),
        });
    }

    if let Some(path) = weights {
        checks.push(check_file(path, "weights", |content| {
            ScorerWeights::from_json(content).map(|w| {
                format!("Scorer weights valid ({} layers)", w.layers.len())
            })
        }));
    } else {
        checks.push(DoctorCheck {
            name: "weights".to_string(),
            status: CheckStatus::Warning,
            message: format!(
                "No weights file; replay uses seeded weights (seed {})",
                DEFAULT_WEIGHT_SEED
            ),
        });
    }

    // Check stdin is available (for piped recordings)
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (replay from stdin ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: LOAD_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Load Doctor Report");
        println!("==================");
        println!("Producer: {}", report.producer);
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
        Err(LoadCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_file<F>(path: &Path, name: &str, validate: F) -> DoctorCheck
where
    F: FnOnce(&str) -> Result<String, EngineError>,
{
    let (status, message) = match fs::read_to_string(path) {
        Ok(content) => match validate(&content) {
            Ok(message) => (CheckStatus::Ok, message),
            Err(e) => (CheckStatus::Error, e.to_string()),
        },
        Err(e) => (CheckStatus::Error, format!("Cannot read {}: {}", path.display(), e)),
    };
    DoctorCheck {
        name: name.to_string(),
        status,
        message,
    }
}

fn format_output<T: serde::Serialize>(
    records: &[T],
    format: &OutputFormat,
) -> Result<String, LoadCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for record in records {
                lines.push(serde_json::to_string(record)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)?),
    }
}

#[derive(Debug)]
enum LoadCliError {
    Io(io::Error),
    Engine(EngineError),
    Json(serde_json::Error),
    NoEvents,
    ScoreOutOfRange(u8),
    DoctorFailed,
}

impl From<io::Error> for LoadCliError {
    fn from(e: io::Error) -> Self {
        LoadCliError::Io(e)
    }
}

impl From<EngineError> for LoadCliError {
    fn from(e: EngineError) -> Self {
        LoadCliError::Engine(e)
    }
}

impl From<serde_json::Error> for LoadCliError {
    fn from(e: serde_json::Error) -> Self {
        LoadCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<LoadCliError> for CliError {
    fn from(e: LoadCliError) -> Self {
        match e {
            LoadCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            LoadCliError::Engine(e) => {
                let (code, hint) = match &e {
                    EngineError::ParseError(_) | EngineError::JsonError(_) => (
                        "PARSE_ERROR",
                        "Ensure each line is a type-tagged input event",
                    ),
                    EngineError::InvalidConfig(_) => {
                        ("CONFIG_ERROR", "Run 'load doctor --config <file>' for details")
                    }
                    EngineError::InvalidWeights(_) => (
                        "WEIGHTS_ERROR",
                        "Regenerate weights with 'load weights --seed <n>'",
                    ),
                    _ => ("ENGINE_ERROR", "Rerun with RUST_LOG=debug for details"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            LoadCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            LoadCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            LoadCliError::ScoreOutOfRange(score) => CliError {
                code: "SCORE_OUT_OF_RANGE".to_string(),
                message: format!("Score {} is outside [0, 100]", score),
                hint: None,
            },
            LoadCliError::DoctorFailed => CliError {
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
    producer: String,
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
