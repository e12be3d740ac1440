//! Proctor CLI - Command-line interface for Proctor Flux
//!
//! Commands:
//! - extract: Reduce recorded input records to window reports
//! - calibrate: Build per-question metric rows and a calibration baseline
//! - features: Print the feature names of a layout
//! - replay: Re-submit recorded input records to a scoring endpoint

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use proctor_flux::baseline::BaselineStore;
use proctor_flux::config::{LogConfig, ProctorConfig};
use proctor_flux::encoder::{metric_rows, SessionIdentity, SubmissionEncoder};
use proctor_flux::features::FeatureLayout;
use proctor_flux::schema::{InputAdapter, InputRecord, Windowing, SCHEMA_VERSION};
use proctor_flux::transport::{HttpSubmitter, SubmissionQueue};
use proctor_flux::types::WindowReport;
use proctor_flux::{ProctorError, PROCTOR_VERSION};

/// Proctor - behavioral feature extraction for exam proctoring
#[derive(Parser)]
#[command(name = "proctor")]
#[command(author = "Synheart AI Inc")]
#[command(version = PROCTOR_VERSION)]
#[command(about = "Turn recorded keystroke and pointer input into feature vectors", long_about = None)]
struct Cli {
    /// Config file (JSON); defaults are used when absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reduce input records to window reports
    Extract {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        #[command(flatten)]
        windows: WindowArgs,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Build per-question behavioral metric rows from a calibration recording
    Calibrate {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        #[arg(long)]
        calibration_session_id: String,

        #[arg(long)]
        student_id: String,

        /// Add the windows to this baseline file, creating it if needed
        #[arg(long)]
        baselines: Option<PathBuf>,
    },

    /// Print the feature names of a layout
    Features {
        #[arg(value_enum)]
        layout: LayoutArg,

        /// Output as a JSON array
        #[arg(long)]
        json: bool,
    },

    /// Submit recorded input records window by window
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        #[command(flatten)]
        windows: WindowArgs,

        #[arg(long)]
        student_id: String,

        #[arg(long)]
        session_id: String,

        /// Scoring endpoint; overrides transport.endpoint from the config
        #[arg(long)]
        endpoint: Option<String>,

        /// Print payloads instead of submitting them
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(clap::Args)]
struct WindowArgs {
    /// Close a window every N milliseconds of record time
    #[arg(long, conflicts_with = "per_question")]
    window_ms: Option<f64>,

    /// Close a window at every question record
    #[arg(long)]
    per_question: bool,

    /// Keystroke layout; overrides session.keystroke_layout from the config
    #[arg(long, value_enum)]
    keystroke_layout: Option<LayoutArg>,
}

impl WindowArgs {
    fn windowing(&self) -> Windowing {
        match (self.window_ms, self.per_question) {
            (Some(ms), _) => Windowing::EveryMs(ms),
            (None, true) => Windowing::PerQuestion,
            (None, false) => Windowing::Single,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LayoutArg {
    /// keystroke.compact.v1
    Compact,
    /// keystroke.extended.v1
    Extended,
    /// pointer.v1
    Pointer,
}

impl From<LayoutArg> for FeatureLayout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Compact => FeatureLayout::KeystrokeCompactV1,
            LayoutArg::Extended => FeatureLayout::KeystrokeExtendedV1,
            LayoutArg::Pointer => FeatureLayout::PointerV1,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one window report per line)
    Ndjson,
    /// JSON array of window reports
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), ProctorCliError> {
    let config = match &cli.config {
        Some(path) => ProctorConfig::load(path)?,
        None => ProctorConfig::default(),
    };
    init_logging(&config.log);

    match cli.command {
        Commands::Extract {
            input,
            output,
            windows,
            output_format,
        } => cmd_extract(&config, &input, &output, &windows, &output_format),

        Commands::Calibrate {
            input,
            calibration_session_id,
            student_id,
            baselines,
        } => cmd_calibrate(
            &config,
            &input,
            &calibration_session_id,
            &student_id,
            baselines.as_deref(),
        ),

        Commands::Features { layout, json } => cmd_features(layout.into(), json),

        Commands::Replay {
            input,
            windows,
            student_id,
            session_id,
            endpoint,
            dry_run,
        } => cmd_replay(
            config,
            &input,
            &windows,
            SessionIdentity::new(student_id, session_id)?,
            endpoint,
            dry_run,
        ),
    }
}

/// Logs go to stderr so stdout stays machine-readable
fn init_logging(config: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }
}

fn cmd_extract(
    config: &ProctorConfig,
    input: &Path,
    output: &Path,
    windows: &WindowArgs,
    output_format: &OutputFormat,
) -> Result<(), ProctorCliError> {
    let config = with_layout(config, windows.keystroke_layout);
    let records = read_records(input)?;
    let reports = InputAdapter::replay(&records, &config, Utc::now(), windows.windowing())?;
    info!(windows = reports.len(), "extracted");

    let output_data = format_output(&reports, output_format)?;
    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }
    Ok(())
}

fn cmd_calibrate(
    config: &ProctorConfig,
    input: &Path,
    calibration_session_id: &str,
    student_id: &str,
    baselines: Option<&Path>,
) -> Result<(), ProctorCliError> {
    let records = read_records(input)?;
    let reports = InputAdapter::replay(&records, config, Utc::now(), Windowing::PerQuestion)?;

    let mut store = match baselines {
        Some(path) if path.exists() => BaselineStore::from_json(&fs::read_to_string(path)?)?,
        _ => BaselineStore::default(),
    };

    let mut stdout = io::stdout();
    let mut written = 0;
    for report in &reports {
        let rows = match metric_rows(calibration_session_id, student_id, report) {
            Ok(rows) => rows,
            Err(ProctorError::MissingQuestionIndex) => {
                warn!(start = %report.window.start, "window before first question skipped");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        for row in &rows {
            writeln!(stdout, "{}", serde_json::to_string(row)?)?;
        }
        store.add(&report.keystroke_vector);
        store.add(&report.pointer_vector);
        written += 1;
    }

    if written == 0 {
        return Err(ProctorCliError::NoWindows);
    }
    if let Some(path) = baselines {
        fs::write(path, store.to_json()?)?;
        info!(path = %path.display(), windows = written, "baseline updated");
    }
    Ok(())
}

fn cmd_features(layout: FeatureLayout, json: bool) -> Result<(), ProctorCliError> {
    let names = layout.feature_names();
    if json {
        println!("{}", serde_json::to_string_pretty(names)?);
    } else {
        println!("Layout: {} ({} features)", layout, names.len());
        println!("Input schema: {}", SCHEMA_VERSION);
        println!();
        for (i, name) in names.iter().enumerate() {
            println!("{:>4}  {}", i, name);
        }
    }
    Ok(())
}

fn cmd_replay(
    mut config: ProctorConfig,
    input: &Path,
    windows: &WindowArgs,
    identity: SessionIdentity,
    endpoint: Option<String>,
    dry_run: bool,
) -> Result<(), ProctorCliError> {
    if endpoint.is_some() {
        config.transport.endpoint = endpoint;
    }
    let config = with_layout(&config, windows.keystroke_layout);
    let records = read_records(input)?;
    let reports = InputAdapter::replay(&records, &config, Utc::now(), windows.windowing())?;
    if reports.is_empty() {
        return Err(ProctorCliError::NoWindows);
    }

    let encoder = SubmissionEncoder::new();
    let include_vectors = config.session.transport_mode.includes_vectors();
    let payloads = reports
        .iter()
        .map(|report| encoder.encode(&identity, report, include_vectors))
        .collect::<Result<Vec<_>, _>>()?;

    if dry_run {
        let mut stdout = io::stdout();
        for payload in &payloads {
            writeln!(stdout, "{}", serde_json::to_string(payload)?)?;
        }
        return Ok(());
    }

    let queue = SubmissionQueue::spawn(
        HttpSubmitter::new(&config.transport)?,
        config.transport.queue_capacity,
    )?;
    for payload in payloads {
        queue.dispatch_wait(payload);
    }

    let mut failures = 0;
    let mut stdout = io::stdout();
    for outcome in queue.shutdown() {
        let line = match &outcome.result {
            Ok(response) => serde_json::json!({
                "windowEnd": outcome.window_end,
                "thresholdExceeded": response.threshold_exceeded(),
            }),
            Err(e) => {
                failures += 1;
                serde_json::json!({
                    "windowEnd": outcome.window_end,
                    "error": e.to_string(),
                })
            }
        };
        writeln!(stdout, "{}", line)?;
    }

    if failures > 0 {
        Err(ProctorCliError::SubmissionFailed(failures))
    } else {
        Ok(())
    }
}

// Helper functions

fn with_layout(config: &ProctorConfig, layout: Option<LayoutArg>) -> ProctorConfig {
    let mut config = config.clone();
    if let Some(layout) = layout {
        config.session.keystroke_layout = layout.into();
    }
    config
}

fn read_records(input: &Path) -> Result<Vec<InputRecord>, ProctorCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            return Err(ProctorCliError::NoInput);
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let records = InputAdapter::parse(&input_data)?;
    if records.is_empty() {
        return Err(ProctorCliError::NoInput);
    }
    Ok(records)
}

fn format_output(
    reports: &[WindowReport],
    format: &OutputFormat,
) -> Result<String, ProctorCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for report in reports {
                lines.push(serde_json::to_string(report)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(reports)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(reports)?),
    }
}

// Error types

#[derive(Debug)]
enum ProctorCliError {
    Io(io::Error),
    Proctor(ProctorError),
    Json(serde_json::Error),
    NoInput,
    NoWindows,
    SubmissionFailed(usize),
}

impl From<io::Error> for ProctorCliError {
    fn from(e: io::Error) -> Self {
        ProctorCliError::Io(e)
    }
}

impl From<ProctorError> for ProctorCliError {
    fn from(e: ProctorError) -> Self {
        ProctorCliError::Proctor(e)
    }
}

impl From<serde_json::Error> for ProctorCliError {
    fn from(e: serde_json::Error) -> Self {
        ProctorCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<ProctorCliError> for CliError {
    fn from(e: ProctorCliError) -> Self {
        match e {
            ProctorCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            ProctorCliError::Proctor(e) => {
                let (code, hint) = match &e {
                    ProctorError::ParseError(_) | ProctorError::JsonError(_) => (
                        "PARSE_ERROR",
                        format!("Ensure input matches {}", SCHEMA_VERSION),
                    ),
                    ProctorError::ConfigError(_) => {
                        ("CONFIG_ERROR", "Check the config file".to_string())
                    }
                    ProctorError::TransportError(_) => (
                        "TRANSPORT_ERROR",
                        "Check the endpoint and network".to_string(),
                    ),
                    ProctorError::InvalidIdentity(_) => (
                        "IDENTITY_ERROR",
                        "Pass non-empty --student-id and --session-id".to_string(),
                    ),
                    _ => ("PROCTOR_ERROR", "Re-run with RUST_LOG=debug".to_string()),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint),
                }
            }
            ProctorCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            ProctorCliError::NoInput => CliError {
                code: "NO_INPUT".to_string(),
                message: "No input records".to_string(),
                hint: Some("Pass --input or pipe records on stdin".to_string()),
            },
            ProctorCliError::NoWindows => CliError {
                code: "NO_WINDOWS".to_string(),
                message: "No measurement windows were produced".to_string(),
                hint: Some("Calibration input needs question records".to_string()),
            },
            ProctorCliError::SubmissionFailed(count) => CliError {
                code: "SUBMISSION_FAILED".to_string(),
                message: format!("{} windows failed to submit", count),
                hint: Some("Review the outcome lines for details".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_windowing_flags() {
        let cli = Cli::parse_from(["proctor", "extract", "--window-ms", "30000"]);
        let Commands::Extract { windows, .. } = cli.command else {
            panic!("expected extract");
        };
        assert_eq!(windows.windowing(), Windowing::EveryMs(30000.0));

        let cli = Cli::parse_from(["proctor", "extract", "--per-question"]);
        let Commands::Extract { windows, .. } = cli.command else {
            panic!("expected extract");
        };
        assert_eq!(windows.windowing(), Windowing::PerQuestion);
    }

    #[test]
    fn test_cli_error_codes() {
        let err = CliError::from(ProctorCliError::Proctor(ProctorError::InvalidIdentity(
            "student id is empty".to_string(),
        )));
        assert_eq!(err.code, "IDENTITY_ERROR");
    }
}
