use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use adpost_core::browser::detect_browser_binary;
use adpost_core::{
    load_worker_config, JobDescriptor, JobResult, JobRunner, JobStatus, WorkerConfig,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] adpost_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("{0}")]
    InvalidJob(#[from] adpost_core::InvalidJob),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Classifieds posting worker control interface", long_about = None)]
pub struct Cli {
    /// Path to adpost.toml; built-in defaults apply when the file is absent
    #[arg(long, default_value = "configs/adpost.toml")]
    pub config: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Executes one posting job and prints the job result
    Run(RunArgs),
    /// Verifies config and browser binary availability without running a job
    Doctor,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Job descriptor JSON file, or '-' for stdin
    #[arg(long)]
    pub job: PathBuf,
    /// Launch the browser with a visible window
    #[arg(long, default_value_t = false)]
    pub headed: bool,
}

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

pub async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli.config)?;
    match &cli.command {
        Commands::Run(args) => run_job(cli.format, args, config).await,
        Commands::Doctor => {
            let report = doctor_report(&cli.config, &config);
            render(&report, cli.format)?;
            let failed = report
                .iter()
                .any(|entry| matches!(entry.status, CheckStatus::Error));
            Ok(if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}

fn load_config(path: &Path) -> Result<WorkerConfig> {
    let mut config = if path.exists() {
        load_worker_config(path)?
    } else {
        WorkerConfig::default()
    };
    config.apply_env_overrides();
    Ok(config)
}

async fn run_job(format: OutputFormat, args: &RunArgs, mut config: WorkerConfig) -> Result<ExitCode> {
    if args.headed {
        config.chromium.headless = false;
    }
    let payload = read_payload(&args.job)?;
    let job = parse_job(&payload)?;
    info!(job_id = %job.job_id, "dispatching job to pipeline");

    let runner = JobRunner::with_chromium(config);
    let result = runner.run(job).await;
    render(&result, format)?;
    Ok(ExitCode::from(exit_code_for(result.status)))
}

fn read_payload(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

/// Boundary validation: JSON shape first, then the core's domain
/// preconditions, so malformed jobs are rejected before a browser launches.
fn parse_job(payload: &str) -> Result<JobDescriptor> {
    let job: JobDescriptor = serde_json::from_str(payload)?;
    job.validate()?;
    Ok(job)
}

fn exit_code_for(status: JobStatus) -> u8 {
    match status {
        JobStatus::Completed => 0,
        JobStatus::Failed | JobStatus::CaptchaDetected => 1,
    }
}

pub fn doctor_report(config_path: &Path, config: &WorkerConfig) -> Vec<HealthEntry> {
    let mut report = Vec::new();

    if config_path.exists() {
        report.push(HealthEntry::ok(
            "config",
            format!("{}", config_path.display()),
        ));
    } else {
        report.push(HealthEntry::warn(
            "config",
            format!("{} absent, using defaults", config_path.display()),
        ));
    }

    match &config.chromium.executable_path {
        Some(path) => {
            let path = PathBuf::from(path);
            if path.exists() {
                report.push(HealthEntry::ok("browser", format!("{}", path.display())));
            } else {
                report.push(HealthEntry::error(
                    "browser",
                    format!("configured binary {} missing", path.display()),
                ));
            }
        }
        None => match detect_browser_binary() {
            Some(path) => {
                report.push(HealthEntry::ok(
                    "browser",
                    format!("auto-detected {}", path.display()),
                ));
            }
            None => {
                report.push(HealthEntry::error(
                    "browser",
                    "no chromium binary found; set CHROME_BIN or chromium.executable_path"
                        .to_string(),
                ));
            }
        },
    }

    report.push(HealthEntry::ok(
        "login_url",
        config.site.login_url.clone(),
    ));

    report
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

impl DisplayFallback for JobResult {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "job {id}: {status} (captcha: {captcha})",
            id = self.job_id,
            status = self.status,
            captcha = if self.captcha_detected { "yes" } else { "no" }
        )];
        for step in &self.steps {
            let mark = if step.success { "ok" } else { "failed" };
            let mut line = format!("  [{mark}] {step}", step = step.step);
            if let Some(error) = &step.error {
                line.push_str(&format!(": {error}"));
            }
            if !step.warnings.is_empty() {
                line.push_str(&format!(" ({} warnings)", step.warnings.len()));
            }
            lines.push(line);
        }
        lines.push(format!("screenshots: {}", self.screenshots.len()));
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct HealthEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub enum CheckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl HealthEntry {
    fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Ok,
            detail: detail.into(),
        }
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warn,
            detail: detail.into(),
        }
    }

    fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Error,
            detail: detail.into(),
        }
    }
}

impl DisplayFallback for Vec<HealthEntry> {
    fn display(&self) -> String {
        self.iter()
            .map(|entry| {
                format!(
                    "[{status}] {name}: {detail}",
                    status = entry.status,
                    name = entry.name,
                    detail = entry.detail
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
