use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::admin;
use crate::config::Config;
use crate::core::gateway::Session;
use crate::core::AnyGateway;
use crate::detection::{Detector, YoloDetector};
use crate::models::InspectionResult;
use crate::pipeline::{InspectionPipeline, Persistence, PipelineError, PipelineSettings, Upload};
use crate::report::ReportBuilder;

#[derive(Parser, Debug)]
#[command(name = "marine-inspect")]
#[command(about = "Detect hull damage in underwater images and file inspection reports")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./marine-inspect.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a full inspection: detect, classify, report, store
    Inspect {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Confidence threshold in (0, 1]. Defaults to pipeline.default_confidence.
        #[arg(short, long)]
        confidence: Option<f32>,
    },
    /// Run the detector only and print detections as JSON
    Predict {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        #[arg(short, long)]
        confidence: Option<f32>,
    },
    /// Stored inspections (requires admin credentials)
    Admin {
        #[command(subcommand)]
        cmd: AdminCommand,
    },
    /// Inspect the resolved configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum AdminCommand {
    /// Check credentials
    Login(Credentials),
    /// List inspections, newest first
    List(Credentials),
    /// Delete one inspection row by id
    Delete {
        #[command(flatten)]
        credentials: Credentials,

        #[arg(value_name = "ID")]
        id: i64,
    },
}

#[derive(clap::Args, Debug)]
pub struct Credentials {
    #[arg(long)]
    pub email: String,

    #[arg(long)]
    pub password: String,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,
}

pub async fn dispatch(args: Args) -> Result<()> {
    let cfg = Config::resolve(args.config.as_deref())?;
    init_logging(&args, &cfg)?;

    match &args.cmd {
        Command::Inspect { image, confidence } => inspect(&cfg, image, *confidence).await,
        Command::Predict { image, confidence } => predict(&cfg, image, *confidence).await,
        Command::Admin { cmd } => admin_command(&cfg, cmd).await,
        Command::Config { cmd: ConfigCommand::Show } => show_config(&cfg),
    }
}

fn init_logging(args: &Args, cfg: &Config) -> Result<()> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stderr_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(())
}

fn load_detector(cfg: &Config) -> Result<Arc<YoloDetector>> {
    let detector = YoloDetector::load(&cfg.detector)
        .context("detector could not be loaded; no inspections can run")?;
    info!(model = ?cfg.detector.model_path, "detector ready");
    Ok(Arc::new(detector))
}

fn threshold_or_default(cfg: &Config, confidence: Option<f32>) -> f32 {
    confidence.unwrap_or(cfg.pipeline.default_confidence)
}

async fn inspect(cfg: &Config, image: &Path, confidence: Option<f32>) -> Result<()> {
    let detector = load_detector(cfg)?;
    let gateway = AnyGateway::from_config(cfg)
        .await
        .context("opening storage backend")?;
    let pipeline = InspectionPipeline::new(
        detector,
        gateway,
        ReportBuilder::new(&cfg.pipeline.report_dir),
        PipelineSettings::from_config(cfg),
    );

    let upload = Upload::from_path(image)
        .await
        .with_context(|| format!("reading {}", image.display()))?;

    let outcome = match pipeline.run(upload, threshold_or_default(cfg, confidence)).await {
        Ok(outcome) => outcome,
        Err(PipelineError::Report { result, source }) => {
            print_result(&result);
            return Err(source).context(format!("no report for {}", result.inspection_id));
        }
        Err(e) => return Err(e.into()),
    };

    print_result(&outcome.result);
    println!("Report:          {}", outcome.report.path().display());

    match outcome.persistence {
        Persistence::Stored(record) => {
            if let Some(id) = record.id {
                println!("Stored as row:   {}", id);
            }
            Ok(())
        }
        Persistence::Failed {
            error,
            orphaned_urls,
        } => {
            for url in &orphaned_urls {
                println!("Orphaned blob:   {}", url);
            }
            Err(error).context(format!(
                "inspection {} was not stored",
                outcome.result.inspection_id
            ))
        }
    }
}

fn print_result(result: &InspectionResult) {
    println!("Inspection ID:   {}", result.inspection_id);
    println!("Risk level:      {}", result.risk_tier);
    println!("Max confidence:  {:.2}", result.max_confidence);
    println!("Inference time:  {:.2} sec", result.inference_time_seconds);
    if result.detections.is_empty() {
        println!("No damage detected.");
    }
    for d in &result.detections {
        println!("  {:<20} {:.2}", d.class_label, d.confidence);
    }
}

async fn predict(cfg: &Config, image: &Path, confidence: Option<f32>) -> Result<()> {
    let detector = load_detector(cfg)?;
    let threshold = threshold_or_default(cfg, confidence);
    let image = image.to_path_buf();
    let annotated_dir = cfg.pipeline.annotated_dir.clone();

    let output = tokio::task::spawn_blocking(move || detector.detect(&image, threshold, &annotated_dir))
        .await??;

    let detections: Vec<_> = output
        .detections
        .iter()
        .map(|d| {
            json!({
                "class": d.class_label,
                "confidence": d.confidence,
                "bbox": d.bbox.as_xywh(),
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&json!({ "detections": detections }))?);
    Ok(())
}

async fn admin_command(cfg: &Config, cmd: &AdminCommand) -> Result<()> {
    let gateway = AnyGateway::from_config(cfg)
        .await
        .context("opening storage backend")?;
    let table = cfg.storage.table.as_str();

    match cmd {
        AdminCommand::Login(credentials) => {
            let session = sign_in(&gateway, credentials).await?;
            println!("Logged in as {}", session.email);
        }
        AdminCommand::List(credentials) => {
            let session = sign_in(&gateway, credentials).await?;
            let records = admin::list_inspections(&gateway, &session, table).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        AdminCommand::Delete { credentials, id } => {
            let session = sign_in(&gateway, credentials).await?;
            if admin::delete_inspection(&gateway, &session, table, *id).await? {
                println!("Deleted inspection row {}", id);
            } else {
                bail!("no inspection row with id {}", id);
            }
        }
    }
    Ok(())
}

async fn sign_in(gateway: &AnyGateway, credentials: &Credentials) -> Result<Session> {
    admin::login(gateway, &credentials.email, &credentials.password)
        .await?
        .ok_or_else(|| anyhow!("invalid email or password"))
}

fn show_config(cfg: &Config) -> Result<()> {
    let mut shown = cfg.clone();
    if shown.remote.api_key.is_some() {
        shown.remote.api_key = Some("<redacted>".into());
    }
    print!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}
