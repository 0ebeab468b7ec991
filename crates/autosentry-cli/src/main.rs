use anyhow::Context;
use autosentry_core::Payload;
use autosentry_orchestrator::{ControllerConfig, MasterController, RunStatus};
use clap::{Parser, Subcommand};
use futures_util::future::join_all;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "autosentry", about = "AutoSentry: predictive maintenance agent orchestrator")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "autosentry.toml")]
    config: PathBuf,

    /// Backend variant (overrides config and AGENT_FRAMEWORK)
    #[arg(long)]
    backend: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the telemetry workflow once per file, concurrently
    Run {
        /// Telemetry JSON files, one vehicle each
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List the registered workers
    Workers,
    /// Generate an RCA/CAPA report from a diagnosis
    Rca {
        #[arg(long)]
        vehicle_id: String,
        /// Diagnosis JSON file
        #[arg(long)]
        diagnosis: PathBuf,
        /// Optional customer feedback JSON file
        #[arg(long)]
        feedback: Option<PathBuf>,
    },
    /// Start feedback collection for a completed appointment
    Feedback {
        #[arg(long)]
        appointment_id: String,
        #[arg(long)]
        customer_id: String,
    },
}

/// Config file (when present), then environment, then command-line override.
fn load_config(path: &Path, backend: Option<&str>) -> anyhow::Result<ControllerConfig> {
    let config = if path.exists() {
        ControllerConfig::load(path)?
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        ControllerConfig::default()
    };
    let mut config = config.apply_env();
    if let Some(backend) = backend {
        config.backend = backend.to_string();
    }
    Ok(config)
}

async fn read_json(path: &Path) -> anyhow::Result<Value> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in '{}'", path.display()))
}

async fn read_object(path: &Path) -> anyhow::Result<Payload> {
    match read_json(path).await? {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("'{}' must contain a JSON object", path.display()),
    }
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn execute(controller: &MasterController, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run { files } => {
            let mut bundles = Vec::with_capacity(files.len());
            for file in &files {
                bundles.push(read_json(file).await?);
            }
            let summaries =
                join_all(bundles.iter().map(|b| controller.process_telemetry(b))).await;
            print_json(&summaries)?;

            let failed = summaries
                .iter()
                .filter(|s| s.status == RunStatus::Failed)
                .count();
            if failed > 0 {
                anyhow::bail!("{failed} of {} workflow runs failed", summaries.len());
            }
        }
        Commands::Workers => {
            print_json(&controller.list_workers())?;
        }
        Commands::Rca {
            vehicle_id,
            diagnosis,
            feedback,
        } => {
            let diagnosis = read_object(&diagnosis).await?;
            let feedback = match feedback {
                Some(path) => Some(read_object(&path).await?),
                None => None,
            };
            let result = controller
                .generate_rca_capa(&vehicle_id, diagnosis, feedback)
                .await?;
            print_json(&result)?;
        }
        Commands::Feedback {
            appointment_id,
            customer_id,
        } => {
            let result = controller
                .collect_feedback(&appointment_id, &customer_id)
                .await?;
            print_json(&result)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!(error = %e, "No .env file loaded");
    }

    let cli = Cli::parse();
    let config = load_config(&cli.config, cli.backend.as_deref())?;
    info!(backend = %config.backend_kind(), "Starting AutoSentry");

    let controller = MasterController::new(config);
    if !controller.initialize().await {
        warn!("Agent backend unavailable; tasks will run through fallback execution");
    }

    let outcome = execute(&controller, cli.command).await;
    controller.shutdown().await;
    outcome
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use autosentry_agent::BackendKind;
    use std::io::Write;

    #[test]
    fn test_cli_parses_run_with_files() {
        let cli = Cli::try_parse_from(["autosentry", "run", "a.json", "b.json"]).unwrap();
        match cli.command {
            Commands::Run { files } => assert_eq!(files.len(), 2),
            _ => panic!("expected run"),
        }
        assert_eq!(cli.config, PathBuf::from("autosentry.toml"));
    }

    #[test]
    fn test_cli_run_requires_files() {
        assert!(Cli::try_parse_from(["autosentry", "run"]).is_err());
    }

    #[test]
    fn test_cli_parses_feedback() {
        let cli = Cli::try_parse_from([
            "autosentry",
            "--backend",
            "process",
            "feedback",
            "--appointment-id",
            "APT-1",
            "--customer-id",
            "CUST-1",
        ])
        .unwrap();
        assert_eq!(cli.backend.as_deref(), Some("process"));
        assert!(matches!(cli.command, Commands::Feedback { .. }));
    }

    #[test]
    fn test_load_config_from_file_with_override() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp.as_file_mut(), "backend = \"remote\"\nagent_id = \"master-009\"").unwrap();

        let config = load_config(tmp.path(), Some("process")).unwrap();
        assert_eq!(config.backend_kind(), BackendKind::Process);
        assert_eq!(config.agent_id, "master-009");
    }

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let config = load_config(Path::new("/nonexistent/autosentry.toml"), Some("builtin")).unwrap();
        assert_eq!(config.backend_kind(), BackendKind::Builtin);
        assert_eq!(config.collaborator_timeout_secs, 30);
    }

    #[tokio::test]
    async fn test_read_object_rejects_arrays() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp.as_file_mut(), "[1, 2]").unwrap();
        assert!(read_object(tmp.path()).await.is_err());
    }
}
