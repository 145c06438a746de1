//! Command-line interface for ticketai.
//!
//! Provides commands for triaging a ticket, checking health, showing the
//! resolved configuration, and previewing log redaction.
//!
//! Logs go to stderr; stdout carries only command output.

use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{load_config, LoadedConfig};
use crate::core::{redact, HealthStatus, TriagePipeline};
use crate::domain::{TicketInput, ANONYMOUS_CALLER};

/// ticketai - Resilient support-ticket triage
#[derive(Parser, Debug)]
#[command(name = "ticketai")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: discovered .ticketai/config.yaml)
    #[arg(long, global = true, env = "TICKETAI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Triage a ticket and print the result as JSON
    Triage {
        #[command(flatten)]
        source: TextSource,

        /// Caller identity used for rate limiting
        #[arg(long, default_value = ANONYMOUS_CALLER)]
        caller: String,

        /// Correlation id (generated if not given)
        #[arg(long)]
        request_id: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        output: OutputFormat,
    },

    /// Show service health
    Health {
        /// Also check that the model endpoint is reachable
        #[arg(long)]
        probe: bool,
    },

    /// Show resolved configuration (no secrets)
    Config,

    /// Print the redacted copy of a ticket, as it would appear in logs
    Redact {
        #[command(flatten)]
        source: TextSource,
    },
}

/// Where ticket text comes from (reads stdin if neither flag is given)
#[derive(clap::Args, Debug)]
pub struct TextSource {
    /// Ticket text
    #[arg(short, long, conflicts_with = "file")]
    pub text: Option<String>,

    /// File containing the ticket text
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

impl TextSource {
    fn read(&self) -> Result<String> {
        if let Some(ref text) = self.text {
            return Ok(text.clone());
        }
        if let Some(ref path) = self.file {
            return std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read input file: {}", path.display()));
        }

        let stdin = io::stdin();
        if stdin.is_terminal() {
            bail!("No ticket text: use --text, --file, or pipe it on stdin");
        }
        let mut buffer = String::new();
        stdin
            .lock()
            .read_to_string(&mut buffer)
            .context("Failed to read stdin")?;
        Ok(buffer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Single-line JSON
    Json,
    /// Indented JSON
    Pretty,
}

impl Cli {
    /// Load configuration honouring `--config`
    pub fn load_config(&self) -> Result<LoadedConfig> {
        load_config(self.config.as_deref())
    }

    /// Execute the CLI command
    pub async fn execute(self, loaded: LoadedConfig) -> Result<()> {
        match self.command {
            Commands::Triage {
                source,
                caller,
                request_id,
                output,
            } => {
                let text = source.read()?;
                triage(loaded, text, caller, request_id, output).await
            }
            Commands::Health { probe } => health(loaded, probe).await,
            Commands::Config => show_config(&loaded),
            Commands::Redact { source } => {
                println!("{}", redact(&source.read()?));
                Ok(())
            }
        }
    }
}

/// Install the tracing subscriber. RUST_LOG wins over the configured level.
pub fn init_tracing(format: LogFormat, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(io::stderr),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(io::stderr),
            )
            .init(),
    }
}

async fn triage(
    loaded: LoadedConfig,
    text: String,
    caller: String,
    request_id: Option<String>,
    output: OutputFormat,
) -> Result<()> {
    let pipeline = TriagePipeline::from_config(loaded.config)?;

    let mut input = TicketInput::new(text, caller);
    if let Some(id) = request_id {
        input = input.with_request_id(id);
    }

    let result = pipeline.triage(input).await.context("Ticket rejected")?;

    let rendered = match output {
        OutputFormat::Json => serde_json::to_string(&result)?,
        OutputFormat::Pretty => serde_json::to_string_pretty(&result)?,
    };
    println!("{}", rendered);
    Ok(())
}

async fn health(loaded: LoadedConfig, probe: bool) -> Result<()> {
    let pipeline = TriagePipeline::from_config(loaded.config)?;
    let report = pipeline.health();
    println!("{}", serde_json::to_string_pretty(&report)?);

    if probe {
        pipeline
            .probe_provider()
            .await
            .context("Model endpoint probe failed")?;
        eprintln!("Model endpoint reachable");
    }

    if report.status != HealthStatus::Ok {
        bail!("Service degraded: circuit {:?}", report.breaker.state);
    }
    Ok(())
}

fn show_config(loaded: &LoadedConfig) -> Result<()> {
    println!("# source: {}", describe_source(loaded.source.as_deref()));
    print!("{}", serde_yaml::to_string(&loaded.config)?);
    Ok(())
}

fn describe_source(source: Option<&Path>) -> String {
    match source {
        Some(path) => path.display().to_string(),
        None => "(defaults)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_triage_text() {
        let cli = Cli::try_parse_from([
            "ticketai",
            "triage",
            "--text",
            "cannot log in",
            "--caller",
            "alice",
            "--output",
            "pretty",
        ])
        .unwrap();

        match cli.command {
            Commands::Triage {
                source,
                caller,
                request_id,
                output,
            } => {
                assert_eq!(source.text.as_deref(), Some("cannot log in"));
                assert_eq!(caller, "alice");
                assert!(request_id.is_none());
                assert_eq!(output, OutputFormat::Pretty);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn test_triage_defaults() {
        let cli = Cli::try_parse_from(["ticketai", "triage", "-t", "x"]).unwrap();
        match cli.command {
            Commands::Triage { caller, output, .. } => {
                assert_eq!(caller, ANONYMOUS_CALLER);
                assert_eq!(output, OutputFormat::Json);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_text_and_file_conflict() {
        let result = Cli::try_parse_from([
            "ticketai", "triage", "--text", "x", "--file", "ticket.txt",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "ticketai",
            "health",
            "--log-format",
            "json",
            "--config",
            "/tmp/ticketai.yaml",
        ])
        .unwrap();

        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/ticketai.yaml")));
        assert!(matches!(cli.command, Commands::Health { probe: false }));
    }

    #[test]
    fn test_text_source_reads_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "from a file").unwrap();

        let source = TextSource {
            text: None,
            file: Some(temp.path().to_path_buf()),
        };
        assert_eq!(source.read().unwrap(), "from a file");
    }
}
