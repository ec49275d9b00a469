//! `opfactory` command line: run a batch from a file, or serve batches over
//! HTTP.

use std::io::Read;
use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use opfactory_core::OperationRequest;
use opfactory_server::network::{NetworkConfig, NetworkModule};
use opfactory_server::{enrollment_dispatcher, BatchRunner, ServerConfig};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Reads the batch from standard input.
const STDIN_MARKER: &str = "-";

#[derive(Parser)]
#[command(name = "opfactory", about = "Validate and dispatch operation batches")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "OPFACTORY_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one batch and print its outcome
    Run {
        /// JSON file holding an array of requests, or `-` for stdin
        #[arg(long)]
        input: String,

        /// Validate and look up, but skip writes
        #[arg(long)]
        dry_run: bool,

        /// Print the linear log form instead of one key per handler
        #[arg(long)]
        flatten: bool,

        #[command(flatten)]
        service: ServiceArgs,
    },
    /// Serve `POST /operations` over HTTP
    Serve {
        #[arg(long, env = "OPFACTORY_HOST", default_value = "0.0.0.0")]
        host: String,

        #[arg(long, env = "OPFACTORY_PORT", default_value_t = 8080)]
        port: u16,

        /// Comma-separated allowed origins
        #[arg(long, env = "OPFACTORY_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
        cors_origins: Vec<String>,

        #[arg(long, env = "OPFACTORY_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
        request_timeout_secs: u64,

        #[arg(long, env = "OPFACTORY_BODY_LIMIT_BYTES", default_value_t = 2 * 1024 * 1024)]
        body_limit_bytes: usize,

        /// Prometheus scrape address; metrics are not exported when unset
        #[arg(long, env = "OPFACTORY_METRICS_ADDR")]
        metrics_addr: Option<SocketAddr>,

        /// Treat requests without `dry_run` as dry runs
        #[arg(long, env = "OPFACTORY_DEFAULT_DRY_RUN")]
        default_dry_run: bool,

        #[command(flatten)]
        service: ServiceArgs,
    },
}

#[derive(Args)]
struct ServiceArgs {
    /// Entries held by the enrollment read cache
    #[arg(long, env = "OPFACTORY_CACHE_CAPACITY", default_value_t = 1024)]
    cache_capacity: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match dispatch(cli.command).await {
        Ok(true) => ExitCode::from(0),
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            let chain = format!("{e:#}");
            error!(error = %chain, "fatal");
            ExitCode::from(2)
        }
    }
}

/// Logs go to stderr so `run` output stays machine-readable.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// `Ok(false)` means the command ran but the batch recorded errors.
async fn dispatch(command: Command) -> anyhow::Result<bool> {
    match command {
        Command::Run {
            input,
            dry_run,
            flatten,
            service,
        } => {
            let config = ServerConfig {
                cache_capacity: service.cache_capacity,
                ..ServerConfig::default()
            };
            run_batch(&input, dry_run, flatten, &config)
        }
        Command::Serve {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            body_limit_bytes,
            metrics_addr,
            default_dry_run,
            service,
        } => {
            if let Some(addr) = metrics_addr {
                PrometheusBuilder::new()
                    .with_http_listener(addr)
                    .install()
                    .context("installing Prometheus exporter")?;
                info!(%addr, "Prometheus exporter listening");
            }

            let network = NetworkConfig {
                host,
                port,
                cors_origins,
                request_timeout: Duration::from_secs(request_timeout_secs),
                body_limit_bytes,
                ..NetworkConfig::default()
            };
            let config = ServerConfig {
                default_dry_run,
                cache_capacity: service.cache_capacity,
            };
            serve(network, config).await?;
            Ok(true)
        }
    }
}

fn run_batch(
    input: &str,
    dry_run: bool,
    flatten: bool,
    config: &ServerConfig,
) -> anyhow::Result<bool> {
    let requests = read_requests(input)?;
    info!(requests = requests.len(), dry_run, "running batch");

    let dispatcher = enrollment_dispatcher(config);
    let outcome = dispatcher.run_batch(requests, dry_run);

    let rendered = if flatten {
        serde_json::to_string_pretty(&json!({
            "results": outcome.flatten(),
            "errors": outcome.errors,
        }))
    } else {
        serde_json::to_string_pretty(&outcome)
    }
    .context("encoding outcome")?;
    println!("{rendered}");

    Ok(outcome.is_clean())
}

async fn serve(network: NetworkConfig, config: ServerConfig) -> anyhow::Result<()> {
    let runner: Arc<dyn BatchRunner> = Arc::new(enrollment_dispatcher(&config));
    let mut module = NetworkModule::new(network, runner, config);
    let port = module.start().await?;
    info!(port, "opfactory listening");

    module
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl-C");
            }
            info!("shutdown signal received");
        })
        .await
}

/// Loads a JSON array of requests from `input`, or from stdin for `-`.
fn read_requests(input: &str) -> anyhow::Result<Vec<OperationRequest>> {
    let text = if input == STDIN_MARKER {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading requests from stdin")?;
        buf
    } else {
        std::fs::read_to_string(Path::new(input))
            .with_context(|| format!("reading requests from {input}"))?
    };
    parse_requests(&text).with_context(|| format!("parsing requests from {input}"))
}

fn parse_requests(text: &str) -> anyhow::Result<Vec<OperationRequest>> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_arguments_parse() {
        let cli = Cli::try_parse_from([
            "opfactory", "run", "--input", "batch.json", "--dry-run", "--flatten",
        ])
        .unwrap();
        match cli.command {
            Command::Run {
                input,
                dry_run,
                flatten,
                service,
            } => {
                assert_eq!(input, "batch.json");
                assert!(dry_run);
                assert!(flatten);
                assert_eq!(service.cache_capacity, 1024);
            }
            Command::Serve { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn reads_requests_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"type": "enrollment", "action": "create", "attendee_id": 1, "session_id": 2}}]"#
        )
        .unwrap();

        let requests = read_requests(file.path().to_str().unwrap()).unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].action(), Some(&json!("create")));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let err = read_requests(path.to_str().unwrap()).unwrap_err();
        assert!(format!("{err:#}").contains("reading requests"));
    }

    #[test]
    fn non_array_input_is_an_error() {
        assert!(parse_requests(r#"{"type": "enrollment"}"#).is_err());
        assert!(parse_requests("not json").is_err());
    }

    #[test]
    fn clean_batch_reports_success() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"type": "enrollment", "action": "create", "attendee_id": 1, "session_id": 2}}]"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        assert!(run_batch(&path, false, false, &ServerConfig::default()).unwrap());
    }

    #[test]
    fn batch_with_errors_reports_failure() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"type": "bogus", "action": "create"}}]"#).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        assert!(!run_batch(&path, false, true, &ServerConfig::default()).unwrap());
    }
}
