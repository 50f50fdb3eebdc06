//! cli-bridge - Run configured command-line operations as typed calls.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use serde_json::Value;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli_bridge::args::{request_from, Request};
use cli_bridge::config::{BridgeConfig, ConfigLoader};
use cli_bridge::display;
use cli_bridge::{Bridge, CallOptions, Outcome};

#[derive(Parser)]
#[command(
    name = "cli-bridge",
    about = "Run command-line tools as typed, supervised calls",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (defaults to .cli-bridge.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured operations.
    List,
    /// Print the command line an operation would run.
    Render {
        /// Operation name.
        operation: String,
        /// Request as a JSON object.
        #[arg(short, long)]
        request: Option<String>,
    },
    /// Run an operation.
    Call {
        /// Operation name.
        operation: String,
        /// Request as a JSON object.
        #[arg(short, long, conflicts_with = "request_file")]
        request: Option<String>,
        /// Read the request from a JSON file.
        #[arg(long)]
        request_file: Option<PathBuf>,
        /// Override the operation's timeout.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn parse_request(inline: Option<&str>, file: Option<&PathBuf>) -> Result<Request, String> {
    let text = match (inline, file) {
        (Some(text), _) => text.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?,
        (None, None) => return Ok(Request::new()),
    };
    let value: Value =
        serde_json::from_str(&text).map_err(|e| format!("Request is not valid JSON: {e}"))?;
    request_from(&value).map_err(|e| e.to_string())
}

fn load_config(path: Option<PathBuf>) -> Result<BridgeConfig, String> {
    let loader = path.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    loader.load().map_err(|e| e.to_string())
}

async fn run_call(
    config: &BridgeConfig,
    name: &str,
    request: &Request,
    timeout_ms: Option<u64>,
) -> ExitCode {
    let Some(operation) = config.operation(name) else {
        display::print_message(&format!("Unknown operation: {name}"));
        return ExitCode::FAILURE;
    };

    let bridge = Bridge::new(config.runtime.clone());
    let shutdown = bridge.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, terminating running calls");
            shutdown.shutdown().await;
        }
    });

    if let Ok(argv) = bridge.render(operation, request) {
        display::print_call_start(name, &argv);
    }

    let mut options = CallOptions::new();
    if let Some(ms) = timeout_ms {
        options = options.timeout(Duration::from_millis(ms));
    }

    let result = match bridge.invoke::<Value>(operation, request, options).await {
        Ok(Outcome::Value(value)) => display::print_json(&value).map_err(Into::into),
        Ok(Outcome::Stream(mut stream)) => {
            let mut printed = Ok(());
            while let Some(event) = stream.next().await {
                printed = display::print_json(&event);
                if printed.is_err() {
                    break;
                }
            }
            match printed {
                Ok(()) => stream.outcome().await.map(|summary| {
                    display::print_summary(&summary);
                }),
                Err(e) => Err(e.into()),
            }
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            display::print_error(&e);
            ExitCode::from(display::exit_code(e.kind()))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match load_config(cli.config) {
        Ok(config) => config,
        Err(e) => {
            display::print_message(&e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::List => {
            display::print_operations(&config);
            ExitCode::SUCCESS
        }
        Commands::Render { operation, request } => {
            let Some(op) = config.operation(&operation) else {
                display::print_message(&format!("Unknown operation: {operation}"));
                return ExitCode::FAILURE;
            };
            let request = match parse_request(request.as_deref(), None) {
                Ok(request) => request,
                Err(e) => {
                    display::print_message(&e);
                    return ExitCode::FAILURE;
                }
            };
            match Bridge::new(config.runtime.clone()).render(op, &request) {
                Ok(argv) => {
                    display::print_invocation(&argv);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    display::print_error(&e);
                    ExitCode::from(display::exit_code(e.kind()))
                }
            }
        }
        Commands::Call {
            operation,
            request,
            request_file,
            timeout_ms,
        } => match parse_request(request.as_deref(), request_file.as_ref()) {
            Ok(request) => run_call(&config, &operation, &request, timeout_ms).await,
            Err(e) => {
                display::print_message(&e);
                ExitCode::FAILURE
            }
        },
    }
}
