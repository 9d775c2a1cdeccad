use clap::{ArgAction, Parser, Subcommand};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clubhouse_webhook::config::WebhookConfig;
use clubhouse_webhook::logging::{init_logging, LoggingConfig};
use clubhouse_webhook::server;
use clubhouse_webhook::signature::compute_signature;

#[derive(Parser, Debug)]
#[command(name = "clubhouse-webhook")]
#[command(version)]
#[command(about = "Receive Clubhouse outgoing webhooks and verify their signatures")]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(long, short, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the webhook receiver
    Serve {
        /// Path to a TOML configuration file
        #[arg(long, short, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Port to listen on (overrides configuration)
        #[arg(long, short)]
        port: Option<u16>,

        /// Address to bind to (overrides configuration)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },
    /// Print the Clubhouse-Signature header value for a payload
    Sign {
        /// Shared webhook secret
        #[arg(long, env = "CLUBHOUSE_WEBHOOK_SECRET", hide_env_values = true)]
        secret: String,

        /// Payload file (reads stdin when omitted)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { config, port, bind } => {
            init_logging(LoggingConfig::from_verbosity(cli.verbose));
            run_serve(config.as_deref(), port, bind).await
        }
        Commands::Sign { secret, file } => run_sign(&secret, file.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run_serve(
    config_path: Option<&Path>,
    port: Option<u16>,
    bind: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = WebhookConfig::load(config_path)?;
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(bind) = bind {
        config = config.with_bind_address(bind);
    }

    tracing::debug!(?config, "Loaded configuration");
    server::serve(config).await?;
    Ok(())
}

fn run_sign(secret: &str, file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let payload = match file {
        Some(path) => std::fs::read(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf)?;
            buf
        }
    };

    println!("{}", compute_signature(secret, &payload));
    Ok(())
}
