mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "porter")]
#[command(about = "Provision a service's CloudFormation stack into one region", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage the payload and template, then create or update the stack
    Provision {
        /// Environment name from the config file
        #[arg(short, long, env = "PORTER_ENV")]
        env: String,
        /// Region to provision into
        #[arg(short, long, env = "PORTER_REGION")]
        region: String,
        /// Update the stack recorded by the last provision instead of creating one
        #[arg(long)]
        update: bool,
        /// Overrides service_version from the config file
        #[arg(long)]
        service_version: Option<String>,
        /// Pre-built service payload
        #[arg(long, default_value = ".porter-tmp/payload.tar")]
        payload: PathBuf,
    },
    /// Render the final template without touching AWS
    Template {
        /// Environment name from the config file
        #[arg(short, long, env = "PORTER_ENV")]
        env: String,
        /// Region whose stack definition is used
        #[arg(short, long, env = "PORTER_REGION")]
        region: String,
        /// Overrides service_version from the config file
        #[arg(long)]
        service_version: Option<String>,
        /// Pre-built service payload; read but not removed
        #[arg(long, default_value = ".porter-tmp/payload.tar")]
        payload: PathBuf,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Provision {
            env,
            region,
            update,
            service_version,
            payload,
        } => {
            commands::provision::handle(commands::provision::ProvisionArgs {
                environment: env,
                region,
                update,
                service_version,
                payload,
            })
            .await
        }
        Commands::Template {
            env,
            region,
            service_version,
            payload,
        } => commands::template::handle(&env, &region, service_version.as_deref(), &payload),
    }
}
