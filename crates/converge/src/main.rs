mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "converge")]
#[command(about = "Declarative cloud resources, converged.", long_about = None)]
struct Cli {
    /// Log engine decisions (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the effective engine settings
    Settings {
        /// Write the default settings to ~/.config/converge/converge.yaml first
        #[arg(long)]
        init: bool,
    },
    /// Check a load balancer config and print its create request
    Validate {
        /// Load balancer config (YAML)
        file: PathBuf,
    },
    /// Preview the plan for a keyed pool collection without calling the API
    #[command(subcommand)]
    Plan(PlanCommands),
    /// Show the version
    Version,
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Pool members, keyed by ip:port
    Members {
        /// Desired pool (YAML with a `members` list)
        #[arg(short, long)]
        desired: PathBuf,
        /// Observed members (JSON array as returned by the list API)
        #[arg(short, long)]
        observed: PathBuf,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Health check policies, keyed by type
    HealthPolicies {
        /// Desired pool (YAML with a `health_policies` list)
        #[arg(short, long)]
        desired: PathBuf,
        /// Observed policies (JSON array as returned by the list API)
        #[arg(short, long)]
        observed: PathBuf,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine readable
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Settings { init } => commands::settings::handle(init),
        Commands::Validate { file } => commands::validate::handle(&file),
        Commands::Plan(PlanCommands::Members {
            desired,
            observed,
            json,
        }) => commands::plan::handle_members(&desired, &observed, json),
        Commands::Plan(PlanCommands::HealthPolicies {
            desired,
            observed,
            json,
        }) => commands::plan::handle_health_policies(&desired, &observed, json),
        Commands::Version => {
            println!("converge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
