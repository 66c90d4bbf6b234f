//! txprop CLI
//!
//! Command-line runner for the transaction propagation simulator.
//!
//! # Commands
//!
//! - `list` - List the scenario catalog
//! - `run` - Run one scenario (or `all`) and print the durable state
//! - `matrix` - Print the propagation resolver table

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Transaction propagation simulator.
#[derive(Parser)]
#[command(name = "txprop")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the scenario catalog
    List,

    /// Run a scenario and print its outcome and durable state
    Run {
        /// Scenario name, or `all`
        name: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print how each mode resolves with and without an ambient context
    Matrix {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::List => commands::list::run(),
        Commands::Run { name, format } => commands::run::run(&name, &format)?,
        Commands::Matrix { format } => commands::matrix::run(&format)?,
        Commands::Version => {
            println!("txprop CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("txprop Core v{}", txprop_core::VERSION);
        }
    }

    Ok(())
}
