//! SharedWAL CLI
//!
//! Command-line tools for inspecting and repairing a shared WAL volume.
//!
//! # Commands
//!
//! - `control show|init|set` - Read or write the reform control record
//! - `scan` - List instance WAL directories on the shared root
//! - `conninfo` - Build the replication connection string for a primary
//! - `segment` - Read one WAL page through the segment locator
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use sharedwal_core::ClusterStatus;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// SharedWAL command-line volume tools.
#[derive(Parser)]
#[command(name = "sharedwal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Shared storage root (overrides the configuration file)
    #[arg(global = true, short, long)]
    root: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read or write the reform control record
    Control {
        #[command(subcommand)]
        action: ControlAction,
    },

    /// List instance WAL directories on the shared root
    Scan {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Build the replication connection string for a primary
    Conninfo {
        /// Primary instance id (defaults to the one in the control file)
        #[arg(short, long)]
        primary: Option<i32>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Read one WAL page through the segment locator
    Segment {
        /// Instance whose WAL directory is read
        #[arg(short, long)]
        instance: i32,

        /// Candidate timelines, newest first
        #[arg(short, long, value_delimiter = ',', default_value = "1")]
        timelines: Vec<u32>,

        /// WAL position of the page (hex accepted with 0x prefix)
        #[arg(short, long)]
        lsn: String,

        /// Number of bytes to read
        #[arg(short = 'n', long, default_value = "8192")]
        len: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum ControlAction {
    /// Show the reform control record
    Show {
        /// Also show checkpoint records of these instances
        #[arg(short, long, value_delimiter = ',')]
        instances: Vec<u32>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Create the control file pair with an initial reform record
    Init {
        /// Primary instance id
        #[arg(short, long, default_value = "0")]
        primary: i32,

        /// Stable node ids
        #[arg(short, long, value_delimiter = ',', default_value = "0")]
        stable: Vec<u32>,
    },

    /// Update fields of the reform control record
    Set {
        /// New primary instance id
        #[arg(short, long)]
        primary: Option<i32>,

        /// New stable node ids
        #[arg(short, long, value_delimiter = ',')]
        stable: Option<Vec<u32>>,

        /// New cluster status
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
    },
}

/// Cluster status as accepted on the command line.
#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Normal,
    OndemandBuild,
    OndemandRedo,
}

impl From<StatusArg> for ClusterStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Normal => Self::Normal,
            StatusArg::OndemandBuild => Self::OndemandBuild,
            StatusArg::OndemandRedo => Self::OndemandRedo,
        }
    }
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

    if let Commands::Version = cli.command {
        println!("SharedWAL CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("SharedWAL Core v{}", sharedwal_core::VERSION);
        return Ok(());
    }

    let config = commands::load_config(cli.config.as_deref(), cli.root)?;

    match cli.command {
        Commands::Control { action } => match action {
            ControlAction::Show { instances, format } => {
                commands::control::show(config, &instances, &format)?;
            }
            ControlAction::Init { primary, stable } => {
                commands::control::init(config, primary, &stable)?;
            }
            ControlAction::Set {
                primary,
                stable,
                status,
            } => {
                commands::control::set(config, primary, stable.as_deref(), status.map(Into::into))?;
            }
        },
        Commands::Scan { format } => {
            commands::scan::run(config, &format)?;
        }
        Commands::Conninfo { primary, format } => {
            commands::conninfo::run(config, primary, &format)?;
        }
        Commands::Segment {
            instance,
            timelines,
            lsn,
            len,
            format,
        } => {
            let lsn = commands::segment::parse_lsn(&lsn)?;
            commands::segment::run(config, instance, timelines, lsn, len, &format)?;
        }
        Commands::Version => {}
    }

    Ok(())
}
