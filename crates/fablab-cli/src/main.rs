mod config;
mod peerings_cmd;

use std::path::Path;

use anyhow::bail;
use clap::{Parser, Subcommand};

use fablab_core::statefile::LabState;

use config::FablabConfig;
use peerings_cmd::SetupPeeringsArgs;

const PEERING_GRAMMAR_HELP: &str = "\
Peering requests:
  1+2                      peer vpc-1 and vpc-2 locally
  2+4:r                    peer vpc-2 and vpc-4 over the fabric
  2+4:r=border             peer remotely through switch group \"border\"
  1~as5835                 attach vpc-1 to external \"as5835\"
  1~                       attach to the single external in the VPC's namespace
  1~as5835:subnets=sub1:prefixes=0.0.0.0/0_le32_ge32,22.22.22.0/24

Prefix tokens accept optional _leN/_geN qualifiers in either order.
Modifier aliases: r/remote, subnets/vpc_subnets, prefixes/ext_prefixes.";

#[derive(Parser)]
#[command(name = "fablab", about = "Provision and exercise virtual network-fabric test labs")]
struct Cli {
    /// Path to the lab state file (overrides FABLAB_STATE env var)
    #[arg(long, global = true)]
    state: Option<String>,

    /// More verbose logging (debug level)
    #[arg(short, long, global = true, conflicts_with = "brief")]
    verbose: bool,

    /// Less verbose logging (warnings only)
    #[arg(short, long, global = true)]
    brief: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file and a sample lab state
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Compile peering requests and print the canonical plan
    #[command(after_help = PEERING_GRAMMAR_HELP)]
    Render {
        /// Peering requests, e.g. "1+2" "2+4:r=border" "1~as5835"
        #[arg(required = true)]
        requests: Vec<String>,
    },
    /// Compile peering requests and apply them to the lab
    #[command(after_help = PEERING_GRAMMAR_HELP)]
    SetupPeerings {
        /// Peering requests, e.g. "1+2" "2+4:r=border" "1~as5835"
        requests: Vec<String>,
        /// Print the plan without touching the lab
        #[arg(long)]
        dry_run: bool,
        /// Delete every existing peering object before creating the plan's
        #[arg(long)]
        cleanup: bool,
        /// Wait for server agents to converge on the applied config
        #[arg(
            long,
            default_value_t = true,
            action = clap::ArgAction::Set,
            num_args = 0..=1,
            require_equals = true,
            default_missing_value = "true",
        )]
        agent_check: bool,
        /// Maximum number of concurrent control-plane operations
        #[arg(long, default_value_t = 8)]
        concurrency: usize,
    },
}

/// Execute `fablab init`: write config file and a sample lab state.
fn cmd_init(state_path: &Path, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        lab: config::LabSection {
            state: state_path.display().to_string(),
        },
    };
    config::save_config(&cfg)?;
    println!("Config written to {}", path.display());
    println!("  lab.state = {}", state_path.display());

    if state_path.exists() {
        println!("Lab state already exists at {}, leaving it alone.", state_path.display());
    } else {
        LabState::sample().save(state_path)?;
        println!("Sample lab state written to {}", state_path.display());
    }

    println!();
    println!("Next: run `fablab setup-peerings 1+2` to peer the sample VPCs.");
    Ok(())
}

fn setup_logging(verbose: bool, brief: bool) {
    let default_level = if verbose {
        "debug"
    } else if brief {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.brief);

    let resolved = FablabConfig::resolve(cli.state.as_deref())?;

    match cli.command {
        Commands::Init { force } => {
            cmd_init(&resolved.state_path, force)?;
        }
        Commands::Render { requests } => {
            peerings_cmd::run_render(&resolved.state_path, &requests)?;
        }
        Commands::SetupPeerings {
            requests,
            dry_run,
            cleanup,
            agent_check,
            concurrency,
        } => {
            let args = SetupPeeringsArgs {
                requests,
                dry_run,
                cleanup,
                agent_check,
                concurrency,
            };
            peerings_cmd::run_setup_peerings(&resolved.state_path, args).await?;
        }
    }

    Ok(())
}
