//! gamelab - deploys a Kubernetes game-server lab and syncs its Arma 3 mods

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod error;
mod exit_codes;

use error::Result;

#[derive(Parser)]
#[command(name = "gamelab")]
#[command(version)]
#[command(about = "Deploy a Kubernetes game-server lab and keep its Arma 3 mods in sync", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Lab configuration file [default: <config dir>/gamelab/config.json]
    #[arg(short, long, env = "LABCONFIG", global = true)]
    config: Option<PathBuf>,

    /// Kubeconfig file (defaults to $KUBECONFIG, ~/.kube/config or in-cluster)
    #[arg(short, long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Customize and apply manifests in dependency order
    Deploy {
        /// Manifest file or directory (repeatable)
        #[arg(short = 'm', long = "manifest", required = true, num_args = 1..)]
        manifests: Vec<PathBuf>,

        /// Stop waiting for a CustomResourceDefinition after this many seconds
        #[arg(long, value_name = "SECONDS")]
        crd_timeout: Option<u64>,
    },

    /// Download the configured workshop mods into every game server Pod
    #[command(alias = "update-arma3-mods")]
    UpdateMods,

    /// Check that the deployed lab is ready
    Verify,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    miette::set_panic_hook();
    error::install_report_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.config.unwrap_or_else(default_config_path);
    let kubeconfig = cli.kubeconfig.as_deref();

    match cli.command {
        Commands::Deploy {
            manifests,
            crd_timeout,
        } => commands::deploy::run(&config, kubeconfig, &manifests, crd_timeout).await,
        Commands::UpdateMods => commands::update_mods::run(&config, kubeconfig).await,
        Commands::Verify => commands::verify::run(&config, kubeconfig).await,
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gamelab")
        .join("config.json")
}

/// `RUST_LOG` wins; otherwise warnings, or everything from gamelab with `--debug`
fn init_tracing(debug: bool) {
    let default = if debug {
        "warn,gamelab=debug,gamelab_core=debug,gamelab_engine=debug,gamelab_kube=debug"
    } else {
        "warn"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}
