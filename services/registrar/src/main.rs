//! registrar
//!
//! Registers this cluster with the topology inventory, or removes it again.
//! Configuration comes from `REGISTRAR_*` environment variables; see
//! [`registrar::Config`].

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use registrar::collaborators::{FileSecretLookup, StaticClusterInfo, StaticWorkloadIdentity};
use registrar::{Config, InventoryClient, Registrar, RegistrationError};

/// Register a cluster with the topology inventory.
#[derive(Debug, Parser)]
#[command(name = "registrar")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Register this cluster and promote it to managed.
    Register,

    /// Unmanage a cluster and remove its record.
    Unregister {
        /// Cluster to remove.
        #[arg(long, env = "REGISTRAR_CLUSTER_ID")]
        cluster_id: Option<String>,
    },

    /// Report whether a cluster is managed.
    Status {
        /// Cluster to check.
        #[arg(long, env = "REGISTRAR_CLUSTER_ID")]
        cluster_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        host_url = %config.host_url,
        account_id = %config.account_id,
        "Configuration loaded"
    );

    let api = Arc::new(InventoryClient::new(&config.host_url, &config.transport())?);
    let registrar = Registrar::new(
        api,
        Arc::new(FileSecretLookup::new(config.secrets_dir.clone())),
        Arc::new(StaticClusterInfo(config.cluster_version())),
        Arc::new(StaticWorkloadIdentity(config.api_service_id.clone())),
    );
    let settings = config.settings();

    if let Err(e) = run(cli.command, &registrar, &settings).await {
        error!(terminal = e.is_terminal(), reason = %e.reason(), "Command failed");
        std::process::exit(1);
    }

    Ok(())
}

async fn run(
    command: Commands,
    registrar: &Registrar,
    settings: &registrar::Settings,
) -> Result<(), RegistrationError> {
    match command {
        Commands::Register => {
            let cluster_id = registrar.register(settings).await?;
            info!(cluster_id = %cluster_id, "Registration complete");
            println!("{cluster_id}");
        }
        Commands::Unregister { cluster_id } => {
            let cluster_id = required_cluster_id(cluster_id)?;
            registrar.unregister(settings, &cluster_id).await?;
            info!(cluster_id = %cluster_id, "Unregistration complete");
        }
        Commands::Status { cluster_id } => {
            let cluster_id = required_cluster_id(cluster_id)?;
            let managed = registrar.is_cluster_managed(settings, &cluster_id).await?;
            println!("{}", if managed { "managed" } else { "unmanaged" });
        }
    }
    Ok(())
}

fn required_cluster_id(cluster_id: Option<String>) -> Result<String, RegistrationError> {
    cluster_id.ok_or_else(|| {
        RegistrationError::InvalidRequest(
            "a cluster id is required (--cluster-id or REGISTRAR_CLUSTER_ID)".to_string(),
        )
    })
}
