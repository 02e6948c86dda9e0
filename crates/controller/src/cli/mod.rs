//! # rcctl
//!
//! Command-line companion for the resource controller.
//!
//! ```bash
//! # Render a declared object's body offline against data object files
//! rcctl render --object index-template.yaml --data settings.yaml --data shared.yaml
//!
//! # Declared objects that reference a ResourceTemplateData
//! rcctl dependents shared-settings --namespace search
//!
//! # Conditions of a declared object
//! rcctl status IndexTemplate logs --namespace search
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kube::Client;
use resource_controller::template::NamespacePolicy;
use std::path::PathBuf;

mod dependents;
mod render;
mod status;

/// Resource controller CLI
#[derive(Parser)]
#[command(name = "rcctl")]
#[command(about = "Resource controller CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace (defaults to "default")
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a declared object's body without a cluster
    Render {
        /// YAML file with the declared object
        #[arg(long, value_name = "FILE")]
        object: PathBuf,

        /// YAML file(s) with ResourceTemplateData objects (multi-document allowed)
        #[arg(long, value_name = "FILE")]
        data: Vec<PathBuf>,

        /// Meaning of references without a namespace (defaults to the kind's policy)
        #[arg(long, value_name = "POLICY")]
        policy: Option<NamespacePolicy>,
    },
    /// List declared objects that reference a ResourceTemplateData
    Dependents {
        /// Name of the ResourceTemplateData
        #[arg(value_name = "NAME")]
        name: String,

        /// Only look at this kind (repeatable)
        #[arg(long, value_name = "KIND")]
        kind: Vec<String>,
    },
    /// Show the status of a declared object
    Status {
        /// Kind of the declared object, e.g. IndexTemplate
        #[arg(value_name = "KIND")]
        kind: String,

        /// Name of the declared object
        #[arg(value_name = "NAME")]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before anything opens a TLS connection
    let provider_installed = rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rcctl=info,resource_controller=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();
    if !provider_installed {
        tracing::debug!("rustls crypto provider already installed");
    }

    let cli = Cli::parse();
    let namespace = cli.namespace.unwrap_or_else(|| "default".to_string());

    match cli.command {
        Commands::Render {
            object,
            data,
            policy,
        } => {
            let rendered = render::render_files(&object, &data, policy).await?;
            println!("{}", serde_json::to_string_pretty(&rendered.body)?);
            eprintln!("appliedHash: {}", rendered.hash);
            Ok(())
        }
        Commands::Dependents { name, kind } => {
            let client = connect().await?;
            dependents::dependents_command(client, &namespace, &name, &kind).await
        }
        Commands::Status { kind, name } => {
            let client = connect().await?;
            status::status_command(client, &kind, &namespace, &name).await
        }
    }
}

async fn connect() -> Result<Client> {
    Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")
}
