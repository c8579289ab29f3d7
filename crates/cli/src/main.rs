//! Rollwatch CLI
//!
//! Inspect well-known workloads across Kubernetes contexts and roll out
//! new images, from the command line.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{inspect, rollout, status};
use output::{LogFormat, OutputFormat};
use rollwatch_lib::Operations;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Rollwatch CLI
#[derive(Parser)]
#[command(name = "rollwatch")]
#[command(author, version, about = "Inspect and roll out workloads across Kubernetes contexts", long_about = None)]
pub struct Cli {
    /// Path to kubeconfig file (defaults to every file in $KUBECONFIG, then ~/.kube/config)
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Path to settings file (defaults to ~/.config/rollwatch/config.json)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: OutputFormat,

    /// Enable debug logging
    #[arg(long, short)]
    pub verbose: bool,

    /// Log format on stderr
    #[arg(long, default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List kubeconfig contexts
    Contexts {
        /// Substring a context name must contain (defaults to the configured pattern)
        #[arg(long)]
        pattern: Option<String>,

        /// Show every context, ignoring the pattern
        #[arg(long, conflicts_with = "pattern")]
        all: bool,
    },

    /// List pods in a namespace
    Pods {
        /// Context to query
        #[arg(long)]
        context: String,

        /// Namespace (defaults to the configured namespace)
        #[arg(long, short)]
        namespace: Option<String>,
    },

    /// Show when a pod was last restarted
    RestartTime {
        /// Context to query
        #[arg(long)]
        context: String,

        /// Namespace (defaults to the configured namespace)
        #[arg(long, short)]
        namespace: Option<String>,

        /// Pod name
        pod: String,
    },

    /// Show the last user activity in a pod's logs
    LastLog {
        /// Context to query
        #[arg(long)]
        context: String,

        /// Namespace (defaults to the configured namespace)
        #[arg(long, short)]
        namespace: Option<String>,

        /// Pod name
        pod: String,
    },

    /// Show the current image of a workload and when it was last updated
    Image {
        /// Context to query
        #[arg(long)]
        context: String,

        /// Namespace (defaults to the configured namespace)
        #[arg(long, short)]
        namespace: Option<String>,

        /// Workload kind (deployment or statefulset)
        #[arg(long)]
        kind: String,

        /// Workload name
        name: String,
    },

    /// Update the image of a workload and wait for the rollout
    Update {
        /// Context to update
        #[arg(long)]
        context: String,

        /// Namespace (defaults to the configured namespace)
        #[arg(long, short)]
        namespace: Option<String>,

        /// Workload kind (deployment or statefulset)
        #[arg(long)]
        kind: String,

        /// New image tag
        #[arg(long)]
        image: String,

        /// Validate on the server without persisting the change
        #[arg(long)]
        dry_run: bool,

        /// Workload name
        name: String,
    },

    /// Show the watched workloads of every matching context
    Status,
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    // stdout is reserved for command output
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let settings = config::load_settings(cli.config.as_deref())?;
    debug!(kubeconfig = ?cli.kubeconfig, namespace = %settings.namespace, "Configured");

    let default_namespace = settings.namespace.clone();
    let ops = Operations::from_kubeconfig(cli.kubeconfig, settings);
    let ns = |namespace: Option<String>| namespace.unwrap_or_else(|| default_namespace.clone());

    let result = match cli.command {
        Commands::Contexts { pattern, all } => {
            inspect::list_contexts(&ops, pattern, all, cli.format).await
        }
        Commands::Pods { context, namespace } => {
            inspect::list_pods(&ops, &context, &ns(namespace), cli.format).await
        }
        Commands::RestartTime {
            context,
            namespace,
            pod,
        } => inspect::show_restart_time(&ops, &context, &ns(namespace), &pod, cli.format).await,
        Commands::LastLog {
            context,
            namespace,
            pod,
        } => inspect::show_last_log(&ops, &context, &ns(namespace), &pod, cli.format).await,
        Commands::Image {
            context,
            namespace,
            kind,
            name,
        } => inspect::show_image(&ops, &context, &ns(namespace), &kind, &name, cli.format).await,
        Commands::Update {
            context,
            namespace,
            kind,
            image,
            dry_run,
            name,
        } => {
            rollout::update_image(
                &ops,
                &context,
                &ns(namespace),
                &kind,
                &name,
                &image,
                dry_run,
                cli.format,
            )
            .await
        }
        Commands::Status => status::show_status(&ops, cli.format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}
