//! Image rollout command

use anyhow::{Context, Result};
use colored::Colorize;
use rollwatch_lib::{Operations, RolloutSummary};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::debug;

use crate::output::{print_info, print_json, print_success, OutputFormat};

/// Update a workload image; Ctrl-C cancels the wait
#[allow(clippy::too_many_arguments)]
pub async fn update_image(
    ops: &Operations,
    context: &str,
    namespace: &str,
    kind: &str,
    name: &str,
    image: &str,
    dry_run: bool,
    format: OutputFormat,
) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received, cancelling rollout");
            let _ = shutdown_tx.send(());
        }
    });

    if !dry_run && format == OutputFormat::Table {
        print_info(&format!(
            "Updating {} {} in {}/{} to {}",
            kind,
            name,
            context,
            namespace,
            image.cyan()
        ));
    }

    let result = ops
        .update_image(context, name, namespace, image, kind, dry_run, Some(shutdown_rx))
        .await;
    signal.abort();

    let summary =
        result.with_context(|| format!("Image update of {} {} did not complete", kind, name))?;

    match (format, &summary) {
        (OutputFormat::Json, RolloutSummary::DryRun { rendered, .. }) => {
            let object: serde_json::Value = serde_json::from_str(rendered)?;
            print_json(&json!({
                "dry_run": true,
                "image": image,
                "object": object,
            }))
        }
        (OutputFormat::Json, RolloutSummary::Completed { replicas, elapsed, polls, .. }) => {
            print_json(&json!({
                "dry_run": false,
                "image": image,
                "replicas": replicas,
                "elapsed_secs": elapsed.as_secs(),
                "polls": polls,
            }))
        }
        (OutputFormat::Table, RolloutSummary::DryRun { .. }) => {
            println!("{}", "Dry run, nothing was changed".yellow());
            println!("{}", summary);
            Ok(())
        }
        (OutputFormat::Table, RolloutSummary::Completed { .. }) => {
            print_success(&summary.to_string());
            Ok(())
        }
    }
}
