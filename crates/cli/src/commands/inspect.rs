//! Read-only inspection commands

use anyhow::{Context, Result};
use colored::Colorize;
use rollwatch_lib::{filter_by_name_pattern, Operations};
use serde::Serialize;
use serde_json::json;
use tabled::Tabled;

use crate::output::{format_timestamp, print_json, print_table, OutputFormat};

/// Row for contexts table
#[derive(Tabled, Serialize)]
struct ContextRow {
    #[tabled(rename = "Context")]
    name: String,
    #[tabled(rename = "Cluster")]
    cluster: String,
}

/// Row for pods table
#[derive(Tabled, Serialize)]
struct PodRow {
    #[tabled(rename = "Pod")]
    name: String,
}

/// List kubeconfig contexts, filtered by `pattern` unless `all` is set
pub async fn list_contexts(
    ops: &Operations,
    pattern: Option<String>,
    all: bool,
    format: OutputFormat,
) -> Result<()> {
    let contexts = ops
        .list_contexts()
        .await
        .context("Failed to read kubeconfig contexts")?;

    let contexts = if all {
        contexts
    } else {
        let pattern = pattern.unwrap_or_else(|| ops.settings().context_pattern.clone());
        filter_by_name_pattern(&contexts, &pattern)
    };

    let rows: Vec<ContextRow> = contexts
        .into_iter()
        .map(|c| ContextRow {
            name: c.name,
            cluster: c.cluster,
        })
        .collect();

    print_table(&rows, format)
}

/// List pod names in a namespace
pub async fn list_pods(
    ops: &Operations,
    context: &str,
    namespace: &str,
    format: OutputFormat,
) -> Result<()> {
    let names = ops
        .list_pod_names(context, namespace)
        .await
        .with_context(|| format!("Failed to list pods in {}/{}", context, namespace))?;

    let rows: Vec<PodRow> = names.into_iter().map(|name| PodRow { name }).collect();
    print_table(&rows, format)
}

pub async fn show_restart_time(
    ops: &Operations,
    context: &str,
    namespace: &str,
    pod: &str,
    format: OutputFormat,
) -> Result<()> {
    let restarted = ops
        .restart_time(context, namespace, pod)
        .await
        .with_context(|| format!("Failed to read restart time of pod {}", pod))?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "context": context,
            "namespace": namespace,
            "pod": pod,
            "last_restart": restarted,
        })),
        OutputFormat::Table => {
            println!("{} {}", "Last restart:".bold(), format_timestamp(&restarted));
            Ok(())
        }
    }
}

pub async fn show_last_log(
    ops: &Operations,
    context: &str,
    namespace: &str,
    pod: &str,
    format: OutputFormat,
) -> Result<()> {
    let logged = ops
        .last_log_time(context, namespace, pod)
        .await
        .with_context(|| format!("No user activity found in logs of pod {}", pod))?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "context": context,
            "namespace": namespace,
            "pod": pod,
            "last_log_time": logged,
        })),
        OutputFormat::Table => {
            println!("{} {}", "Last activity:".bold(), format_timestamp(&logged));
            Ok(())
        }
    }
}

pub async fn show_image(
    ops: &Operations,
    context: &str,
    namespace: &str,
    kind: &str,
    name: &str,
    format: OutputFormat,
) -> Result<()> {
    let update = ops
        .last_image_update(context, namespace, name, kind)
        .await
        .with_context(|| format!("Failed to read image of {} {}", kind, name))?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "context": context,
            "namespace": namespace,
            "kind": kind,
            "name": name,
            "image": update.image,
            "last_image_update": update.updated_at,
        })),
        OutputFormat::Table => {
            println!("{} {}", "Image:       ".bold(), update.image.cyan());
            println!("{} {}", "Last update: ".bold(), format_timestamp(&update.updated_at));
            Ok(())
        }
    }
}
