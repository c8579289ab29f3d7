//! Consolidated status across contexts

use anyhow::{Context, Result};
use colored::Colorize;
use rollwatch_lib::{Operations, Target};
use tabled::Tabled;

use crate::output::{format_timestamp, print_json, print_warning, OutputFormat};

/// Row for status table
#[derive(Tabled)]
struct TargetRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "Last Restart")]
    last_restart: String,
    #[tabled(rename = "Last Log")]
    last_log: String,
    #[tabled(rename = "Last Image Update")]
    last_image_update: String,
}

impl From<&Target> for TargetRow {
    fn from(target: &Target) -> Self {
        Self {
            name: target.name.clone(),
            image: target.current_image.clone(),
            last_restart: format_timestamp(&target.last_restart),
            last_log: format_timestamp(&target.last_log_time),
            last_image_update: format_timestamp(&target.last_image_update),
        }
    }
}

/// Show the watched workloads of every matching context
pub async fn show_status(ops: &Operations, format: OutputFormat) -> Result<()> {
    let targets = ops
        .all_clusters_info()
        .await
        .context("Failed to aggregate cluster status")?;

    match format {
        OutputFormat::Json => print_json(&targets),
        OutputFormat::Table => {
            println!(
                "{} (contexts matching {:?})",
                "Cluster Status".bold(),
                ops.settings().context_pattern
            );
            println!("{}", "=".repeat(60));

            if targets.is_empty() {
                print_warning("No workloads could be probed");
                return Ok(());
            }

            let rows: Vec<TargetRow> = targets.iter().map(TargetRow::from).collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} workloads", targets.len());
            Ok(())
        }
    }
}
