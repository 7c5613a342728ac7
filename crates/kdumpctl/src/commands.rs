//! Command handlers for kdumpctl.

use crate::client::KdumpdClient;
use crate::display::{allowed_lines, parse_indices, render_status};
use anyhow::{Context, Result};
use clap::Args;
use kdump_common::{KdumpConfig, ReservedMemory};
use owo_colors::OwoColorize;
use std::io::IsTerminal;

/// Changes applied on top of the daemon's current configuration
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// Enable kernel crash dump
    #[arg(long, conflicts_with = "disable")]
    pub enable: bool,

    /// Disable kernel crash dump
    #[arg(long)]
    pub disable: bool,

    /// Number of crash dumps to keep (0 disables capture)
    #[arg(long, value_name = "N", conflicts_with = "unlimited")]
    pub files_to_save: Option<u32>,

    /// Keep crash dumps without limit
    #[arg(long)]
    pub unlimited: bool,

    /// Delete the oldest dump when the limit is reached
    #[arg(long, conflicts_with = "keep_old_files")]
    pub delete_old_files: bool,

    /// Skip capture when the limit is reached
    #[arg(long)]
    pub keep_old_files: bool,

    /// Crash kernel memory in MB, or "auto"
    #[arg(long, value_name = "SPEC")]
    pub reserved_memory: Option<ReservedMemory>,
}

impl ConfigArgs {
    pub fn apply_to(&self, mut config: KdumpConfig) -> KdumpConfig {
        if self.enable {
            config.enable = true;
        }
        if self.disable {
            config.enable = false;
        }
        if self.unlimited {
            config.files_to_save = None;
        }
        if let Some(n) = self.files_to_save {
            config.files_to_save = Some(n);
        }
        if self.delete_old_files {
            config.delete_old_files = true;
        }
        if self.keep_old_files {
            config.delete_old_files = false;
        }
        if let Some(mem) = &self.reserved_memory {
            config.reserved_memory = mem.clone();
        }
        config
    }
}

fn report_bad_indices(bad: &[String]) {
    for arg in bad {
        eprintln!("Ignoring invalid kernel crash dump index {}", arg);
    }
}

/// Handle show command
pub async fn show(client: &mut KdumpdClient) -> Result<()> {
    let config = client.config().await.context("Show kernel crash dumps")?;
    let status = client.status().await.context("Show kernel crash dumps")?;
    let color = std::io::stdout().is_terminal();
    print!("{}", render_status(&config, &status, color));
    if status.rebooted_after_system_crash {
        let note = "System rebooted due to a system crash.";
        if color {
            println!("\n{}", note.red().bold());
        } else {
            println!("\n{}", note);
        }
    }
    Ok(())
}

/// Handle message command
pub async fn message(client: &mut KdumpdClient, args: &[String]) -> Result<()> {
    let (indices, bad) = parse_indices(args);
    report_bad_indices(&bad);

    let logs = client
        .crash_dmesg(indices)
        .await
        .context("Show kernel crash dump message")?;
    for log in logs {
        if log.is_resolved() {
            println!("Kernel dmesg for Crash Dump {}:{}", log.index, log.filename);
            println!("{}", log.dmesg);
            println!("\n");
        } else {
            eprintln!("Ignoring invalid index {}", log.index);
        }
    }
    Ok(())
}

/// Handle delete command
pub async fn delete(client: &mut KdumpdClient, args: &[String]) -> Result<()> {
    let (indices, bad) = parse_indices(args);
    report_bad_indices(&bad);
    if indices.is_empty() && !bad.is_empty() {
        // Nothing valid left; an empty list would mean "delete everything"
        anyhow::bail!("no valid kernel crash dump index given");
    }

    let removed = client
        .delete_crash_dumps(indices)
        .await
        .context("Delete kernel crash dumps")?;
    println!("Deleted {} kernel crash dump(s)", removed);
    Ok(())
}

/// Handle allowed command
pub async fn allowed(client: &mut KdumpdClient) -> Result<()> {
    let status = client.status().await?;
    for line in allowed_lines(status.crash_count()) {
        println!("{}", line);
    }
    Ok(())
}

/// Handle set command
pub async fn set(client: &mut KdumpdClient, args: &ConfigArgs) -> Result<()> {
    let current = client.config().await?;
    let desired = args.apply_to(current);
    client
        .check_config(&desired)
        .await
        .context("Invalid kernel crash dump configuration")?;
    let message = client.set_config(&desired).await?;
    println!("{}", message.trim_end());
    Ok(())
}

/// Handle check command
pub async fn check(client: &mut KdumpdClient, args: &ConfigArgs) -> Result<()> {
    let current = client.config().await?;
    let proposed = args.apply_to(current);
    client.check_config(&proposed).await?;
    println!("Configuration is valid");
    Ok(())
}
