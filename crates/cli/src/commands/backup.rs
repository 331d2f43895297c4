//! `ctxrelay backup`, `backups`, and `restore`.

use std::path::Path;

use ctxrelay_orchestrator::ContextRelay;

use super::{format_timestamp, load_config};

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let relay = ContextRelay::from_config(&load_config(config_path)?)?;

    match relay.backup() {
        Some(ts) => {
            println!("✅ Backup written: {ts} ({})", format_timestamp(ts));
            println!("   {} contexts captured", relay.stats().vault.contexts);
        }
        None if relay.vault().is_fallback() => {
            return Err("vault is in memory-only mode; backups are disabled".into());
        }
        None => return Err("backup failed; see the log for details".into()),
    }
    Ok(())
}

pub async fn list(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let relay = ContextRelay::from_config(&load_config(config_path)?)?;
    let backups = relay.list_backups();

    if backups.is_empty() {
        println!("No backups yet. Run `ctxrelay backup` to take one.");
        return Ok(());
    }

    println!("📦 {} backup(s), oldest first:", backups.len());
    for ts in backups {
        println!("  {ts}  {}", format_timestamp(ts));
    }
    Ok(())
}

pub async fn restore(
    config_path: Option<&Path>,
    timestamp: Option<i64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut relay = ContextRelay::from_config(&load_config(config_path)?)?;

    if !relay.restore(timestamp) {
        let which = timestamp.map_or_else(|| "latest".to_string(), |ts| ts.to_string());
        return Err(format!("could not restore the {which} backup").into());
    }

    println!(
        "✅ Restored {} contexts from {}",
        relay.stats().vault.contexts,
        timestamp.map_or_else(|| "the latest backup".to_string(), format_timestamp)
    );
    Ok(())
}
