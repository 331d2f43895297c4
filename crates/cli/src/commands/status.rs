//! `ctxrelay status`: Show system status.

use std::path::Path;

use ctxrelay_config::AppConfig;
use ctxrelay_orchestrator::ContextRelay;

use super::{format_timestamp, load_config};

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let relay = ContextRelay::from_config(&config)?;
    let stats = relay.stats();

    println!("🔐 ctxrelay Status");
    println!("==================");
    println!("  Config dir:    {}", AppConfig::config_dir().display());
    println!("  Vault:         {}", stats.vault.storage_path.display());
    println!(
        "  Encryption:    {}",
        if stats.vault.encrypted { "aes-256-gcm" } else { "disabled" }
    );
    println!("  Contexts:      {}", stats.vault.contexts);
    println!(
        "  Backups:       {} of {} kept",
        stats.vault.backups, stats.vault.max_backups
    );
    println!(
        "  Last backup:   {}",
        stats
            .vault
            .last_backup
            .map(format_timestamp)
            .unwrap_or_else(|| "never".into())
    );
    println!(
        "  Auto-backup:   {}",
        if config.backup.enabled {
            format!("every {}s", config.backup.interval_secs)
        } else {
            "disabled".into()
        }
    );
    println!("  Half-life:     {} ms", config.momentum.half_life_ms);
    println!("  Max contexts:  {}", config.bridge.max_contexts);

    if stats.vault.fallback_mode {
        println!("\n  ⚠️  Vault storage unavailable — running memory-only, backups disabled");
    } else {
        println!("\n  ✅ Vault storage available");
    }

    let config_file = AppConfig::config_dir().join("config.toml");
    if config_path.is_none() && !config_file.exists() {
        println!("  ⚠️  No config file — run `ctxrelay onboard` to create one");
    }

    Ok(())
}
