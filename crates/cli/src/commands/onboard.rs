//! `ctxrelay onboard`: First-time setup.

use ctxrelay_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("🔐 ctxrelay — First-Time Setup");
    println!("==============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Review storage and backup settings in {}", config_path.display());
    println!("   2. Run: ctxrelay demo");
    println!("   3. Run: ctxrelay status\n");
    println!("   A vault key is generated on first use and stored next to the vault.");
    println!("   Back it up: without it, encrypted contexts cannot be recovered.\n");

    Ok(())
}
