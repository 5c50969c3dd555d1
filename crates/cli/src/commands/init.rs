//! `uiscout init`: Write a starter configuration.

use std::path::Path;
use uiscout_config::{AppConfig, DEFAULT_CONFIG_FILE};

pub async fn run(path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));

    if path.exists() && !force {
        println!("  Config already exists: {} (use --force to overwrite)", path.display());
        return Ok(());
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, AppConfig::default_toml()).await?;
    println!("✅ Wrote {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Add [[scenarios]] with an id and a goal");
    println!("  2. Run `uiscout validate`");
    println!("  3. Run `uiscout plan` to see what would run");

    Ok(())
}
