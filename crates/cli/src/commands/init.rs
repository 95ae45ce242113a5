//! `toolloop init` — Write a default config file.

use toolloop_config::AppConfig;

pub fn run(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    }

    if config_path.exists() && !force {
        println!("Config already exists at: {}", config_path.display());
        println!("   Edit it manually or re-run with --force.");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("Wrote config.toml at: {}", config_path.display());
    println!("\nNext steps:");
    println!("   1. Start Ollama and pull a tool-capable model (ollama pull qwen3:8b)");
    println!("   2. Run: toolloop doctor");
    println!("   3. Run: toolloop chat\n");

    Ok(())
}
