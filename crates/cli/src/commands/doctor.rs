//! `toolloop doctor` — Diagnose config and backend health.

use toolloop_config::AppConfig;
use toolloop_core::provider::Health;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("Toolloop Doctor — System Diagnostics");
    println!("====================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  [ok]   Config file found: {}", config_path.display());
    } else {
        println!("  [info] No config file, using defaults (run `toolloop init`)");
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  [ok]   Config valid");
            config
        }
        Err(e) => {
            println!("  [fail] Config invalid: {e}");
            println!("\n  1 issue found. Fix the config and re-run.");
            return Ok(());
        }
    };

    let backend = match toolloop_providers::build_from_config(&config.backend) {
        Ok(backend) => backend,
        Err(e) => {
            println!("  [fail] Could not build backend client: {e}");
            return Ok(());
        }
    };

    match backend.health_check().await {
        Health::Healthy => println!("  [ok]   Backend reachable at {}", backend.endpoint()),
        Health::Unreachable { reason } => {
            println!("  [fail] Backend unreachable at {}: {reason}", backend.endpoint());
            issues += 1;
        }
    }

    if issues == 0 {
        match backend.list_models().await {
            Ok(models) => {
                if models.iter().any(|m| m == &config.backend.model) {
                    println!("  [ok]   Model '{}' available", config.backend.model);
                } else {
                    println!(
                        "  [warn] Model '{}' not listed by the backend",
                        config.backend.model
                    );
                    issues += 1;
                }
                for model in &models {
                    println!("           - {model}");
                }
            }
            Err(e) => {
                println!("  [fail] Could not list models: {e}");
                issues += 1;
            }
        }
    }

    let notes = toolloop_tools::NoteStore::new();
    match toolloop_tools::default_registry(&config.tools.disabled, &notes) {
        Ok(registry) => println!("  [ok]   {} tools registered", registry.len()),
        Err(e) => {
            println!("  [fail] Tool registry: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  All checks passed!");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
