//! `toolloop tools` — Print the catalog offered to the model.

pub fn run(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let notes = toolloop_tools::NoteStore::new();
    let registry = toolloop_tools::default_registry(&config.tools.disabled, &notes)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&registry.definitions())?);
        return Ok(());
    }

    println!("{} tools:\n", registry.len());
    for def in registry.definitions() {
        println!("  {:<14} {}", def.name, def.description);
    }
    if !config.tools.disabled.is_empty() {
        println!("\n  disabled: {}", config.tools.disabled.join(", "));
    }

    Ok(())
}
