//! `preflight models` — print the loaded model capability table.

use preflight_config::AppConfig;
use preflight_providers::ModelCapabilityRegistry;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let registry = ModelCapabilityRegistry::load(
        &config.models,
        &config.default_effort,
        &config.default_provider,
    );

    let models = registry.models();
    if models.is_empty() {
        println!("No models configured.");
        return Ok(());
    }

    println!("{:<28} {:<12} {:<10} {:<9} parallel", "MODEL", "PROVIDER", "FAMILY", "reasoning");
    for model in models {
        println!(
            "{:<28} {:<12} {:<10} {:<9} {}",
            model.id,
            model.provider,
            model.family.as_deref().unwrap_or("-"),
            model.reasoning,
            model.parallel,
        );
    }
    Ok(())
}
