//! `preflight doctor` — configuration health report.

use preflight_config::AppConfig;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;

    println!("Preflight doctor");
    println!("================");

    let key_status = if config.api_key.is_some() {
        "configured"
    } else {
        "MISSING (set PREFLIGHT_API_KEY or OPENAI_API_KEY)"
    };
    println!("API key:          {key_status}");
    println!("Default provider: {}", config.default_provider);
    println!("Default model:    {}", config.default_model);
    println!("Default chain:    {}", config.default_chain);
    println!(
        "Trim defaults:    target {} tokens, floor {} turns",
        config.trim.target_tokens, config.trim.min_turns
    );
    println!(
        "Retention:        {} ({})",
        config.retention.provider,
        if config.retention.provider == "none" {
            "scoring disabled, metrics report missing"
        } else {
            config.retention.model.as_str()
        }
    );
    println!(
        "Bearer gate:      {}",
        if config.gateway.bearer_secret.is_some() {
            "enabled"
        } else {
            "OPEN (set PREFLIGHT_BEARER_SECRET)"
        }
    );
    println!("Configured models: {}", config.models.len());

    Ok(())
}
