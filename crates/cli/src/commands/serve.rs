//! `preflight serve` — start the HTTP gateway.

use preflight_config::AppConfig;

pub async fn run(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load()?;
    if let Some(port) = port {
        config.gateway.port = port;
    }

    if config.gateway.bearer_secret.is_none() {
        tracing::warn!(
            "No bearer secret configured — gateway endpoints are open. \
             Set PREFLIGHT_BEARER_SECRET to guard them."
        );
    }

    preflight_gateway::start(config).await
}
