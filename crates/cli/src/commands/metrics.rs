//! `preflight metrics` — fetch and print gateway metrics.
//!
//! Uses the JSON exposition so a Missing retention prints as `null`
//! rather than being collapsed to a number.

pub async fn run(base_url: &str, token: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let url = format!("{}/metrics/json", base_url.trim_end_matches('/'));

    let client = reqwest::Client::new();
    let mut request = client.get(&url);
    if let Some(token) = token {
        request = request.header("Authorization", format!("Bearer {token}"));
    }

    let response = request.send().await?;
    if !response.status().is_success() {
        return Err(format!("gateway returned {}", response.status()).into());
    }

    let metrics: serde_json::Value = response.json().await?;
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}
