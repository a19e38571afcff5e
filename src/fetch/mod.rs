mod basic;
mod client;
mod throttle;

pub use basic::BasicClient;
pub use client::HttpClient;
pub use throttle::Throttle;

use anyhow::{Result, anyhow};

/// Fetches `url` and returns the body, failing on non-success statuses.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(anyhow!("{} returned status {}: {}", url, status, body));
    }
    Ok(resp.bytes().await?.to_vec())
}
