use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{Method, Request, StatusCode, Url};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::fetch::{BasicClient, HttpClient, Throttle};
use crate::model::{Location, Measurement};
use crate::parser::parse_response;
use crate::query::QueryOptions;
use crate::services::soil_api::SoilDataApi;

/// Point-query client for the ISRIC SoilGrids REST API.
pub struct SoilGridsClient<C: HttpClient = BasicClient> {
    http: C,
    base_url: Url,
    retry_wait: std::time::Duration,
    throttle: Throttle,
}

impl SoilGridsClient<BasicClient> {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = BasicClient::with_config(config)?;
        Self::with_http_client(http, config)
    }
}

impl<C: HttpClient> SoilGridsClient<C> {
    pub fn with_http_client(http: C, config: &ClientConfig) -> Result<Self> {
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url =
            Url::parse(&base).with_context(|| format!("invalid base url '{}'", config.base_url))?;

        Ok(Self {
            http,
            base_url,
            retry_wait: config.retry_wait,
            throttle: Throttle::new(config.request_interval),
        })
    }

    /// `properties/query` URL for one point, with list arguments repeated.
    pub fn query_url(&self, location: Location, options: &QueryOptions) -> Result<Url> {
        let mut url = self.base_url.join("properties/query")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("lon", &location.lon.to_string())
                .append_pair("lat", &location.lat.to_string());
            for property in options.resolved_properties() {
                pairs.append_pair("property", property.as_str());
            }
            for depth in options.resolved_depths() {
                pairs.append_pair("depth", &depth);
            }
            for value in options.resolved_values() {
                pairs.append_pair("value", value.as_str());
            }
        }
        Ok(url)
    }

    fn request(url: &Url) -> Request {
        let mut req = Request::new(Method::GET, url.clone());
        req.headers_mut()
            .insert(ACCEPT, HeaderValue::from_static("application/geojson"));
        req
    }

    /// GETs `url`, retrying once after a rate-limit response.
    async fn get(&self, url: &Url) -> Result<Vec<u8>> {
        let mut retried = false;
        loop {
            self.throttle.wait().await;

            let response = self
                .http
                .execute(Self::request(url))
                .await
                .map_err(|e| anyhow!("Failed to send SoilGrids request: {}", e))?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS && !retried {
                warn!(
                    retry_wait_secs = self.retry_wait.as_secs(),
                    "SoilGrids rate limit hit, retrying once"
                );
                tokio::time::sleep(self.retry_wait).await;
                retried = true;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(anyhow!("SoilGrids returned status {}: {}", status, body));
            }

            return Ok(response.bytes().await?.to_vec());
        }
    }
}

#[async_trait]
impl<C: HttpClient> SoilDataApi for SoilGridsClient<C> {
    #[tracing::instrument(skip_all, fields(%location))]
    async fn query_point(
        &self,
        location: Location,
        options: &QueryOptions,
    ) -> Result<Vec<Measurement>> {
        let url = self.query_url(location, options)?;
        debug!(%url, "Querying SoilGrids");

        let body = self.get(&url).await?;
        let measurements = parse_response(&body)
            .with_context(|| format!("parsing SoilGrids response for {location}"))?;

        debug!(count = measurements.len(), "Point parsed");
        Ok(measurements)
    }
}
