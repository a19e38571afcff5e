//! Trait for the remote soil data provider.

use anyhow::Result;

use crate::model::{Location, Measurement};
use crate::query::QueryOptions;

/// Abstraction over a point-query soil data service (e.g., SoilGrids).
#[async_trait::async_trait]
pub trait SoilDataApi: Send + Sync {
    /// Returns every measurement the service reports for `location` under
    /// the selection in `options`.
    async fn query_point(&self, location: Location, options: &QueryOptions)
    -> Result<Vec<Measurement>>;
}
