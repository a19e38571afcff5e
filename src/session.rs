//! Stateful entry point tying the fetch and analysis layers together.

use anyhow::{Context, Result};
use rand::Rng;
use std::collections::BTreeSet;
use tracing::info;

use crate::analyzers::aggregate::aggregate;
use crate::analyzers::correlate::correlate;
use crate::analyzers::rank;
use crate::analyzers::types::{RankedTable, RegressionSummary};
use crate::error::SoilError;
use crate::model::{AggregatedMeasurement, Measurement, SoilProperty, Statistic};
use crate::query::{QueryOptions, SampleRequest, broadcast_locations};
use crate::services::soil_api::SoilDataApi;

/// Owns a [`SoilDataApi`] and the most recently fetched batch.
///
/// Each fetch replaces the stored batch; the analysis helpers work on it.
pub struct SoilGrids<A: SoilDataApi> {
    api: A,
    data: Option<Vec<Measurement>>,
}

impl<A: SoilDataApi> SoilGrids<A> {
    pub fn new(api: A) -> Self {
        Self { api, data: None }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Queries every `(lat, lon)` pair in turn and stores the combined
    /// result. Single values broadcast against the other list.
    pub async fn get_points(
        &mut self,
        lats: &[f64],
        lons: &[f64],
        options: &QueryOptions,
    ) -> Result<&[Measurement]> {
        let locations = broadcast_locations(lats, lons)?;
        info!(points = locations.len(), "Fetching SoilGrids points");

        let mut batch = Vec::new();
        for location in locations {
            let measurements = self
                .api
                .query_point(location, options)
                .await
                .with_context(|| format!("querying {location}"))?;
            batch.extend(measurements);
        }

        Ok(self.data.insert(batch).as_slice())
    }

    /// Draws points from `request`'s bounding box and fetches them.
    pub async fn get_points_sample<R: Rng + ?Sized>(
        &mut self,
        request: &SampleRequest,
        options: &QueryOptions,
        rng: &mut R,
    ) -> Result<&[Measurement]> {
        let points = request.sample(rng)?;
        let (lats, lons): (Vec<f64>, Vec<f64>) = points.iter().map(|p| (p.lat, p.lon)).unzip();
        self.get_points(&lats, &lons, options).await
    }

    pub fn data(&self) -> Result<&[Measurement], SoilError> {
        self.data.as_deref().ok_or(SoilError::NoData)
    }

    /// Replaces the stored batch, e.g. with measurements read from disk.
    pub fn set_data(&mut self, data: Vec<Measurement>) {
        self.data = Some(data);
    }

    /// Depth-weighted means over `[top, bottom)` for the stored batch.
    pub fn aggregate_means(
        &self,
        top: f64,
        bottom: f64,
    ) -> Result<Vec<AggregatedMeasurement>, SoilError> {
        let means: Vec<Measurement> = self
            .data()?
            .iter()
            .filter(|m| m.statistic == Statistic::Mean)
            .cloned()
            .collect();
        aggregate(&means, top, bottom)
    }

    /// Ranks `properties` per location over `[top, bottom)`, keeping the
    /// `top_n` largest if given.
    pub fn rank_properties(
        &self,
        top: f64,
        bottom: f64,
        properties: &BTreeSet<SoilProperty>,
        top_n: Option<usize>,
    ) -> Result<RankedTable, SoilError> {
        let table = rank::rank(&self.aggregate_means(top, bottom)?, properties);
        Ok(match top_n {
            Some(n) => table.top(n),
            None => table,
        })
    }

    /// Dominant texture fraction (sand, silt or clay) per location.
    pub fn main_properties(&self, top: f64, bottom: f64) -> Result<RankedTable, SoilError> {
        Ok(rank::main_properties(&self.aggregate_means(top, bottom)?))
    }

    /// Regresses organic carbon stock on the texture fractions.
    pub fn ocs_correlation(&self, top: f64, bottom: f64) -> Result<RegressionSummary, SoilError> {
        correlate(
            &self.aggregate_means(top, bottom)?,
            SoilProperty::Ocs,
            &SoilProperty::TEXTURE,
        )
    }
}
