use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::model::{Measurement, Statistic};

/// Summary of one fetched batch, written as a CSV row per run.
#[derive(Debug, Default, Serialize)]
pub struct BatchStats {
    pub timestamp: DateTime<Utc>,
    pub source: Option<String>,

    pub locations: usize,
    pub measurements: usize,
    pub properties: usize,
    pub depth_bands: usize,

    // missing values
    pub missing: usize,
    pub missing_mean: usize,

    // error tracking
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

impl BatchStats {
    pub fn from_measurements(measurements: &[Measurement]) -> Self {
        let locations: BTreeSet<_> = measurements.iter().map(|m| m.location).collect();
        let properties: BTreeSet<_> = measurements.iter().map(|m| m.property).collect();
        let bands: BTreeSet<String> = measurements.iter().map(|m| m.band.label()).collect();

        let missing = measurements.iter().filter(|m| m.is_missing()).count();
        let missing_mean = measurements
            .iter()
            .filter(|m| m.is_missing() && m.statistic == Statistic::Mean)
            .count();

        BatchStats {
            timestamp: Utc::now(),
            source: None,
            locations: locations.len(),
            measurements: measurements.len(),
            properties: properties.len(),
            depth_bands: bands.len(),
            missing,
            missing_mean,
            error_type: None,
            error_message: None,
        }
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    pub fn missing_pct(&self) -> f64 {
        Self::pct(self.missing, self.measurements)
    }

    /// Create an error record with timestamp and error information
    pub fn from_error(error_type: &str, error_message: &str) -> Self {
        BatchStats {
            timestamp: Utc::now(),
            error_type: Some(error_type.to_string()),
            error_message: Some(error_message.to_string()),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }
}
