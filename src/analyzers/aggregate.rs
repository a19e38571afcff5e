use crate::error::SoilError;
use crate::model::{AggregatedMeasurement, DepthBand, Location, Measurement, SoilProperty, Statistic};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// How missing values inside a partition affect the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingPolicy {
    /// Missing bands are dropped from both numerator and denominator; the
    /// remaining overlap weights are renormalized. The result is missing
    /// only when no overlapping band has a value.
    ///
    /// Partial missingness therefore shrinks the effective depth range
    /// silently. Callers who need a strict answer should use `Propagate`.
    #[default]
    DropAndRenormalize,
    /// Any overlapping band with a missing value makes the result missing.
    Propagate,
}

/// Target depth range plus missing-value policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregationRequest {
    pub band: DepthBand,
    pub missing: MissingPolicy,
}

impl AggregationRequest {
    pub fn new(target_top: f64, target_bottom: f64) -> Result<Self, SoilError> {
        Ok(Self {
            band: DepthBand::new(target_top, target_bottom)?,
            missing: MissingPolicy::default(),
        })
    }

    pub fn with_missing_policy(mut self, missing: MissingPolicy) -> Self {
        self.missing = missing;
        self
    }
}

type PartitionKey = (Location, SoilProperty, Statistic);

/// Reduces depth-banded measurements to one value per partition over
/// `[target_top, target_bottom)` using the default missing policy.
///
/// See [`aggregate_with`].
pub fn aggregate(
    measurements: &[Measurement],
    target_top: f64,
    target_bottom: f64,
) -> Result<Vec<AggregatedMeasurement>, SoilError> {
    let request = AggregationRequest::new(target_top, target_bottom)?;
    Ok(aggregate_with(measurements, &request))
}

/// Depth-weighted mean per `(location, property, statistic)`.
///
/// Each band contributes `value * overlap`, where `overlap` is the length of
/// its intersection with the target band; the sum is divided by the total
/// overlap of the contributing bands. Bands that do not overlap the target
/// are ignored. Output order is sorted by partition key, so it does not
/// depend on input order.
pub fn aggregate_with(
    measurements: &[Measurement],
    request: &AggregationRequest,
) -> Vec<AggregatedMeasurement> {
    let mut partitions: BTreeMap<PartitionKey, Vec<&Measurement>> = BTreeMap::new();

    for m in measurements {
        partitions
            .entry((m.location, m.property, m.statistic))
            .or_default()
            .push(m);
    }

    debug!(
        partitions = partitions.len(),
        measurements = measurements.len(),
        target = %request.band,
        "Aggregating measurements"
    );

    partitions
        .into_values()
        .map(|mut members| {
            members.sort_by(|a, b| a.depth_top().total_cmp(&b.depth_top()));
            aggregate_partition(&members, request)
        })
        .collect()
}

fn aggregate_partition(members: &[&Measurement], request: &AggregationRequest) -> AggregatedMeasurement {
    let target = &request.band;

    let mut weighted_total = 0.0;
    let mut weight_sum = 0.0;
    let mut saw_missing = false;
    let mut contributor: Option<&Measurement> = None;

    for &m in members {
        let overlap = m.band.overlap(target);
        if overlap <= 0.0 {
            continue;
        }

        match m.value {
            Some(value) => {
                weighted_total += value * overlap;
                weight_sum += overlap;

                match contributor {
                    None => contributor = Some(m),
                    Some(first) if first.mapped_unit != m.mapped_unit => {
                        warn!(
                            location = %m.location,
                            property = %m.property,
                            first_unit = %first.mapped_unit,
                            unit = %m.mapped_unit,
                            "Inconsistent units within partition, no conversion applied"
                        );
                    }
                    Some(_) => {}
                }
            }
            None => saw_missing = true,
        }
    }

    let value = if weight_sum == 0.0 {
        None
    } else if saw_missing && request.missing == MissingPolicy::Propagate {
        None
    } else {
        Some(weighted_total / weight_sum)
    };

    // Partitions are never empty; fall back to the shallowest band for units.
    let template = contributor.unwrap_or(members[0]);

    Measurement {
        location: template.location,
        property: template.property,
        statistic: template.statistic,
        band: *target,
        mapped_unit: template.mapped_unit.clone(),
        target_unit: template.target_unit.clone(),
        d_factor: template.d_factor,
        value,
    }
}
