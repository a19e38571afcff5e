//! Query arguments and their validation.
//!
//! Everything here is checked before a request is sent, both to fail fast
//! with a useful message and to keep load off the SoilGrids service.

use rand::Rng;

use crate::error::SoilError;
use crate::model::{Location, SoilProperty, Statistic};

/// Depth labels SoilGrids accepts.
pub const DEPTH_LABELS: [&str; 7] = [
    "0-5cm", "0-30cm", "5-15cm", "15-30cm", "30-60cm", "60-100cm", "100-200cm",
];

/// What to request for each point. Empty selections mean "everything".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub properties: Vec<SoilProperty>,
    pub depths: Vec<String>,
    pub values: Vec<Statistic>,
}

impl QueryOptions {
    /// Builds options from user-supplied names, rejecting unknown ones.
    pub fn parse<S: AsRef<str>>(
        properties: &[S],
        depths: &[S],
        values: &[S],
    ) -> Result<Self, SoilError> {
        let properties = properties
            .iter()
            .map(|p| p.as_ref().parse())
            .collect::<Result<Vec<SoilProperty>, _>>()?;
        let values = values
            .iter()
            .map(|v| v.as_ref().parse())
            .collect::<Result<Vec<Statistic>, _>>()?;

        let unknown: Vec<&str> = depths
            .iter()
            .map(AsRef::as_ref)
            .filter(|d| !DEPTH_LABELS.contains(d))
            .collect();
        if !unknown.is_empty() {
            return Err(SoilError::InvalidArgument(format!(
                "unknown depth '{}', allowed values are '{}'",
                unknown.join("', '"),
                DEPTH_LABELS.join("', '")
            )));
        }

        Ok(Self {
            properties,
            depths: depths.iter().map(|d| d.as_ref().to_string()).collect(),
            values,
        })
    }

    /// Properties to request, all of them if none were selected.
    pub fn resolved_properties(&self) -> Vec<SoilProperty> {
        if self.properties.is_empty() {
            SoilProperty::ALL.to_vec()
        } else {
            dedup(&self.properties)
        }
    }

    pub fn resolved_depths(&self) -> Vec<String> {
        if self.depths.is_empty() {
            DEPTH_LABELS.iter().map(|d| d.to_string()).collect()
        } else {
            dedup(&self.depths)
        }
    }

    /// Statistics to request. The mean is always included since every
    /// analysis step works on it.
    pub fn resolved_values(&self) -> Vec<Statistic> {
        let mut values = if self.values.is_empty() {
            Statistic::ALL.to_vec()
        } else {
            dedup(&self.values)
        };
        if !values.contains(&Statistic::Mean) {
            values.push(Statistic::Mean);
        }
        values
    }
}

fn dedup<T: Clone + PartialEq>(items: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

/// Validates a single coordinate pair and rounds it to query precision.
pub fn validate_location(lat: f64, lon: f64) -> Result<Location, SoilError> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(SoilError::InvalidCoordinate(format!(
            "latitude {lat} is outside [-90, 90]"
        )));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(SoilError::InvalidCoordinate(format!(
            "longitude {lon} is outside [-180, 180]"
        )));
    }
    Ok(Location::new(lat, lon).rounded())
}

/// Pairs latitudes with longitudes.
///
/// A single value on either side is repeated against every value on the
/// other; otherwise both sides must have the same length.
pub fn broadcast_locations(lats: &[f64], lons: &[f64]) -> Result<Vec<Location>, SoilError> {
    let pairs: Vec<(f64, f64)> = match (lats.len(), lons.len()) {
        (0, _) | (_, 0) => {
            return Err(SoilError::InvalidArgument(
                "at least one latitude and one longitude are required".to_string(),
            ));
        }
        (1, _) => lons.iter().map(|lon| (lats[0], *lon)).collect(),
        (_, 1) => lats.iter().map(|lat| (*lat, lons[0])).collect(),
        (a, b) if a == b => lats.iter().copied().zip(lons.iter().copied()).collect(),
        (a, b) => {
            return Err(SoilError::InvalidArgument(format!(
                "cannot pair {a} latitudes with {b} longitudes"
            )));
        }
    };

    pairs
        .into_iter()
        .map(|(lat, lon)| validate_location(lat, lon))
        .collect()
}

/// Bounding box for uniformly sampled points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRequest {
    pub n: usize,
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl Default for SampleRequest {
    fn default() -> Self {
        Self {
            n: 5,
            lat_min: -90.0,
            lat_max: 90.0,
            lon_min: -180.0,
            lon_max: 180.0,
        }
    }
}

impl SampleRequest {
    /// Draws `n` uniformly distributed points. Bounds given in reverse order
    /// are swapped.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<Location>, SoilError> {
        let (lat_lo, lat_hi) = ordered(self.lat_min, self.lat_max);
        let (lon_lo, lon_hi) = ordered(self.lon_min, self.lon_max);

        validate_location(lat_lo, lon_lo)?;
        validate_location(lat_hi, lon_hi)?;

        Ok((0..self.n)
            .map(|_| {
                Location::new(rng.gen_range(lat_lo..=lat_hi), rng.gen_range(lon_lo..=lon_hi))
                    .rounded()
            })
            .collect())
    }
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}
