//! Core soil data types shared by the fetch, parse and analysis layers.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::SoilError;

/// Decimal places coordinates are rounded to before querying.
pub const COORDINATE_PRECISION: i32 = 6;

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// A sampled point. Identity is the coordinate pair at micro-degree precision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Returns the location rounded to [`COORDINATE_PRECISION`] decimal places.
    pub fn rounded(&self) -> Self {
        Self {
            lat: round_coordinate(self.lat),
            lon: round_coordinate(self.lon),
        }
    }

    fn key(&self) -> (i64, i64) {
        let scale = 10f64.powi(COORDINATE_PRECISION);
        (
            (self.lat * scale).round() as i64,
            (self.lon * scale).round() as i64,
        )
    }
}

pub fn round_coordinate(value: f64) -> f64 {
    let scale = 10f64.powi(COORDINATE_PRECISION);
    (value * scale).round() / scale
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Location {}

impl Hash for Location {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for Location {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Location {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

// ---------------------------------------------------------------------------
// Properties and statistics
// ---------------------------------------------------------------------------

/// Soil properties published by SoilGrids.
///
/// Variants are declared in lexicographic order of their API names, so the
/// derived `Ord` doubles as the deterministic tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoilProperty {
    Bdod,
    Cec,
    Cfvo,
    Clay,
    Nitrogen,
    Ocd,
    Ocs,
    Phh2o,
    Sand,
    Silt,
    Soc,
    Wv0010,
    Wv0033,
    Wv1500,
}

impl SoilProperty {
    pub const ALL: [SoilProperty; 14] = [
        SoilProperty::Bdod,
        SoilProperty::Cec,
        SoilProperty::Cfvo,
        SoilProperty::Clay,
        SoilProperty::Nitrogen,
        SoilProperty::Ocd,
        SoilProperty::Ocs,
        SoilProperty::Phh2o,
        SoilProperty::Sand,
        SoilProperty::Silt,
        SoilProperty::Soc,
        SoilProperty::Wv0010,
        SoilProperty::Wv0033,
        SoilProperty::Wv1500,
    ];

    /// The three particle-size fractions.
    pub const TEXTURE: [SoilProperty; 3] =
        [SoilProperty::Sand, SoilProperty::Silt, SoilProperty::Clay];

    pub fn as_str(&self) -> &'static str {
        match self {
            SoilProperty::Bdod => "bdod",
            SoilProperty::Cec => "cec",
            SoilProperty::Cfvo => "cfvo",
            SoilProperty::Clay => "clay",
            SoilProperty::Nitrogen => "nitrogen",
            SoilProperty::Ocd => "ocd",
            SoilProperty::Ocs => "ocs",
            SoilProperty::Phh2o => "phh2o",
            SoilProperty::Sand => "sand",
            SoilProperty::Silt => "silt",
            SoilProperty::Soc => "soc",
            SoilProperty::Wv0010 => "wv0010",
            SoilProperty::Wv0033 => "wv0033",
            SoilProperty::Wv1500 => "wv1500",
        }
    }
}

impl fmt::Display for SoilProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SoilProperty {
    type Err = SoilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SoilProperty::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| SoilError::InvalidArgument(format!("unknown soil property '{s}'")))
    }
}

/// Summary statistic a SoilGrids value describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Statistic {
    #[serde(rename = "mean")]
    Mean,
    #[serde(rename = "Q0.05")]
    Q05,
    #[serde(rename = "Q0.5")]
    Q50,
    #[serde(rename = "Q0.95")]
    Q95,
    #[serde(rename = "uncertainty")]
    Uncertainty,
}

impl Statistic {
    pub const ALL: [Statistic; 5] = [
        Statistic::Q50,
        Statistic::Q05,
        Statistic::Q95,
        Statistic::Mean,
        Statistic::Uncertainty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::Q05 => "Q0.05",
            Statistic::Q50 => "Q0.5",
            Statistic::Q95 => "Q0.95",
            Statistic::Uncertainty => "uncertainty",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Statistic {
    type Err = SoilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Statistic::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| SoilError::InvalidArgument(format!("unknown statistic '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Depth bands
// ---------------------------------------------------------------------------

/// A half-open depth interval `[top, bottom)` in centimetres.
///
/// Deserialization goes through [`DepthBand::new`], so an inverted band is
/// rejected there as well.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDepthBand")]
pub struct DepthBand {
    top: f64,
    bottom: f64,
}

#[derive(Deserialize)]
struct RawDepthBand {
    top: f64,
    bottom: f64,
}

impl TryFrom<RawDepthBand> for DepthBand {
    type Error = SoilError;

    fn try_from(raw: RawDepthBand) -> Result<Self, Self::Error> {
        DepthBand::new(raw.top, raw.bottom)
    }
}

impl DepthBand {
    pub fn new(top: f64, bottom: f64) -> Result<Self, SoilError> {
        // Written so NaN bounds are rejected too.
        if !(top < bottom) {
            return Err(SoilError::InvalidRange { top, bottom });
        }
        Ok(Self { top, bottom })
    }

    pub fn top(&self) -> f64 {
        self.top
    }

    pub fn bottom(&self) -> f64 {
        self.bottom
    }

    pub fn thickness(&self) -> f64 {
        self.bottom - self.top
    }

    /// Length of the intersection with `other`, zero when disjoint.
    pub fn overlap(&self, other: &DepthBand) -> f64 {
        (self.bottom.min(other.bottom) - self.top.max(other.top)).max(0.0)
    }

    /// SoilGrids style label, e.g. `0-30cm`.
    pub fn label(&self) -> String {
        format!("{}-{}cm", self.top, self.bottom)
    }
}

impl fmt::Display for DepthBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

// ---------------------------------------------------------------------------
// Measurements
// ---------------------------------------------------------------------------

/// One value for a (location, property, depth band, statistic) tuple.
///
/// `value` is expressed in `mapped_unit`; dividing by `d_factor` converts it
/// to `target_unit`.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub location: Location,
    pub property: SoilProperty,
    pub statistic: Statistic,
    pub band: DepthBand,
    pub mapped_unit: String,
    pub target_unit: String,
    pub d_factor: f64,
    pub value: Option<f64>,
}

/// Result of depth-weighted aggregation: same shape, band set to the target.
pub type AggregatedMeasurement = Measurement;

impl Measurement {
    pub fn depth_top(&self) -> f64 {
        self.band.top()
    }

    pub fn depth_bottom(&self) -> f64 {
        self.band.bottom()
    }

    pub fn is_missing(&self) -> bool {
        self.value.is_none()
    }

    /// Value in `target_unit`, if present.
    pub fn converted_value(&self) -> Option<f64> {
        match self.value {
            Some(v) if self.d_factor != 0.0 => Some(v / self.d_factor),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_band_rejects_inverted_and_empty() {
        assert!(DepthBand::new(30.0, 0.0).is_err());
        assert!(DepthBand::new(5.0, 5.0).is_err());
        assert!(DepthBand::new(f64::NAN, 5.0).is_err());
        assert!(DepthBand::new(0.0, 5.0).is_ok());
    }

    #[test]
    fn test_depth_band_deserialize_validates() {
        let err = serde_json::from_str::<DepthBand>(r#"{"top":30.0,"bottom":0.0}"#).unwrap_err();
        assert!(err.to_string().contains("30"));
        assert!(serde_json::from_str::<DepthBand>(r#"{"top":5.0,"bottom":5.0}"#).is_err());

        let band: DepthBand = serde_json::from_str(r#"{"top":0.0,"bottom":30.0}"#).unwrap();
        assert_eq!(band, DepthBand::new(0.0, 30.0).unwrap());
    }

    #[test]
    fn test_overlap() {
        let target = DepthBand::new(0.0, 15.0).unwrap();
        assert_eq!(DepthBand::new(0.0, 5.0).unwrap().overlap(&target), 5.0);
        assert_eq!(DepthBand::new(5.0, 15.0).unwrap().overlap(&target), 10.0);
        assert_eq!(DepthBand::new(15.0, 30.0).unwrap().overlap(&target), 0.0);
        assert_eq!(DepthBand::new(10.0, 60.0).unwrap().overlap(&target), 5.0);
    }

    #[test]
    fn test_location_identity_uses_six_decimals() {
        let a = Location::new(55.1234561, 8.0);
        let b = Location::new(55.1234564, 8.0);
        let c = Location::new(55.123457, 8.0);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a < c);
    }

    #[test]
    fn test_property_round_trips_through_name() {
        for p in SoilProperty::ALL {
            assert_eq!(p.as_str().parse::<SoilProperty>().unwrap(), p);
        }
        assert!("loam".parse::<SoilProperty>().is_err());
    }

    #[test]
    fn test_property_order_is_lexicographic() {
        let mut names: Vec<_> = SoilProperty::ALL.iter().map(|p| p.as_str()).collect();
        names.sort();
        let ordered: Vec<_> = SoilProperty::ALL.iter().map(|p| p.as_str()).collect();
        assert_eq!(names, ordered);
    }

    #[test]
    fn test_statistic_names() {
        assert_eq!("Q0.05".parse::<Statistic>().unwrap(), Statistic::Q05);
        assert_eq!(Statistic::Mean.to_string(), "mean");
        assert!("Q0.25".parse::<Statistic>().is_err());
    }

    #[test]
    fn test_converted_value() {
        let m = Measurement {
            location: Location::new(0.0, 0.0),
            property: SoilProperty::Clay,
            statistic: Statistic::Mean,
            band: DepthBand::new(0.0, 5.0).unwrap(),
            mapped_unit: "g/kg".to_string(),
            target_unit: "%".to_string(),
            d_factor: 10.0,
            value: Some(290.0),
        };
        assert_eq!(m.converted_value(), Some(29.0));
        assert_eq!(m.depth_top(), 0.0);
        assert_eq!(m.depth_bottom(), 5.0);
    }
}
