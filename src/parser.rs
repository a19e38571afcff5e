//! GeoJSON parser for SoilGrids point queries.

use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::SoilError;
use crate::model::{DepthBand, Location, Measurement, SoilProperty, Statistic};

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Geometry,
    properties: FeatureProperties,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// `[lon, lat]`
    coordinates: [f64; 2],
}

#[derive(Debug, Deserialize)]
struct FeatureProperties {
    layers: Vec<Layer>,
}

#[derive(Debug, Deserialize)]
struct Layer {
    name: String,
    unit_measure: UnitMeasure,
    depths: Vec<Depth>,
}

#[derive(Debug, Deserialize)]
struct UnitMeasure {
    d_factor: f64,
    mapped_units: String,
    target_units: String,
}

#[derive(Debug, Deserialize)]
struct Depth {
    range: DepthRange,
    values: BTreeMap<String, Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct DepthRange {
    top_depth: f64,
    bottom_depth: f64,
    unit_depth: String,
}

/// Decodes a SoilGrids `properties/query` response into flat [`Measurement`]s.
///
/// One measurement is produced per layer, depth and statistic. Layers or
/// statistics this crate does not know are skipped with a warning.
///
/// # Errors
///
/// Returns [`SoilError::Parse`] if the body is not the expected GeoJSON, a
/// depth is not in centimetres, or a depth band is inverted.
pub fn parse_response(bytes: &[u8]) -> Result<Vec<Measurement>, SoilError> {
    let feature: Feature =
        serde_json::from_slice(bytes).map_err(|e| SoilError::Parse(e.to_string()))?;

    let [lon, lat] = feature.geometry.coordinates;
    let location = Location::new(lat, lon);

    let mut out = Vec::new();

    for layer in feature.properties.layers {
        let property = match layer.name.parse::<SoilProperty>() {
            Ok(p) => p,
            Err(_) => {
                warn!(layer = %layer.name, %location, "Skipping unknown soil property");
                continue;
            }
        };

        for depth in layer.depths {
            if depth.range.unit_depth != "cm" {
                return Err(SoilError::Parse(format!(
                    "unsupported depth unit '{}' for {property}",
                    depth.range.unit_depth
                )));
            }
            let band = DepthBand::new(depth.range.top_depth, depth.range.bottom_depth)
                .map_err(|e| SoilError::Parse(e.to_string()))?;

            for (name, value) in depth.values {
                let Ok(statistic) = name.parse::<Statistic>() else {
                    warn!(statistic = %name, %property, "Skipping unknown statistic");
                    continue;
                };
                out.push(Measurement {
                    location,
                    property,
                    statistic,
                    band,
                    mapped_unit: layer.unit_measure.mapped_units.clone(),
                    target_unit: layer.unit_measure.target_units.clone(),
                    d_factor: layer.unit_measure.d_factor,
                    value,
                });
            }
        }
    }

    Ok(out)
}
