use crate::analyzers::types::{RankedRow, RankedTable};
use crate::model::{AggregatedMeasurement, Location, SoilProperty, Statistic};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Ranks `properties` per location by descending aggregated mean.
///
/// A location is dropped entirely if any requested property is missing,
/// whether the record is absent or its value is `None`. Equal values keep
/// the property name order.
pub fn rank(aggregated: &[AggregatedMeasurement], properties: &BTreeSet<SoilProperty>) -> RankedTable {
    let mut by_location: BTreeMap<Location, BTreeMap<SoilProperty, Option<f64>>> = BTreeMap::new();

    for m in aggregated {
        if m.statistic != Statistic::Mean || !properties.contains(&m.property) {
            continue;
        }
        by_location
            .entry(m.location)
            .or_default()
            .insert(m.property, m.value);
    }

    let total = by_location.len();

    let rows: Vec<RankedRow> = by_location
        .into_iter()
        .filter_map(|(location, values)| {
            let mut ranked = properties
                .iter()
                .map(|p| values.get(p).copied().flatten().map(|v| (*p, v)))
                .collect::<Option<Vec<_>>>()?;

            // Stable sort, so ties stay in property order.
            ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
            Some(RankedRow { location, ranked })
        })
        .collect();

    debug!(
        locations = total,
        ranked = rows.len(),
        dropped = total - rows.len(),
        "Ranked properties"
    );

    RankedTable { rows }
}

/// Most prevalent particle-size fraction (sand, silt or clay) per location.
pub fn main_properties(aggregated: &[AggregatedMeasurement]) -> RankedTable {
    let texture: BTreeSet<_> = SoilProperty::TEXTURE.into_iter().collect();
    rank(aggregated, &texture).top(1)
}
