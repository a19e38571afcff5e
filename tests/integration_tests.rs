use approx::assert_relative_eq;
use soilgrids::analyzers::aggregate::{AggregationRequest, MissingPolicy, aggregate, aggregate_with};
use soilgrids::analyzers::correlate::correlate;
use soilgrids::analyzers::rank::{main_properties, rank};
use soilgrids::model::{Location, Measurement, SoilProperty, Statistic};
use soilgrids::output::{read_measurements, write_measurements};
use soilgrids::parser::parse_response;
use soilgrids::stats::BatchStats;
use std::collections::BTreeSet;

fn fixture() -> Vec<Measurement> {
    let bytes = include_bytes!("fixtures/soilgrids_response.json");
    parse_response(bytes).expect("Failed to parse response")
}

fn value(aggregated: &[Measurement], property: SoilProperty, statistic: Statistic) -> Option<f64> {
    aggregated
        .iter()
        .find(|m| m.property == property && m.statistic == statistic)
        .and_then(|m| m.value)
}

/// Copies the fixture to `i` degrees away with property-specific scaling.
fn shifted(base: &[Measurement], i: usize) -> Vec<Measurement> {
    let x = i as f64;
    base.iter()
        .cloned()
        .map(|mut m| {
            m.location = Location::new(m.location.lat - x, m.location.lon + x);
            let factor = match m.property {
                SoilProperty::Sand => 1.0 + 0.1 * x,
                SoilProperty::Silt => 1.0 - 0.03 * x + 0.01 * (i % 3) as f64,
                SoilProperty::Clay => 1.0 + 0.02 * x * x,
                SoilProperty::Ocs => 1.0 + 0.05 * x - 0.04 * (i % 2) as f64,
                _ => 1.0,
            };
            m.value = m.value.map(|v| v * factor);
            m
        })
        .collect()
}

#[test]
fn test_parse_fixture() {
    let measurements = fixture();
    assert_eq!(measurements.len(), 26);

    let stats = BatchStats::from_measurements(&measurements);
    assert_eq!(stats.locations, 1);
    assert_eq!(stats.properties, 4);
    assert_eq!(stats.depth_bands, 5);
    assert_eq!(stats.missing, 2);
    assert_eq!(stats.missing_mean, 1);
}

#[test]
fn test_full_pipeline_single_point() {
    let aggregated = aggregate(&fixture(), 0.0, 30.0).unwrap();

    // 4 properties x 2 statistics
    assert_eq!(aggregated.len(), 8);
    assert!(aggregated.iter().all(|m| m.depth_top() == 0.0 && m.depth_bottom() == 30.0));

    assert_relative_eq!(
        value(&aggregated, SoilProperty::Sand, Statistic::Mean).unwrap(),
        12200.0 / 30.0,
        epsilon = 1e-9
    );
    // The 15-30cm clay band is missing, so only 0-15cm contributes.
    assert_relative_eq!(
        value(&aggregated, SoilProperty::Clay, Statistic::Mean).unwrap(),
        3500.0 / 15.0,
        epsilon = 1e-9
    );
    assert_eq!(value(&aggregated, SoilProperty::Ocs, Statistic::Mean), Some(55.0));

    let main = main_properties(&aggregated);
    assert_eq!(main.len(), 1);
    assert_eq!(main.rows[0].leading(), Some(SoilProperty::Sand));

    let texture: BTreeSet<_> = SoilProperty::TEXTURE.into_iter().collect();
    let ranked = rank(&aggregated, &texture);
    let order: Vec<_> = ranked.rows[0].ranked.iter().map(|(p, _)| *p).collect();
    assert_eq!(order, vec![SoilProperty::Sand, SoilProperty::Silt, SoilProperty::Clay]);
}

#[test]
fn test_propagate_policy_hides_partial_clay() {
    let request = AggregationRequest::new(0.0, 30.0)
        .unwrap()
        .with_missing_policy(MissingPolicy::Propagate);
    let aggregated = aggregate_with(&fixture(), &request);

    assert_eq!(value(&aggregated, SoilProperty::Clay, Statistic::Mean), None);
    assert!(value(&aggregated, SoilProperty::Sand, Statistic::Mean).is_some());

    // Without clay, the location drops out of a texture ranking.
    assert!(main_properties(&aggregated).is_empty());
}

#[test]
fn test_correlation_over_several_points() {
    let base = fixture();
    let batch: Vec<Measurement> = (0..6).flat_map(|i| shifted(&base, i)).collect();

    let aggregated = aggregate(&batch, 0.0, 30.0).unwrap();
    let summary = correlate(&aggregated, SoilProperty::Ocs, &SoilProperty::TEXTURE).unwrap();

    assert_eq!(summary.observations, 6);
    assert_eq!(summary.degrees_of_freedom, 2);
    assert_eq!(summary.coefficients.len(), 4);
    assert_eq!(summary.formula(), "ocs ~ sand + silt + clay");
    assert!((0.0..=1.0).contains(&summary.r_squared));

    let text = summary.to_string();
    assert!(text.contains("Residual standard error"));
    assert!(text.contains("on 3 and 2 DF"));
}

#[test]
fn test_correlation_needs_enough_points() {
    let base = fixture();
    let batch: Vec<Measurement> = (0..4).flat_map(|i| shifted(&base, i)).collect();
    let aggregated = aggregate(&batch, 0.0, 30.0).unwrap();

    let err = correlate(&aggregated, SoilProperty::Ocs, &SoilProperty::TEXTURE).unwrap_err();
    assert_eq!(
        err,
        soilgrids::SoilError::InsufficientData {
            rows: 4,
            required: 5
        }
    );
}

#[test]
fn test_saved_batch_aggregates_the_same() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("batch.csv");
    let measurements = fixture();

    let written = write_measurements(path.to_str().unwrap(), &measurements, true).unwrap();
    let restored = read_measurements(&written).unwrap();

    assert_eq!(
        aggregate(&restored, 0.0, 30.0).unwrap(),
        aggregate(&measurements, 0.0, 30.0).unwrap()
    );
}
