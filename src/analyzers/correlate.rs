use crate::analyzers::regression::{LinearRegression, OrdinaryLeastSquares};
use crate::analyzers::types::{RegressionSummary, WideRow, WideTable};
use crate::error::SoilError;
use crate::model::{AggregatedMeasurement, Location, SoilProperty, Statistic};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Pivots aggregated means from long form into one row per location and one
/// column per entry of `columns`.
///
/// Locations with no record for a column get `None` in that cell.
pub fn wide_table(aggregated: &[AggregatedMeasurement], columns: &[SoilProperty]) -> WideTable {
    let mut rows: BTreeMap<Location, Vec<Option<f64>>> = BTreeMap::new();

    for m in aggregated {
        if m.statistic != Statistic::Mean {
            continue;
        }
        let Some(idx) = columns.iter().position(|c| *c == m.property) else {
            continue;
        };
        rows.entry(m.location).or_insert_with(|| vec![None; columns.len()])[idx] = m.value;
    }

    WideTable {
        columns: columns.to_vec(),
        rows: rows
            .into_iter()
            .map(|(location, values)| WideRow { location, values })
            .collect(),
    }
}

/// Regresses `response` on `predictors` using [`OrdinaryLeastSquares`].
///
/// See [`correlate_with`].
pub fn correlate(
    aggregated: &[AggregatedMeasurement],
    response: SoilProperty,
    predictors: &[SoilProperty],
) -> Result<RegressionSummary, SoilError> {
    correlate_with(aggregated, response, predictors, &OrdinaryLeastSquares)
}

/// Reshapes to wide form, keeps complete rows and hands the columns to
/// `regression`.
///
/// Fails with [`SoilError::InsufficientData`] when fewer than
/// `predictors.len() + 2` complete rows remain.
pub fn correlate_with<R: LinearRegression + ?Sized>(
    aggregated: &[AggregatedMeasurement],
    response: SoilProperty,
    predictors: &[SoilProperty],
    regression: &R,
) -> Result<RegressionSummary, SoilError> {
    if predictors.is_empty() {
        return Err(SoilError::InvalidArgument(
            "at least one predictor is required".to_string(),
        ));
    }
    let distinct: BTreeSet<_> = predictors.iter().collect();
    if distinct.len() != predictors.len() {
        return Err(SoilError::InvalidArgument(
            "predictors must be distinct".to_string(),
        ));
    }
    if distinct.contains(&response) {
        return Err(SoilError::InvalidArgument(format!(
            "response '{response}' cannot also be a predictor"
        )));
    }

    let mut columns = Vec::with_capacity(predictors.len() + 1);
    columns.push(response);
    columns.extend_from_slice(predictors);

    let table = wide_table(aggregated, &columns);
    let total_rows = table.rows.len();
    let table = table.complete();

    let required = predictors.len() + 2;
    debug!(
        rows = total_rows,
        complete = table.rows.len(),
        required,
        "Reshaped aggregated data"
    );

    if table.rows.len() < required {
        return Err(SoilError::InsufficientData {
            rows: table.rows.len(),
            required,
        });
    }

    // Every row is complete, so every column resolves.
    let series: Vec<Vec<f64>> = columns
        .iter()
        .map(|c| table.column(*c).unwrap_or_default())
        .collect();

    let predictor_columns: Vec<(&str, &[f64])> = predictors
        .iter()
        .zip(&series[1..])
        .map(|(p, values)| (p.as_str(), values.as_slice()))
        .collect();

    let summary = regression.fit((response.as_str(), series[0].as_slice()), &predictor_columns)?;

    info!(
        formula = %summary.formula(),
        observations = summary.observations,
        r_squared = summary.r_squared,
        "Regression fitted"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::types::{Coefficient, ResidualQuantiles};
    use crate::model::{DepthBand, Measurement};
    use std::cell::RefCell;

    /// Records what reaches the regression step.
    #[derive(Default)]
    struct Recorder {
        seen: RefCell<Option<(usize, usize)>>,
    }

    impl LinearRegression for Recorder {
        fn fit(
            &self,
            response: (&str, &[f64]),
            predictors: &[(&str, &[f64])],
        ) -> Result<RegressionSummary, SoilError> {
            *self.seen.borrow_mut() = Some((response.1.len(), predictors.len() + 1));
            Ok(RegressionSummary {
                response: response.0.to_string(),
                observations: response.1.len(),
                coefficients: vec![Coefficient {
                    term: "(Intercept)".to_string(),
                    estimate: 0.0,
                    std_error: 0.0,
                    t_value: 0.0,
                    p_value: 1.0,
                }],
                residuals: ResidualQuantiles {
                    min: 0.0,
                    q1: 0.0,
                    median: 0.0,
                    q3: 0.0,
                    max: 0.0,
                },
                residual_standard_error: 0.0,
                degrees_of_freedom: 0,
                r_squared: 0.0,
                adj_r_squared: 0.0,
                f_statistic: 0.0,
                f_p_value: 1.0,
            })
        }
    }

    fn agg(i: usize, property: SoilProperty, value: Option<f64>) -> Measurement {
        Measurement {
            location: Location::new(50.0 + i as f64, 8.0),
            property,
            statistic: Statistic::Mean,
            band: DepthBand::new(0.0, 30.0).unwrap(),
            mapped_unit: "g/kg".to_string(),
            target_unit: "%".to_string(),
            d_factor: 10.0,
            value,
        }
    }

    const ALL_FOUR: [SoilProperty; 4] = [
        SoilProperty::Clay,
        SoilProperty::Sand,
        SoilProperty::Silt,
        SoilProperty::Ocs,
    ];

    fn five_complete_locations() -> Vec<Measurement> {
        let values = [
            [220.0, 410.0, 370.0, 48.0],
            [180.0, 520.0, 300.0, 41.0],
            [305.0, 260.0, 435.0, 62.0],
            [120.0, 700.0, 180.0, 35.0],
            [260.0, 330.0, 410.0, 57.0],
        ];
        values
            .iter()
            .enumerate()
            .flat_map(|(i, row)| {
                ALL_FOUR
                    .iter()
                    .zip(row)
                    .map(move |(p, v)| agg(i, *p, Some(*v)))
            })
            .collect()
    }

    #[test]
    fn test_wide_table_shape() {
        let table = wide_table(&five_complete_locations(), &ALL_FOUR);
        assert_eq!(table.rows.len(), 5);
        assert_eq!(table.columns.len(), 4);
        assert!(table.rows.iter().all(|r| r.values.len() == 4 && r.is_complete()));
        assert_eq!(table.column(SoilProperty::Ocs).unwrap()[3], 35.0);
    }

    #[test]
    fn test_all_complete_rows_reach_regression() {
        let recorder = Recorder::default();
        correlate_with(
            &five_complete_locations(),
            SoilProperty::Ocs,
            &[SoilProperty::Clay, SoilProperty::Sand, SoilProperty::Silt],
            &recorder,
        )
        .unwrap();
        assert_eq!(*recorder.seen.borrow(), Some((5, 4)));
    }

    fn two_complete_of_five() -> Vec<Measurement> {
        let mut data = five_complete_locations();
        // Locations 0, 2 and 4 each lose one property.
        data.retain(|m| {
            !(m.location == Location::new(50.0, 8.0) && m.property == SoilProperty::Silt)
        });
        for m in data.iter_mut() {
            if m.location == Location::new(52.0, 8.0) && m.property == SoilProperty::Ocs {
                m.value = None;
            }
            if m.location == Location::new(54.0, 8.0) && m.property == SoilProperty::Clay {
                m.value = None;
            }
        }
        data
    }

    #[test]
    fn test_missing_rows_are_dropped_before_regression() {
        let recorder = Recorder::default();
        let result = correlate_with(
            &two_complete_of_five(),
            SoilProperty::Ocs,
            &[SoilProperty::Clay, SoilProperty::Sand, SoilProperty::Silt],
            &recorder,
        );
        assert_eq!(
            result.unwrap_err(),
            SoilError::InsufficientData { rows: 2, required: 5 }
        );
        assert!(recorder.seen.borrow().is_none());

        let table = wide_table(&two_complete_of_five(), &ALL_FOUR).complete();
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn test_single_predictor_needs_three_rows() {
        // Drop sand wherever another property is already missing, leaving
        // the same two complete rows for the ocs ~ sand fit.
        let data: Vec<_> = two_complete_of_five()
            .into_iter()
            .filter(|m| {
                let incomplete = [50.0, 52.0, 54.0].contains(&m.location.lat);
                !incomplete || m.property != SoilProperty::Sand
            })
            .collect();
        let err = correlate(&data, SoilProperty::Ocs, &[SoilProperty::Sand]).unwrap_err();
        assert_eq!(err, SoilError::InsufficientData { rows: 2, required: 3 });
    }

    #[test]
    fn test_default_backend_fits() {
        let summary = correlate(
            &five_complete_locations(),
            SoilProperty::Ocs,
            &[SoilProperty::Clay, SoilProperty::Sand],
        )
        .unwrap();
        assert_eq!(summary.observations, 5);
        assert_eq!(summary.formula(), "ocs ~ clay + sand");
        assert_eq!(summary.degrees_of_freedom, 2);
    }

    #[test]
    fn test_rejects_bad_arguments() {
        let data = five_complete_locations();
        assert!(matches!(
            correlate(&data, SoilProperty::Ocs, &[]),
            Err(SoilError::InvalidArgument(_))
        ));
        assert!(matches!(
            correlate(&data, SoilProperty::Ocs, &[SoilProperty::Ocs]),
            Err(SoilError::InvalidArgument(_))
        ));
        assert!(matches!(
            correlate(&data, SoilProperty::Ocs, &[SoilProperty::Clay, SoilProperty::Clay]),
            Err(SoilError::InvalidArgument(_))
        ));
    }
}
