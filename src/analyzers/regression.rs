//! Linear regression backends.
//!
//! [`LinearRegression`] is the seam the correlation step delegates to.
//! [`OrdinaryLeastSquares`] fits with `nalgebra` and takes its test
//! statistics from `statrs` distributions.

use crate::analyzers::types::{Coefficient, RegressionSummary, ResidualQuantiles};
use crate::analyzers::utility::{mean, quantile};
use crate::error::SoilError;
use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};

pub const INTERCEPT: &str = "(Intercept)";

/// Fits `response ~ predictors` with an intercept.
///
/// Every column has the same length and contains no missing values.
pub trait LinearRegression {
    fn fit(
        &self,
        response: (&str, &[f64]),
        predictors: &[(&str, &[f64])],
    ) -> Result<RegressionSummary, SoilError>;
}

/// Least-squares fit via the normal equations.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrdinaryLeastSquares;

impl LinearRegression for OrdinaryLeastSquares {
    fn fit(
        &self,
        response: (&str, &[f64]),
        predictors: &[(&str, &[f64])],
    ) -> Result<RegressionSummary, SoilError> {
        let (response_name, y) = response;
        let n = y.len();
        let k = predictors.len() + 1;

        if predictors.iter().any(|(_, col)| col.len() != n) {
            return Err(SoilError::Regression("column lengths differ".to_string()));
        }
        if n <= k {
            return Err(SoilError::InsufficientData {
                rows: n,
                required: k + 1,
            });
        }

        let x = DMatrix::from_fn(n, k, |i, j| if j == 0 { 1.0 } else { predictors[j - 1].1[i] });
        let y_vec = DVector::from_column_slice(y);

        let xt = x.transpose();
        let xtx_inv = (&xt * &x)
            .try_inverse()
            .ok_or_else(|| SoilError::Regression("design matrix is singular".to_string()))?;
        let beta = &xtx_inv * (&xt * &y_vec);

        let fitted = &x * &beta;
        let residuals: Vec<f64> = (&y_vec - &fitted).iter().copied().collect();

        let df = n - k;
        let rss: f64 = residuals.iter().map(|r| r * r).sum();
        let sigma2 = rss / df as f64;

        let y_mean = mean(y);
        let tss: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();

        let t_dist = StudentsT::new(0.0, 1.0, df as f64)
            .map_err(|e| SoilError::Regression(format!("{e:?}")))?;

        let terms = std::iter::once(INTERCEPT).chain(predictors.iter().map(|(name, _)| *name));
        let coefficients = terms
            .enumerate()
            .map(|(j, term)| {
                let estimate = beta[j];
                let std_error = (sigma2 * xtx_inv[(j, j)]).sqrt();
                let t_value = estimate / std_error;
                Coefficient {
                    term: term.to_string(),
                    estimate,
                    std_error,
                    t_value,
                    p_value: 2.0 * t_dist.sf(t_value.abs()),
                }
            })
            .collect();

        let r_squared = 1.0 - rss / tss;
        let adj_r_squared = 1.0 - (1.0 - r_squared) * (n - 1) as f64 / df as f64;

        let model_df = predictors.len() as f64;
        let f_statistic = ((tss - rss) / model_df) / sigma2;
        let f_dist = FisherSnedecor::new(model_df, df as f64)
            .map_err(|e| SoilError::Regression(format!("{e:?}")))?;
        let f_p_value = if f_statistic.is_finite() {
            f_dist.sf(f_statistic)
        } else {
            0.0
        };

        let mut sorted = residuals.clone();
        sorted.sort_by(f64::total_cmp);

        Ok(RegressionSummary {
            response: response_name.to_string(),
            observations: n,
            coefficients,
            residuals: ResidualQuantiles {
                min: quantile(&sorted, 0.0),
                q1: quantile(&sorted, 0.25),
                median: quantile(&sorted, 0.5),
                q3: quantile(&sorted, 0.75),
                max: quantile(&sorted, 1.0),
            },
            residual_standard_error: sigma2.sqrt(),
            degrees_of_freedom: df,
            r_squared,
            adj_r_squared,
            f_statistic,
            f_p_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fits_simple_line() {
        // Roughly y = 2 + 3x; Sxy = 29.8, Sxx = 10.
        let x: &[f64] = &[1.0, 2.0, 3.0, 4.0, 5.0];
        let y: &[f64] = &[5.1, 7.9, 11.1, 13.9, 17.0];
        let s = OrdinaryLeastSquares.fit(("y", y), &[("x", x)]).unwrap();

        assert_eq!(s.observations, 5);
        assert_eq!(s.degrees_of_freedom, 3);
        assert_relative_eq!(s.coefficient("x").unwrap().estimate, 2.98, epsilon = 1e-9);
        assert_relative_eq!(s.coefficient(INTERCEPT).unwrap().estimate, 2.06, epsilon = 1e-9);
        assert!(s.r_squared > 0.99);
        assert!(s.coefficient("x").unwrap().p_value < 0.001);
        assert!(s.f_p_value < 0.001);
    }

    #[test]
    fn test_r_squared_matches_squared_correlation() {
        let x: &[f64] = &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y: &[f64] = &[2.0, 1.0, 4.0, 3.0, 6.0, 5.0];
        let s = OrdinaryLeastSquares.fit(("y", y), &[("x", x)]).unwrap();

        // slope = Sxy / Sxx = 14.5 / 17.5
        assert_relative_eq!(s.coefficient("x").unwrap().estimate, 14.5 / 17.5, epsilon = 1e-9);
        // r^2 = Sxy^2 / (Sxx * Syy), Syy = 17.5
        assert_relative_eq!(s.r_squared, 14.5 * 14.5 / (17.5 * 17.5), epsilon = 1e-9);
        // For one predictor, F equals t^2.
        let t = s.coefficient("x").unwrap().t_value;
        assert_relative_eq!(s.f_statistic, t * t, epsilon = 1e-9);
        assert_relative_eq!(s.f_p_value, s.coefficient("x").unwrap().p_value, epsilon = 1e-9);
    }

    #[test]
    fn test_near_perfect_fit_keeps_tiny_p_values() {
        // y = 1 + 2x with alternating noise of 0.001, so t is in the tens of thousands.
        let x: Vec<f64> = (1..=10).map(f64::from).collect();
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, x)| 1.0 + 2.0 * x + if i % 2 == 0 { 0.001 } else { -0.001 })
            .collect();
        let s = OrdinaryLeastSquares
            .fit(("y", y.as_slice()), &[("x", x.as_slice())])
            .unwrap();

        let slope = s.coefficient("x").unwrap();
        assert!(slope.t_value > 1e4);
        assert!(slope.p_value > 0.0 && slope.p_value < 1e-20);
        assert!(s.f_p_value > 0.0 && s.f_p_value < 1e-20);
    }

    #[test]
    fn test_residual_quantiles_are_ordered() {
        let x1: &[f64] = &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let x2: &[f64] = &[3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0];
        let y: &[f64] = &[4.0, 3.5, 8.0, 6.1, 10.2, 15.0, 9.1];
        let s = OrdinaryLeastSquares
            .fit(("y", y), &[("x1", x1), ("x2", x2)])
            .unwrap();

        let r = &s.residuals;
        assert!(r.min <= r.q1 && r.q1 <= r.median && r.median <= r.q3 && r.q3 <= r.max);
        assert_eq!(s.coefficients.len(), 3);
        assert!(s.adj_r_squared <= s.r_squared);
    }

    #[test]
    fn test_singular_design_fails() {
        let x1: &[f64] = &[1.0, 2.0, 3.0, 4.0];
        let x2: &[f64] = &[2.0, 4.0, 6.0, 8.0];
        let y: &[f64] = &[1.0, 3.0, 2.0, 5.0];
        let err = OrdinaryLeastSquares
            .fit(("y", y), &[("x1", x1), ("x2", x2)])
            .unwrap_err();
        assert!(matches!(err, SoilError::Regression(_)));
    }

    #[test]
    fn test_too_few_rows() {
        let x: &[f64] = &[1.0, 2.0];
        let y: &[f64] = &[1.0, 2.0];
        let err = OrdinaryLeastSquares.fit(("y", y), &[("x", x)]).unwrap_err();
        assert_eq!(err, SoilError::InsufficientData { rows: 2, required: 3 });
    }
}
