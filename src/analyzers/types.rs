//! Data types produced by the ranking and correlation steps.

use crate::model::{Location, SoilProperty};
use serde::Serialize;
use std::fmt;

/// Requested properties for one location, ordered by descending value.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedRow {
    pub location: Location,
    pub ranked: Vec<(SoilProperty, f64)>,
}

impl RankedRow {
    /// Highest-valued property.
    pub fn leading(&self) -> Option<SoilProperty> {
        self.ranked.first().map(|(p, _)| *p)
    }

    /// Cells formatted as `clay:  62`, one per rank.
    pub fn describe(&self) -> Vec<String> {
        self.ranked
            .iter()
            .map(|(p, v)| format!("{}: {:>3}", p, v.round() as i64))
            .collect()
    }
}

/// One row per location with a complete set of requested properties.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RankedTable {
    pub rows: Vec<RankedRow>,
}

impl RankedTable {
    /// Keeps only the `n` highest-ranked properties in every row.
    pub fn top(mut self, n: usize) -> Self {
        for row in &mut self.rows {
            row.ranked.truncate(n);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Width of the widest row.
    pub fn rank_count(&self) -> usize {
        self.rows.iter().map(|r| r.ranked.len()).max().unwrap_or(0)
    }
}

/// A location with one optional value per wide-table column.
#[derive(Debug, Clone, PartialEq)]
pub struct WideRow {
    pub location: Location,
    pub values: Vec<Option<f64>>,
}

impl WideRow {
    pub fn is_complete(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }
}

/// Wide form of aggregated data: one row per location, one column per property.
#[derive(Debug, Clone, PartialEq)]
pub struct WideTable {
    pub columns: Vec<SoilProperty>,
    pub rows: Vec<WideRow>,
}

impl WideTable {
    pub fn column_index(&self, property: SoilProperty) -> Option<usize> {
        self.columns.iter().position(|c| *c == property)
    }

    /// Values of one column; `None` when the property is not a column or any
    /// row is incomplete for it.
    pub fn column(&self, property: SoilProperty) -> Option<Vec<f64>> {
        let idx = self.column_index(property)?;
        self.rows.iter().map(|r| r.values[idx]).collect()
    }

    /// Drops every row with a missing value in any column.
    pub fn complete(self) -> Self {
        Self {
            columns: self.columns,
            rows: self.rows.into_iter().filter(WideRow::is_complete).collect(),
        }
    }
}

/// Estimate, standard error and test statistic for one model term.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coefficient {
    pub term: String,
    pub estimate: f64,
    pub std_error: f64,
    pub t_value: f64,
    pub p_value: f64,
}

/// Residual five-number summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResidualQuantiles {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Output of a linear regression fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionSummary {
    pub response: String,
    pub observations: usize,
    pub coefficients: Vec<Coefficient>,
    pub residuals: ResidualQuantiles,
    pub residual_standard_error: f64,
    pub degrees_of_freedom: usize,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub f_statistic: f64,
    pub f_p_value: f64,
}

impl RegressionSummary {
    pub fn coefficient(&self, term: &str) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.term == term)
    }

    /// Model formula in `response ~ a + b` form.
    pub fn formula(&self) -> String {
        let terms: Vec<_> = self
            .coefficients
            .iter()
            .filter(|c| c.term != "(Intercept)")
            .map(|c| c.term.as_str())
            .collect();
        format!("{} ~ {}", self.response, terms.join(" + "))
    }
}

impl fmt::Display for RegressionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Formula: {}", self.formula())?;
        writeln!(f)?;
        writeln!(f, "Residuals:")?;
        writeln!(
            f,
            "{:>10} {:>10} {:>10} {:>10} {:>10}",
            "Min", "1Q", "Median", "3Q", "Max"
        )?;
        let r = &self.residuals;
        writeln!(
            f,
            "{:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
            r.min, r.q1, r.median, r.q3, r.max
        )?;
        writeln!(f)?;
        writeln!(f, "Coefficients:")?;
        writeln!(
            f,
            "{:<12} {:>12} {:>12} {:>9} {:>10}",
            "", "Estimate", "Std. Error", "t value", "Pr(>|t|)"
        )?;
        for c in &self.coefficients {
            writeln!(
                f,
                "{:<12} {:>12.5} {:>12.5} {:>9.3} {:>10.4}",
                c.term, c.estimate, c.std_error, c.t_value, c.p_value
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "Residual standard error: {:.4} on {} degrees of freedom",
            self.residual_standard_error, self.degrees_of_freedom
        )?;
        writeln!(
            f,
            "Multiple R-squared: {:.4},\tAdjusted R-squared: {:.4}",
            self.r_squared, self.adj_r_squared
        )?;
        write!(
            f,
            "F-statistic: {:.4} on {} and {} DF,  p-value: {:.4}",
            self.f_statistic,
            self.coefficients.len().saturating_sub(1),
            self.degrees_of_freedom,
            self.f_p_value
        )
    }
}
