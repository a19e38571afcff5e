//! Soil data analysis.
//!
//! Depth-weighted aggregation reconciles measurements reported over
//! different depth bands into one value per location and property. Ranking
//! and correlation work on the aggregated output.

pub mod aggregate;
pub mod correlate;
pub mod rank;
pub mod regression;
pub mod types;
pub mod utility;
