pub mod analyzers;
pub mod config;
pub mod error;
pub mod fetch;
pub mod infra;
pub mod model;
pub mod output;
pub mod parser;
pub mod query;
pub mod services;
pub mod session;
pub mod stats;

pub use error::SoilError;
pub use session::SoilGrids;
