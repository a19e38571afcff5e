pub mod soil_api;
