pub mod soilgrids;
