// src/station/mod.rs
pub mod registry;
pub mod schema;

pub use registry::{Station, StationError, StationFile, StationRegistry};
pub use schema::StationSchema;
