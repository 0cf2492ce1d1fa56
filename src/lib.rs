// src/lib.rs
pub mod config;
pub mod inputs;
pub mod pipeline;
pub mod process;
pub mod sink;
pub mod station;
pub mod trip;
