//! Bed-occupancy forecasting service: wiring shared by the service binary
//! and the operator CLI.

pub mod bootstrap;
pub mod cli;
pub mod seed;

pub use bootstrap::{App, config_path, init_tracing, load_config};
