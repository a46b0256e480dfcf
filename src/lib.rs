//! # Energy Probe Instrument
//!
//! This crate drives an ARM energy probe through the external `caiman` capture
//! utility and turns the raw sample log it records into a labelled CSV time
//! series.
//!
//! ## Crate Structure
//!
//! - **`instrument`**: the `Instrument` lifecycle contract, measurement channels
//!   and the channel registry, plus `EnergyProbeInstrument` which implements it.
//! - **`capture`**: locating `caiman`, building its command line, and owning the
//!   running capture process group and its temporary output directory.
//! - **`data`**: decoding the fixed-layout raw records into CSV, and the
//!   `MeasurementsCsv` result type.
//! - **`config`**: Figment-based configuration (TOML file + environment).
//! - **`error`**: the `ProbeError` enum used across the crate.
//! - **`logging`**: `tracing-subscriber` initialisation.

pub mod capture;
pub mod config;
pub mod data;
pub mod error;
pub mod instrument;
pub mod logging;

pub use error::{ProbeError, ProbeResult};
