//! Instrument contract and the energy probe implementation.
//!
//! The `Instrument` trait is the lifecycle every measurement instrument
//! exposes to the collection framework:
//!
//! 1. `reset` selects the active channels and prepares a fresh session.
//! 2. `start` begins acquisition without blocking.
//! 3. `stop` ends acquisition.
//! 4. `get_data` converts what was captured into a `MeasurementsCsv`.
//!
//! Channel identities are registered once, at construction, through a
//! [`ChannelRegistry`].

pub mod channel;
pub mod energy_probe;

pub use channel::{ChannelRegistry, ChannelSelection, InstrumentChannel, MeasurementKind};
pub use energy_probe::EnergyProbeInstrument;

use crate::data::measurements::MeasurementsCsv;
use crate::error::ProbeResult;
use std::path::Path;

/// How an instrument produces measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentMode {
    /// Measurements are sampled on demand.
    Instantaneous,
    /// Measurements are collected between `start` and `stop`.
    Continuous,
}

/// Trait for any measurement instrument driven by the collection framework.
///
/// Calls are expected in the order `reset`, `start`, `stop`, `get_data`.
/// Out-of-order calls return one of the session state errors of
/// [`ProbeError`](crate::error::ProbeError).
pub trait Instrument {
    /// Returns the name of the instrument.
    fn name(&self) -> &str;

    /// Acquisition mode.
    fn mode(&self) -> InstrumentMode;

    /// Channel registry backing this instrument.
    fn registry(&self) -> &ChannelRegistry;

    /// All channels, in registration order.
    fn list_channels(&self) -> &[InstrumentChannel] {
        self.registry().list_channels()
    }

    /// Channels selected by the last `reset`.
    fn active_channels(&self) -> &[InstrumentChannel] {
        self.registry().active_channels()
    }

    /// Selects the active channels and prepares a new acquisition.
    fn reset(&mut self, selection: ChannelSelection) -> ProbeResult<()>;

    /// Starts acquisition.
    fn start(&mut self) -> ProbeResult<()>;

    /// Stops acquisition.
    fn stop(&mut self) -> ProbeResult<()>;

    /// Writes the captured data for the active channels to `outfile`.
    fn get_data(&mut self, outfile: &Path) -> ProbeResult<MeasurementsCsv>;
}
