//! ARM energy probe driven through the `caiman` capture utility.
//!
//! The probe has one or more ports, each with a shunt resistor. For every port
//! the instrument exposes `power`, `voltage` and `current` channels. Capture
//! runs `caiman` as a separate process group between `start` and `stop`;
//! `get_data` then decodes the raw log it wrote into a CSV.
//!
//! # Example
//! ```no_run
//! use energy_probe::capture::PathLocator;
//! use energy_probe::config::ProbeSettings;
//! use energy_probe::instrument::{ChannelSelection, EnergyProbeInstrument, Instrument};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), energy_probe::error::ProbeError> {
//! let settings = ProbeSettings::new(vec![0.01, 0.02]).with_labels(["A57", "A53"]);
//! let mut probe = EnergyProbeInstrument::new(settings, &PathLocator)?;
//!
//! probe.reset(ChannelSelection::channels(["A57_power", "A53_power"]))?;
//! probe.start()?;
//! std::thread::sleep(std::time::Duration::from_secs(5));
//! probe.stop()?;
//! let csv = probe.get_data(Path::new("power.csv"))?;
//! println!("{} rows", csv.measurements()?.len());
//! # Ok(())
//! # }
//! ```

use super::{ChannelRegistry, ChannelSelection, Instrument, InstrumentMode};
use crate::capture::{CaptureSession, RunningCapture, ToolLocator, CAPTURE_TOOL};
use crate::config::ProbeSettings;
use crate::data::decoder::{RecordLayout, SampleDecoder, FAST_DECODE_ENABLED};
use crate::data::measurements::MeasurementsCsv;
use crate::error::{ProbeError, ProbeResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Session state between lifecycle calls.
#[derive(Debug, Default)]
enum CaptureState {
    /// No session prepared.
    #[default]
    Idle,
    /// Output directory and command ready; nothing running.
    Ready(CaptureSession),
    /// Capture utility running. `capture` is declared first so the process
    /// group is stopped before the session directory is removed.
    Running {
        capture: RunningCapture,
        session: CaptureSession,
    },
    /// Capture finished; raw file complete.
    Stopped(CaptureSession),
}

/// Energy probe instrument.
#[derive(Debug)]
pub struct EnergyProbeInstrument {
    settings: ProbeSettings,
    tool: PathBuf,
    registry: ChannelRegistry,
    state: CaptureState,
}

impl EnergyProbeInstrument {
    /// Creates the instrument and registers its channels.
    ///
    /// Fails if the settings are invalid or the capture utility cannot be
    /// found. An explicit `capture_tool` in the settings takes precedence over
    /// `locator`.
    pub fn new(settings: ProbeSettings, locator: &dyn ToolLocator) -> ProbeResult<Self> {
        settings.validate()?;

        let tool = match &settings.capture_tool {
            Some(path) if path.is_file() => Some(path.clone()),
            Some(path) => {
                return Err(ProbeError::Configuration(format!(
                    "Capture utility not found at {}",
                    path.display()
                )))
            }
            None => locator.locate(CAPTURE_TOOL),
        };
        let tool = tool.ok_or_else(|| {
            ProbeError::Configuration(format!(
                "{} must be installed on the host (see https://github.com/ARM-software/caiman)",
                CAPTURE_TOOL
            ))
        })?;
        debug!("Using capture utility at {}", tool.display());

        if !FAST_DECODE_ENABLED {
            info!("Building with --features fast_decode will significantly speed up decoding");
        }

        let registry = ChannelRegistry::for_sites(&settings.site_labels())?;

        Ok(Self {
            settings,
            tool,
            registry,
            state: CaptureState::Idle,
        })
    }

    /// Probe configuration.
    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Path of the capture utility in use.
    pub fn tool(&self) -> &Path {
        &self.tool
    }

    /// Session prepared by the last `reset`, if any.
    pub fn session(&self) -> Option<&CaptureSession> {
        match &self.state {
            CaptureState::Idle => None,
            CaptureState::Ready(session)
            | CaptureState::Stopped(session)
            | CaptureState::Running { session, .. } => Some(session),
        }
    }

    /// Whether the capture utility is currently running.
    pub fn is_running(&self) -> bool {
        matches!(self.state, CaptureState::Running { .. })
    }

    /// Decoder for the current active channels.
    pub fn decoder(&self) -> ProbeResult<SampleDecoder> {
        SampleDecoder::new(
            RecordLayout::new(self.settings.ports()),
            self.registry.list_channels(),
            self.registry.active_channels(),
        )
    }
}

impl Instrument for EnergyProbeInstrument {
    fn name(&self) -> &str {
        "energy_probe"
    }

    fn mode(&self) -> InstrumentMode {
        InstrumentMode::Continuous
    }

    fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    fn reset(&mut self, selection: ChannelSelection) -> ProbeResult<()> {
        let active = self.registry.resolve(&selection)?;

        // Dropping a running capture terminates its process group.
        self.state = CaptureState::Idle;
        let session = CaptureSession::prepare(
            &self.tool,
            &self.settings.device_entry,
            &self.settings.resistor_values,
            &self.settings.raw_file_name,
            self.settings.session_root.as_deref(),
        )?;
        debug!("{}", session.command());
        self.registry.set_active(active);
        self.state = CaptureState::Ready(session);
        Ok(())
    }

    fn start(&mut self) -> ProbeResult<()> {
        match std::mem::take(&mut self.state) {
            CaptureState::Ready(session) => match session.spawn() {
                Ok(capture) => {
                    self.state = CaptureState::Running { capture, session };
                    Ok(())
                }
                Err(e) => {
                    self.state = CaptureState::Ready(session);
                    Err(e)
                }
            },
            state @ CaptureState::Running { .. } => {
                self.state = state;
                Err(ProbeError::CaptureAlreadyRunning)
            }
            state => {
                self.state = state;
                Err(ProbeError::SessionNotPrepared)
            }
        }
    }

    fn stop(&mut self) -> ProbeResult<()> {
        match std::mem::take(&mut self.state) {
            CaptureState::Running { capture, session } => {
                self.state = CaptureState::Stopped(session);
                capture.terminate()?;
                Ok(())
            }
            state => {
                self.state = state;
                Err(ProbeError::CaptureNotRunning)
            }
        }
    }

    fn get_data(&mut self, outfile: &Path) -> ProbeResult<MeasurementsCsv> {
        let raw = match &self.state {
            CaptureState::Stopped(session) | CaptureState::Ready(session) => {
                session.raw_data_path()
            }
            CaptureState::Running { .. } => return Err(ProbeError::CaptureStillRunning),
            CaptureState::Idle => return Err(ProbeError::SessionNotPrepared),
        };
        self.decoder()?.decode_file(&raw, outfile)
    }
}
