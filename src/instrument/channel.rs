//! Measurement channels and the ordered channel registry.
//!
//! A channel is identified by a site (one per probe port) and a measurement
//! kind. The registry keeps channels in registration order, which for the
//! energy probe is also the order of values inside a raw sample record.

use crate::error::{ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Physical quantity measured on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementKind {
    /// Power, in watts.
    Power,
    /// Voltage, in volts.
    Voltage,
    /// Current, in amps.
    Current,
}

impl MeasurementKind {
    /// Kinds reported per probe port, in record order.
    pub const PER_SITE: [MeasurementKind; 3] = [Self::Power, Self::Voltage, Self::Current];

    /// Lower-case name used in channel labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Power => "power",
            Self::Voltage => "voltage",
            Self::Current => "current",
        }
    }

    /// Base unit of the decoded value.
    pub fn units(&self) -> &'static str {
        match self {
            Self::Power => "watts",
            Self::Voltage => "volts",
            Self::Current => "amps",
        }
    }
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeasurementKind {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "power" => Ok(Self::Power),
            "voltage" => Ok(Self::Voltage),
            "current" => Ok(Self::Current),
            other => Err(ProbeError::Configuration(format!(
                "Invalid measurement kind '{}'. Must be one of: power, voltage, current",
                other
            ))),
        }
    }
}

/// A single logical measurement channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentChannel {
    /// Site the channel belongs to (a probe port label).
    pub site: String,
    /// Quantity measured.
    pub kind: MeasurementKind,
}

impl InstrumentChannel {
    /// Creates a channel for `site` measuring `kind`.
    pub fn new(site: impl Into<String>, kind: MeasurementKind) -> Self {
        Self {
            site: site.into(),
            kind,
        }
    }

    /// Column label, `<site>_<kind>`.
    pub fn label(&self) -> String {
        format!("{}_{}", self.site, self.kind)
    }

    /// Base unit of this channel's values.
    pub fn units(&self) -> &'static str {
        self.kind.units()
    }
}

impl fmt::Display for InstrumentChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.site, self.kind)
    }
}

/// How `reset` chooses the active channels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ChannelSelection {
    /// Every registered channel, in registration order.
    #[default]
    All,
    /// Channels matching the given sites and kinds. `None` places no constraint.
    Filter {
        /// Sites to keep.
        sites: Option<Vec<String>>,
        /// Kinds to keep.
        kinds: Option<Vec<MeasurementKind>>,
    },
    /// Explicit channel labels, in the order given.
    Channels(Vec<String>),
}

impl ChannelSelection {
    /// Selects channels by label.
    pub fn channels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Channels(labels.into_iter().map(Into::into).collect())
    }
}

/// Ordered set of registered channels plus the active subset.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    channels: Vec<InstrumentChannel>,
    active: Vec<InstrumentChannel>,
}

impl ChannelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry for a set of probe ports: three channels per site,
    /// `power`, `voltage`, `current`, sites in the given order.
    pub fn for_sites<S: AsRef<str>>(sites: &[S]) -> ProbeResult<Self> {
        let mut registry = Self::new();
        for site in sites {
            for kind in MeasurementKind::PER_SITE {
                registry.add_channel(site.as_ref(), kind)?;
            }
        }
        registry.active = registry.channels.clone();
        Ok(registry)
    }

    /// Registers a channel. Labels must be unique.
    pub fn add_channel(&mut self, site: &str, kind: MeasurementKind) -> ProbeResult<()> {
        let channel = InstrumentChannel::new(site, kind);
        if self.channels.contains(&channel) {
            return Err(ProbeError::Configuration(format!(
                "Duplicate channel '{}'",
                channel
            )));
        }
        self.channels.push(channel);
        Ok(())
    }

    /// All registered channels, in registration order.
    pub fn list_channels(&self) -> &[InstrumentChannel] {
        &self.channels
    }

    /// Channels selected by the most recent `select`.
    pub fn active_channels(&self) -> &[InstrumentChannel] {
        &self.active
    }

    /// Looks up a channel by label.
    pub fn get(&self, label: &str) -> Option<&InstrumentChannel> {
        self.channels.iter().find(|c| c.label() == label)
    }

    /// Position of a channel in the full list.
    pub fn index_of(&self, channel: &InstrumentChannel) -> Option<usize> {
        self.channels.iter().position(|c| c == channel)
    }

    /// Distinct sites, in registration order.
    pub fn sites(&self) -> Vec<&str> {
        let mut sites: Vec<&str> = Vec::new();
        for channel in &self.channels {
            if !sites.contains(&channel.site.as_str()) {
                sites.push(&channel.site);
            }
        }
        sites
    }

    /// Replaces the active subset.
    pub fn select(&mut self, selection: &ChannelSelection) -> ProbeResult<()> {
        self.active = self.resolve(selection)?;
        Ok(())
    }

    /// Channels `selection` picks, in output order, without changing the
    /// active subset.
    pub fn resolve(&self, selection: &ChannelSelection) -> ProbeResult<Vec<InstrumentChannel>> {
        Ok(match selection {
            ChannelSelection::All => self.channels.clone(),
            ChannelSelection::Filter { sites, kinds } => self
                .channels
                .iter()
                .filter(|c| sites.as_ref().map_or(true, |s| s.contains(&c.site)))
                .filter(|c| kinds.as_ref().map_or(true, |k| k.contains(&c.kind)))
                .cloned()
                .collect(),
            ChannelSelection::Channels(labels) => labels
                .iter()
                .map(|label| {
                    self.get(label)
                        .cloned()
                        .ok_or_else(|| ProbeError::UnknownChannel(label.clone()))
                })
                .collect::<ProbeResult<Vec<_>>>()?,
        })
    }

    /// Makes `active` the active subset. Every channel must be registered.
    pub(crate) fn set_active(&mut self, active: Vec<InstrumentChannel>) {
        debug_assert!(active.iter().all(|c| self.channels.contains(c)));
        self.active = active;
    }
}
