//! CSV measurement results handed back to the collection framework.

use crate::error::{ProbeError, ProbeResult};
use crate::instrument::InstrumentChannel;
use std::path::{Path, PathBuf};

/// A single decoded value together with the channel it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Value in the channel's base unit.
    pub value: f64,
    /// Channel the value was read from.
    pub channel: InstrumentChannel,
}

impl Measurement {
    /// Unit of `value`.
    pub fn units(&self) -> &'static str {
        self.channel.units()
    }
}

/// A CSV file of measurements plus the channel of each column.
///
/// The first row of the file is a header of channel labels; the channel list
/// is carried alongside so consumers know column semantics without parsing it.
#[derive(Debug, Clone)]
pub struct MeasurementsCsv {
    path: PathBuf,
    channels: Vec<InstrumentChannel>,
}

impl MeasurementsCsv {
    /// Wraps an existing CSV file whose columns are `channels`.
    pub fn new(path: impl Into<PathBuf>, channels: Vec<InstrumentChannel>) -> Self {
        Self {
            path: path.into(),
            channels,
        }
    }

    /// Location of the CSV file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Column channels, in column order.
    pub fn channels(&self) -> &[InstrumentChannel] {
        &self.channels
    }

    /// Reads every data row back as measurements.
    pub fn measurements(&self) -> ProbeResult<Vec<Vec<Measurement>>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)?;

        let header = reader.headers()?.clone();
        let expected: Vec<String> = self.channels.iter().map(InstrumentChannel::label).collect();
        if !self.channels.is_empty() && header.iter().ne(expected.iter().map(String::as_str)) {
            return Err(ProbeError::Processing(format!(
                "CSV header {:?} does not match channels {:?}",
                header.iter().collect::<Vec<_>>(),
                expected
            )));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let row = self
                .channels
                .iter()
                .zip(record.iter())
                .map(|(channel, field)| {
                    field
                        .parse::<f64>()
                        .map(|value| Measurement {
                            value,
                            channel: channel.clone(),
                        })
                        .map_err(|e| {
                            ProbeError::Processing(format!(
                                "Invalid value '{}' in column {}: {}",
                                field, channel, e
                            ))
                        })
                })
                .collect::<ProbeResult<Vec<_>>>()?;
            rows.push(row);
        }
        Ok(rows)
    }
}
