//! Decoder for the capture utility's raw sample log.
//!
//! The raw file is a flat sequence of fixed-size records. Each record holds
//! one sample for every probe port: `ports × 3` unsigned 32-bit little-endian
//! integers in channel registration order (`power`, `voltage`, `current` per
//! port). Values are milli-units (mW, mV, mA) and are divided by 1000 on output.
//!
//! Capture is stopped with a signal, so the file routinely ends with a partial
//! record. The first short chunk in a pass is skipped silently; any further
//! short chunk is logged as a warning. Neither aborts the pass.

use crate::data::measurements::MeasurementsCsv;
use crate::error::{ProbeError, ProbeResult};
use crate::instrument::InstrumentChannel;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// Values per port in each record (power, voltage, current).
pub const ATTRIBUTES_PER_SAMPLE: usize = 3;

/// Width of one encoded value.
pub const BYTES_PER_VALUE: usize = 4;

/// Raw values are fixed point with three decimal digits.
const MILLI_PER_UNIT: f64 = 1000.0;

/// Whether the raw file is memory-mapped during decoding.
pub const FAST_DECODE_ENABLED: bool = cfg!(feature = "fast_decode");

/// Byte layout of one raw sample record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    ports: usize,
}

impl RecordLayout {
    /// Layout for a probe with `ports` ports.
    pub fn new(ports: usize) -> Self {
        Self { ports }
    }

    /// Number of probe ports.
    pub fn ports(&self) -> usize {
        self.ports
    }

    /// Number of `u32` values in a record.
    pub fn values_per_record(&self) -> usize {
        self.ports * ATTRIBUTES_PER_SAMPLE
    }

    /// Size of a record in bytes.
    pub fn record_size(&self) -> usize {
        self.values_per_record() * BYTES_PER_VALUE
    }

    /// Reads value `index` from a full record.
    fn value_at(record: &[u8], index: usize) -> u32 {
        let offset = index * BYTES_PER_VALUE;
        let mut word = [0u8; BYTES_PER_VALUE];
        word.copy_from_slice(&record[offset..offset + BYTES_PER_VALUE]);
        u32::from_le_bytes(word)
    }
}

/// Counts gathered during one decode pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeSummary {
    /// Records decoded and written as rows.
    pub records: usize,
    /// Short chunks skipped.
    pub misaligned: usize,
}

/// Converts raw records into CSV rows for a chosen subset of channels.
#[derive(Debug, Clone)]
pub struct SampleDecoder {
    layout: RecordLayout,
    active: Vec<InstrumentChannel>,
    active_indexes: Vec<usize>,
}

impl SampleDecoder {
    /// Creates a decoder.
    ///
    /// `all_channels` must list every channel in record order; `active` picks
    /// the output columns, in output order.
    pub fn new(
        layout: RecordLayout,
        all_channels: &[InstrumentChannel],
        active: &[InstrumentChannel],
    ) -> ProbeResult<Self> {
        if layout.ports() == 0 {
            return Err(ProbeError::Configuration(
                "Record layout needs at least one port".into(),
            ));
        }
        if all_channels.len() != layout.values_per_record() {
            return Err(ProbeError::Configuration(format!(
                "{} channels registered but records hold {} values",
                all_channels.len(),
                layout.values_per_record()
            )));
        }

        let active_indexes = active
            .iter()
            .map(|channel| {
                all_channels
                    .iter()
                    .position(|c| c == channel)
                    .ok_or_else(|| ProbeError::UnknownChannel(channel.label()))
            })
            .collect::<ProbeResult<Vec<_>>>()?;

        Ok(Self {
            layout,
            active: active.to_vec(),
            active_indexes,
        })
    }

    /// Position of each active channel within a record.
    pub fn active_indexes(&self) -> &[usize] {
        &self.active_indexes
    }

    /// Decodes every record from `reader` and writes CSV to `writer`.
    ///
    /// With no active channels the header and every row are empty lines.
    pub fn decode<R: Read, W: Write>(&self, reader: R, mut writer: W) -> ProbeResult<DecodeSummary> {
        if self.active.is_empty() {
            // The csv writer quotes an empty record as `""`, which reads back as one column.
            writer.write_all(b"\n")?;
            let summary = self.for_each_record(reader, |_| Ok(writer.write_all(b"\n")?))?;
            writer.flush()?;
            return Ok(summary);
        }

        let mut csv = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        csv.write_record(self.active.iter().map(InstrumentChannel::label))?;

        let mut row: Vec<f64> = Vec::with_capacity(self.active_indexes.len());
        let summary = self.for_each_record(reader, |record| {
            row.clear();
            row.extend(
                self.active_indexes
                    .iter()
                    .map(|&i| f64::from(RecordLayout::value_at(record, i)) / MILLI_PER_UNIT),
            );
            csv.serialize(&row)?;
            Ok(())
        })?;

        csv.flush()?;
        Ok(summary)
    }

    /// Calls `on_record` for every full record, skipping short chunks.
    fn for_each_record<R, F>(&self, mut reader: R, mut on_record: F) -> ProbeResult<DecodeSummary>
    where
        R: Read,
        F: FnMut(&[u8]) -> ProbeResult<()>,
    {
        let mut record = vec![0u8; self.layout.record_size()];
        let mut summary = DecodeSummary::default();

        loop {
            let filled = read_record(&mut reader, &mut record)?;
            if filled == 0 {
                break;
            }

            if filled < record.len() {
                summary.misaligned += 1;
                if summary.misaligned == 1 {
                    debug!(bytes = filled, "Skipping trailing partial record");
                } else {
                    warn!(
                        "Possibly misaligned caiman raw data, row contained {} bytes",
                        filled
                    );
                }
                continue;
            }

            on_record(&record)?;
            summary.records += 1;
        }

        Ok(summary)
    }

    /// Decodes the raw file at `raw` into a CSV file at `outfile`.
    pub fn decode_file(&self, raw: &Path, outfile: &Path) -> ProbeResult<MeasurementsCsv> {
        debug!("Parsing raw data file: {}", raw.display());

        let file = File::open(raw)?;
        let out = BufWriter::new(File::create(outfile)?);
        let summary = decode_source(self, file, out)?;

        info!(
            records = summary.records,
            misaligned = summary.misaligned,
            "Decoded {} into {}",
            raw.display(),
            outfile.display()
        );
        Ok(MeasurementsCsv::new(outfile, self.active.clone()))
    }
}

#[cfg(not(feature = "fast_decode"))]
fn decode_source<W: Write>(decoder: &SampleDecoder, file: File, out: W) -> ProbeResult<DecodeSummary> {
    decoder.decode(io::BufReader::new(file), out)
}

#[cfg(feature = "fast_decode")]
#[allow(unsafe_code)]
fn decode_source<W: Write>(decoder: &SampleDecoder, file: File, out: W) -> ProbeResult<DecodeSummary> {
    if file.metadata()?.len() == 0 {
        return decoder.decode(io::empty(), out);
    }
    // SAFETY: the capture utility has exited before decoding starts, so the
    // file is not modified while mapped.
    let map = unsafe { memmap2::Mmap::map(&file)? };
    decoder.decode(&map[..], out)
}

/// Fills `buf` from `reader`, stopping early only at end of stream.
fn read_record<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
