//! Raw sample decoding and CSV results.
pub mod decoder;
pub mod measurements;

pub use decoder::{DecodeSummary, RecordLayout, SampleDecoder};
pub use measurements::{Measurement, MeasurementsCsv};
