//! Integration tests for decoding raw caiman logs into CSV files.

use energy_probe::data::{RecordLayout, SampleDecoder};
use energy_probe::instrument::{ChannelRegistry, ChannelSelection, InstrumentChannel, MeasurementKind};
use energy_probe::ProbeError;
use std::fs;
use std::path::Path;

fn encode(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decoder_for(sites: &[&str], selection: ChannelSelection) -> SampleDecoder {
    let mut registry = ChannelRegistry::for_sites(sites).unwrap();
    registry.select(&selection).unwrap();
    SampleDecoder::new(
        RecordLayout::new(sites.len()),
        registry.list_channels(),
        registry.active_channels(),
    )
    .unwrap()
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn test_two_port_example_row() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("0000000000");
    let out = dir.path().join("out.csv");
    fs::write(
        &raw,
        encode(&[100_000, 5_000_000, 50_000, 200_000, 4_000_000, 80_000]),
    )
    .unwrap();

    let decoder = decoder_for(
        &["PORT_0", "PORT_1"],
        ChannelSelection::channels(["PORT_0_power", "PORT_1_voltage"]),
    );
    let csv = decoder.decode_file(&raw, &out).unwrap();

    assert_eq!(
        read_lines(&out),
        vec!["PORT_0_power,PORT_1_voltage", "100.0,4000.0"]
    );
    assert_eq!(
        csv.channels(),
        &[
            InstrumentChannel::new("PORT_0", MeasurementKind::Power),
            InstrumentChannel::new("PORT_1", MeasurementKind::Voltage),
        ]
    );
}

#[test]
fn test_k_records_give_k_rows() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw");
    let out = dir.path().join("out.csv");

    let k = 250u32;
    let values: Vec<u32> = (0..k * 6).collect();
    fs::write(&raw, encode(&values)).unwrap();

    let csv = decoder_for(&["A57", "A53"], ChannelSelection::All)
        .decode_file(&raw, &out)
        .unwrap();
    let rows = csv.measurements().unwrap();

    assert_eq!(rows.len(), k as usize);
    assert_eq!(read_lines(&out).len(), k as usize + 1);
    for (r, row) in rows.iter().enumerate() {
        assert_eq!(row.len(), 6);
        for (c, measurement) in row.iter().enumerate() {
            let raw_value = (r * 6 + c) as f64;
            assert_eq!(measurement.value, raw_value / 1000.0);
        }
    }
    assert_eq!(rows[0][2].channel.label(), "A57_current");
    assert_eq!(rows[0][2].units(), "amps");
}

#[test]
fn test_truncated_trailing_record() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw");
    let out = dir.path().join("out.csv");

    let mut bytes = encode(&[1_000, 2_000, 3_000, 4_000, 5_000, 6_000, 7_000, 8_000, 9_000]);
    bytes.extend_from_slice(&[0xff; 7]);
    fs::write(&raw, bytes).unwrap();

    let csv = decoder_for(
        &["PORT_0"],
        ChannelSelection::Filter {
            sites: None,
            kinds: Some(vec![MeasurementKind::Voltage]),
        },
    )
    .decode_file(&raw, &out)
    .unwrap();

    assert_eq!(
        read_lines(&out),
        vec!["PORT_0_voltage", "2.0", "5.0", "8.0"]
    );
    assert_eq!(csv.measurements().unwrap().len(), 3);
}

#[test]
fn test_empty_raw_file_gives_header_only() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw");
    let out = dir.path().join("out.csv");
    fs::write(&raw, []).unwrap();

    let csv = decoder_for(&["PORT_0"], ChannelSelection::All)
        .decode_file(&raw, &out)
        .unwrap();

    assert_eq!(
        read_lines(&out),
        vec!["PORT_0_power,PORT_0_voltage,PORT_0_current"]
    );
    assert!(csv.measurements().unwrap().is_empty());
}

#[test]
fn test_missing_raw_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = decoder_for(&["PORT_0"], ChannelSelection::All)
        .decode_file(&dir.path().join("missing"), &dir.path().join("out.csv"))
        .unwrap_err();
    assert!(matches!(err, ProbeError::Io(_)));
}
