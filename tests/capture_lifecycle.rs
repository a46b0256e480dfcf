//! End-to-end capture lifecycle against a stand-in `caiman` script.
//!
//! The script writes a small raw log into its output directory, starts a
//! helper process in the same process group and then waits, so stopping the
//! capture has to signal the whole group.
#![cfg(target_os = "linux")]

use energy_probe::capture::FixedLocator;
use energy_probe::config::ProbeSettings;
use energy_probe::instrument::{ChannelSelection, EnergyProbeInstrument, Instrument};
use energy_probe::ProbeError;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::{Duration, Instant};

/// Two complete single-port records followed by three stray bytes:
/// (100000, 5000000, 50000) and (200000, 2000000, 100000).
const RECORDING_TOOL: &str = r#"#!/bin/sh
for out in "$@"; do :; done
echo "$@" > "$out/args.txt"
printf '\240\206\001\000\100\113\114\000\120\303\000\000' > "$out/raw.tmp"
printf '\100\015\003\000\200\204\036\000\240\206\001\000' >> "$out/raw.tmp"
printf '\001\002\003' >> "$out/raw.tmp"
mv "$out/raw.tmp" "$out/0000000000"
sleep 60 &
echo $! > "$out/helper.pid"
wait
"#;

const FAILING_TOOL: &str = r#"#!/bin/sh
echo "caiman: unable to open device" >&2
exit 1
"#;

const WAIT_LIMIT: Duration = Duration::from_secs(10);

fn install_tool(dir: &Path, script: &str) -> FixedLocator {
    let path = dir.join("caiman");
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    FixedLocator::new(path)
}

fn probe_with(dir: &Path, script: &str) -> EnergyProbeInstrument {
    EnergyProbeInstrument::new(ProbeSettings::new(vec![0.01]), &install_tool(dir, script)).unwrap()
}

/// Retries while another test thread still holds a freshly written script open.
fn start(probe: &mut EnergyProbeInstrument) {
    for _ in 0..50 {
        match probe.start() {
            Err(ProbeError::Launch { source, .. }) if source.raw_os_error() == Some(26) => {
                sleep(Duration::from_millis(20));
            }
            other => return other.unwrap(),
        }
    }
    panic!("capture utility stayed busy");
}

fn wait_for<T>(mut probe: impl FnMut() -> Option<T>) -> T {
    let deadline = Instant::now() + WAIT_LIMIT;
    loop {
        if let Some(value) = probe() {
            return value;
        }
        assert!(Instant::now() < deadline, "timed out waiting");
        sleep(Duration::from_millis(20));
    }
}

fn helper_pid(output_dir: &Path) -> u32 {
    let pid_file = output_dir.join("helper.pid");
    wait_for(|| fs::read_to_string(&pid_file).ok()?.trim().parse().ok())
}

fn is_alive(pid: u32) -> bool {
    match fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => {
            let state = stat.rsplit(')').next().unwrap_or("").trim_start();
            !(state.starts_with('Z') || state.starts_with('X'))
        }
        Err(_) => false,
    }
}

fn wait_until_gone(pid: u32) {
    wait_for(|| (!is_alive(pid)).then_some(()));
}

fn output_dir(probe: &EnergyProbeInstrument) -> PathBuf {
    probe.session().unwrap().output_dir().to_path_buf()
}

#[test]
fn test_capture_stop_and_decode() {
    let dir = tempfile::tempdir().unwrap();
    let mut probe = probe_with(dir.path(), RECORDING_TOOL);

    probe
        .reset(ChannelSelection::channels(["PORT_0_power", "PORT_0_current"]))
        .unwrap();
    start(&mut probe);
    assert!(probe.is_running());

    let session_dir = output_dir(&probe);
    let helper = helper_pid(&session_dir);
    assert!(is_alive(helper));

    let args = fs::read_to_string(session_dir.join("args.txt")).unwrap();
    assert!(args.starts_with("-d /dev/ttyACM0 -l -r 0:10 "));
    assert!(args.trim_end().ends_with(&*session_dir.to_string_lossy()));

    probe.stop().unwrap();
    assert!(!probe.is_running());
    wait_until_gone(helper);

    let outfile = dir.path().join("power.csv");
    let csv = probe.get_data(&outfile).unwrap();
    assert_eq!(
        fs::read_to_string(&outfile).unwrap(),
        "PORT_0_power,PORT_0_current\n100.0,50.0\n200.0,100.0\n"
    );
    assert_eq!(csv.measurements().unwrap().len(), 2);

    assert!(matches!(probe.stop(), Err(ProbeError::CaptureNotRunning)));
    assert!(matches!(probe.start(), Err(ProbeError::SessionNotPrepared)));
}

#[test]
fn test_running_capture_rejects_out_of_order_calls() {
    let dir = tempfile::tempdir().unwrap();
    let mut probe = probe_with(dir.path(), RECORDING_TOOL);

    probe.reset(ChannelSelection::All).unwrap();
    start(&mut probe);

    assert!(matches!(probe.start(), Err(ProbeError::CaptureAlreadyRunning)));
    assert!(matches!(
        probe.get_data(&dir.path().join("early.csv")),
        Err(ProbeError::CaptureStillRunning)
    ));
    assert!(probe.is_running());

    probe.stop().unwrap();
}

#[test]
fn test_reset_while_running_terminates_capture() {
    let dir = tempfile::tempdir().unwrap();
    let mut probe = probe_with(dir.path(), RECORDING_TOOL);

    probe.reset(ChannelSelection::All).unwrap();
    start(&mut probe);
    let first_dir = output_dir(&probe);
    let helper = helper_pid(&first_dir);

    probe.reset(ChannelSelection::All).unwrap();
    assert!(!probe.is_running());
    wait_until_gone(helper);
    assert!(!first_dir.exists());
    assert_ne!(output_dir(&probe), first_dir);
}

#[test]
fn test_dropping_instrument_terminates_capture() {
    let dir = tempfile::tempdir().unwrap();
    let mut probe = probe_with(dir.path(), RECORDING_TOOL);

    probe.reset(ChannelSelection::All).unwrap();
    start(&mut probe);
    let session_dir = output_dir(&probe);
    let helper = helper_pid(&session_dir);

    drop(probe);
    wait_until_gone(helper);
    assert!(!session_dir.exists());
}

#[test]
fn test_stop_after_tool_exited_early() {
    let dir = tempfile::tempdir().unwrap();
    let mut probe = probe_with(dir.path(), FAILING_TOOL);

    probe.reset(ChannelSelection::All).unwrap();
    start(&mut probe);

    let stderr_log = output_dir(&probe).join("caiman.stderr.log");
    wait_for(|| {
        fs::read_to_string(&stderr_log)
            .ok()
            .filter(|s| s.contains("unable to open device"))
    });

    probe.stop().unwrap();
    let err = probe.get_data(&dir.path().join("out.csv")).unwrap_err();
    assert!(matches!(err, ProbeError::Io(_)));
}
