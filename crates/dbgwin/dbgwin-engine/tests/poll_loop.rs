//! Drives the full polling loop against slot images published to files.

use dbgwin_config::{DebugStreamConfig, SourceConfig, SourceSpec, ThreadInfoConfig};
use dbgwin_engine::{
    DebugStreamSession, EngineError, Runner, SLOT_SIZE, Session, Step, ThreadInfoSession,
    open_source,
};
use dbgwin_mmap::{MmapFileMut, TELEMETRY_SLOT_TYPE};
use dbgwin_records::{CpuInfo, ThreadInfo};
use dbgwin_stream::producer::SlotBuilder;
use dbgwin_telemetry2::CoreState;
use dbgwin_telemetry2::producer::Telemetry2Builder;
use std::path::PathBuf;
use std::time::Duration;

fn temp_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("dbgwin_engine_{tag}_{}", std::process::id()))
}

fn publish(map: &mut MmapFileMut, at: usize, bytes: &[u8]) {
    map.as_mut_slice()[at..at + bytes.len()].copy_from_slice(bytes);
    map.flush().unwrap();
}

fn cpu_payload(load: u8) -> Vec<u8> {
    CpuInfo {
        load,
        threads: vec![ThreadInfo {
            name: "idle".into(),
            stack_usage: 51,
            cpu_load: 51,
        }],
    }
    .to_payload()
}

#[test]
fn debug_stream_from_debugfs_file() {
    let path = temp_path("stream");
    let mut map = MmapFileMut::create_rw(&path, SLOT_SIZE as u64).unwrap();

    let cfg = DebugStreamConfig {
        source: SourceConfig {
            file: Some(path.clone()),
            ..SourceConfig::default()
        },
        ..DebugStreamConfig::default()
    };
    let spec = cfg.source_spec();
    assert_eq!(spec, SourceSpec::File(path.clone()));

    let session = DebugStreamSession::new(cfg.error_threshold, Vec::new());
    let slot_type = session.slot_type();
    let mut runner = Runner::new(session, Duration::ZERO, move || {
        open_source(&spec, slot_type)
    });

    // Uninitialized slot: keep sleeping.
    assert_eq!(runner.step().unwrap(), Step::Sleep);

    let mut slot = SlotBuilder::new(&[128, 128]);
    slot.ring(0).push(1, &cpu_payload(10));
    slot.ring(1).push(1, &cpu_payload(20));
    publish(&mut map, 0, slot.as_bytes());
    assert_eq!(runner.step().unwrap(), Step::Continue);
    assert_eq!(runner.step().unwrap(), Step::Sleep);

    for load in 0..15u8 {
        slot.ring(1).push(1, &cpu_payload(load));
    }
    publish(&mut map, 0, slot.as_bytes());
    assert_eq!(runner.step().unwrap(), Step::Continue);
    assert_eq!(runner.step().unwrap(), Step::Sleep);

    let out = String::from_utf8(runner.session().printer().get_ref().clone()).unwrap();
    let core1: Vec<&str> = out.lines().filter(|l| l.starts_with("CPU 1:")).collect();
    assert_eq!(core1.len(), 16);
    assert!(core1[15].ends_with("(seqno 15)"));
    assert_eq!(out.lines().filter(|l| l.starts_with("CPU 0:")).count(), 1);
    assert!(out.contains("    idle                 stack 20.0%\tload 20.0%"));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn thread_info_from_debug_window() {
    let path = temp_path("window");
    let mut map = MmapFileMut::create_rw(&path, (SLOT_SIZE * 16) as u64).unwrap();
    // Descriptor 4 announces the telemetry slot.
    publish(&mut map, 4 * 12 + 4, &TELEMETRY_SLOT_TYPE.to_le_bytes());

    let cfg = ThreadInfoConfig {
        source: SourceConfig {
            file: Some(temp_path("no_debugfs")),
            window: Some(path.clone()),
            ..SourceConfig::default()
        },
        ..ThreadInfoConfig::default()
    };
    let spec = cfg.source_spec();
    assert!(matches!(spec, SourceSpec::Window { slot: None, .. }));

    let session = ThreadInfoSession::new(Vec::new());
    let slot_type = session.slot_type();
    let mut runner = Runner::new(session, Duration::ZERO, move || {
        open_source(&spec, slot_type)
    });
    assert_eq!(runner.step().unwrap(), Step::Sleep);

    let mut t2 = Telemetry2Builder::new(2);
    t2.set_core(0, CoreState::UpToDate, 1, 128, &[("idle", 10, 200), ("ll", 20, 30)]);
    publish(&mut map, 5 * SLOT_SIZE, t2.as_bytes());
    runner.step().unwrap();
    runner.step().unwrap();

    t2.set_core(1, CoreState::BeingUpdated, 1, 0, &[]);
    publish(&mut map, 5 * SLOT_SIZE, t2.as_bytes());
    runner.step().unwrap();

    let out = String::from_utf8(runner.session().printer().get_ref().clone()).unwrap();
    assert_eq!(out.matches("CPU 0:").count(), 1);
    assert!(!out.contains("CPU 1:"));
    assert!(out.contains("CPU 0: Load: 50.2% 2 threads (counter 1)"));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn missing_debugfs_node_is_fatal() {
    let spec = SourceSpec::File(temp_path("absent"));
    let mut runner = Runner::new(ThreadInfoSession::new(Vec::new()), Duration::ZERO, move || {
        open_source(&spec, TELEMETRY_SLOT_TYPE)
    });
    assert!(matches!(runner.step(), Err(EngineError::SourceMissing(_))));
}
