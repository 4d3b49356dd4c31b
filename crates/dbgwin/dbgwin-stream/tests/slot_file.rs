//! Decodes debug-stream slots through the real slot sources.
//!
//! The producer side is emulated with [`SlotBuilder`]; after every batch of
//! records the slot image is copied into a memory-mapped file, the way the
//! kernel driver refreshes its debugfs node. The reader only ever sees the
//! file.

use dbgwin_mmap::{
    DEBUG_STREAM_SLOT_TYPE, FileSlot, MmapFileMut, SlotSelector, SlotSource, WindowSlot,
};
use dbgwin_records::{CpuInfo, Record, RecordKind, ThreadInfo};
use dbgwin_stream::producer::SlotBuilder;
use dbgwin_stream::{SLOT_SIZE, StreamDecoder};
use std::path::PathBuf;

fn temp_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("dbgwin_stream_{tag}_{}", std::process::id()))
}

fn cpu(load: u8, names: &[&str]) -> CpuInfo {
    CpuInfo {
        load,
        threads: names
            .iter()
            .map(|name| ThreadInfo {
                name: name.to_string(),
                stack_usage: 10,
                cpu_load: 20,
            })
            .collect(),
    }
}

struct Published {
    map: MmapFileMut,
    offset: usize,
}

impl Published {
    fn publish(&mut self, slot: &SlotBuilder) {
        let dst = &mut self.map.as_mut_slice()[self.offset..self.offset + SLOT_SIZE];
        dst.copy_from_slice(slot.as_bytes());
        self.map.flush().unwrap();
    }
}

fn drain(source: &mut impl SlotSource, dec: &mut StreamDecoder, out: &mut Vec<(u32, Record)>) {
    let mut buf = vec![0u8; SLOT_SIZE];
    source.read_slot(&mut buf).unwrap();
    dec.poll(&buf, out);
    assert!(dec.check_slot(&buf));
}

#[test]
fn decodes_through_debugfs_style_file() {
    let path = temp_path("file");
    let mut file = Published {
        map: MmapFileMut::create_rw(&path, SLOT_SIZE as u64).unwrap(),
        offset: 0,
    };

    // Nothing written yet: the reader must see a not-ready slot.
    let mut source = FileSlot::open(&path).unwrap();
    let mut buf = vec![0u8; SLOT_SIZE];
    source.read_slot(&mut buf).unwrap();
    let mut dec = StreamDecoder::default();
    assert!(dec.get_descriptors(&buf).unwrap_err().is_not_ready());

    let mut slot = SlotBuilder::new(&[256, 256]);
    slot.ring(0).push(1, &cpu(40, &["idle", "ll"]).to_payload());
    slot.ring(1).push(1, &cpu(90, &["dp"]).to_payload());
    file.publish(&slot);

    source.read_slot(&mut buf).unwrap();
    assert_eq!(dec.get_descriptors(&buf), Ok(2));
    let mut out = Vec::new();
    assert_eq!(dec.catch_up_all(&buf, &mut out), 2);

    for round in 0..5u8 {
        slot.ring(0).push(1, &cpu(round, &["idle"]).to_payload());
        slot.ring(0).push_sized(7, 6);
    }
    file.publish(&slot);
    drain(&mut source, &mut dec, &mut out);

    let core0: Vec<u32> = out
        .iter()
        .filter(|(core, _)| *core == 0)
        .map(|(_, r)| r.seqno())
        .collect();
    assert_eq!(core0, (0..11).collect::<Vec<_>>());

    let loads: Vec<u8> = out
        .iter()
        .filter(|(_, r)| r.header().kind() == RecordKind::ThreadInfo)
        .filter_map(|(_, r)| CpuInfo::parse(r.payload()).ok())
        .map(|info| info.load)
        .collect();
    assert_eq!(loads, vec![40, 90, 0, 1, 2, 3, 4]);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn decodes_through_debug_window() {
    let path = temp_path("window");
    let window_len = SLOT_SIZE * 16;
    let mut map = MmapFileMut::create_rw(&path, window_len as u64).unwrap();
    // Slot 2 carries the debug stream.
    let desc = 2 * 12;
    map.as_mut_slice()[desc + 4..desc + 8].copy_from_slice(&DEBUG_STREAM_SLOT_TYPE.to_le_bytes());
    let mut window = Published {
        map,
        offset: 3 * SLOT_SIZE,
    };

    let mut slot = SlotBuilder::new(&[128]);
    for _ in 0..3 {
        slot.ring(0).push_sized(1, 5);
    }
    window.publish(&slot);

    let mut source =
        WindowSlot::open(&path, 0, SlotSelector::Type(DEBUG_STREAM_SLOT_TYPE)).unwrap();
    let mut buf = vec![0u8; SLOT_SIZE];
    source.read_slot(&mut buf).unwrap();

    let mut dec = StreamDecoder::default();
    assert_eq!(dec.get_descriptors(&buf), Ok(1));
    let mut out = Vec::new();
    assert_eq!(dec.catch_up_all(&buf, &mut out), 3);

    // Wrap the ring several times between snapshots without lapping the
    // reader by more than one ring's worth.
    for _ in 0..4 {
        for _ in 0..10 {
            slot.ring(0).push_sized(1, 9);
        }
        window.publish(&slot);
        drain(&mut source, &mut dec, &mut out);
    }

    let seqnos: Vec<u32> = out.iter().map(|(_, r)| r.seqno()).collect();
    assert_eq!(seqnos, (0..43).collect::<Vec<_>>());

    let _ = std::fs::remove_file(&path);
}
