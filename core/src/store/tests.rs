//! Tests for the snapshot store

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::delta::{CodecError, DeltaCodec, Lz4DeltaCodec};
use crate::schedule::SaveSchedule;
use crate::test_utils::{GatedCodec, wait_until};

use super::{SnapshotStore, StoreError};

const SHORT: Duration = Duration::from_millis(100);
const LONG: Duration = Duration::from_secs(5);

fn schedule() -> SaveSchedule {
    SaveSchedule::new(2, 900)
}

fn lz4_store() -> SnapshotStore {
    SnapshotStore::new(Arc::new(Lz4DeltaCodec::new()), schedule(), 3)
}

/// Wait for worker threads to release their capacity slots
fn wait_idle(store: &SnapshotStore) {
    wait_until("diff workers to finish", || store.outstanding() == 0);
}

fn state(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8) ^ seed).collect()
}

/// Codec that counts decodes
#[derive(Default)]
struct CountingCodec {
    decodes: AtomicUsize,
}

impl DeltaCodec for CountingCodec {
    fn encode(&self, base: &[u8], target: &[u8]) -> Result<Vec<u8>, CodecError> {
        Lz4DeltaCodec.encode(base, target)
    }

    fn decode(&self, base: &[u8], diff: &[u8]) -> Result<Vec<u8>, CodecError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        Lz4DeltaCodec.decode(base, diff)
    }
}

/// Codec that damages the base fingerprint of diffs whose target starts with 0xEE
struct CorruptingCodec;

impl DeltaCodec for CorruptingCodec {
    fn encode(&self, base: &[u8], target: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut diff = Lz4DeltaCodec.encode(base, target)?;
        if target.first() == Some(&0xEE) {
            diff[10] ^= 0x01;
        }
        Ok(diff)
    }

    fn decode(&self, base: &[u8], diff: &[u8]) -> Result<Vec<u8>, CodecError> {
        Lz4DeltaCodec.decode(base, diff)
    }
}

/// Codec whose `encode` panics
struct PanickingCodec;

impl DeltaCodec for PanickingCodec {
    fn encode(&self, _base: &[u8], _target: &[u8]) -> Result<Vec<u8>, CodecError> {
        panic!("encoder exploded");
    }

    fn decode(&self, _base: &[u8], _diff: &[u8]) -> Result<Vec<u8>, CodecError> {
        unreachable!("nothing to decode");
    }
}

/// Codec whose `encode` always reports an error
struct RejectingCodec;

impl DeltaCodec for RejectingCodec {
    fn encode(&self, _base: &[u8], target: &[u8]) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::TooLarge { len: target.len() })
    }

    fn decode(&self, _base: &[u8], _diff: &[u8]) -> Result<Vec<u8>, CodecError> {
        unreachable!("nothing to decode");
    }
}

#[test]
fn test_capture_base_only_once() {
    let store = lz4_store();
    store.capture_base(state(64, 1)).unwrap();
    assert_eq!(
        store.capture_base(state(64, 2)),
        Err(StoreError::BaseAlreadyCaptured)
    );
    assert_eq!(&*store.base().unwrap(), state(64, 1).as_slice());
}

#[test]
fn test_resolve_base_frame_skips_decode() {
    let codec = Arc::new(CountingCodec::default());
    let store = SnapshotStore::new(codec.clone(), schedule(), 3);
    let base = state(128, 7);
    store.capture_base(base.clone()).unwrap();

    assert_eq!(store.resolve(2).unwrap(), base);
    assert_eq!(codec.decodes.load(Ordering::SeqCst), 0);
}

#[test]
fn test_schedule_and_resolve_diff() {
    let store = lz4_store();
    store.capture_base(state(1024, 1)).unwrap();

    let later = state(1024, 9);
    let handle = store.schedule_diff(902, later.clone()).unwrap();
    assert_eq!(handle.frame(), 902);
    assert!(store.has_diff(902));

    assert_eq!(store.resolve(902).unwrap(), later);
    assert!(store.is_diff_ready(902));
    wait_idle(&store);
}

#[test]
fn test_schedule_rejects_off_schedule_frames() {
    let store = lz4_store();
    store.capture_base(state(16, 1)).unwrap();
    assert_eq!(
        store.schedule_diff(900, state(16, 2)).unwrap_err(),
        StoreError::OffSchedule(900)
    );
    assert_eq!(
        store.schedule_diff(2, state(16, 2)).unwrap_err(),
        StoreError::OffSchedule(2)
    );
}

#[test]
fn test_schedule_requires_base() {
    let store = lz4_store();
    assert_eq!(
        store.schedule_diff(902, state(16, 2)).unwrap_err(),
        StoreError::MissingBase
    );
    assert_eq!(store.resolve(2).unwrap_err(), StoreError::MissingBase);
}

#[test]
fn test_resolve_unknown_frame() {
    let store = lz4_store();
    store.capture_base(state(16, 1)).unwrap();
    assert_eq!(store.resolve(1802).unwrap_err(), StoreError::NoDiff(1802));
}

#[test]
fn test_schedule_same_frame_returns_existing_entry() {
    let store = lz4_store();
    store.capture_base(state(64, 1)).unwrap();
    let first = state(64, 3);
    store.schedule_diff(902, first.clone()).unwrap();
    store.schedule_diff(902, state(64, 4)).unwrap();

    assert_eq!(store.stats().diff_count, 1);
    assert_eq!(store.resolve(902).unwrap(), first);
}

#[test]
fn test_pending_diff_is_present_but_not_ready() {
    let codec = Arc::new(GatedCodec::default());
    let store = SnapshotStore::new(codec.clone(), schedule(), 3);
    store.capture_base(state(64, 1)).unwrap();

    let handle = store.schedule_diff(902, state(64, 2)).unwrap();
    assert!(store.has_diff(902));
    assert!(!store.is_diff_ready(902));
    assert_eq!(store.stats().pending, 1);

    codec.release(1);
    assert!(handle.wait().is_some());
    assert!(store.is_diff_ready(902));
}

#[test]
fn test_fourth_diff_blocks_until_one_completes() {
    let codec = Arc::new(GatedCodec::default());
    let store = SnapshotStore::new(codec.clone(), schedule(), 3);
    store.capture_base(state(256, 1)).unwrap();

    for (i, frame) in [902, 1802, 2702].into_iter().enumerate() {
        store.schedule_diff(frame, state(256, i as u8 + 2)).unwrap();
    }
    assert_eq!(store.outstanding(), 3);
    assert!(store.at_capacity());

    let (tx, rx) = mpsc::channel();
    let blocked_store = store.clone();
    let scheduler = thread::spawn(move || {
        let result = blocked_store.schedule_diff(3602, state(256, 9));
        tx.send(result.is_ok()).unwrap();
    });

    assert!(rx.recv_timeout(SHORT).is_err(), "fourth diff did not block");

    codec.release(1);
    assert_eq!(rx.recv_timeout(LONG), Ok(true));
    scheduler.join().unwrap();

    codec.release(3);
    for frame in [902, 1802, 2702, 3602] {
        assert!(store.resolve(frame).is_ok());
    }
    wait_idle(&store);
}

#[test]
fn test_wait_for_capacity_returns_when_closed() {
    let codec = Arc::new(GatedCodec::default());
    let store = SnapshotStore::new(codec.clone(), schedule(), 1);
    store.capture_base(state(32, 1)).unwrap();
    store.schedule_diff(902, state(32, 2)).unwrap();

    let (tx, rx) = mpsc::channel();
    let waiting_store = store.clone();
    let waiter = thread::spawn(move || {
        tx.send(waiting_store.wait_for_capacity()).unwrap();
    });
    assert!(rx.recv_timeout(SHORT).is_err());

    store.close();
    assert_eq!(rx.recv_timeout(LONG), Ok(false));
    waiter.join().unwrap();

    assert_eq!(
        store.schedule_diff(1802, state(32, 3)).unwrap_err(),
        StoreError::Closed
    );
    codec.release(1);
}

#[test]
fn test_codec_failure_is_isolated_to_one_entry() {
    let store = SnapshotStore::new(Arc::new(CorruptingCodec), schedule(), 3);
    store.capture_base(state(128, 1)).unwrap();

    let mut broken = state(128, 2);
    broken[0] = 0xEE;
    let healthy = state(128, 3);
    store.schedule_diff(902, broken).unwrap();
    store.schedule_diff(1802, healthy.clone()).unwrap();

    assert_eq!(
        store.resolve(902).unwrap_err(),
        StoreError::Codec {
            frame: 902,
            source: CodecError::BaseMismatch,
        }
    );
    assert_eq!(store.resolve(1802).unwrap(), healthy);
}

#[test]
fn test_panicking_worker_releases_capacity() {
    let store = SnapshotStore::new(Arc::new(PanickingCodec), schedule(), 1);
    store.capture_base(state(32, 1)).unwrap();
    store.schedule_diff(902, state(32, 2)).unwrap();

    assert_eq!(store.resolve(902).unwrap_err(), StoreError::DiffFailed(902));
    assert!(store.wait_for_capacity());
    assert_eq!(store.outstanding(), 0);
}

#[test]
fn test_encode_error_fails_diff_and_releases_capacity() {
    let store = SnapshotStore::new(Arc::new(RejectingCodec), schedule(), 1);
    store.capture_base(state(32, 1)).unwrap();
    store.schedule_diff(902, state(32, 2)).unwrap();

    assert_eq!(store.resolve(902).unwrap_err(), StoreError::DiffFailed(902));
    assert!(store.wait_for_capacity());
    assert_eq!(store.outstanding(), 0);
}

#[test]
fn test_clear_keeps_base_and_reset_drops_it() {
    let store = lz4_store();
    store.capture_base(state(64, 1)).unwrap();
    store.schedule_diff(902, state(64, 2)).unwrap();

    store.clear();
    assert!(!store.has_diff(902));
    assert!(store.base().is_some());

    store.reset();
    assert!(store.base().is_none());
    assert!(!store.is_open());
    assert_eq!(store.capture_base(state(64, 5)), Err(StoreError::Closed));

    store.open();
    store.capture_base(state(64, 5)).unwrap();
}

#[test]
fn test_stats() {
    let store = lz4_store();
    store.capture_base(state(2048, 1)).unwrap();
    store.schedule_diff(902, state(2048, 1)).unwrap();
    store.resolve(902).unwrap();
    wait_idle(&store);

    let stats = store.stats();
    assert_eq!(stats.diff_count, 1);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.outstanding, 0);
    assert_eq!(stats.base_bytes, 2048);
    assert!(stats.compressed_bytes > 0);
    assert!(stats.compressed_bytes < 2048);
}
