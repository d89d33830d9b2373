//! Time-ordered checkpoint ids.
//!
//! UUIDv6 puts the timestamp in the leading bits, so the hyphenated strings sort in
//! creation order. The tick counter never repeats within a process, which keeps ids
//! strictly increasing even when two checkpoints land in the same 100ns tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::{Timestamp, Uuid};

/// 100ns intervals between 1582-10-15 (UUID epoch) and 1970-01-01.
const GREGORIAN_OFFSET: u64 = 0x01B2_1DD2_1381_4000;

static LAST_TICKS: AtomicU64 = AtomicU64::new(0);
static NODE_ID: OnceLock<[u8; 6]> = OnceLock::new();

fn now_ticks() -> u64 {
    let since_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    GREGORIAN_OFFSET + (since_unix.as_nanos() / 100) as u64
}

fn node_id() -> &'static [u8; 6] {
    NODE_ID.get_or_init(|| {
        let random = Uuid::new_v4();
        let mut node = [0u8; 6];
        node.copy_from_slice(&random.as_bytes()[10..16]);
        node
    })
}

/// Next checkpoint id; greater than every id returned before in this process.
pub fn next_checkpoint_id() -> String {
    let now = now_ticks();
    let mut prev = LAST_TICKS.load(Ordering::Relaxed);
    let ticks = loop {
        let candidate = now.max(prev + 1);
        match LAST_TICKS.compare_exchange_weak(prev, candidate, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => break candidate,
            Err(actual) => prev = actual,
        }
    };
    let ts = Timestamp::from_gregorian(ticks, 0);
    Uuid::new_v6(ts, node_id()).hyphenated().to_string()
}
