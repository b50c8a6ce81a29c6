//! Per-room drift-corrected tick scheduler.
//!
//! Each active room gets its own thread. The next expected tick is always
//! computed from the previous expected time plus one interval, never from
//! the actual wake time, so jitter on any single tick doesn't accumulate
//! across the run — see `run_scheduler` below.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::warn;

use bandroom_types::{room_channel_path, RoomId, ServerEvent};

use crate::channels::ChannelRegistry;
use crate::clock;
use crate::room_store::RoomStore;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftStats {
    pub max_drift_ms: f64,
    pub avg_drift_ms: f64,
    pub tick_count: u64,
}

#[derive(Default)]
struct DriftAccumulator {
    max_ms: f64,
    sum_ms: f64,
    count: u64,
}

impl DriftAccumulator {
    fn record(&mut self, drift_ms: f64) {
        self.max_ms = self.max_ms.max(drift_ms);
        self.sum_ms += drift_ms;
        self.count += 1;
    }

    fn snapshot(&self) -> DriftStats {
        DriftStats {
            max_drift_ms: self.max_ms,
            avg_drift_ms: if self.count > 0 {
                self.sum_ms / self.count as f64
            } else {
                0.0
            },
            tick_count: self.count,
        }
    }
}

struct SchedulerHandle {
    stop_tx: Sender<()>,
    join: Option<JoinHandle<()>>,
    bpm: Arc<AtomicU32>,
    stats: Arc<Mutex<DriftAccumulator>>,
}

pub struct MetronomeEngine {
    room_store: Arc<RoomStore>,
    channels: Arc<ChannelRegistry>,
    schedulers: Mutex<HashMap<RoomId, SchedulerHandle>>,
}

impl MetronomeEngine {
    pub fn new(room_store: Arc<RoomStore>, channels: Arc<ChannelRegistry>) -> Self {
        Self {
            room_store,
            channels,
            schedulers: Mutex::new(HashMap::new()),
        }
    }

    /// Start a scheduler for `room_id` at `initial_bpm`. If one already
    /// exists it is stopped first.
    pub fn initialize(&self, room_id: RoomId, initial_bpm: u32) {
        self.cleanup(&room_id);

        let (stop_tx, stop_rx) = mpsc::channel();
        let bpm = Arc::new(AtomicU32::new(initial_bpm));
        let stats = Arc::new(Mutex::new(DriftAccumulator::default()));

        let room_store = self.room_store.clone();
        let channels = self.channels.clone();
        let bpm_handle = bpm.clone();
        let stats_handle = stats.clone();
        let scheduler_room_id = room_id.clone();

        let join = thread::spawn(move || {
            run_scheduler(scheduler_room_id, room_store, channels, bpm_handle, stats_handle, stop_rx);
        });

        self.schedulers.lock().unwrap().insert(
            room_id,
            SchedulerHandle {
                stop_tx,
                join: Some(join),
                bpm,
                stats,
            },
        );
    }

    /// Stage a new bpm. Takes effect at the scheduler's next tick boundary,
    /// never truncating the interval already in flight.
    pub fn update_tempo(&self, room_id: &RoomId, bpm: u32) {
        if let Some(handle) = self.schedulers.lock().unwrap().get(room_id) {
            handle.bpm.store(bpm, Ordering::SeqCst);
        }
    }

    pub fn cleanup(&self, room_id: &RoomId) {
        let handle = self.schedulers.lock().unwrap().remove(room_id);
        if let Some(mut handle) = handle {
            let _ = handle.stop_tx.send(());
            if let Some(join) = handle.join.take() {
                let _ = join.join();
            }
        }
    }

    pub fn drift_stats(&self, room_id: &RoomId) -> Option<DriftStats> {
        let schedulers = self.schedulers.lock().unwrap();
        schedulers.get(room_id).map(|h| h.stats.lock().unwrap().snapshot())
    }

    pub fn is_running(&self, room_id: &RoomId) -> bool {
        self.schedulers.lock().unwrap().contains_key(room_id)
    }
}

fn run_scheduler(
    room_id: RoomId,
    room_store: Arc<RoomStore>,
    channels: Arc<ChannelRegistry>,
    bpm: Arc<AtomicU32>,
    stats: Arc<Mutex<DriftAccumulator>>,
    stop_rx: mpsc::Receiver<()>,
) {
    let path = room_channel_path(&room_id);
    let mut expected_next = clock::mono_ns();

    loop {
        let current_bpm = bpm.load(Ordering::SeqCst).max(1);
        let interval_ns = (60_000_000_000f64 / current_bpm as f64).round() as u64;

        let now = clock::mono_ns();
        let drift_ms = (now as i128 - expected_next as i128).unsigned_abs() as f64 / 1_000_000.0;
        stats.lock().unwrap().record(drift_ms);

        let wall_now = clock::wall_ms();
        if !room_store.stamp_tick(&room_id, current_bpm, wall_now) {
            warn!(target: "metronome", "room {room_id} vanished, stopping scheduler");
            return;
        }
        channels.broadcast(
            &path,
            ServerEvent::MetronomeTick {
                timestamp_ms: wall_now,
                bpm: current_bpm,
            },
        );

        expected_next += interval_ns;
        let sleep_ns = expected_next.saturating_sub(clock::mono_ns());

        match stop_rx.recv_timeout(Duration::from_nanos(sleep_ns)) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => continue,
        }
    }
}
