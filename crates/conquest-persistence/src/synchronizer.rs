//! Persistence synchronizer.
//!
//! Game loops hand every tick's delta to a single background task. The task
//! keeps the newest record per entity and writes the buffer in one
//! transaction when it grows past `flush_max_records` or every
//! `flush_interval`. Failed writes are retried with exponential backoff while
//! new deltas keep merging into the buffer. Games never wait on storage
//! except for the final flush at game end.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use conquest_core::ids::*;
use conquest_core::records::*;

use crate::error::PersistError;
use crate::repository::GameRepository;

/// Destination of flushed deltas.
pub trait StateSink: Send + Sync + 'static {
    /// Write all deltas atomically.
    fn write(&self, deltas: &[StateDelta]) -> impl Future<Output = Result<(), PersistError>> + Send;
}

impl StateSink for GameRepository {
    fn write(&self, deltas: &[StateDelta]) -> impl Future<Output = Result<(), PersistError>> + Send {
        self.apply_deltas(deltas)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Flush as soon as this many distinct records are buffered.
    pub flush_max_records: usize,
    pub flush_interval_ms: u64,
    /// Delay before the first retry; doubles per consecutive failure.
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    /// Consecutive failures before the degraded warning.
    pub degraded_after: u32,
    /// Attempts made by a final (game end or shutdown) flush.
    pub final_flush_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            flush_max_records: 256,
            flush_interval_ms: 500,
            retry_base_ms: 100,
            retry_max_ms: 5_000,
            degraded_after: 5,
            final_flush_attempts: 3,
        }
    }
}

impl SyncConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    /// Wait after the `failures`-th consecutive failure.
    pub fn backoff(&self, failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(20);
        let ms = self.retry_base_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(ms.min(self.retry_max_ms))
    }
}

/// Counters exposed for health reporting.
#[derive(Debug, Default)]
pub struct SyncStats {
    flushes: AtomicU64,
    failures: AtomicU64,
    records_written: AtomicU64,
    degraded: AtomicBool,
}

impl SyncStats {
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }
}

enum SyncMessage {
    Delta(StateDelta),
    /// Write everything buffered now, retrying, and report the result.
    Flush(oneshot::Sender<Result<(), PersistError>>),
    Shutdown(oneshot::Sender<Result<(), PersistError>>),
}

/// Cloneable sender side of the synchronizer.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<SyncMessage>,
    stats: Arc<SyncStats>,
}

impl std::fmt::Debug for SyncMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMessage::Delta(d) => write!(f, "Delta({} @ {})", d.game_id, d.tick),
            SyncMessage::Flush(_) => f.write_str("Flush"),
            SyncMessage::Shutdown(_) => f.write_str("Shutdown"),
        }
    }
}

impl SyncHandle {
    /// Queue a delta. Never blocks. Empty deltas are dropped here.
    pub fn submit(&self, delta: StateDelta) -> Result<(), PersistError> {
        if delta.is_empty() {
            return Ok(());
        }
        self.tx
            .send(SyncMessage::Delta(delta))
            .map_err(|_| PersistError::SynchronizerClosed)
    }

    /// Flush everything submitted so far and wait for the outcome.
    pub async fn flush(&self) -> Result<(), PersistError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(SyncMessage::Flush(ack))
            .map_err(|_| PersistError::SynchronizerClosed)?;
        done.await.map_err(|_| PersistError::SynchronizerClosed)?
    }

    /// `flush` for callers outside the runtime, such as game-loop threads.
    /// Must not be called from an async context.
    pub fn flush_blocking(&self) -> Result<(), PersistError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(SyncMessage::Flush(ack))
            .map_err(|_| PersistError::SynchronizerClosed)?;
        done.blocking_recv()
            .map_err(|_| PersistError::SynchronizerClosed)?
    }

    /// Final flush, then stop the task.
    pub async fn shutdown(&self) -> Result<(), PersistError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(SyncMessage::Shutdown(ack))
            .map_err(|_| PersistError::SynchronizerClosed)?;
        done.await.map_err(|_| PersistError::SynchronizerClosed)?
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }
}

/// Start the synchronizer task on the current runtime.
pub fn spawn<S: StateSink>(sink: S, config: SyncConfig) -> (SyncHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stats = Arc::new(SyncStats::default());
    let task = tokio::spawn(run(sink, config, rx, Arc::clone(&stats)));
    (SyncHandle { tx, stats }, task)
}

// ---- Buffer ----

/// Latest record per entity for one game.
#[derive(Debug, Default)]
struct GameBatch {
    tick: u64,
    game: Option<GameRecord>,
    players: BTreeMap<PlayerId, PlayerRecord>,
    camps: BTreeMap<CampId, CampRecord>,
    units: BTreeMap<UnitId, UnitRecord>,
    ships: BTreeMap<ShipId, ShipRecord>,
    regions: BTreeMap<RegionId, RegionControlRecord>,
}

impl GameBatch {
    fn len(&self) -> usize {
        usize::from(self.game.is_some())
            + self.players.len()
            + self.camps.len()
            + self.units.len()
            + self.ships.len()
            + self.regions.len()
    }
}

#[derive(Debug, Default)]
struct PendingBatch {
    games: BTreeMap<GameId, GameBatch>,
}

impl PendingBatch {
    fn merge(&mut self, delta: StateDelta) {
        let batch = self.games.entry(delta.game_id).or_default();
        batch.tick = batch.tick.max(delta.tick);
        if delta.game.is_some() {
            batch.game = delta.game;
        }
        batch.players.extend(delta.players.into_iter().map(|r| (r.id, r)));
        batch.camps.extend(delta.camps.into_iter().map(|r| (r.id, r)));
        batch.units.extend(delta.units.into_iter().map(|r| (r.id, r)));
        batch.ships.extend(delta.ships.into_iter().map(|r| (r.id, r)));
        batch.regions.extend(delta.region_control.into_iter().map(|r| (r.region_id, r)));
    }

    fn len(&self) -> usize {
        self.games.values().map(GameBatch::len).sum()
    }

    fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    fn drain(&mut self) -> Vec<StateDelta> {
        std::mem::take(&mut self.games)
            .into_iter()
            .map(|(game_id, b)| StateDelta {
                game_id,
                tick: b.tick,
                game: b.game,
                players: b.players.into_values().collect(),
                camps: b.camps.into_values().collect(),
                units: b.units.into_values().collect(),
                ships: b.ships.into_values().collect(),
                region_control: b.regions.into_values().collect(),
            })
            .collect()
    }
}

// ---- Task ----

struct Synchronizer<S> {
    sink: S,
    config: SyncConfig,
    pending: PendingBatch,
    failures: u32,
    retry_at: Option<Instant>,
    degraded: bool,
    stats: Arc<SyncStats>,
}

impl<S: StateSink> Synchronizer<S> {
    fn may_attempt(&self) -> bool {
        self.retry_at.map_or(true, |at| Instant::now() >= at)
    }

    async fn flush(&mut self) -> Result<(), PersistError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let deltas = self.pending.drain();
        let records: usize = deltas.iter().map(StateDelta::record_count).sum();
        match self.sink.write(&deltas).await {
            Ok(()) => {
                self.stats.flushes.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .records_written
                    .fetch_add(records as u64, Ordering::Relaxed);
                if self.failures > 0 {
                    info!(failures = self.failures, "persistence recovered");
                }
                self.failures = 0;
                self.retry_at = None;
                self.degraded = false;
                self.stats.degraded.store(false, Ordering::Relaxed);
                debug!(records, games = deltas.len(), "flushed");
                Ok(())
            }
            Err(error) => {
                // Nothing new arrived during the write; put the batch back.
                for delta in deltas {
                    self.pending.merge(delta);
                }
                self.failures += 1;
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                let wait = self.config.backoff(self.failures);
                self.retry_at = Some(Instant::now() + wait);
                warn!(
                    %error,
                    failures = self.failures,
                    retry_in_ms = wait.as_millis() as u64,
                    records,
                    "flush failed"
                );
                if self.failures >= self.config.degraded_after && !self.degraded {
                    self.degraded = true;
                    self.stats.degraded.store(true, Ordering::Relaxed);
                    warn!(
                        failures = self.failures,
                        buffered = self.pending.len(),
                        "persistence degraded, games continue in memory"
                    );
                }
                Err(error)
            }
        }
    }

    /// Flush ignoring the backoff schedule, retrying a bounded number of times.
    async fn flush_final(&mut self) -> Result<(), PersistError> {
        let attempts = self.config.final_flush_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.flush().await {
                Ok(()) => return Ok(()),
                Err(error) if attempt >= attempts => return Err(error),
                Err(_) => {
                    time::sleep(self.config.backoff(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

async fn run<S: StateSink>(
    sink: S,
    config: SyncConfig,
    mut rx: mpsc::UnboundedReceiver<SyncMessage>,
    stats: Arc<SyncStats>,
) {
    let mut ticker = time::interval(config.flush_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    let mut sync = Synchronizer {
        sink,
        config,
        pending: PendingBatch::default(),
        failures: 0,
        retry_at: None,
        degraded: false,
        stats,
    };
    debug!("synchronizer started");

    loop {
        let retry_at = sync.retry_at;
        let retry = async move {
            match retry_at {
                Some(at) => time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            message = rx.recv() => match message {
                Some(SyncMessage::Delta(delta)) => {
                    sync.pending.merge(delta);
                    if sync.pending.len() >= sync.config.flush_max_records && sync.may_attempt() {
                        let _ = sync.flush().await;
                    }
                }
                Some(SyncMessage::Flush(ack)) => {
                    let _ = ack.send(sync.flush_final().await);
                }
                Some(SyncMessage::Shutdown(ack)) => {
                    let _ = ack.send(sync.flush_final().await);
                    break;
                }
                None => {
                    if let Err(error) = sync.flush_final().await {
                        warn!(%error, lost = sync.pending.len(), "final flush failed on close");
                    }
                    break;
                }
            },
            _ = ticker.tick() => {
                if !sync.pending.is_empty() && sync.may_attempt() {
                    let _ = sync.flush().await;
                }
            }
            _ = retry => {
                let _ = sync.flush().await;
            }
        }
    }
    info!("synchronizer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_cap() {
        let config = SyncConfig::default();
        assert_eq!(config.backoff(1), Duration::from_millis(100));
        assert_eq!(config.backoff(2), Duration::from_millis(200));
        assert_eq!(config.backoff(4), Duration::from_millis(800));
        assert_eq!(config.backoff(7), Duration::from_millis(5_000));
        assert_eq!(config.backoff(u32::MAX), Duration::from_millis(5_000));
    }
}
