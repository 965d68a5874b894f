//! Job progress ledger.
//!
//! Process-wide table of job id -> progress entry, the only state shared
//! between a running job, a concurrent `cancel` call and a concurrent
//! progress reader. The ledger is an injected service with an explicit
//! lifecycle: an entry is created on `begin`, mutated through
//! [`ProgressLedger::complete_tile`] and [`ProgressLedger::request_cancel`],
//! and removed on `end`. Entries for different job ids never contend.
//!
//! Cancellation state lives next to, but apart from, the numeric
//! counters: a one-shot [`CancellationToken`] carries the request and a
//! oneshot channel carries the acknowledgment back to the canceller.

use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Errors raised by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// A live entry already exists for the job id.
    #[error("a job with id '{0}' is already running")]
    DuplicateJob(String),

    /// No live entry exists for the job id.
    #[error("no running job with id '{0}'")]
    UnknownJob(String),
}

/// Receiver side of a cancellation acknowledgment.
///
/// Resolves with the job id once the canceled job has drained its
/// in-flight work. If the job terminates naturally (or fails) before the
/// cancellation takes effect, the channel closes without a value.
pub type CancelAck = oneshot::Receiver<String>;

/// Result of crediting one completed tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCredit {
    /// Tiles completed so far, including the one just credited.
    pub tiles_completed: u64,
    /// True if cancellation was requested before or during this tile.
    pub cancel_requested: bool,
}

/// Progress of a job, computed at read time.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Total tiles the job will produce.
    pub total_tiles: u64,
    /// Tiles completed so far.
    pub tiles_completed: u64,
    /// Completion percentage, rounded to two decimals.
    pub percent: f64,
    /// Estimated remaining wait in milliseconds, projected from the pace
    /// of completed tiles. Zero until the first tile lands.
    pub estimated_wait_ms: u64,
}

#[derive(Debug)]
struct ProgressEntry {
    total_tiles: u64,
    tiles_completed: u64,
    started: Instant,
    last_tile: Option<Instant>,
    cancel: CancellationToken,
    acknowledger: Option<oneshot::Sender<String>>,
}

impl ProgressEntry {
    fn new(total_tiles: u64) -> Self {
        Self {
            total_tiles,
            tiles_completed: 0,
            started: Instant::now(),
            last_tile: None,
            cancel: CancellationToken::new(),
            acknowledger: None,
        }
    }
}

/// Table of live job progress entries.
#[derive(Debug, Default)]
pub struct ProgressLedger {
    entries: DashMap<String, ProgressEntry>,
}

impl ProgressLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the entry for a starting job.
    ///
    /// # Returns
    ///
    /// The job's cancellation token, for the traversal to observe.
    ///
    /// # Errors
    ///
    /// [`LedgerError::DuplicateJob`] if the id already has a live entry.
    pub fn begin(&self, job_id: &str, total_tiles: u64) -> Result<CancellationToken, LedgerError> {
        match self.entries.entry(job_id.to_string()) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateJob(job_id.to_string())),
            Entry::Vacant(vacant) => {
                let entry = ProgressEntry::new(total_tiles);
                let token = entry.cancel.clone();
                vacant.insert(entry);
                debug!(job = job_id, total_tiles, "progress entry created");
                Ok(token)
            }
        }
    }

    /// Returns the progress of a job, or `None` for unknown ids.
    pub fn snapshot(&self, job_id: &str) -> Option<ProgressSnapshot> {
        self.snapshot_at(job_id, Instant::now())
    }

    fn snapshot_at(&self, job_id: &str, now: Instant) -> Option<ProgressSnapshot> {
        let entry = self.entries.get(job_id)?;

        let ratio = if entry.total_tiles == 0 {
            100.0
        } else {
            entry.tiles_completed as f64 * 100.0 / entry.total_tiles as f64
        };

        let estimated_wait_ms = match entry.last_tile {
            Some(last_tile) if entry.tiles_completed > 0 => {
                // time from start to the last completed tile, projected to
                // 100%, minus the wait already spent since that tile
                let elapsed_ms = last_tile.duration_since(entry.started).as_millis() as f64;
                let since_last_ms = now.duration_since(last_tile).as_millis() as f64;
                let remaining = elapsed_ms * 100.0 / ratio - elapsed_ms - since_last_ms;
                remaining.round().max(0.0) as u64
            }
            _ => 0,
        };

        Some(ProgressSnapshot {
            total_tiles: entry.total_tiles,
            tiles_completed: entry.tiles_completed,
            percent: (ratio * 100.0).round() / 100.0,
            estimated_wait_ms,
        })
    }

    /// Credits one completed tile and reports pending cancellation.
    ///
    /// Increment, timestamp and cancellation check happen under the
    /// entry's lock as one operation; concurrent credits never lose an
    /// update and the check always sees the credit it follows.
    ///
    /// Returns `None` if the job has no live entry.
    pub fn complete_tile(&self, job_id: &str) -> Option<TileCredit> {
        let mut entry = self.entries.get_mut(job_id)?;
        entry.tiles_completed += 1;
        entry.last_tile = Some(Instant::now());
        Some(TileCredit {
            tiles_completed: entry.tiles_completed,
            cancel_requested: entry.cancel.is_cancelled(),
        })
    }

    /// Requests cooperative cancellation of a job.
    ///
    /// The returned [`CancelAck`] resolves once the job drains. Calling
    /// again replaces the previous acknowledger; its receiver observes a
    /// closed channel.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownJob`] if the id has no live entry.
    pub fn request_cancel(&self, job_id: &str) -> Result<CancelAck, LedgerError> {
        let mut entry = self
            .entries
            .get_mut(job_id)
            .ok_or_else(|| LedgerError::UnknownJob(job_id.to_string()))?;

        let (tx, rx) = oneshot::channel();
        entry.cancel.cancel();
        entry.acknowledger = Some(tx);
        debug!(job = job_id, "cancellation requested");
        Ok(rx)
    }

    /// Takes the acknowledger for a job, if a cancel was requested.
    ///
    /// The acknowledger can be taken at most once per cancel request.
    pub fn take_acknowledger(&self, job_id: &str) -> Option<oneshot::Sender<String>> {
        self.entries.get_mut(job_id)?.acknowledger.take()
    }

    /// Removes the entry for a job. Idempotent.
    pub fn end(&self, job_id: &str) {
        if self.entries.remove(job_id).is_some() {
            debug!(job = job_id, "progress entry removed");
        }
    }

    /// Number of live entries.
    pub fn active_jobs(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_begin_and_duplicate() {
        let ledger = ProgressLedger::new();
        ledger.begin("job-1", 10).unwrap();

        assert_eq!(
            ledger.begin("job-1", 10),
            Err(LedgerError::DuplicateJob("job-1".to_string()))
        );
        assert_eq!(ledger.active_jobs(), 1);
    }

    #[test]
    fn test_snapshot_unknown_job() {
        let ledger = ProgressLedger::new();
        assert!(ledger.snapshot("missing").is_none());
    }

    #[test]
    fn test_cancel_unknown_job() {
        let ledger = ProgressLedger::new();
        assert_eq!(
            ledger.request_cancel("missing").unwrap_err(),
            LedgerError::UnknownJob("missing".to_string())
        );
    }

    #[test]
    fn test_percent_rounds_to_two_decimals() {
        let ledger = ProgressLedger::new();
        ledger.begin("job-1", 3).unwrap();
        ledger.complete_tile("job-1").unwrap();

        let snapshot = ledger.snapshot("job-1").unwrap();
        assert_eq!(snapshot.percent, 33.33);
        assert_eq!(snapshot.tiles_completed, 1);
    }

    #[test]
    fn test_wait_is_zero_before_first_tile() {
        let ledger = ProgressLedger::new();
        ledger.begin("job-1", 10).unwrap();

        let snapshot = ledger.snapshot("job-1").unwrap();
        assert_eq!(snapshot.percent, 0.0);
        assert_eq!(snapshot.estimated_wait_ms, 0);
    }

    #[test]
    fn test_wait_projection() {
        let ledger = ProgressLedger::new();
        ledger.begin("job-1", 100).unwrap();

        // 40 tiles in 8 seconds, last tile 2 seconds ago: the remaining
        // 60% project to 12s, minus the 2s already waited
        let now = Instant::now();
        {
            let mut entry = ledger.entries.get_mut("job-1").unwrap();
            entry.tiles_completed = 40;
            entry.started = now - Duration::from_secs(10);
            entry.last_tile = Some(now - Duration::from_secs(2));
        }

        let snapshot = ledger.snapshot_at("job-1", now).unwrap();
        assert_eq!(snapshot.percent, 40.0);
        assert_eq!(snapshot.estimated_wait_ms, 10_000);
    }

    #[test]
    fn test_wait_never_negative() {
        let ledger = ProgressLedger::new();
        ledger.begin("job-1", 2).unwrap();

        // 1 of 2 tiles done instantly, then a long pause: the projection
        // is overdue and clamps at zero
        let now = Instant::now();
        {
            let mut entry = ledger.entries.get_mut("job-1").unwrap();
            entry.tiles_completed = 1;
            entry.started = now - Duration::from_secs(60);
            entry.last_tile = Some(now - Duration::from_secs(59));
        }

        let snapshot = ledger.snapshot_at("job-1", now).unwrap();
        assert_eq!(snapshot.estimated_wait_ms, 0);
    }

    #[test]
    fn test_percent_monotonic_and_bounded() {
        let ledger = ProgressLedger::new();
        ledger.begin("job-1", 7).unwrap();

        let mut previous = 0.0;
        for _ in 0..7 {
            ledger.complete_tile("job-1").unwrap();
            let snapshot = ledger.snapshot("job-1").unwrap();
            assert!(snapshot.percent >= previous);
            assert!(snapshot.percent <= 100.0);
            previous = snapshot.percent;
        }
        assert_eq!(previous, 100.0);
    }

    #[test]
    fn test_complete_tile_observes_cancel_after_credit() {
        let ledger = ProgressLedger::new();
        ledger.begin("job-1", 10).unwrap();

        let credit = ledger.complete_tile("job-1").unwrap();
        assert!(!credit.cancel_requested);
        assert_eq!(credit.tiles_completed, 1);

        let _ack = ledger.request_cancel("job-1").unwrap();
        let credit = ledger.complete_tile("job-1").unwrap();
        assert!(credit.cancel_requested);
        // the tile was still credited
        assert_eq!(credit.tiles_completed, 2);
    }

    #[tokio::test]
    async fn test_acknowledger_fires_once() {
        let ledger = ProgressLedger::new();
        ledger.begin("job-1", 10).unwrap();

        let ack = ledger.request_cancel("job-1").unwrap();
        let sender = ledger.take_acknowledger("job-1").unwrap();
        assert!(ledger.take_acknowledger("job-1").is_none());

        sender.send("job-1".to_string()).unwrap();
        assert_eq!(ack.await.unwrap(), "job-1");
    }

    #[tokio::test]
    async fn test_acknowledger_closes_when_entry_ends() {
        let ledger = ProgressLedger::new();
        ledger.begin("job-1", 10).unwrap();

        let ack = ledger.request_cancel("job-1").unwrap();
        ledger.end("job-1");

        // sender dropped with the entry: the canceller sees a closed channel
        assert!(ack.await.is_err());
    }

    #[test]
    fn test_end_is_idempotent() {
        let ledger = ProgressLedger::new();
        ledger.begin("job-1", 10).unwrap();
        ledger.end("job-1");
        ledger.end("job-1");
        assert_eq!(ledger.active_jobs(), 0);
    }

    #[test]
    fn test_begin_token_matches_cancel_request() {
        let ledger = ProgressLedger::new();
        let token = ledger.begin("job-1", 10).unwrap();
        assert!(!token.is_cancelled());

        let _ack = ledger.request_cancel("job-1").unwrap();
        assert!(token.is_cancelled());
    }
}
