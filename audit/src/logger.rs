use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::{AuditError, Result};
use crate::risk::{derive_tags, risk_score};
use crate::sink::AuditSink;
use crate::types::{AuditDetails, AuditEntry, AuditEventType, AuditLevel};

/// Configuration for the batching audit logger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Maximum entries written per flush
    pub batch_size: usize,
    /// Interval of the background flush in milliseconds
    pub flush_interval_ms: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            flush_interval_ms: 5_000,
        }
    }
}

/// Result of a single flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was queued
    Idle,
    /// Another flush was already running; nothing was done
    Busy,
    /// This many entries were written
    Flushed(usize),
}

struct FlushTask {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Clears the in-progress flag when a flush ends, however it ends.
struct FlushingGuard<'a>(&'a AtomicBool);

impl Drop for FlushingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Batched, at-least-once audit recorder.
///
/// [`AuditLogger::log`] builds an entry and queues it without waiting for
/// storage. Queued entries are written in batches by a background task
/// (see [`AuditLogger::start`]) or on demand with
/// [`AuditLogger::force_flush`]. An entry leaves the queue only once its
/// batch was written; a failed batch goes back to the front of the queue.
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    config: AuditConfig,
    queue: Mutex<VecDeque<AuditEntry>>,
    flushing: AtomicBool,
    task: Mutex<Option<FlushTask>>,
}

impl AuditLogger {
    /// Create a new audit logger writing to `sink`.
    pub fn new(sink: Arc<dyn AuditSink>, config: AuditConfig) -> Self {
        Self {
            sink,
            config,
            queue: Mutex::new(VecDeque::new()),
            flushing: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    /// Record an event and return its entry id.
    ///
    /// Returns as soon as the entry is queued, except for critical events,
    /// which wait until the queue has been flushed. A failed flush is logged
    /// and does not change the result.
    pub async fn log(&self, event_type: AuditEventType, details: AuditDetails) -> String {
        let entry = build_entry(event_type, details);
        let id = entry.id.clone();
        let critical = entry.level == AuditLevel::Critical;

        match entry.level {
            AuditLevel::Error | AuditLevel::Critical => warn!(
                "Audit {} ({}): actor={:?}, risk={}",
                entry.event_type, entry.level, entry.actor_email, entry.risk_score
            ),
            _ => debug!(
                "Audit {}: actor={:?}, risk={}",
                entry.event_type, entry.actor_email, entry.risk_score
            ),
        }

        self.enqueue(entry);

        if critical {
            if let Err(e) = self.force_flush().await {
                error!("Failed to flush critical audit entry {}: {}", id, e);
            }
        }

        id
    }

    fn enqueue(&self, entry: AuditEntry) {
        match self.queue.lock() {
            Ok(mut queue) => queue.push_back(entry),
            Err(_) => error!("Audit queue poisoned; dropping entry {}", entry.id),
        }
    }

    /// Number of entries waiting to be written.
    pub fn queue_len(&self) -> usize {
        self.queue.lock().map(|queue| queue.len()).unwrap_or(0)
    }

    /// Whether a flush is currently running.
    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::Acquire)
    }

    /// Write one batch from the front of the queue.
    ///
    /// Does nothing when another flush is in progress. All entries of the
    /// batch are written concurrently; if any write fails the whole batch is
    /// put back at the front of the queue and an error is returned.
    pub async fn flush(&self) -> Result<FlushOutcome> {
        if self
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(FlushOutcome::Busy);
        }
        let _guard = FlushingGuard(&self.flushing);

        let batch: Vec<AuditEntry> = {
            let mut queue = self
                .queue
                .lock()
                .map_err(|_| AuditError::Sink("audit queue poisoned".to_string()))?;
            let take = queue.len().min(self.config.batch_size.max(1));
            queue.drain(..take).collect()
        };

        if batch.is_empty() {
            return Ok(FlushOutcome::Idle);
        }

        let mut writes = JoinSet::new();
        for entry in batch.iter().cloned() {
            let sink = Arc::clone(&self.sink);
            writes.spawn(async move { sink.write(&entry).await });
        }

        let mut failed = 0;
        let mut reason = String::new();
        while let Some(joined) = writes.join_next().await {
            let outcome = match joined {
                Ok(result) => result,
                Err(e) => Err(AuditError::Sink(format!("write task failed: {}", e))),
            };
            if let Err(e) = outcome {
                failed += 1;
                reason = e.to_string();
            }
        }

        if failed > 0 {
            let size = batch.len();
            self.requeue_front(batch);
            warn!(
                "Audit flush failed for {}/{} entries, batch re-queued: {}",
                failed, size, reason
            );
            return Err(AuditError::Flush {
                failed,
                batch: size,
                reason,
            });
        }

        debug!("Flushed {} audit entries", batch.len());
        Ok(FlushOutcome::Flushed(batch.len()))
    }

    fn requeue_front(&self, batch: Vec<AuditEntry>) {
        match self.queue.lock() {
            Ok(mut queue) => {
                for entry in batch.into_iter().rev() {
                    queue.push_front(entry);
                }
            }
            Err(_) => error!("Audit queue poisoned; {} entries lost", batch.len()),
        }
    }

    /// Write everything queued, waiting for a running flush to finish first.
    ///
    /// Returns the number of entries this call wrote, or the first error.
    pub async fn force_flush(&self) -> Result<usize> {
        let mut written = 0;
        loop {
            match self.flush().await? {
                FlushOutcome::Flushed(count) => written += count,
                FlushOutcome::Idle => return Ok(written),
                FlushOutcome::Busy => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
    }

    /// Spawn the periodic flush on the current tokio runtime.
    ///
    /// Calling it again while the task is running does nothing.
    pub fn start(self: &Arc<Self>) {
        let Ok(mut slot) = self.task.lock() else {
            error!("Audit task state poisoned; background flush not started");
            return;
        };
        if slot.is_some() {
            return;
        }

        let (stop, mut stopped) = oneshot::channel();
        let logger = Arc::clone(self);
        let period = Duration::from_millis(self.config.flush_interval_ms.max(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = logger.flush().await {
                            warn!("Background audit flush failed: {}", e);
                        }
                    }
                    _ = &mut stopped => break,
                }
            }
        });

        *slot = Some(FlushTask { stop, handle });
        info!("Audit logger started (flush every {:?})", period);
    }

    /// Stop the background flush and drain the queue.
    pub async fn shutdown(&self) -> Result<usize> {
        let task = match self.task.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(task) = task {
            let _ = task.stop.send(());
            if let Err(e) = task.handle.await {
                warn!("Audit flush task ended abnormally: {}", e);
            }
        }

        let written = self.force_flush().await?;
        info!("Audit logger stopped, {} entries flushed on shutdown", written);
        Ok(written)
    }
}

/// Session id recorded on an entry.
///
/// The browser session id is only reused when the user consented to
/// functional storage; otherwise every entry gets a fresh ephemeral id.
pub fn resolve_session_id(details: &AuditDetails) -> String {
    match (&details.session_id, details.functional_consent) {
        (Some(session_id), true) if !session_id.is_empty() => session_id.clone(),
        _ => format!("ephemeral_{}", ulid::Ulid::new()),
    }
}

/// Build a complete entry, computing risk score and tags.
pub fn build_entry(event_type: AuditEventType, details: AuditDetails) -> AuditEntry {
    let risk_score = risk_score(event_type, &details);
    let tags = derive_tags(event_type, &details);
    let session_id = resolve_session_id(&details);

    AuditEntry {
        id: ulid::Ulid::new().to_string(),
        event_type,
        timestamp: Utc::now(),
        level: details.level,
        actor_email: details.actor_email,
        actor_role: details.actor_role,
        actor_ip: details.actor_ip,
        target_email: details.target_email,
        target_id: details.target_id,
        target_type: details.target_type,
        session_id,
        action: details.action,
        resource: details.resource,
        old_value: details.old_value,
        new_value: details.new_value,
        metadata: details.metadata,
        risk_score,
        tags,
        error: details.error,
        stack_trace: details.stack_trace,
    }
}
