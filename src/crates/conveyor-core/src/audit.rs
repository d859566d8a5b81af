//! Audit log: best-effort execution records through a bounded queue
//!
//! Every agent execution produces an [`ExecutionRecord`] (timing, success
//! flag, serialized input/output snapshots). Records flow through a
//! [`BoundedAuditQueue`] - an explicit capacity-bounded buffer with a
//! dedicated drain task and a drop-oldest overflow policy - so audit
//! persistence can never block or fail the primary execution path, and
//! queue growth stays observable instead of hiding in detached tasks.
//!
//! Sink failures are logged and swallowed; they never propagate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::warn;

/// Structured record of one agent execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Tenant the execution was scoped to
    pub tenant_id: String,
    /// Work item being processed
    pub work_item_id: String,
    /// Graph being executed
    pub graph_id: String,
    /// Agent that ran
    pub agent_name: String,
    /// Start of the execution
    pub started_at: DateTime<Utc>,
    /// End of the execution
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Whether the execution completed successfully
    pub success: bool,
    /// Serialized context snapshot before the execution
    pub input_snapshot: serde_json::Value,
    /// Serialized result snapshot after the execution
    pub output_snapshot: serde_json::Value,
    /// Error text for failed executions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Destination for execution records; allowed to fail without affecting
/// the primary path
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist one record
    async fn write(&self, record: ExecutionRecord) -> std::result::Result<(), String>;
}

/// Collecting sink for tests
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    records: Arc<Mutex<Vec<ExecutionRecord>>>,
}

impl MemoryAuditSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Records received so far
    pub async fn records(&self) -> Vec<ExecutionRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn write(&self, record: ExecutionRecord) -> std::result::Result<(), String> {
        self.records.lock().await.push(record);
        Ok(())
    }
}

struct QueueInner {
    buffer: Mutex<VecDeque<ExecutionRecord>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
    closed: std::sync::atomic::AtomicBool,
}

/// Bounded audit queue with a dedicated drain task
#[derive(Clone)]
pub struct BoundedAuditQueue {
    inner: Arc<QueueInner>,
}

impl BoundedAuditQueue {
    /// Create a queue and spawn its drain task against the given sink
    pub fn start(sink: Arc<dyn AuditSink>, capacity: usize) -> Self {
        let inner = Arc::new(QueueInner {
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
            closed: std::sync::atomic::AtomicBool::new(false),
        });

        let drain = inner.clone();
        tokio::spawn(async move {
            loop {
                let record = {
                    let mut buffer = drain.buffer.lock().await;
                    buffer.pop_front()
                };
                match record {
                    Some(record) => {
                        if let Err(error) = sink.write(record).await {
                            warn!(%error, "Audit sink write failed, record lost");
                        }
                    }
                    None => {
                        if drain.closed.load(Ordering::Acquire) {
                            break;
                        }
                        drain.notify.notified().await;
                    }
                }
            }
        });

        Self { inner }
    }

    /// Enqueue a record without blocking.
    ///
    /// When the queue is full the oldest record is dropped and counted;
    /// the new record always gets in. Never fails.
    pub async fn push(&self, record: ExecutionRecord) {
        {
            let mut buffer = self.inner.buffer.lock().await;
            if buffer.len() >= self.inner.capacity {
                buffer.pop_front();
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            }
            buffer.push_back(record);
        }
        self.inner.notify.notify_one();
    }

    /// Records dropped to overflow since start
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Records currently buffered (not yet drained)
    pub async fn pending(&self) -> usize {
        self.inner.buffer.lock().await.len()
    }

    /// Stop the drain task once the buffer empties
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn record(agent: &str) -> ExecutionRecord {
        let now = Utc::now();
        ExecutionRecord {
            tenant_id: "tenant-a".to_string(),
            work_item_id: "wi-1".to_string(),
            graph_id: "planning-graph".to_string(),
            agent_name: agent.to_string(),
            started_at: now,
            finished_at: now,
            duration_ms: 12,
            success: true,
            input_snapshot: json!({}),
            output_snapshot: json!({}),
            error: None,
        }
    }

    async fn drain_settles(queue: &BoundedAuditQueue) {
        for _ in 0..50 {
            if queue.pending().await == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("queue did not drain");
    }

    #[tokio::test]
    async fn records_reach_the_sink() {
        let sink = Arc::new(MemoryAuditSink::new());
        let queue = BoundedAuditQueue::start(sink.clone(), 16);

        queue.push(record("analyzer")).await;
        queue.push(record("planner")).await;
        drain_settles(&queue).await;

        let records = sink.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].agent_name, "analyzer");
        assert_eq!(queue.dropped_count(), 0);
    }

    #[tokio::test]
    async fn overflow_drops_oldest() {
        struct StuckSink(Notify);
        #[async_trait]
        impl AuditSink for StuckSink {
            async fn write(&self, _r: ExecutionRecord) -> std::result::Result<(), String> {
                self.0.notified().await; // never resolves in this test
                Ok(())
            }
        }

        let queue = BoundedAuditQueue::start(Arc::new(StuckSink(Notify::new())), 2);
        // First push is consumed by the drain task and parks in the sink;
        // the buffer then holds up to 2 and drops from the front.
        queue.push(record("a")).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(record("b")).await;
        queue.push(record("c")).await;
        queue.push(record("d")).await;

        assert_eq!(queue.dropped_count(), 1);
        assert_eq!(queue.pending().await, 2);
    }

    #[tokio::test]
    async fn failing_sink_is_swallowed() {
        struct FailingSink;
        #[async_trait]
        impl AuditSink for FailingSink {
            async fn write(&self, _r: ExecutionRecord) -> std::result::Result<(), String> {
                Err("disk full".to_string())
            }
        }

        let queue = BoundedAuditQueue::start(Arc::new(FailingSink), 8);
        queue.push(record("planner")).await;
        drain_settles(&queue).await;
        // Nothing to assert beyond "we got here without a panic or error".
    }
}
