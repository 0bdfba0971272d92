//! Per-session execution lanes
//!
//! `SessionQueue` gives every session key its own FIFO lane. A lane runs at
//! most `max_concurrent` tasks at once (1 by default), so two runs against
//! the same session never interleave while different sessions proceed in
//! parallel. An optional process-wide limit caps the total across lanes.
//!
//! Tasks that fail or panic free their slot like any other; the next
//! queued task starts regardless.
//!
//! # Example
//!
//! ```rust
//! use taskclaw::queue::{EnqueueOptions, SessionQueue};
//!
//! # tokio_test::block_on(async {
//! let queue = SessionQueue::new();
//! let answer = queue
//!     .enqueue("cli:default", || async { Ok(4) }, EnqueueOptions::new())
//!     .await
//!     .unwrap();
//! assert_eq!(answer, 4);
//! # });
//! ```

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, warn};

use crate::config::QueueConfig;
use crate::error::{Result, TaskClawError};

/// Lane used when a caller passes a blank key.
pub const DEFAULT_LANE: &str = "main";

/// Reported when a task waited at least its `warn_after` before starting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitInfo {
    /// Lane the task ran on
    pub lane: String,
    /// Time spent queued
    pub waited_ms: u64,
    /// Tasks still pending in the lane when it started
    pub queued_behind: usize,
}

/// Callback fired for slow-starting tasks.
pub type WaitCallback = Arc<dyn Fn(&WaitInfo) + Send + Sync>;

/// Per-task options.
#[derive(Clone, Default)]
pub struct EnqueueOptions {
    warn_after: Option<Duration>,
    on_wait: Option<WaitCallback>,
}

impl EnqueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the wait callback if the task waits at least `ms` milliseconds.
    pub fn warn_after_ms(mut self, ms: u64) -> Self {
        self.warn_after = Some(Duration::from_millis(ms));
        self
    }

    /// Replace the default wait warning with `callback`.
    pub fn on_wait<F>(mut self, callback: F) -> Self
    where
        F: Fn(&WaitInfo) + Send + Sync + 'static,
    {
        self.on_wait = Some(Arc::new(callback));
        self
    }
}

/// A queued job. Resolves to `true` when the task succeeded.
type Job = Box<dyn FnOnce() -> BoxFuture<'static, bool> + Send>;

struct QueuedTask {
    job: Job,
    enqueued_at: Instant,
    warn_after: Duration,
    on_wait: Option<WaitCallback>,
}

struct Lane {
    pending: VecDeque<QueuedTask>,
    active: usize,
    max_concurrent: usize,
}

impl Lane {
    fn new(max_concurrent: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            active: 0,
            max_concurrent,
        }
    }

    fn size(&self) -> usize {
        self.pending.len() + self.active
    }
}

struct Inner {
    lanes: Mutex<HashMap<String, Lane>>,
    default_max_concurrent: usize,
    default_warn_after: Duration,
    global: Option<Arc<Semaphore>>,
}

impl Inner {
    fn lanes(&self) -> MutexGuard<'_, HashMap<String, Lane>> {
        // Lane bookkeeping stays consistent even if a holder panicked.
        self.lanes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Serializes work per session key.
///
/// Cheap to clone; clones share the same lanes.
#[derive(Clone)]
pub struct SessionQueue {
    inner: Arc<Inner>,
}

impl Default for SessionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionQueue {
    /// A queue with one task per lane and a 2s wait warning.
    pub fn new() -> Self {
        Self::from_config(&QueueConfig::default())
    }

    /// A queue using the `queue` config section.
    pub fn from_config(config: &QueueConfig) -> Self {
        let queue = Self::with_defaults(
            config.max_concurrent,
            Duration::from_millis(config.warn_after_ms),
        );
        match config.global_max_concurrent {
            Some(limit) => queue.with_global_limit(limit),
            None => queue,
        }
    }

    fn with_defaults(max_concurrent: usize, warn_after: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                lanes: Mutex::new(HashMap::new()),
                default_max_concurrent: max_concurrent.max(1),
                default_warn_after: warn_after,
                global: None,
            }),
        }
    }

    /// Cap concurrent tasks across all lanes.
    ///
    /// Call before any task is enqueued; clones made earlier keep no limit.
    pub fn with_global_limit(self, limit: usize) -> Self {
        let inner = Inner {
            lanes: Mutex::new(HashMap::new()),
            default_max_concurrent: self.inner.default_max_concurrent,
            default_warn_after: self.inner.default_warn_after,
            global: Some(Arc::new(Semaphore::new(limit.max(1)))),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Run `task` on `lane` once every earlier task on that lane has started
    /// and a slot is free, and return its result.
    ///
    /// # Errors
    ///
    /// Whatever the task returns, or `Queue` if the task panicked or was
    /// removed by [`clear`](Self::clear) before starting.
    pub async fn enqueue<F, Fut, T>(&self, lane: &str, task: F, opts: EnqueueOptions) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let lane = lane_name(lane);
        let (tx, rx) = oneshot::channel();

        let job: Job = Box::new(move || {
            async move {
                let outcome = AssertUnwindSafe(async move { task().await })
                    .catch_unwind()
                    .await;
                let result = match outcome {
                    Ok(result) => result,
                    Err(_) => Err(TaskClawError::Queue("task panicked".into())),
                };
                let ok = result.is_ok();
                let _ = tx.send(result);
                ok
            }
            .boxed()
        });

        let queued = QueuedTask {
            job,
            enqueued_at: Instant::now(),
            warn_after: opts.warn_after.unwrap_or(self.inner.default_warn_after),
            on_wait: opts.on_wait,
        };

        {
            let mut lanes = self.inner.lanes();
            let default_max = self.inner.default_max_concurrent;
            let state = lanes
                .entry(lane.clone())
                .or_insert_with(|| Lane::new(default_max));
            state.pending.push_back(queued);
            debug!(lane = %lane, total = state.size(), "Enqueued task");
        }
        drain(&self.inner, &lane);

        rx.await
            .unwrap_or_else(|_| Err(TaskClawError::Queue(format!("task on lane '{}' was cleared", lane))))
    }

    /// Set how many tasks `lane` may run at once (minimum 1).
    pub fn set_concurrency(&self, lane: &str, max_concurrent: usize) {
        let lane = lane_name(lane);
        {
            let mut lanes = self.inner.lanes();
            let default_max = self.inner.default_max_concurrent;
            lanes
                .entry(lane.clone())
                .or_insert_with(|| Lane::new(default_max))
                .max_concurrent = max_concurrent.max(1);
        }
        drain(&self.inner, &lane);
    }

    /// Pending plus running tasks on `lane`.
    pub fn size(&self, lane: &str) -> usize {
        let lane = lane_name(lane);
        self.inner.lanes().get(&lane).map_or(0, Lane::size)
    }

    /// Pending plus running tasks on every lane.
    pub fn total_size(&self) -> usize {
        self.inner.lanes().values().map(Lane::size).sum()
    }

    /// Drop every pending task on `lane`. Running tasks are unaffected.
    ///
    /// Returns the number of tasks removed; their callers get a `Queue` error.
    pub fn clear(&self, lane: &str) -> usize {
        let lane = lane_name(lane);
        let removed: Vec<QueuedTask> = match self.inner.lanes().get_mut(&lane) {
            Some(state) => state.pending.drain(..).collect(),
            None => return 0,
        };
        if !removed.is_empty() {
            warn!(lane = %lane, removed = removed.len(), "Cleared pending tasks");
        }
        removed.len()
    }

    /// Forget lanes with nothing pending or running.
    ///
    /// Lanes are created on demand, so this only resets per-lane concurrency
    /// overrides. Returns the number of lanes removed.
    pub fn prune_idle(&self) -> usize {
        let mut lanes = self.inner.lanes();
        let before = lanes.len();
        lanes.retain(|_, state| state.size() > 0);
        let pruned = before - lanes.len();
        if pruned > 0 {
            debug!(pruned, "Pruned idle lanes");
        }
        pruned
    }

    /// Number of lanes currently tracked.
    pub fn lane_count(&self) -> usize {
        self.inner.lanes().len()
    }
}

fn lane_name(lane: &str) -> String {
    let trimmed = lane.trim();
    if trimmed.is_empty() {
        DEFAULT_LANE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Start as many pending tasks on `lane` as its free slots allow.
fn drain(inner: &Arc<Inner>, lane: &str) {
    let mut ready = Vec::new();
    {
        let mut lanes = inner.lanes();
        let Some(state) = lanes.get_mut(lane) else {
            return;
        };
        // Slots are claimed under the lock, so a concurrent drain cannot
        // start the same task twice.
        while state.active < state.max_concurrent {
            let Some(task) = state.pending.pop_front() else {
                break;
            };
            state.active += 1;
            ready.push((task, state.pending.len()));
        }
    }

    for (task, queued_behind) in ready {
        let waited = task.enqueued_at.elapsed();
        if waited >= task.warn_after {
            let info = WaitInfo {
                lane: lane.to_string(),
                waited_ms: waited.as_millis() as u64,
                queued_behind,
            };
            match task.on_wait {
                Some(ref callback) => callback(&info),
                None => warn!(
                    lane = %info.lane,
                    waited_ms = info.waited_ms,
                    queued_behind,
                    "Lane wait exceeded"
                ),
            }
        }
        debug!(lane, waited_ms = waited.as_millis() as u64, queued_behind, "Dequeued task");
        spawn_task(Arc::clone(inner), lane.to_string(), task.job);
    }
}

fn spawn_task(inner: Arc<Inner>, lane: String, job: Job) {
    tokio::spawn(async move {
        let permit = match inner.global {
            Some(ref semaphore) => Arc::clone(semaphore).acquire_owned().await.ok(),
            None => None,
        };

        let start = Instant::now();
        let ok = job().await;
        drop(permit);

        let (active, pending) = {
            let mut lanes = inner.lanes();
            match lanes.get_mut(&lane) {
                Some(state) => {
                    state.active = state.active.saturating_sub(1);
                    (state.active, state.pending.len())
                }
                None => (0, 0),
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        if ok {
            debug!(lane = %lane, duration_ms, active, pending, "Task done");
        } else {
            warn!(lane = %lane, duration_ms, active, pending, "Task failed");
        }

        drain(&inner, &lane);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{Barrier, Notify};

    async fn wait_for_size(queue: &SessionQueue, lane: &str, size: usize) {
        for _ in 0..200 {
            if queue.size(lane) == size {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("lane {} never reached size {}", lane, size);
    }

    #[tokio::test]
    async fn test_fifo_start_order() {
        let queue = SessionQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 1..=3 {
            let queue = queue.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(
                        "s1",
                        move || async move {
                            order.lock().unwrap().push(i);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            Ok(())
                        },
                        EnqueueOptions::new(),
                    )
                    .await
            }));
            // enqueue order follows spawn order only once each call has run
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_same_lane_never_overlaps() {
        let queue = SessionQueue::new();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = (0..5).map(|_| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            queue.enqueue(
                "s1",
                move || async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                },
                EnqueueOptions::new(),
            )
        });
        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_task_enqueued_from_running_task_starts() {
        let queue = SessionQueue::new();
        let (tx, rx) = oneshot::channel();

        let outer_queue = queue.clone();
        queue
            .enqueue(
                "s1",
                move || async move {
                    let nested_queue = outer_queue.clone();
                    tokio::spawn(async move {
                        let result = nested_queue
                            .enqueue("s1", || async { Ok(7) }, EnqueueOptions::new())
                            .await;
                        let _ = tx.send(result);
                    });
                    // the nested task is pending behind this one
                    wait_for_size(&outer_queue, "s1", 2).await;
                    Ok(())
                },
                EnqueueOptions::new(),
            )
            .await
            .unwrap();

        let nested = tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(nested.unwrap(), 7);
        assert_eq!(queue.size("s1"), 0);
    }

    #[tokio::test]
    async fn test_set_concurrency_allows_parallelism() {
        let queue = SessionQueue::new();
        queue.set_concurrency("s1", 2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = (0..4).map(|_| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            queue.enqueue(
                "s1",
                move || async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                },
                EnqueueOptions::new(),
            )
        });
        futures::future::join_all(tasks).await;
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_set_concurrency_floor_is_one() {
        let queue = SessionQueue::new();
        queue.set_concurrency("s1", 0);
        let value = queue
            .enqueue("s1", || async { Ok("ran") }, EnqueueOptions::new())
            .await
            .unwrap();
        assert_eq!(value, "ran");
    }

    #[tokio::test]
    async fn test_different_lanes_run_in_parallel() {
        let queue = SessionQueue::new();
        let barrier = Arc::new(Barrier::new(2));

        let a = {
            let barrier = Arc::clone(&barrier);
            queue.enqueue(
                "a",
                move || async move {
                    barrier.wait().await;
                    Ok(())
                },
                EnqueueOptions::new(),
            )
        };
        let b = {
            let barrier = Arc::clone(&barrier);
            queue.enqueue(
                "b",
                move || async move {
                    barrier.wait().await;
                    Ok(())
                },
                EnqueueOptions::new(),
            )
        };

        let both = tokio::time::timeout(Duration::from_secs(2), futures::future::join(a, b)).await;
        let (a, b) = both.expect("lanes should not block each other");
        a.unwrap();
        b.unwrap();
    }

    #[tokio::test]
    async fn test_global_limit_spans_lanes() {
        let queue = SessionQueue::new().with_global_limit(1);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = ["a", "b", "c"].into_iter().map(|lane| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            queue.enqueue(
                lane,
                move || async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                },
                EnqueueOptions::new(),
            )
        });
        futures::future::join_all(tasks).await;
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_lane() {
        let queue = SessionQueue::new();
        let failed = queue.enqueue(
            "s1",
            || async { Err::<(), _>(TaskClawError::Tool("boom".into())) },
            EnqueueOptions::new(),
        );
        let next = queue.enqueue("s1", || async { Ok(2) }, EnqueueOptions::new());

        let (failed, next) = futures::future::join(failed, next).await;
        assert!(matches!(failed, Err(TaskClawError::Tool(_))));
        assert_eq!(next.unwrap(), 2);
        wait_for_size(&queue, "s1", 0).await;
    }

    #[tokio::test]
    async fn test_panic_does_not_stop_lane() {
        let queue = SessionQueue::new();
        let panicked = queue.enqueue(
            "s1",
            || async {
                if true {
                    panic!("task blew up");
                }
                Ok(())
            },
            EnqueueOptions::new(),
        );
        let next = queue.enqueue("s1", || async { Ok("still running") }, EnqueueOptions::new());

        let (panicked, next) = futures::future::join(panicked, next).await;
        assert!(matches!(panicked, Err(TaskClawError::Queue(_))));
        assert_eq!(next.unwrap(), "still running");
    }

    #[tokio::test]
    async fn test_clear_drops_pending_only() {
        let queue = SessionQueue::new();
        let release = Arc::new(Notify::new());

        let blocker = {
            let queue = queue.clone();
            let release = Arc::clone(&release);
            tokio::spawn(async move {
                queue
                    .enqueue(
                        "s1",
                        move || async move {
                            release.notified().await;
                            Ok("finished")
                        },
                        EnqueueOptions::new(),
                    )
                    .await
            })
        };
        wait_for_size(&queue, "s1", 1).await;

        let waiting: Vec<_> = (0..2)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move {
                    queue
                        .enqueue("s1", || async { Ok("never") }, EnqueueOptions::new())
                        .await
                })
            })
            .collect();
        wait_for_size(&queue, "s1", 3).await;
        assert_eq!(queue.total_size(), 3);

        assert_eq!(queue.clear("s1"), 2);
        assert_eq!(queue.size("s1"), 1);
        release.notify_one();

        assert_eq!(blocker.await.unwrap().unwrap(), "finished");
        for handle in waiting {
            assert!(matches!(handle.await.unwrap(), Err(TaskClawError::Queue(_))));
        }
        assert_eq!(queue.clear("unknown"), 0);
    }

    #[tokio::test]
    async fn test_wait_callback() {
        let queue = SessionQueue::new();
        let fired = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&fired);
        queue
            .enqueue(
                "s1",
                || async { Ok(()) },
                EnqueueOptions::new()
                    .warn_after_ms(0)
                    .on_wait(move |info| seen.lock().unwrap().push(info.clone())),
            )
            .await
            .unwrap();

        let seen = Arc::clone(&fired);
        queue
            .enqueue(
                "s1",
                || async { Ok(()) },
                EnqueueOptions::new()
                    .warn_after_ms(60_000)
                    .on_wait(move |info| seen.lock().unwrap().push(info.clone())),
            )
            .await
            .unwrap();

        let fired = fired.lock().unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].lane, "s1");
        assert_eq!(fired[0].queued_behind, 0);
    }

    #[tokio::test]
    async fn test_blank_lane_uses_main() {
        let queue = SessionQueue::new();
        queue
            .enqueue("   ", || async { Ok(()) }, EnqueueOptions::new())
            .await
            .unwrap();
        assert_eq!(queue.lane_count(), 1);
        wait_for_size(&queue, "", 0).await;
        assert_eq!(queue.size(DEFAULT_LANE), 0);
        assert_eq!(queue.prune_idle(), 1);
        assert_eq!(queue.lane_count(), 0);
    }

    #[test]
    fn test_from_config() {
        let config = QueueConfig {
            max_concurrent: 0,
            warn_after_ms: 10,
            global_max_concurrent: Some(4),
        };
        let queue = SessionQueue::from_config(&config);
        assert_eq!(queue.inner.default_max_concurrent, 1);
        assert_eq!(queue.inner.default_warn_after, Duration::from_millis(10));
        assert!(queue.inner.global.is_some());
    }
}
