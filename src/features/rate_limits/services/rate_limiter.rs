use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;

use crate::features::rate_limits::error::RateLimitError;
use crate::features::rate_limits::models::{ApiCategory, RateLimitConfig, RateLimitStatus};

/// Slack added to the computed wait so the oldest timestamp has left the
/// window when the drain loop wakes
const DRAIN_MARGIN: Duration = Duration::from_millis(10);

/// A queued operation. Calling it returns `None` when the caller has already
/// gone away, otherwise the future that runs the operation and delivers its
/// result.
type QueuedJob = Box<dyn FnOnce() -> Option<BoxFuture<'static, ()>> + Send>;

struct QueuedRequest {
    job: QueuedJob,
    enqueued_at: Instant,
}

#[derive(Default)]
struct LimiterState {
    timestamps: VecDeque<Instant>,
    queue: VecDeque<QueuedRequest>,
    processing: bool,
}

impl LimiterState {
    /// Timestamps are pushed in order, so expired ones sit at the front
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.duration_since(oldest) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn count_in_window(&self, now: Instant, window: Duration) -> usize {
        self.timestamps
            .iter()
            .filter(|t| now.duration_since(**t) < window)
            .count()
    }

    /// Time until the oldest timestamp leaves the window
    fn wait_time(&self, now: Instant, window: Duration) -> Duration {
        self.timestamps
            .front()
            .map(|oldest| window.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or_default()
    }
}

enum DrainStep {
    Dispatch(BoxFuture<'static, ()>, Instant),
    Wait(Duration),
    Skipped(Instant),
}

enum Admission {
    Immediate,
    Queued,
    Rejected(Duration),
}

/// Sliding-window limiter with an optional FIFO queue.
///
/// At most `max_requests` operations start within any `window`. When the
/// window is full, callers either get `RateLimitError::Exceeded` or wait in
/// the queue, which a single background task services strictly in order.
pub struct RateLimiter {
    category: ApiCategory,
    config: RateLimitConfig,
    state: Arc<Mutex<LimiterState>>,
}

impl RateLimiter {
    pub fn new(category: ApiCategory, config: RateLimitConfig) -> Self {
        Self {
            category,
            config,
            state: Arc::new(Mutex::new(LimiterState::default())),
        }
    }

    /// Runs `op` once the window allows it and hands back its own result.
    ///
    /// Dropping the returned future withdraws a queued request; it is then
    /// skipped without consuming a slot.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<RateLimitError> + Send + 'static,
    {
        let window = self.config.window();
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.prune(now, window);

        // New callers never overtake a non-empty queue
        let admission = if state.queue.is_empty()
            && state.timestamps.len() < self.config.max_requests() as usize
        {
            Admission::Immediate
        } else if self.config.queue_enabled() {
            Admission::Queued
        } else {
            Admission::Rejected(state.wait_time(now, window))
        };

        match admission {
            Admission::Immediate => {
                state.timestamps.push_back(now);
                drop(state);
                op().await
            }
            Admission::Rejected(retry_after) => {
                tracing::debug!(
                    category = %self.category,
                    ?retry_after,
                    "Rate limit exceeded, queueing disabled"
                );
                Err(RateLimitError::Exceeded {
                    category: self.category,
                    retry_after,
                }
                .into())
            }
            Admission::Queued => {
                let (result_tx, result_rx) = oneshot::channel::<Result<T, E>>();
                let (started_tx, started_rx) = oneshot::channel::<()>();

                let job: QueuedJob = Box::new(move || {
                    if result_tx.is_closed() {
                        return None;
                    }
                    let _ = started_tx.send(());
                    Some(
                        async move {
                            let _ = result_tx.send(op().await);
                        }
                        .boxed(),
                    )
                });

                state.queue.push_back(QueuedRequest { job, enqueued_at: now });
                tracing::debug!(
                    category = %self.category,
                    queue_length = state.queue.len(),
                    "Request queued"
                );
                self.ensure_draining(&mut state);
                drop(state);

                self.await_queued(started_rx, result_rx).await
            }
        }
    }

    async fn await_queued<T, E>(
        &self,
        started_rx: oneshot::Receiver<()>,
        result_rx: oneshot::Receiver<Result<T, E>>,
    ) -> Result<T, E>
    where
        E: From<RateLimitError>,
    {
        let cleared = || -> E {
            RateLimitError::QueueCleared {
                category: self.category,
            }
            .into()
        };

        if let Some(limit) = self.config.queue_timeout() {
            match tokio::time::timeout(limit, started_rx).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => return Err(cleared()),
                Err(_) => {
                    tracing::warn!(category = %self.category, waited = ?limit, "Queued request timed out");
                    return Err(RateLimitError::QueueTimeout {
                        category: self.category,
                        waited: limit,
                    }
                    .into());
                }
            }
        }

        // A dropped sender means the job was discarded by `reset`
        result_rx.await.unwrap_or_else(|_| Err(cleared()))
    }

    fn ensure_draining(&self, state: &mut LimiterState) {
        if state.processing {
            return;
        }
        state.processing = true;

        tokio::spawn(drain_queue(
            Arc::clone(&self.state),
            self.config,
            self.category,
        ));
    }

    /// Read-only snapshot; expired timestamps are excluded, not removed
    pub async fn status(&self) -> RateLimitStatus {
        let state = self.state.lock().await;
        let in_window = state.count_in_window(Instant::now(), self.config.window());
        let max_requests = self.config.max_requests();

        RateLimitStatus {
            category: self.category,
            requests_in_window: in_window as u32,
            max_requests,
            queue_length: state.queue.len(),
            can_make_request: in_window < max_requests as usize && state.queue.is_empty(),
            window: self.config.window(),
        }
    }

    /// Forgets the window and drops every queued request. Waiting callers
    /// observe `RateLimitError::QueueCleared`.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        let dropped = state.queue.len();
        state.timestamps.clear();
        state.queue.clear();

        tracing::info!(category = %self.category, dropped, "Rate limiter reset");
    }
}

/// Services the queue until it is empty. Exactly one instance runs per
/// limiter, guarded by `LimiterState::processing`.
async fn drain_queue(
    state: Arc<Mutex<LimiterState>>,
    config: RateLimitConfig,
    category: ApiCategory,
) {
    let window = config.window();
    let max_requests = config.max_requests() as usize;

    loop {
        let step = {
            let mut guard = state.lock().await;
            let now = Instant::now();
            guard.prune(now, window);

            if guard.timestamps.len() >= max_requests && !guard.queue.is_empty() {
                DrainStep::Wait(guard.wait_time(now, window) + DRAIN_MARGIN)
            } else if let Some(request) = guard.queue.pop_front() {
                match (request.job)() {
                    Some(future) => {
                        guard.timestamps.push_back(now);
                        DrainStep::Dispatch(future, request.enqueued_at)
                    }
                    None => DrainStep::Skipped(request.enqueued_at),
                }
            } else {
                guard.processing = false;
                return;
            }
        };

        match step {
            DrainStep::Wait(delay) => {
                tracing::debug!(%category, ?delay, "Window full, drain loop waiting");
                tokio::time::sleep(delay).await;
            }
            DrainStep::Dispatch(future, enqueued_at) => {
                tracing::debug!(%category, waited = ?enqueued_at.elapsed(), "Dispatching queued request");
                if AssertUnwindSafe(future).catch_unwind().await.is_err() {
                    tracing::error!(%category, "Queued request panicked");
                }
            }
            DrainStep::Skipped(enqueued_at) => {
                tracing::debug!(%category, waited = ?enqueued_at.elapsed(), "Skipping withdrawn request");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Limited(RateLimitError),
        Op(&'static str),
    }

    impl From<RateLimitError> for TestError {
        fn from(err: RateLimitError) -> Self {
            TestError::Limited(err)
        }
    }

    fn limiter(max_requests: u32, window_ms: u64, queue_enabled: bool) -> Arc<RateLimiter> {
        let config =
            RateLimitConfig::new(max_requests, Duration::from_millis(window_ms), queue_enabled)
                .unwrap();
        Arc::new(RateLimiter::new(ApiCategory::Api, config))
    }

    async fn ok_now(limiter: &RateLimiter) -> Result<Instant, TestError> {
        limiter
            .execute(|| async { Ok::<_, TestError>(Instant::now()) })
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_immediately_under_limit() {
        let limiter = limiter(3, 1_000, false);
        let start = Instant::now();

        for _ in 0..3 {
            let ran_at = ok_now(&limiter).await.unwrap();
            assert_eq!(ran_at, start);
        }

        let status = limiter.status().await;
        assert_eq!(status.requests_in_window, 3);
        assert!(!status.can_make_request);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_at_boundary_without_queue() {
        let limiter = limiter(2, 1_000, false);
        ok_now(&limiter).await.unwrap();
        tokio::time::advance(Duration::from_millis(400)).await;
        ok_now(&limiter).await.unwrap();

        let err = ok_now(&limiter).await.unwrap_err();
        assert_eq!(
            err,
            TestError::Limited(RateLimitError::Exceeded {
                category: ApiCategory::Api,
                retry_after: Duration::from_millis(600),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timestamp_at_exact_window_age_is_expired() {
        let limiter = limiter(1, 1_000, false);
        ok_now(&limiter).await.unwrap();

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(ok_now(&limiter).await.is_err());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(ok_now(&limiter).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_request_waits_for_window() {
        let limiter = limiter(2, 1_000, true);
        let start = Instant::now();

        ok_now(&limiter).await.unwrap();
        ok_now(&limiter).await.unwrap();
        let third = ok_now(&limiter).await.unwrap();

        assert!(third.duration_since(start) >= Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_is_serviced_in_fifo_order() {
        let limiter = limiter(1, 100, true);
        let started = Arc::new(std::sync::Mutex::new(Vec::new()));

        // Earlier callers run longest, so any reordering would show up
        let calls = (0..5u64).map(|i| {
            let limiter = Arc::clone(&limiter);
            let started = Arc::clone(&started);
            async move {
                limiter
                    .execute(move || async move {
                        started.lock().unwrap().push((i, Instant::now()));
                        tokio::time::sleep(Duration::from_millis((5 - i) * 70)).await;
                        Ok::<_, TestError>(i)
                    })
                    .await
            }
        });

        let results: Vec<u64> = futures::future::join_all(calls)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(results, vec![0, 1, 2, 3, 4]);

        let started = started.lock().unwrap();
        let order: Vec<u64> = started.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        for pair in started.windows(2) {
            assert!(pair[1].1.duration_since(pair[0].1) >= Duration::from_millis(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_window_ever_holds_more_than_max() {
        let limiter = limiter(3, 1_000, true);

        let calls = (0..10).map(|_| {
            let limiter = Arc::clone(&limiter);
            async move { ok_now(&limiter).await }
        });
        let started: Vec<Instant> = futures::future::join_all(calls)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        for pair in started.windows(4) {
            assert!(pair[3].duration_since(pair[0]) >= Duration::from_millis(1_000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_counts_only_live_timestamps() {
        let limiter = limiter(2, 1_000, true);
        ok_now(&limiter).await.unwrap();
        ok_now(&limiter).await.unwrap();

        tokio::time::advance(Duration::from_millis(1_500)).await;

        let status = limiter.status().await;
        assert_eq!(status.requests_in_window, 0);
        assert_eq!(status.queue_length, 0);
        assert!(status.can_make_request);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_errors_pass_through_without_retry() {
        let limiter = limiter(5, 1_000, true);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let result: Result<(), TestError> = limiter
            .execute(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Op("upstream failed"))
            })
            .await;

        assert_eq!(result, Err(TestError::Op("upstream failed")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_releases_queued_callers() {
        let limiter = limiter(1, 60_000, true);
        ok_now(&limiter).await.unwrap();

        let waiting = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { ok_now(&limiter).await })
        };

        // Let the spawned caller reach the queue
        while limiter.status().await.queue_length == 0 {
            tokio::task::yield_now().await;
        }
        limiter.reset().await;

        let result = waiting.await.unwrap();
        assert_eq!(
            result.unwrap_err(),
            TestError::Limited(RateLimitError::QueueCleared {
                category: ApiCategory::Api
            })
        );
        assert!(limiter.status().await.can_make_request);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_timeout_gives_up() {
        let config = RateLimitConfig::new(1, Duration::from_secs(10), true)
            .unwrap()
            .with_queue_timeout(Duration::from_millis(200))
            .unwrap();
        let limiter = RateLimiter::new(ApiCategory::Search, config);
        ok_now(&limiter).await.unwrap();

        let err = ok_now(&limiter).await.unwrap_err();
        assert_eq!(
            err,
            TestError::Limited(RateLimitError::QueueTimeout {
                category: ApiCategory::Search,
                waited: Duration::from_millis(200),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_withdrawn_request_is_skipped_without_a_slot() {
        let limiter = limiter(1, 1_000, true);
        ok_now(&limiter).await.unwrap();

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let withdrawn = limiter.execute(move || async move {
            flag.store(true, Ordering::SeqCst);
            Ok::<_, TestError>(())
        });
        assert!(tokio::time::timeout(Duration::from_millis(50), withdrawn)
            .await
            .is_err());

        tokio::time::sleep(Duration::from_millis(1_500)).await;

        assert!(!ran.load(Ordering::SeqCst));
        let status = limiter.status().await;
        assert_eq!(status.requests_in_window, 0);
        assert_eq!(status.queue_length, 0);
    }
}
