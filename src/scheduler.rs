//! Fixed-period jobs on the tokio runtime.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use aws_sdk_sqs::error::DisplayErrorContext;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use crate::mdc::{MdcFutureExt, Snapshot};
use crate::span;

/// Runs named jobs on a fixed period until shut down.
///
/// Every invocation gets its own root span named after the job, and runs
/// with the MDC seeded from that span. A job that is still running when its
/// next tick is due makes the scheduler skip that tick.
pub struct Scheduler {
    jobs: JoinSet<()>,
    shutdown: Arc<watch::Sender<bool>>,
}

/// Stops the jobs of a [`Scheduler`] from anywhere, e.g. a signal handler.
#[derive(Clone)]
pub struct ShutdownHandle {
    shutdown: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Jobs finish their in-flight invocation, then stop.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            jobs: JoinSet::new(),
            shutdown: Arc::new(shutdown),
        }
    }

    /// Runs `job` every `period`, the first time right away.
    ///
    /// An invocation error is logged under the invocation's context; the
    /// schedule continues.
    pub fn every<F, Fut, E>(&mut self, identity: &'static str, period: Duration, job: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: std::error::Error + Send + 'static,
    {
        let mut shutdown = self.shutdown.subscribe();

        self.jobs.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                let stopped = *shutdown.borrow_and_update();
                if stopped {
                    break;
                }
                tokio::select! {
                    _ = interval.tick() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                }

                let span = span::invocation(identity);
                let invocation = job();
                async move {
                    if let Err(e) = invocation.await {
                        error!(job = identity, error = %DisplayErrorContext(&e), "scheduled invocation failed");
                    }
                }
                .with_mdc(Snapshot::for_span(&span))
                .await;
            }

            debug!(job = identity, "job stopped");
        });
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Waits until every job has stopped.
    pub async fn join(mut self) {
        while let Some(result) = self.jobs.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "job ended abnormally");
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::mdc;
    use crate::testing::init_tracing;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn counting_job(
        count: &Arc<AtomicUsize>,
    ) -> impl Fn() -> std::future::Ready<Result<(), TransportError>> + Send + 'static {
        let count = Arc::clone(count);
        move || {
            count.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_on_every_tick_until_shutdown() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        scheduler.every("send-job", Duration::from_secs(3), counting_job(&count));

        tokio::time::sleep(Duration::from_millis(6500)).await;
        scheduler.shutdown_handle().shutdown();
        scheduler.join().await;

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_before_first_tick_runs_nothing() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        scheduler.shutdown_handle().shutdown();
        scheduler.every("send-job", Duration::from_secs(3), counting_job(&count));

        scheduler.join().await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_invocation_does_not_stop_the_schedule() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        let calls = Arc::clone(&count);
        scheduler.every("receive-job", Duration::from_secs(2), move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err(TransportError::new("ReceiveMessage", "connection refused")))
        });

        tokio::time::sleep(Duration::from_millis(4500)).await;
        scheduler.shutdown_handle().shutdown();
        scheduler.join().await;

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn each_invocation_runs_under_its_own_root_span() {
        init_tracing();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        let record = Arc::clone(&seen);
        scheduler.every("send-job", Duration::from_secs(1), move || {
            let record = Arc::clone(&record);
            async move {
                tokio::task::yield_now().await;
                record.lock().unwrap().push(mdc::get("traceId"));
                Ok::<_, TransportError>(())
            }
        });

        tokio::time::sleep(Duration::from_millis(1500)).await;
        scheduler.shutdown_handle().shutdown();
        scheduler.join().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(Option::is_some));
        assert_ne!(seen[0], seen[1]);
    }
}
