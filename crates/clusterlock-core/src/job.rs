//! Protected job contract

use std::future::Future;

use async_trait::async_trait;

use crate::cancel::CancellationSignal;

/// Work run while the lock is held
///
/// The signal is cancelled when the lease is lost or the manager shuts down.
/// Implementations must observe it and return promptly; the manager does not
/// abort a job that ignores it.
#[async_trait]
pub trait LockedJob: Send + Sync + 'static {
    async fn run(&self, cancel: CancellationSignal) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> LockedJob for F
where
    F: Fn(CancellationSignal) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn run(&self, cancel: CancellationSignal) -> anyhow::Result<()> {
        (self)(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct CountingJob {
        runs: AtomicU32,
    }

    #[async_trait]
    impl LockedJob for CountingJob {
        async fn run(&self, _cancel: CancellationSignal) -> anyhow::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_closure_job() {
        let seen = Arc::new(AtomicU32::new(0));
        let counter = seen.clone();
        let job = move |cancel: CancellationSignal| {
            let counter = counter.clone();
            async move {
                if !cancel.is_cancelled() {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                Ok::<(), anyhow::Error>(())
            }
        };

        job.run(CancellationSignal::new()).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_struct_job() {
        let job = CountingJob {
            runs: AtomicU32::new(0),
        };
        job.run(CancellationSignal::new()).await.unwrap();
        job.run(CancellationSignal::new()).await.unwrap();
        assert_eq!(job.runs.load(Ordering::SeqCst), 2);
    }
}
