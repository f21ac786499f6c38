//! Blocking capture loops stopped by Ctrl-C.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop request, checked by capture loops between frames.
#[derive(Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Run `work` on a blocking thread until it returns. Ctrl-C sets the stop
/// flag so the loop can finish its current frame and clean up.
pub async fn run_until_interrupted<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(StopFlag) -> Result<T> + Send + 'static,
{
    let stop = StopFlag::new();

    let watcher = {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received; stopping after current frame");
                stop.stop();
            }
        })
    };

    let result = tokio::task::spawn_blocking(move || work(stop))
        .await
        .context("capture thread panicked")?;
    watcher.abort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_flag_shared_between_clones() {
        let flag = StopFlag::new();
        let other = flag.clone();
        assert!(!other.is_stopped());
        flag.stop();
        assert!(other.is_stopped());
    }

    #[tokio::test]
    async fn test_run_until_interrupted_returns_work_result() {
        let value = run_until_interrupted(|stop| {
            assert!(!stop.is_stopped());
            Ok(42)
        })
        .await
        .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_run_until_interrupted_propagates_error() {
        let result: Result<()> = run_until_interrupted(|_| anyhow::bail!("camera gone")).await;
        assert_eq!(result.unwrap_err().to_string(), "camera gone");
    }
}
