use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Linear backoff: `base_delay × attempt` before each retry.
    pub fn delay_before(&self, attempt: usize) -> Duration {
        self.base_delay.saturating_mul(attempt as u32)
    }
}

/// Runs `op` until it succeeds or `policy.max_retries` retries are spent.
/// `op` receives the zero-based attempt number.
pub async fn retry_with_backoff<T, F, Fut>(label: &str, policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0usize;
    loop {
        if attempt > 0 {
            let delay = policy.delay_before(attempt);
            info!(
                task = label,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying after delay"
            );
            tokio::time::sleep(delay).await;
        }

        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_retries => {
                warn!(
                    task = label,
                    attempt = attempt + 1,
                    total = policy.max_retries + 1,
                    "Attempt failed: {err:#}"
                );
                attempt += 1;
            }
            Err(err) => {
                warn!(
                    task = label,
                    attempts = attempt + 1,
                    "Giving up: {err:#}"
                );
                return Err(err);
            }
        }
    }
}

/// Issues tasks strictly one after another, sleeping `spacing` between them.
/// A failed task is recorded as `None` and never stops the batch.
pub async fn run_sequential<K, T, F, Fut>(tasks: Vec<(K, F)>, spacing: Duration) -> BTreeMap<K, Option<T>>
where
    K: Ord + Clone + std::fmt::Debug,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut results = BTreeMap::new();

    for (index, (key, task)) in tasks.into_iter().enumerate() {
        if index > 0 && !spacing.is_zero() {
            tokio::time::sleep(spacing).await;
        }

        match task().await {
            Ok(value) => {
                info!(task = ?key, "Sequential task succeeded");
                results.insert(key, Some(value));
            }
            Err(err) => {
                warn!(task = ?key, "Sequential task failed: {err:#}");
                results.insert(key, None);
            }
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use anyhow::anyhow;

    use super::*;

    const NO_WAIT: RetryPolicy = RetryPolicy {
        max_retries: 2,
        base_delay: Duration::ZERO,
    };

    #[test]
    fn backoff_grows_linearly() {
        let policy = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_secs(2),
        };
        assert_eq!(policy.delay_before(1), Duration::from_secs(2));
        assert_eq!(policy.delay_before(2), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicUsize::new(0);
        let value = retry_with_backoff("flaky", NO_WAIT, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(anyhow!("attempt {attempt} failed"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_after_max_retries() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = retry_with_backoff("broken", NO_WAIT, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(anyhow!("always fails")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), NO_WAIT.max_retries + 1);
    }

    #[tokio::test]
    async fn sequential_run_survives_failures_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let make = |name: &'static str, ok: bool| {
            let order = Arc::clone(&order);
            move || async move {
                order.lock().unwrap().push(name);
                if ok {
                    Ok(name.len())
                } else {
                    Err(anyhow!("{name} failed"))
                }
            }
        };

        let results = run_sequential(
            vec![
                ("left", make("left", false)),
                ("right", make("right", true)),
                ("back", make("back", false)),
            ],
            Duration::ZERO,
        )
        .await;

        assert_eq!(*order.lock().unwrap(), vec!["left", "right", "back"]);
        assert_eq!(results.len(), 3);
        assert_eq!(results["left"], None);
        assert_eq!(results["right"], Some(5));
        assert_eq!(results["back"], None);
    }
}
