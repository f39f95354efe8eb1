use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    /// 3 attempts, waiting 500 ms then 1 s
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn immediate(attempts: usize) -> Self {
        Self {
            attempts,
            initial_delay: Duration::from_millis(1),
        }
    }
}

/// Retry an async operation while `retryable` says the error is worth another attempt.
pub async fn retry_async<F, Fut, T, E, P>(policy: RetryPolicy, retryable: P, mut op: F) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < policy.attempts && retryable(&e) => {
                log::debug!("[retry] attempt {} failed, retrying in {:?}", attempt, delay);
                sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let counter = AtomicUsize::new(0);
        let res: Result<u32, &str> = retry_async(RetryPolicy::immediate(4), |_| true, |_| {
            let current = counter.fetch_add(1, Ordering::Relaxed);
            async move { if current < 2 { Err("down") } else { Ok(7) } }
        })
        .await;

        assert_eq!(res.unwrap(), 7);
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let counter = AtomicUsize::new(0);
        let res: Result<u32, &str> = retry_async(RetryPolicy::immediate(3), |e| *e == "transient", |_| {
            counter.fetch_add(1, Ordering::Relaxed);
            async { Err("permanent") }
        })
        .await;

        assert!(res.is_err());
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn gives_up_after_bound() {
        let counter = AtomicUsize::new(0);
        let res: Result<u32, &str> = retry_async(RetryPolicy::immediate(3), |_| true, |_| {
            counter.fetch_add(1, Ordering::Relaxed);
            async { Err("transient") }
        })
        .await;

        assert!(res.is_err());
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }
}
