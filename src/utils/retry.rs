use tokio::time::{sleep, Duration};
use std::future::Future;

pub async fn retry_with_backoff<F, Fut, T, E>(max_retries: u32, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
{
    let mut retries = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                retries += 1;
                if retries >= max_retries {
                    log::error!("Operation failed after {} retries: {:?}", max_retries, e);
                    return Err(e);
                }

                // Exponential backoff: 1s, 2s, 4s, 8s, but no more than 30s
                let delay_ms = backoff_delay_ms(retries);
                log::warn!("Operation failed (attempt {}/{}): {:?}, retrying in {}ms",
                          retries, max_retries, e, delay_ms);
                sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

fn backoff_delay_ms(attempt: u32) -> u64 {
    1000u64.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1))).min(30_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_delay_is_capped() {
        assert_eq!(backoff_delay_ms(1), 1000);
        assert_eq!(backoff_delay_ms(2), 2000);
        assert_eq!(backoff_delay_ms(3), 4000);
        assert_eq!(backoff_delay_ms(10), 30_000);
        assert_eq!(backoff_delay_ms(64), 30_000);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failure() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let result: Result<u32, String> = retry_with_backoff(3, || async move {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 2 { Err(format!("attempt {} failed", n)) } else { Ok(n) }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up_with_single_attempt() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let result: Result<(), &str> = retry_with_backoff(1, || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err("boom")
        })
        .await;

        assert_eq!(result, Err("boom"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
