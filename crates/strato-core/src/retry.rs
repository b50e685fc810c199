use std::thread;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{info, warn};

/// Retry a fallible operation with a fixed inter-attempt delay, but only
/// while `retryable` classifies the error as transient.
///
/// Cloud APIs are eventually consistent: a launch referencing a
/// just-created IAM profile or subnet can fail parameter validation for
/// a few seconds. Those failures get `max_attempts` tries with a flat
/// `delay` between them; any other error aborts immediately.
pub fn retry_on<T, E, F, P>(
    max_attempts: u32,
    delay: Duration,
    label: &str,
    retryable: P,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match f() {
            Ok(val) => return Ok(val),
            Err(e) if attempt < max_attempts && retryable(&e) => {
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "{} failed, retrying",
                    label,
                );
                thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Poll `check` at a fixed interval until it reports true, up to
/// `max_attempts` tries. An `Err` from `check` aborts the poll; running
/// out of attempts is an error of its own.
pub fn poll_until<F>(max_attempts: u32, interval: Duration, label: &str, mut check: F) -> Result<()>
where
    F: FnMut() -> Result<bool>,
{
    info!("Waiting until {}", label);
    for attempt in 1..=max_attempts {
        if check()? {
            return Ok(());
        }
        if attempt < max_attempts {
            thread::sleep(interval);
        }
    }
    bail!("{} not ready after {} attempts", label, max_attempts);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn always(_: &anyhow::Error) -> bool {
        true
    }

    #[test]
    fn test_retry_succeeds_first_try() {
        let result: Result<i32, anyhow::Error> =
            retry_on(5, Duration::from_millis(1), "test", always, || Ok(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_retry_succeeds_on_third_attempt() {
        let count = Cell::new(0);
        let result: Result<u32, anyhow::Error> =
            retry_on(5, Duration::from_millis(1), "test", always, || {
                let c = count.get() + 1;
                count.set(c);
                if c < 3 {
                    anyhow::bail!("not yet");
                }
                Ok(c)
            });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_retry_exhausts_exact_attempt_budget() {
        let count = Cell::new(0);
        let result: Result<i32, anyhow::Error> =
            retry_on(5, Duration::from_millis(1), "test", always, || {
                count.set(count.get() + 1);
                anyhow::bail!("always fails");
            });
        assert!(result.is_err());
        assert_eq!(count.get(), 5);
    }

    #[test]
    fn test_retry_aborts_on_non_retryable() {
        let count = Cell::new(0);
        let result: Result<i32, anyhow::Error> = retry_on(
            5,
            Duration::from_millis(1),
            "test",
            |e: &anyhow::Error| e.to_string().contains("transient"),
            || {
                count.set(count.get() + 1);
                anyhow::bail!("hard failure");
            },
        );
        assert!(result.is_err());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_poll_until_succeeds() {
        let count = Cell::new(0);
        poll_until(5, Duration::from_millis(1), "thing ready", || {
            count.set(count.get() + 1);
            Ok(count.get() >= 3)
        })
        .unwrap();
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn test_poll_until_bounded() {
        let result = poll_until(3, Duration::from_millis(1), "thing ready", || Ok(false));
        assert!(result.unwrap_err().to_string().contains("3 attempts"));
    }

    #[test]
    fn test_poll_until_propagates_check_error() {
        let result = poll_until(3, Duration::from_millis(1), "thing ready", || {
            anyhow::bail!("api exploded")
        });
        assert!(result.unwrap_err().to_string().contains("api exploded"));
    }
}
