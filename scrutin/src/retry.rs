#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Bounded retry for transient upstream faults: at most three attempts with
//! exponential backoff capped at one second. Once an error surfaces past this
//! helper, the caller rolls back and reports it; no partial state survives.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Errors that may be retried locally before surfacing.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Total number of attempts, including the first.
pub const MAX_ATTEMPTS: u32 = 3;

const BACKOFF_BASE_MS: u64 = 250;
const BACKOFF_CAP_MS: u64 = 1_000;

fn backoff_after(attempt: u32) -> Duration {
    let ms = BACKOFF_BASE_MS.saturating_mul(1u64 << attempt.min(8));
    Duration::from_millis(ms.min(BACKOFF_CAP_MS))
}

/// Runs `op` up to [`MAX_ATTEMPTS`] times, sleeping between attempts, until
/// it succeeds or fails permanently.
pub async fn with_retries<T, E, F, Fut>(what: &str, mut op: F) -> Result<T, E>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < MAX_ATTEMPTS => {
                let delay = backoff_after(attempt);
                warn!(%e, what, attempt, "transient upstream fault, backing off");
                async_io::Timer::after(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use futures_lite::future::block_on;
    use std::cell::Cell;

    #[derive(Debug, PartialEq)]
    struct Fault(bool);

    impl Transient for Fault {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    impl std::fmt::Display for Fault {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "fault(transient: {})", self.0)
        }
    }

    #[test]
    fn succeeds_after_transient_faults() {
        let calls = Cell::new(0u32);
        let result: Result<u32, Fault> = block_on(with_retries("test", || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move { if n < 3 { Err(Fault(true)) } else { Ok(n) } }
        }));
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let calls = Cell::new(0u32);
        let result: Result<u32, Fault> = block_on(with_retries("test", || {
            calls.set(calls.get() + 1);
            async { Err(Fault(true)) }
        }));
        assert_eq!(result.unwrap_err(), Fault(true));
        assert_eq!(calls.get(), MAX_ATTEMPTS);
    }

    #[test]
    fn permanent_faults_are_not_retried() {
        let calls = Cell::new(0u32);
        let result: Result<u32, Fault> = block_on(with_retries("test", || {
            calls.set(calls.get() + 1);
            async { Err(Fault(false)) }
        }));
        assert_eq!(result.unwrap_err(), Fault(false));
        assert_eq!(calls.get(), 1);
    }
}
