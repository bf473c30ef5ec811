// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Quick-and-simple polling for a condition to come true, bounded by a
//! wall-clock maximum.  Every wait in the harness goes through here so
//! that no caller can wait forever by accident.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Result of one check of the condition being polled
#[derive(Debug, Error)]
pub enum CondCheckError<E> {
    #[error("poll condition not yet true")]
    NotYet,
    #[error("poll condition failed permanently")]
    Failed(#[from] E),
}

/// Error returned by [`wait_for_condition()`]
#[derive(Debug, Error)]
pub enum Error<E> {
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("poll failed permanently")]
    PermanentError(E),
}

impl<E> Error<E> {
    pub fn unwrap_permanent(self) -> E {
        match self {
            Error::TimedOut(d) => {
                panic!("poll timed out after {:?} (not a permanent error)", d)
            }
            Error::PermanentError(e) => e,
        }
    }
}

/// Poll `cond` every `poll_interval` until it returns `Ok` (success) or
/// `Err(CondCheckError::Failed)` (permanent failure), for at most
/// `poll_max`.
///
/// The condition is always checked at least once, even if `poll_max` has
/// already elapsed by the time the first check completes.
pub async fn wait_for_condition<T, E, Func, Fut>(
    mut cond: Func,
    poll_interval: &Duration,
    poll_max: &Duration,
) -> Result<T, Error<E>>
where
    Func: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CondCheckError<E>>>,
{
    let poll_start = Instant::now();
    loop {
        match cond().await {
            Ok(value) => return Ok(value),
            Err(CondCheckError::Failed(e)) => {
                return Err(Error::PermanentError(e))
            }
            Err(CondCheckError::NotYet) => (),
        }

        if poll_start.elapsed() >= *poll_max {
            return Err(Error::TimedOut(*poll_max));
        }
        tokio::time::sleep(*poll_interval).await;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_wait_for_condition_succeeds() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let result = wait_for_condition::<_, std::io::Error, _, _>(
            move || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) >= 2 {
                        Ok(27)
                    } else {
                        Err(CondCheckError::NotYet)
                    }
                }
            },
            &Duration::from_millis(1),
            &Duration::from_secs(10),
        )
        .await;
        assert_eq!(result.unwrap(), 27);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_for_condition_times_out() {
        let result = wait_for_condition::<(), std::io::Error, _, _>(
            || async { Err(CondCheckError::NotYet) },
            &Duration::from_millis(1),
            &Duration::from_millis(20),
        )
        .await;
        assert_matches!(result, Err(Error::TimedOut(_)));
    }

    #[tokio::test]
    async fn test_wait_for_condition_propagates_failure() {
        let result = wait_for_condition::<(), _, _, _>(
            || async {
                Err(CondCheckError::Failed(std::io::Error::other("boom")))
            },
            &Duration::from_millis(1),
            &Duration::from_secs(10),
        )
        .await;
        let error = result.unwrap_err().unwrap_permanent();
        assert_eq!(error.to_string(), "boom");
    }
}
