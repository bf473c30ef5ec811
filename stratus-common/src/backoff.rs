// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Module providing utilities for retrying operations with backoff.

use std::time::Duration;

pub use ::backoff::future::{retry, retry_notify};
pub use ::backoff::Error as BackoffError;
pub use ::backoff::{backoff::Backoff, ExponentialBackoff, Notify};

/// Return a backoff policy for re-establishing a remote shell whose
/// channel went away: a fixed short interval inside a bounded window.
/// Exhausting the window means the host is really gone.
pub fn shell_reconnect_policy() -> ::backoff::ExponentialBackoff {
    const RETRY_INTERVAL: Duration = Duration::from_secs(5);
    const RECONNECT_WINDOW: Duration = Duration::from_secs(600);
    fixed_interval_policy(RETRY_INTERVAL, Some(RECONNECT_WINDOW))
}

/// Return a backoff policy for short in-band waits (prompt settling,
/// channel readiness) that should give up quickly.
pub fn short_wait_policy() -> ::backoff::ExponentialBackoff {
    const RETRY_INTERVAL: Duration = Duration::from_millis(250);
    const WINDOW: Duration = Duration::from_secs(30);
    fixed_interval_policy(RETRY_INTERVAL, Some(WINDOW))
}

fn fixed_interval_policy(
    interval: Duration,
    max_elapsed_time: Option<Duration>,
) -> ::backoff::ExponentialBackoff {
    ::backoff::ExponentialBackoff {
        current_interval: interval,
        initial_interval: interval,
        multiplier: 1.0,
        max_interval: interval,
        max_elapsed_time,
        ..::backoff::ExponentialBackoff::default()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_shell_reconnect_policy_is_fixed_interval() {
        let mut policy = shell_reconnect_policy();
        let first = policy.next_backoff().expect("policy expired immediately");
        let second = policy.next_backoff().expect("policy expired after one");
        assert_eq!(first, Duration::from_secs(5));
        assert_eq!(second, Duration::from_secs(5));
    }
}
