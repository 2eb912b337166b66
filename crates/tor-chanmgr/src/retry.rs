//! `ConnectWithRetry`: dial a relay with exponential backoff.

use std::net::SocketAddr;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use tor_proto::channel::Channel;

/// The first backoff delay, before any attempt has failed.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
/// The backoff delay never grows past this.
const MAX_BACKOFF: Duration = Duration::from_secs(30);
/// The backoff delay doubles after every failed attempt.
const BACKOFF_MULTIPLIER: u32 = 2;
/// Each delay is jittered by up to this fraction in either direction.
const JITTER_FRACTION: f64 = 0.25;

/// Dial `addr` repeatedly, doubling the delay between attempts (capped at
/// [`MAX_BACKOFF`], jittered by ±25%) until one succeeds.
///
/// This never gives up on its own: a relay that is briefly unreachable is
/// still worth reconnecting to forever, the way a long-lived link is meant
/// to be retried in the background. A caller that wants a bound on the
/// total time spent retrying should race it against a timeout, e.g.
/// `tokio::time::timeout` — dropping this future mid-attempt cancels it
/// cleanly, since the only state it holds is the backoff delay itself.
pub async fn connect_with_retry(addr: SocketAddr) -> Channel {
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match Channel::connect(addr).await {
            Ok(chan) => return chan,
            Err(e) => {
                debug!("connect attempt {} to {} failed: {}", attempt, addr, e);
                tokio::time::sleep(jittered(backoff)).await;
                backoff = (backoff * BACKOFF_MULTIPLIER).min(MAX_BACKOFF);
            }
        }
    }
}

/// Apply up to ±[`JITTER_FRACTION`] of jitter to `delay`.
fn jittered(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(1.0 - JITTER_FRACTION..=1.0 + JITTER_FRACTION);
    delay.mul_f64(factor)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn jitter_stays_within_bounds() {
        let base = Duration::from_secs(10);
        for _ in 0..200 {
            let d = jittered(base);
            assert!(d >= Duration::from_millis(7500));
            assert!(d <= Duration::from_millis(12500));
        }
    }

    #[test]
    fn backoff_caps_at_30s() {
        let mut backoff = INITIAL_BACKOFF;
        for _ in 0..10 {
            backoff = (backoff * BACKOFF_MULTIPLIER).min(MAX_BACKOFF);
        }
        assert_eq!(backoff, MAX_BACKOFF);
    }
}
