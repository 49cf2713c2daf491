use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;

use crate::error::LawError;

enum Request {
    Transfer { want: usize, reply: oneshot::Sender<usize> },
}

/// A token-bucket byte throttle. Wraps a write or read count: callers submit
/// the size of buffer they'd like to move and get back how much of it they're
/// allowed to move *this tick*; the rest is up to the caller to retry.
///
/// Model: a single regulator task owns the remaining quota and a periodic
/// refill timer. Requests queue on an `mpsc` channel and are serviced FIFO,
/// one at a time; a request that exceeds the remaining quota is granted only
/// the remainder, and the caller is expected to ask again next tick for what
/// didn't fit. `limit == 0` disables throttling entirely — no task is
/// spawned, and `reserve` always grants the full amount requested.
#[derive(Clone)]
pub struct RateLimiter {
    tx: Option<mpsc::Sender<Request>>,
}

impl RateLimiter {
    pub fn new(limit: u64, interval_duration: Duration) -> Self {
        if limit == 0 {
            return Self { tx: None };
        }
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(regulator(limit, interval_duration, rx));
        Self { tx: Some(tx) }
    }

    /// Reserves up to `want` bytes of this tick's quota, blocking until at
    /// least one byte is available (or the limiter is disabled, in which
    /// case it returns `want` immediately).
    pub async fn reserve(&self, want: usize) -> Result<usize, LawError> {
        let Some(tx) = &self.tx else {
            return Ok(want);
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(Request::Transfer {
            want,
            reply: reply_tx,
        })
        .await
        .map_err(|_| LawError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "rate limiter regulator task has exited",
        )))?;
        reply_rx.await.map_err(|_| {
            LawError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "rate limiter regulator task dropped its reply",
            ))
        })
    }
}

async fn regulator(limit: u64, interval_duration: Duration, mut rx: mpsc::Receiver<Request>) {
    let mut remaining: u64 = limit;
    let mut ticker = interval(interval_duration);
    ticker.tick().await; // first tick fires immediately; consume it up front

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                remaining = limit;
            }
            maybe_req = rx.recv() => {
                let Some(Request::Transfer { want, reply }) = maybe_req else {
                    return; // all senders dropped, nothing left to service
                };
                if remaining == 0 {
                    ticker.tick().await;
                    remaining = limit;
                }
                let grant = (want as u64).min(remaining) as usize;
                remaining -= grant as u64;
                let _ = reply.send(grant);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_limiter_grants_everything_immediately() {
        let limiter = RateLimiter::new(0, Duration::from_millis(10));
        assert_eq!(limiter.reserve(1_000_000).await.unwrap(), 1_000_000);
    }

    #[tokio::test]
    async fn limiter_caps_a_single_tick() {
        let limiter = RateLimiter::new(100, Duration::from_millis(50));
        let granted = limiter.reserve(1_000).await.unwrap();
        assert!(granted <= 100);
    }

    #[tokio::test]
    async fn limiter_conserves_total_bytes_across_ticks() {
        let limiter = RateLimiter::new(50, Duration::from_millis(20));
        let mut total = 0usize;
        let want = 200usize;
        while total < want {
            total += limiter.reserve(want - total).await.unwrap();
        }
        assert_eq!(total, want);
    }
}
