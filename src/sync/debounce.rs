//! Timer-reset debounce
//!
//! Each event restarts the quiet window; the caller acts only once the
//! window elapses with nothing new, so a burst collapses to one action.

use std::future::Future;
use std::time::Duration;

/// Wait for `window` of silence.
///
/// `next` resolves to `true` for every new event and `false` once the
/// source is closed. Returns `false` if the source closed while waiting.
pub async fn settle<F, Fut>(window: Duration, mut next: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    loop {
        tokio::select! {
            alive = next() => {
                if !alive {
                    return false;
                }
            }
            _ = tokio::time::sleep(window) => return true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_burst_is_coalesced() {
        let (tx, rx) = flume::unbounded::<u32>();
        let rx_ref = &rx;

        let sender = tokio::spawn(async move {
            for i in 0..5 {
                tx.send(i).unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            tx
        });

        rx.recv_async().await.unwrap();
        let started = Instant::now();
        let alive = settle(Duration::from_millis(80), move || async move {
            rx_ref.recv_async().await.is_ok()
        })
        .await;

        assert!(alive);
        // the window restarted on every event of the burst
        assert!(started.elapsed() >= Duration::from_millis(80 + 30));
        assert!(rx.is_empty());
        drop(sender.await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_source_ends_wait() {
        let (tx, rx) = flume::unbounded::<u32>();
        drop(tx);
        let rx_ref = &rx;

        let alive = settle(Duration::from_secs(5), move || async move {
            rx_ref.recv_async().await.is_ok()
        })
        .await;
        assert!(!alive);
    }
}
