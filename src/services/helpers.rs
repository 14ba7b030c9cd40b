//! Shared helper functions
//!
//! Provider, cache and preference calls block; these run them on the
//! blocking pool from async code.

use crate::error::Result;

/// Run a blocking operation off the async worker threads
pub async fn run_blocking<T, F>(op: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op).await?
}

/// Spawn a blocking operation whose result only matters for logging
pub fn spawn_blocking_logged<T, F>(label: &'static str, op: F)
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = run_blocking(op).await {
            tracing::warn!("{} failed: {}", label, e);
        }
    });
}
