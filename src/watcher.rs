//! Polling file watcher used for hot-reloading the auth token file.
//!
//! Polling keeps the contract OS-agnostic; there is no inotify/FSEvents
//! dependency. The file is re-read on every tick, hashed, and the callback
//! invoked only when the digest changed since the last observation. The
//! callback always fires on the first successful read.

use std::path::PathBuf;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Watches `path`, invoking `callback` with the raw file contents whenever
/// they change. Runs until `shutdown` is cancelled.
pub async fn watch_file<F>(
    path: PathBuf,
    interval: Duration,
    shutdown: CancellationToken,
    mut callback: F,
) where
    F: FnMut(&[u8]) + Send,
{
    let mut last_digest: Option<[u8; 32]> = None;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(filename = %path.display(), "file watcher stopped");
                return;
            }
            _ = ticker.tick() => {
                let bytes = match tokio::fs::read(&path).await {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        error!(filename = %path.display(), error = %err, "file watcher: failed to read file");
                        continue;
                    }
                };

                let digest: [u8; 32] = Sha256::digest(&bytes).into();
                if last_digest == Some(digest) {
                    debug!(filename = %path.display(), "file watcher: contents unchanged");
                    continue;
                }

                debug!(filename = %path.display(), "file watcher: contents updated, triggering callback");
                callback(&bytes);
                last_digest = Some(digest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const TICK: Duration = Duration::from_millis(25);

    /// Long enough for several watcher ticks to pass.
    const SETTLE: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn callback_fires_on_first_read_and_on_change_only() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "first").unwrap();
        file.flush().unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let shutdown = CancellationToken::new();

        let watcher = {
            let calls = Arc::clone(&calls);
            let seen = Arc::clone(&seen);
            let path = file.path().to_path_buf();
            let shutdown = shutdown.clone();
            tokio::spawn(watch_file(path, TICK, shutdown, move |bytes| {
                calls.fetch_add(1, Ordering::SeqCst);
                seen.lock().unwrap().push(bytes.to_vec());
            }))
        };

        // The first tick is immediate and always fires the callback; the
        // ticks after it see unchanged content and stay silent.
        tokio::time::sleep(SETTLE).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Changed content fires exactly once more.
        write!(file, " second").unwrap();
        file.flush().unwrap();
        tokio::time::sleep(SETTLE).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        shutdown.cancel();
        watcher.await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], b"first");
        assert_eq!(seen[1], b"first second");
    }

    #[tokio::test]
    async fn unreadable_file_is_retried_without_firing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let shutdown = CancellationToken::new();

        let watcher = {
            let calls = Arc::clone(&calls);
            let shutdown = shutdown.clone();
            tokio::spawn(watch_file(
                PathBuf::from("/nonexistent/auth-tokens.json"),
                TICK,
                shutdown,
                move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                },
            ))
        };

        tokio::time::sleep(SETTLE).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        shutdown.cancel();
        watcher.await.unwrap();
    }
}
