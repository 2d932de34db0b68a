//! Timer-driven snapshot saving on a named background thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, error};

use crate::stash::Stash;

/// Advisory cancellation token. Operations that take one check it at coarse
/// checkpoints (the find scan, the snapshot copy loop) and bail out early.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Calls [`Stash::save_to_disk`] every `interval` until stopped.
///
/// Save errors are logged and retried on the next tick. [`PeriodicSaver::stop`]
/// lets an in-flight save complete; dropping the handle without stopping asks
/// the in-flight save to bail out instead.
pub struct PeriodicSaver {
    tx: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
    cancel: CancelFlag,
}

impl PeriodicSaver {
    /// Spawn the saver thread. Returns `None` when `interval` is zero
    /// (periodic saving disabled).
    pub fn spawn(stash: Arc<Stash>, interval: Duration) -> anyhow::Result<Option<Self>> {
        if interval.is_zero() {
            debug!("periodic saving disabled");
            return Ok(None);
        }

        let (tx, rx) = mpsc::channel();
        let cancel = CancelFlag::new();
        let save_cancel = cancel.clone();
        let handle = thread::Builder::new()
            .name("stash-saver".to_string())
            .spawn(move || save_loop(&stash, &rx, interval, &save_cancel))
            .context("spawn stash saver thread")?;

        Ok(Some(PeriodicSaver {
            tx,
            handle: Some(handle),
            cancel,
        }))
    }

    /// Stop the timer and wait for the thread; an in-flight save completes.
    pub fn stop(mut self) {
        let _ = self.tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PeriodicSaver {
    fn drop(&mut self) {
        // Dropped without a graceful stop: ask any in-flight save to bail
        // out; the channel disconnect ends the loop.
        if self.handle.is_some() {
            self.cancel.cancel();
        }
    }
}

fn save_loop(stash: &Stash, rx: &mpsc::Receiver<()>, interval: Duration, cancel: &CancelFlag) {
    loop {
        match rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                if let Err(err) = stash.save_to_disk(cancel) {
                    error!(error = %err, "periodic save failed");
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                debug!("stash saver stopping");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::record::FieldValue;
    use std::collections::HashMap;
    use std::time::Instant;

    #[test]
    fn cancel_flag_round_trip() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        let other = flag.clone();
        other.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn zero_interval_disables_saving() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config {
            store_file: dir.path().join("stash.data"),
            store_interval: Duration::ZERO,
            restore: false,
        };
        let stash = Arc::new(Stash::new(&config).unwrap());
        assert!(PeriodicSaver::spawn(stash, Duration::ZERO)
            .unwrap()
            .is_none());
    }

    #[test]
    fn ticks_write_the_snapshot_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store_file = dir.path().join("stash.data");
        let config = Config {
            store_file: store_file.clone(),
            store_interval: Duration::ZERO,
            restore: false,
        };
        let stash = Arc::new(Stash::new(&config).unwrap());
        stash
            .insert(
                1,
                HashMap::from([("k".to_string(), FieldValue::Str("v".to_string()))]),
            )
            .unwrap();

        let saver = PeriodicSaver::spawn(Arc::clone(&stash), Duration::from_millis(20))
            .unwrap()
            .expect("saver enabled");

        let deadline = Instant::now() + Duration::from_secs(5);
        while !store_file.exists() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        saver.stop();
        assert!(store_file.exists(), "no snapshot written within deadline");
    }
}
