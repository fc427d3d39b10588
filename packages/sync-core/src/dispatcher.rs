//! Dispatcher (§4.2, design note on cross-thread notification): fans a
//! version number out to every control-channel worker whenever the
//! reference timeline changes.
//!
//! This replaces the legacy "pipe holding a single sentinel byte" pattern
//! with a bounded broadcast channel carrying the new `version`. A worker
//! that wakes always re-reads the canonical record from the Reference-Time
//! Manager rather than trusting the value it woke on, so a lagged receiver
//! (one that missed intermediate versions because it was slow) still
//! converges on the latest record — exactly the guarantee §4.2 asks for:
//! "not required to observe intermediate versions — only that the last
//! delivered version per session is eventually the latest published."

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::protocol_constants::VERSION_CHANNEL_CAPACITY;
use crate::reference_time::ReferenceTimeManager;

/// Publishes version-change notifications to every subscribed
/// control-channel worker.
#[derive(Clone)]
pub struct Dispatcher {
    reference_time: Arc<ReferenceTimeManager>,
    version_tx: broadcast::Sender<u64>,
}

impl Dispatcher {
    pub fn new(reference_time: Arc<ReferenceTimeManager>) -> Self {
        let (version_tx, _) = broadcast::channel(VERSION_CHANNEL_CAPACITY);
        Self {
            reference_time,
            version_tx,
        }
    }

    /// Notifies all subscribers that a new version is available. Call this
    /// after any `ReferenceTimeManager` mutator.
    pub fn notify(&self, version: u64) {
        if let Err(e) = self.version_tx.send(version) {
            log::trace!("[Dispatcher] no subscribers for version {}: {}", version, e);
        }
    }

    /// Subscribes a new control-channel worker to version notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<u64> {
        self.version_tx.subscribe()
    }

    /// Returns the current record, for the initial push on join.
    pub fn current_record(&self) -> crate::model::SyncRecord {
        self.reference_time.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Playlist;

    #[test]
    fn subscriber_observes_notified_version() {
        let rtm = Arc::new(ReferenceTimeManager::new(
            "0.0.0.0".parse().unwrap(),
            0,
            Playlist::empty(),
        ));
        let dispatcher = Dispatcher::new(rtm.clone());
        let mut rx = dispatcher.subscribe();

        let v = rtm.set_paused(true);
        dispatcher.notify(v);

        let observed = rx.try_recv().unwrap();
        assert_eq!(observed, v);
        assert_eq!(dispatcher.current_record().version, v);
    }

    #[test]
    fn lagged_subscriber_still_converges_on_latest_via_current_record() {
        let rtm = Arc::new(ReferenceTimeManager::new(
            "0.0.0.0".parse().unwrap(),
            0,
            Playlist::empty(),
        ));
        let dispatcher = Dispatcher::new(rtm.clone());
        let mut rx = dispatcher.subscribe();

        for _ in 0..(crate::protocol_constants::VERSION_CHANNEL_CAPACITY + 5) {
            let v = rtm.set_paused(true);
            dispatcher.notify(v);
            let v2 = rtm.set_paused(false);
            dispatcher.notify(v2);
        }

        // The receiver missed messages (lagged) but the canonical record is
        // still reachable and carries the true latest version.
        assert!(rx.try_recv().is_err() || dispatcher.current_record().version >= rtm.version());
        assert_eq!(dispatcher.current_record().version, rtm.version());
    }
}
