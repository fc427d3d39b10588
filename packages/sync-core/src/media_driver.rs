//! Media Driver contract (§4.4): the server-side probe pipeline.
//!
//! The underlying media decoding pipeline is an external collaborator (§1,
//! "OUT OF SCOPE") — this module only fixes its contract as a trait so the
//! Reference-Time Manager's `advance_track`/playlist-transition bookkeeping
//! can be driven without this crate depending on a concrete decoder.
//! [`NullMediaDriver`] is the only concrete implementation shipped here: it
//! never probes anything and never emits `end-of-stream` on its own,
//! suitable for playlists whose durations are all known up front (the
//! common case for the example CLI) and for tests.
//!
//! `wait_for_end_of_stream` is the inbound half of the contract: whatever
//! drives the playlist (see `bootstrap::handle_end_of_stream`) loops on it
//! and reacts by advancing the Reference-Time Manager and reloading the
//! next track.

use async_trait::async_trait;

use crate::error::SyncResult;

/// Desired pipeline state, mapped 1:1 from the current `SyncRecord`:
/// `stopped` ↔ `Quiesced`, `paused` ↔ `Paused`, otherwise `Playing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Quiesced,
    Paused,
    Playing,
}

/// Probes the current track for a duration estimate and observes
/// end-of-stream so the server can drive `advance_track()` even for
/// clients that cannot observe end-of-stream themselves.
#[async_trait]
pub trait MediaDriver: Send + Sync {
    /// Tears down any current pipeline and builds one for `uri`. Does not
    /// start playback; call `set_state` afterwards.
    async fn load(&self, uri: &str) -> SyncResult<()>;

    /// Applies `stopped`/`paused`/playing pipeline state. On a
    /// `Paused -> Playing` transition the caller has already computed
    /// `base_time + base_time_offset` and must pass it so the driver's own
    /// rendering lines up with what clients will present.
    async fn set_state(&self, state: DriverState, realigned_base_time_ns: Option<u64>) -> SyncResult<()>;

    /// Tears the pipeline down to null without rebuilding (used before
    /// loading the next track, or on shutdown).
    async fn teardown(&self) -> SyncResult<()>;

    /// Blocks until the probe pipeline reaches end-of-stream for the
    /// currently loaded track, then returns once. Callers are expected to
    /// call this in a loop, handling one end-of-stream per return and
    /// re-calling it against whatever track was just loaded.
    ///
    /// A driver with no currently loaded track (nothing probing yet, or a
    /// driver that can never observe end-of-stream) should block forever
    /// rather than return early, so the orchestration loop can `select!`
    /// against it without busy-polling.
    async fn wait_for_end_of_stream(&self) -> SyncResult<()>;
}

/// A `MediaDriver` that never probes and never emits end-of-stream:
/// durations must already be known (e.g. from the playlist text file),
/// and playlist advancement is driven some other way (or not at all).
pub struct NullMediaDriver;

#[async_trait]
impl MediaDriver for NullMediaDriver {
    async fn load(&self, uri: &str) -> SyncResult<()> {
        log::debug!("[MediaDriver] load (null driver, no-op): {}", uri);
        Ok(())
    }

    async fn set_state(&self, state: DriverState, _realigned_base_time_ns: Option<u64>) -> SyncResult<()> {
        log::debug!("[MediaDriver] set_state (null driver, no-op): {:?}", state);
        Ok(())
    }

    async fn teardown(&self) -> SyncResult<()> {
        Ok(())
    }

    async fn wait_for_end_of_stream(&self) -> SyncResult<()> {
        std::future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_driver_accepts_every_transition() {
        let driver = NullMediaDriver;
        driver.load("file:///a.mp4").await.unwrap();
        driver.set_state(DriverState::Playing, None).await.unwrap();
        driver
            .set_state(DriverState::Playing, Some(12345))
            .await
            .unwrap();
        driver.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn null_driver_never_reports_end_of_stream() {
        let driver = NullMediaDriver;
        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            driver.wait_for_end_of_stream(),
        )
        .await;
        assert!(outcome.is_err(), "null driver must never resolve EOS on its own");
    }
}
