//! Catch-Up Engine (§4.5): governs the local playback pipeline's
//! presentation-time alignment against the server's reference timeline.
//!
//! The local playback pipeline and the network clock are external
//! collaborators (§1); [`LocalPipeline`] and [`NetworkClock`] fix their
//! contracts. `seek_state` is kept as an atomic (§5) so a pipeline bus
//! handler running on another thread can inspect it without locking; the
//! rest of [`LocalPipelineState`] lives behind a mutex.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{SyncError, SyncResult};
use crate::model::{LocalPipelineState, SeekState, SyncRecord};
use crate::protocol_constants::{CLOCK_SYNC_TIMEOUT_SECS, SEEK_TOLERANCE_MS};

/// Network time consumer: disciplines a local clock to the server's and
/// reports synchronisation status.
pub trait NetworkClock: Send + Sync {
    fn now_ns(&self) -> u64;
    fn is_synchronised(&self) -> bool;
}

/// The local playback pipeline, as the catch-up engine needs to drive it.
/// For a live, non-seekable source `is_live()` returns true (the
/// no-preroll signal from the media library, §4.5).
#[async_trait]
pub trait LocalPipeline: Send + Sync {
    async fn teardown(&self) -> SyncResult<()>;
    /// Builds a pipeline for `uri`, anchored at `base_time_ns`.
    async fn rebuild(&self, uri: &str, base_time_ns: u64) -> SyncResult<()>;
    /// Re-anchors without tearing down.
    async fn set_base_time(&self, base_time_ns: u64) -> SyncResult<()>;
    async fn set_paused(&self, paused: bool) -> SyncResult<()>;
    /// Issues an accurate flushing seek; completion is observed separately
    /// via [`CatchUpEngine::on_seek_completed`] (observed synchronously to
    /// maximise accuracy per §4.5).
    async fn seek(&self, position_ns: u64) -> SyncResult<()>;
    fn is_live(&self) -> bool;
}

/// A `LocalPipeline` that never builds anything: logs every transition and
/// reports seeks as immediately and exactly achieved. Suitable for the
/// example client CLI and for tests, the same role [`crate::media_driver::NullMediaDriver`]
/// plays on the server side.
pub struct NullLocalPipeline;

#[async_trait]
impl LocalPipeline for NullLocalPipeline {
    async fn teardown(&self) -> SyncResult<()> {
        log::debug!("[LocalPipeline] teardown (null pipeline, no-op)");
        Ok(())
    }
    async fn rebuild(&self, uri: &str, base_time_ns: u64) -> SyncResult<()> {
        log::debug!(
            "[LocalPipeline] rebuild (null pipeline, no-op): uri={} base_time={}",
            uri,
            base_time_ns
        );
        Ok(())
    }
    async fn set_base_time(&self, base_time_ns: u64) -> SyncResult<()> {
        log::debug!("[LocalPipeline] set_base_time (null pipeline, no-op): {}", base_time_ns);
        Ok(())
    }
    async fn set_paused(&self, paused: bool) -> SyncResult<()> {
        log::debug!("[LocalPipeline] set_paused (null pipeline, no-op): {}", paused);
        Ok(())
    }
    async fn seek(&self, position_ns: u64) -> SyncResult<()> {
        log::debug!("[LocalPipeline] seek (null pipeline, no-op): {}", position_ns);
        Ok(())
    }
    fn is_live(&self) -> bool {
        false
    }
}

/// A `NetworkClock` reading the system clock directly and reporting itself
/// synchronised immediately. The actual clock-discipline protocol (NTP or
/// similar) is an external collaborator (§1, "OUT OF SCOPE"); this is the
/// minimal implementation sufficient when the server and client clocks are
/// already close enough (e.g. both NTP-disciplined by the host OS).
pub struct SystemClock;

impl NetworkClock for SystemClock {
    fn now_ns(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64
    }

    fn is_synchronised(&self) -> bool {
        true
    }
}

/// Drives presentation-time alignment for one client connection.
pub struct CatchUpEngine {
    local_id: String,
    clock: Arc<dyn NetworkClock>,
    pipeline: Arc<dyn LocalPipeline>,
    seek_state: AtomicU8,
    /// Whether `rebuild_for_current_track` has ever run for this engine.
    /// Records absorbed while the clock was unsynchronised never reach it
    /// (§4.5's clock-sync gate), so the first record processed *after*
    /// sync completes must force a fresh build rather than being diffed
    /// against a pre-sync record that was stored but never acted on.
    has_built: AtomicBool,
    state: Mutex<LocalPipelineState>,
}

impl CatchUpEngine {
    pub fn new(local_id: String, clock: Arc<dyn NetworkClock>, pipeline: Arc<dyn LocalPipeline>) -> Self {
        Self {
            local_id,
            clock,
            pipeline,
            seek_state: AtomicU8::new(SeekState::NeedSeek as u8),
            has_built: AtomicBool::new(false),
            state: Mutex::new(LocalPipelineState::default()),
        }
    }

    pub fn seek_state(&self) -> SeekState {
        SeekState::from_u8(self.seek_state.load(Ordering::Acquire))
    }

    fn set_seek_state(&self, state: SeekState) {
        self.seek_state.store(state as u8, Ordering::Release);
    }

    /// Blocks (bounded by `CLOCK_SYNC_TIMEOUT_SECS`) until the clock
    /// provider reports `synchronised = true`. Until that happens no
    /// pipeline state change past paused is allowed; on timeout, surfaces
    /// a `ClockError` and leaves `clock_synchronised = false`.
    pub async fn wait_for_clock_sync(&self) -> SyncResult<()> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(CLOCK_SYNC_TIMEOUT_SECS);
        loop {
            if self.clock.is_synchronised() {
                self.state.lock().clock_synchronised = true;
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                self.state.lock().clock_synchronised = false;
                return Err(SyncError::Clock(format!(
                    "clock did not synchronise within {}s",
                    CLOCK_SYNC_TIMEOUT_SECS
                )));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Applies a newly received `SyncRecord`, diff-comparing it against the
    /// previously held one per §4.5's rules.
    pub async fn on_record(&self, new_record: SyncRecord) -> SyncResult<()> {
        // Monotonic `version` — out-of-order deliveries are discarded (§5).
        let previous = {
            let mut guard = self.state.lock();
            if let Some(ref current) = guard.current_record {
                if new_record.version <= current.version {
                    return Ok(());
                }
            }
            let previous = guard.current_record.clone();
            guard.current_record = Some(new_record.clone());
            previous
        };

        if !self.state.lock().clock_synchronised {
            // Updates are absorbed into the in-memory record but no
            // pipeline transition past PAUSED is allowed.
            return Ok(());
        }

        if !self.has_built.load(Ordering::Acquire) {
            // Either the very first record ever seen, or the first one
            // processed since the clock finished synchronising: any
            // `previous` here was only absorbed into memory, never built,
            // so diffing against it would wrongly skip the initial build.
            self.rebuild_for_current_track(&new_record).await?;
            return Ok(());
        }

        let Some(previous) = previous else {
            // Defensive fallback: `has_built` is only set from within
            // `rebuild_for_current_track`, which always runs after
            // `current_record` has been stored, so this should be
            // unreachable. Build fresh rather than panic if it ever is.
            self.rebuild_for_current_track(&new_record).await?;
            return Ok(());
        };

        let uri_changed = previous.playlist.current_track().map(|t| &t.uri)
            != new_record.playlist.current_track().map(|t| &t.uri);
        let base_time_changed = previous.base_time != new_record.base_time;

        if uri_changed || base_time_changed {
            self.rebuild_for_current_track(&new_record).await?;
            return Ok(());
        }

        if previous.stopped != new_record.stopped {
            if new_record.stopped {
                self.pipeline.teardown().await?;
            } else {
                self.rebuild_for_current_track(&new_record).await?;
            }
            return Ok(());
        }

        if previous.paused != new_record.paused {
            self.pipeline.set_paused(new_record.paused).await?;
            if !new_record.paused {
                if self.pipeline.is_live() {
                    self.set_seek_state(SeekState::DoneSeek);
                } else {
                    self.reanchor(&new_record).await?;
                }
            }
            return Ok(());
        }

        if previous.base_time_offset != new_record.base_time_offset {
            self.reanchor(&new_record).await?;
        }

        Ok(())
    }

    async fn rebuild_for_current_track(&self, record: &SyncRecord) -> SyncResult<()> {
        self.has_built.store(true, Ordering::Release);
        self.pipeline.teardown().await?;
        if record.stopped {
            self.set_seek_state(SeekState::NeedSeek);
            return Ok(());
        }
        let Some(track) = record.playlist.current_track() else {
            self.set_seek_state(SeekState::NeedSeek);
            return Ok(());
        };
        self.pipeline.rebuild(&track.uri, record.base_time).await?;
        if record.paused {
            // §3: "if paused then clients must hold at PAUSED" — a freshly
            // built pipeline must not be left playing when the record it
            // was built from already says paused.
            self.pipeline.set_paused(true).await?;
        }
        self.set_seek_state(SeekState::NeedSeek);
        Ok(())
    }

    async fn reanchor(&self, record: &SyncRecord) -> SyncResult<()> {
        let seek_offset = self.state.lock().seek_offset_ns;
        self.pipeline
            .set_base_time(record.base_time + record.base_time_offset + seek_offset)
            .await
    }

    /// Called when the local pipeline reaches the `playing` state.
    pub async fn on_pipeline_reached_playing(&self) -> SyncResult<()> {
        if self.seek_state() != SeekState::NeedSeek {
            return Ok(());
        }

        if self.pipeline.is_live() {
            self.set_seek_state(SeekState::DoneSeek);
            return Ok(());
        }

        let record = self
            .state
            .lock()
            .current_record
            .clone()
            .ok_or_else(|| SyncError::Timeline("no current record".into()))?;

        let cur_pos = record.rendering_position(self.clock.now_ns());
        if cur_pos > SEEK_TOLERANCE_MS as i64 * 1_000_000 {
            self.set_seek_state(SeekState::InSeek);
            self.pipeline.seek(cur_pos.max(0) as u64).await?;
        } else {
            self.state.lock().seek_offset_ns = 0;
            self.pipeline
                .set_base_time(record.base_time + record.base_time_offset)
                .await?;
            self.set_seek_state(SeekState::DoneSeek);
        }
        Ok(())
    }

    /// Called when the pipeline reports the seek it was issued has
    /// completed, with the actually-achieved position.
    pub async fn on_seek_completed(&self, achieved_position_ns: u64) -> SyncResult<()> {
        if self.seek_state() != SeekState::InSeek {
            return Ok(());
        }
        self.state.lock().seek_offset_ns = achieved_position_ns;
        let record = self
            .state
            .lock()
            .current_record
            .clone()
            .ok_or_else(|| SyncError::Timeline("no current record".into()))?;
        self.pipeline
            .set_base_time(record.base_time + record.base_time_offset + achieved_position_ns)
            .await?;
        self.set_seek_state(SeekState::DoneSeek);
        Ok(())
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// The transform plan for this client's id given the current record,
    /// if any.
    pub fn current_transform_plan(&self) -> Vec<crate::transform::TransformStageOp> {
        self.state
            .lock()
            .current_record
            .as_ref()
            .and_then(|r| r.transforms.get(&self.local_id))
            .map(crate::transform::plan)
            .unwrap_or_default()
    }
}
