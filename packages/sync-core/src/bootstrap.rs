//! Server-side application bootstrap and dependency wiring.
//!
//! Single composition root where the Reference-Time Manager, Client
//! Registry, Dispatcher, Control-Channel Server and Media Driver are
//! instantiated and wired together.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::control_server::{ControlChannelServer, TcpControlServer};
use crate::dispatcher::Dispatcher;
use crate::error::SyncResult;
use crate::events::{BroadcastEventBridge, EventEmitter, SyncEvent};
use crate::media_driver::{DriverState, MediaDriver};
use crate::model::Playlist;
use crate::reference_time::ReferenceTimeManager;
use crate::registry::ClientRegistry;
use crate::runtime::{TaskSpawner, TokioSpawner};

/// Container for all bootstrapped server services.
#[derive(Clone)]
pub struct BootstrappedServer {
    pub reference_time: Arc<ReferenceTimeManager>,
    pub registry: Arc<ClientRegistry>,
    pub dispatcher: Dispatcher,
    pub event_bridge: Arc<BroadcastEventBridge>,
    pub control_server: Arc<TcpControlServer>,
    pub media_driver: Arc<dyn MediaDriver>,
    pub spawner: TokioSpawner,
    pub cancel_token: CancellationToken,
}

impl BootstrappedServer {
    /// Initiates graceful shutdown: stops accepting connections, force
    /// closes existing ones, tears the media driver's pipeline to null.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] beginning graceful shutdown...");
        self.cancel_token.cancel();
        self.control_server.stop().await;
        if let Err(e) = self.media_driver.teardown().await {
            log::warn!("[Bootstrap] media driver teardown failed: {}", e);
        }
        log::info!("[Bootstrap] shutdown complete");
    }
}

/// Bootstraps the server side: Reference-Time Manager, Client Registry,
/// Dispatcher, Control-Channel Server and a Media Driver, in dependency
/// order.
///
/// 1. Reference-Time Manager (owns the timeline, seeded with `playlist`)
/// 2. Dispatcher (depends on the Reference-Time Manager)
/// 3. Event bridge (domain events: client-joined/left, end-of-stream)
/// 4. Client Registry
/// 5. Control-Channel Server (depends on registry, dispatcher, event bridge)
pub fn bootstrap_server(
    bind_addr: SocketAddr,
    clock_port: u16,
    playlist: Playlist,
    media_driver: Arc<dyn MediaDriver>,
) -> SyncResult<BootstrappedServer> {
    let clock_address = bind_addr.ip();
    let reference_time = Arc::new(ReferenceTimeManager::new(clock_address, clock_port, playlist));
    let dispatcher = Dispatcher::new(Arc::clone(&reference_time));
    let event_bridge = Arc::new(BroadcastEventBridge::new(
        crate::protocol_constants::EVENT_CHANNEL_CAPACITY,
    ));
    let registry = Arc::new(ClientRegistry::new());
    let cancel_token = CancellationToken::new();
    let spawner = TokioSpawner::current();

    let control_server = Arc::new(TcpControlServer::new(
        bind_addr,
        Arc::clone(&registry),
        dispatcher.clone(),
        Arc::clone(&event_bridge) as Arc<dyn EventEmitter>,
        cancel_token.child_token(),
    ));

    let server = BootstrappedServer {
        reference_time,
        registry,
        dispatcher,
        event_bridge,
        control_server,
        media_driver,
        spawner,
        cancel_token,
    };
    spawn_eos_loop(&server);
    Ok(server)
}

/// §4.4's "on end-of-stream" procedure: tear the probe pipeline down, emit
/// `SyncEvent::EndOfStream` for the track that just ended, then either
/// advance to the next track (reloading the driver and publishing the
/// bumped `base_time_offset` to every client) or, if that was the last
/// track, emit `SyncEvent::EndOfPlaylist` and leave the playlist past end.
async fn handle_end_of_stream(
    reference_time: &ReferenceTimeManager,
    media_driver: &dyn MediaDriver,
    control_server: &dyn ControlChannelServer,
    events: &dyn EventEmitter,
) -> SyncResult<()> {
    let record = reference_time.snapshot();
    let Some(ended_track) = record.playlist.current_track().cloned() else {
        return Ok(());
    };
    events.emit(SyncEvent::EndOfStream {
        track_uri: ended_track.uri.clone(),
    });
    media_driver.teardown().await?;

    if !ended_track.has_known_duration() {
        let observed = reference_time.now().saturating_sub(record.base_time);
        reference_time.record_observed_duration(observed);
    }
    let version = reference_time.advance_track();

    let next_record = reference_time.snapshot();
    if next_record.playlist.is_past_end() {
        events.emit(SyncEvent::EndOfPlaylist);
    } else if let Some(track) = next_record.playlist.current_track() {
        media_driver.load(&track.uri).await?;
        media_driver.set_state(DriverState::Playing, None).await?;
    }
    control_server.publish(version);
    Ok(())
}

/// Spawns the background task that drives [`handle_end_of_stream`] off of
/// [`MediaDriver::wait_for_end_of_stream`], until the server's cancellation
/// token fires.
fn spawn_eos_loop(server: &BootstrappedServer) {
    let reference_time = Arc::clone(&server.reference_time);
    let media_driver = Arc::clone(&server.media_driver);
    let control_server = Arc::clone(&server.control_server);
    let events = Arc::clone(&server.event_bridge) as Arc<dyn EventEmitter>;
    let cancel = server.cancel_token.child_token();

    server.spawner.spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("[Bootstrap] end-of-stream loop stopping");
                    break;
                }
                result = media_driver.wait_for_end_of_stream() => {
                    match result {
                        Ok(()) => {
                            if let Err(e) = handle_end_of_stream(
                                &reference_time,
                                media_driver.as_ref(),
                                control_server.as_ref(),
                                events.as_ref(),
                            )
                            .await
                            {
                                log::warn!("[Bootstrap] end-of-stream handling failed: {}", e);
                            }
                        }
                        Err(e) => {
                            log::warn!("[Bootstrap] media driver end-of-stream wait failed: {}", e);
                            break;
                        }
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catch_up::{CatchUpEngine, LocalPipeline, NetworkClock};
    use crate::control_client::{ControlChannelClient, TcpControlClient};
    use crate::error::SyncResult;
    use crate::media_driver::NullMediaDriver;
    use crate::model::{ClientSession, Track};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn bootstrap_wires_services_with_version_zero() {
        let server = bootstrap_server(
            "127.0.0.1:0".parse().unwrap(),
            9000,
            Playlist::empty(),
            Arc::new(NullMediaDriver),
        )
        .unwrap();
        assert_eq!(server.reference_time.version(), 0);
        assert_eq!(server.registry.session_count(), 0);
    }

    struct FixedClock(AtomicI64);

    impl NetworkClock for FixedClock {
        fn now_ns(&self) -> u64 {
            self.0.load(Ordering::SeqCst) as u64
        }
        fn is_synchronised(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct RecordingPipeline {
        built_uri: StdMutex<Option<String>>,
        base_time: AtomicU64,
    }

    #[async_trait::async_trait]
    impl LocalPipeline for RecordingPipeline {
        async fn teardown(&self) -> SyncResult<()> {
            Ok(())
        }
        async fn rebuild(&self, uri: &str, base_time_ns: u64) -> SyncResult<()> {
            *self.built_uri.lock().unwrap() = Some(uri.to_string());
            self.base_time.store(base_time_ns, Ordering::SeqCst);
            Ok(())
        }
        async fn set_base_time(&self, base_time_ns: u64) -> SyncResult<()> {
            self.base_time.store(base_time_ns, Ordering::SeqCst);
            Ok(())
        }
        async fn set_paused(&self, _paused: bool) -> SyncResult<()> {
            Ok(())
        }
        async fn seek(&self, _position_ns: u64) -> SyncResult<()> {
            Ok(())
        }
        fn is_live(&self) -> bool {
            false
        }
    }

    /// End-to-end scenario 1 (§8): two independently-connected clients
    /// joining the same server converge on the same playlist position
    /// because both receive the identical `SyncRecord` over the wire and
    /// compute the same `rendering_position` from it.
    #[tokio::test]
    async fn two_clients_converge_on_the_same_record() {
        let playlist = Playlist::new(vec![
            Track::new("u1", 10_000_000_000),
            Track::new("u2", 5_000_000_000),
        ]);
        let addr = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let server = bootstrap_server(addr, 9100, playlist, Arc::new(NullMediaDriver)).unwrap();
        Arc::clone(&server.control_server).start().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        async fn join_and_fetch(addr: std::net::SocketAddr, id: &str) -> crate::model::SyncRecord {
            let client = Arc::new(TcpControlClient::new(
                addr,
                ClientSession {
                    id: id.to_string(),
                    config: HashMap::new(),
                },
            ));
            let (tx, mut rx) = mpsc::channel(4);
            let client_for_task = Arc::clone(&client);
            tokio::spawn(async move {
                let _ = client_for_task.start(tx).await;
            });
            rx.recv().await.unwrap()
        }

        let record_a = join_and_fetch(addr, "client-a").await;
        let record_b = join_and_fetch(addr, "client-b").await;

        assert_eq!(record_a.version, record_b.version);
        assert_eq!(record_a.base_time, record_b.base_time);
        assert_eq!(record_a.base_time_offset, record_b.base_time_offset);

        // Both catch-up engines, driven by the same (fixed) clock reading,
        // must compute the identical rendering position and seek decision.
        let clock = Arc::new(FixedClock(AtomicI64::new(
            (record_a.base_time + 2_000_000_000) as i64,
        )));
        let pipeline_a = Arc::new(RecordingPipeline::default());
        let pipeline_b = Arc::new(RecordingPipeline::default());
        let engine_a = CatchUpEngine::new(
            "client-a".into(),
            clock.clone() as Arc<dyn NetworkClock>,
            pipeline_a.clone() as Arc<dyn LocalPipeline>,
        );
        let engine_b = CatchUpEngine::new(
            "client-b".into(),
            clock as Arc<dyn NetworkClock>,
            pipeline_b.clone() as Arc<dyn LocalPipeline>,
        );
        engine_a.on_record(record_a).await.unwrap();
        engine_b.on_record(record_b).await.unwrap();
        engine_a.on_pipeline_reached_playing().await.unwrap();
        engine_b.on_pipeline_reached_playing().await.unwrap();

        assert_eq!(engine_a.seek_state(), engine_b.seek_state());
        assert_eq!(
            pipeline_a.base_time.load(Ordering::SeqCst),
            pipeline_b.base_time.load(Ordering::SeqCst)
        );
    }

    #[derive(Default)]
    struct ScriptedMediaDriver {
        loaded: StdMutex<Vec<String>>,
        teardown_count: StdMutex<u32>,
        fired: AtomicBool,
    }

    #[async_trait::async_trait]
    impl MediaDriver for ScriptedMediaDriver {
        async fn load(&self, uri: &str) -> SyncResult<()> {
            self.loaded.lock().unwrap().push(uri.to_string());
            Ok(())
        }
        async fn set_state(&self, _state: DriverState, _realigned_base_time_ns: Option<u64>) -> SyncResult<()> {
            Ok(())
        }
        async fn teardown(&self) -> SyncResult<()> {
            *self.teardown_count.lock().unwrap() += 1;
            Ok(())
        }
        /// Reports end-of-stream exactly once; every subsequent call blocks
        /// forever, the same as `NullMediaDriver` once there is nothing left
        /// to probe.
        async fn wait_for_end_of_stream(&self) -> SyncResult<()> {
            if self.fired.swap(true, Ordering::SeqCst) {
                std::future::pending().await
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct CapturingEventEmitter {
        events: StdMutex<Vec<SyncEvent>>,
    }

    impl EventEmitter for CapturingEventEmitter {
        fn emit(&self, event: SyncEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn end_of_stream_advances_to_next_track_and_reloads_driver() {
        let rtm = ReferenceTimeManager::new(
            "0.0.0.0".parse().unwrap(),
            0,
            Playlist::new(vec![Track::new("u1", 10_000_000_000), Track::new("u2", 5_000_000_000)]),
        );
        let control = Arc::new(TcpControlServer::new(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(ClientRegistry::new()),
            Dispatcher::new(Arc::new(ReferenceTimeManager::new(
                "0.0.0.0".parse().unwrap(),
                0,
                Playlist::empty(),
            ))),
            Arc::new(crate::events::emitter::NoopEventEmitter),
            CancellationToken::new(),
        ));
        let driver = ScriptedMediaDriver::default();
        let emitter = CapturingEventEmitter::default();

        handle_end_of_stream(&rtm, &driver, control.as_ref(), &emitter)
            .await
            .unwrap();

        let record = rtm.snapshot();
        assert_eq!(record.playlist.current_track_index(), 1);
        assert!(!record.playlist.is_past_end());
        assert_eq!(*driver.loaded.lock().unwrap(), vec!["u2".to_string()]);
        assert_eq!(*driver.teardown_count.lock().unwrap(), 1);
        assert_eq!(
            *emitter.events.lock().unwrap(),
            vec![SyncEvent::EndOfStream {
                track_uri: "u1".into()
            }]
        );
    }

    #[tokio::test]
    async fn end_of_stream_on_last_track_emits_end_of_playlist_without_reload() {
        let rtm = ReferenceTimeManager::new(
            "0.0.0.0".parse().unwrap(),
            0,
            Playlist::new(vec![Track::new("only", 10_000_000_000)]),
        );
        let control = Arc::new(TcpControlServer::new(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(ClientRegistry::new()),
            Dispatcher::new(Arc::new(ReferenceTimeManager::new(
                "0.0.0.0".parse().unwrap(),
                0,
                Playlist::empty(),
            ))),
            Arc::new(crate::events::emitter::NoopEventEmitter),
            CancellationToken::new(),
        ));
        let driver = ScriptedMediaDriver::default();
        let emitter = CapturingEventEmitter::default();

        handle_end_of_stream(&rtm, &driver, control.as_ref(), &emitter)
            .await
            .unwrap();

        assert!(rtm.snapshot().playlist.is_past_end());
        assert!(driver.loaded.lock().unwrap().is_empty());
        assert_eq!(
            *emitter.events.lock().unwrap(),
            vec![
                SyncEvent::EndOfStream {
                    track_uri: "only".into()
                },
                SyncEvent::EndOfPlaylist,
            ]
        );
    }

    /// §4.4 end-to-end: a media driver that reports end-of-stream on its
    /// own (unlike `NullMediaDriver`) drives the playlist forward with no
    /// other component ever calling `advance_track()` directly.
    #[tokio::test]
    async fn bootstrap_advances_playlist_when_driver_reports_end_of_stream() {
        let playlist = Playlist::new(vec![Track::new("u1", 10_000_000_000), Track::new("u2", 5_000_000_000)]);
        let driver = Arc::new(ScriptedMediaDriver::default());
        let server = bootstrap_server(
            "127.0.0.1:0".parse().unwrap(),
            9200,
            playlist,
            driver.clone() as Arc<dyn MediaDriver>,
        )
        .unwrap();

        for _ in 0..50 {
            if server.reference_time.snapshot().playlist.current_track_index() == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let record = server.reference_time.snapshot();
        assert_eq!(record.playlist.current_track_index(), 1);
        assert_eq!(*driver.loaded.lock().unwrap(), vec!["u2".to_string()]);
        server.shutdown().await;
    }
}
