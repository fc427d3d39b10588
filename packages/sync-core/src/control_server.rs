//! Control-Channel Server (§4.3): pluggable transport, default a framed TCP
//! listener.
//!
//! Per the design note on pluggable transports, this is expressed as a flat
//! capability set (`start`, `stop`, `publish`) rather than a trait
//! hierarchy — an alternative transport only needs to implement
//! [`ControlChannelServer`], not extend anything. `on_client_joined` /
//! `on_client_left` are satisfied through the existing [`EventEmitter`]
//! seam rather than a second callback-registration mechanism, since that
//! seam already exists for every other domain event.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::Dispatcher;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventEmitter, SyncEvent};
use crate::framing::JsonFrameCodec;
use crate::registry::ClientRegistry;
use crate::wire::{JoinDescriptor, SyncRecordWire};

/// Capability set a control-channel server transport must provide.
#[async_trait]
pub trait ControlChannelServer: Send + Sync {
    /// Starts accepting connections; returns once the listener is bound.
    /// Workers for accepted connections run in spawned background tasks.
    async fn start(self: Arc<Self>) -> SyncResult<()>;

    /// Stops accepting new connections and force-closes existing ones.
    async fn stop(&self);

    /// Wakes every connected worker so it re-checks the dispatcher's
    /// current version and pushes if it has advanced.
    fn publish(&self, version: u64);
}

/// Default framed-TCP implementation.
pub struct TcpControlServer {
    bind_addr: SocketAddr,
    registry: Arc<ClientRegistry>,
    dispatcher: Dispatcher,
    events: Arc<dyn EventEmitter>,
    cancel: CancellationToken,
}

impl TcpControlServer {
    pub fn new(
        bind_addr: SocketAddr,
        registry: Arc<ClientRegistry>,
        dispatcher: Dispatcher,
        events: Arc<dyn EventEmitter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            bind_addr,
            registry,
            dispatcher,
            events,
            cancel,
        }
    }
}

#[async_trait]
impl ControlChannelServer for TcpControlServer {
    async fn start(self: Arc<Self>) -> SyncResult<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        log::info!("[ControlServer] listening on {}", self.bind_addr);

        let this = Arc::clone(&self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => {
                        log::info!("[ControlServer] accept loop stopping");
                        break;
                    }
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, peer)) => {
                                let worker = Arc::clone(&this);
                                tokio::spawn(async move {
                                    if let Err(e) = worker.run_connection(stream, peer).await {
                                        log::warn!("[ControlServer] connection {} ended: {}", peer, e);
                                    }
                                });
                            }
                            Err(e) => log::warn!("[ControlServer] accept failed: {}", e),
                        }
                    }
                }
            }
        });

        Ok(())
    }

    async fn stop(&self) {
        self.cancel.cancel();
        self.registry.close_all();
    }

    fn publish(&self, version: u64) {
        self.dispatcher.notify(version);
    }
}

impl TcpControlServer {
    /// Per-connection worker: (a) reads one descriptor message, (b) sends
    /// the current record, (c) blocks on the dispatcher's version-notify
    /// channel and sends on every advance, (d) terminates on peer close,
    /// peer error, or server stop. No inbound bytes are expected after the
    /// join descriptor (§9 open question, resolved: any are a protocol
    /// error).
    async fn run_connection(&self, stream: TcpStream, peer: SocketAddr) -> SyncResult<()> {
        let mut framed = Framed::new(stream, JsonFrameCodec::new());

        let descriptor_value = framed
            .next()
            .await
            .ok_or_else(|| SyncError::Transport(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before join descriptor",
            )))??;
        let descriptor: JoinDescriptor = serde_json::from_value(descriptor_value)?;
        let client_id = descriptor.id.clone();
        let session = descriptor.into();

        let guard = self.registry.register(session);
        self.events.emit(SyncEvent::ClientJoined {
            client_id: client_id.clone(),
        });

        let mut version_rx = self.dispatcher.subscribe();

        let initial = self.dispatcher.current_record();
        let mut last_sent_version = initial.version;
        let wire: SyncRecordWire = (&initial).into();
        framed.send(serde_json::to_value(&wire)?).await?;

        let result = loop {
            tokio::select! {
                _ = guard.cancel_token().cancelled() => {
                    break Ok(());
                }
                version = version_rx.recv() => {
                    match version {
                        Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                            let record = self.dispatcher.current_record();
                            if record.version > last_sent_version {
                                last_sent_version = record.version;
                                let wire: SyncRecordWire = (&record).into();
                                if let Err(e) = framed.send(serde_json::to_value(&wire)?).await {
                                    break Err(e.into());
                                }
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break Ok(()),
                    }
                }
                incoming = framed.next() => {
                    match incoming {
                        None => break Ok(()),
                        Some(Ok(_)) => {
                            break Err(SyncError::Protocol(
                                "unexpected message after join descriptor".into(),
                            ));
                        }
                        Some(Err(e)) => break Err(e),
                    }
                }
            }
        };

        self.events.emit(SyncEvent::ClientLeft { client_id });
        log::info!("[ControlServer] {} disconnected", peer);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::emitter::NoopEventEmitter;
    use crate::model::Playlist;
    use crate::reference_time::ReferenceTimeManager;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn join_then_receives_current_record_then_update() {
        let rtm = Arc::new(ReferenceTimeManager::new(
            "0.0.0.0".parse().unwrap(),
            0,
            Playlist::empty(),
        ));
        let dispatcher = Dispatcher::new(rtm.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let server = Arc::new(TcpControlServer::new(
            addr,
            Arc::new(ClientRegistry::new()),
            dispatcher.clone(),
            Arc::new(NoopEventEmitter),
            CancellationToken::new(),
        ));
        Arc::clone(&server).start().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let join = serde_json::to_vec(&JoinDescriptor {
            id: "c1".into(),
            config: Default::default(),
        })
        .unwrap();
        stream.write_all(&join).await.unwrap();

        let mut buf = vec![0u8; 4096];
        let n = stream.read(&mut buf).await.unwrap();
        let first: serde_json::Value = serde_json::from_slice(&buf[..n]).unwrap();
        assert_eq!(first["version"], 0);

        let new_version = rtm.set_paused(true);
        server.publish(new_version);

        let n = stream.read(&mut buf).await.unwrap();
        let second: serde_json::Value = serde_json::from_slice(&buf[..n]).unwrap();
        assert_eq!(second["version"], new_version);
        assert_eq!(second["paused"], true);
    }
}
