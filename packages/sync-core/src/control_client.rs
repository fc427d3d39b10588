//! Control-Channel Client (§4.7): pluggable transport, default TCP.
//!
//! Opens a connection, sends the join descriptor, then reads framed
//! objects; each decoded object replaces the in-memory `SyncRecord` and
//! notifies the catch-up engine. Orderly close on stop; on read error,
//! surfaces the error and stops.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::error::{SyncError, SyncResult};
use crate::framing::JsonFrameCodec;
use crate::model::{ClientSession, SyncRecord};
use crate::wire::{JoinDescriptor, SyncRecordWire};

/// Capability set a control-channel client transport must provide.
#[async_trait]
pub trait ControlChannelClient: Send + Sync {
    /// Connects, joins, and begins delivering decoded records to `on_record`
    /// until `stop()` is called or a read error occurs.
    async fn start(self: Arc<Self>, on_record: mpsc::Sender<SyncRecord>) -> SyncResult<()>;

    /// Requests an orderly close.
    async fn stop(&self);
}

/// Default TCP implementation.
pub struct TcpControlClient {
    server_addr: SocketAddr,
    session: ClientSession,
    cancel: CancellationToken,
}

impl TcpControlClient {
    pub fn new(server_addr: SocketAddr, session: ClientSession) -> Self {
        Self {
            server_addr,
            session,
            cancel: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl ControlChannelClient for TcpControlClient {
    async fn start(self: Arc<Self>, on_record: mpsc::Sender<SyncRecord>) -> SyncResult<()> {
        let stream = TcpStream::connect(self.server_addr).await?;
        let mut framed = Framed::new(stream, JsonFrameCodec::new());

        let descriptor = JoinDescriptor::from(&self.session);
        framed.send(serde_json::to_value(&descriptor)?).await?;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    log::info!("[ControlClient] stopping on request");
                    return Ok(());
                }
                incoming = framed.next() => {
                    match incoming {
                        None => {
                            log::info!("[ControlClient] server closed connection");
                            return Ok(());
                        }
                        Some(Err(e)) => {
                            log::warn!("[ControlClient] read error: {}", e);
                            return Err(e);
                        }
                        Some(Ok(value)) => {
                            let wire: SyncRecordWire = serde_json::from_value(value)
                                .map_err(SyncError::from)?;
                            let record: SyncRecord = wire.into();
                            if on_record.send(record).await.is_err() {
                                log::info!("[ControlClient] engine channel closed, stopping");
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }

    async fn stop(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_server::{ControlChannelServer, TcpControlServer};
    use crate::dispatcher::Dispatcher;
    use crate::events::emitter::NoopEventEmitter;
    use crate::model::Playlist;
    use crate::reference_time::ReferenceTimeManager;
    use crate::registry::ClientRegistry;
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn client_receives_current_record_then_an_update() {
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

        let client = Arc::new(TcpControlClient::new(
            addr,
            ClientSession {
                id: "c1".into(),
                config: HashMap::new(),
            },
        ));
        let (tx, mut rx) = mpsc::channel(8);
        let client_for_task = Arc::clone(&client);
        tokio::spawn(async move {
            client_for_task.start(tx).await.unwrap();
        });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.version, 0);

        let new_version = rtm.set_paused(true);
        server.publish(new_version);

        let second = rx.recv().await.unwrap();
        assert_eq!(second.version, new_version);
        assert!(second.paused);

        client.stop().await;
    }
}
