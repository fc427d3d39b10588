//! Event emitter abstraction for decoupling services from transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than a concrete
//! broadcast channel, enabling testing and alternative delivery mechanisms.

use super::SyncEvent;

/// Trait for emitting domain events without knowledge of transport.
pub trait EventEmitter: Send + Sync {
    /// Emits a domain event (join, leave, end-of-stream, end-of-playlist).
    fn emit(&self, event: SyncEvent);
}

/// No-op emitter; events are silently discarded.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit(&self, _event: SyncEvent) {}
}

/// Logs every event at debug level. Useful for a headless deployment with
/// no other consumer of domain events.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit(&self, event: SyncEvent) {
        log::debug!("[Events] {:?}", event);
    }
}
