//! Connection registry.
//!
//! Tracks live relay connections and hands out dense, reusable identifiers:
//! a new connection takes the first closed slot before a new slot is
//! appended. Closed records stay in place so broadcast is a plain scan.

use spirit_shared::net::{ConnectionId, ServerMsg};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// Messages queued per connection before further ones are dropped.
pub const OUTBOUND_QUEUE: usize = 256;

/// Outbound side of one connection.
pub trait MessageSink: Send {
    fn deliver(&self, msg: &ServerMsg) -> anyhow::Result<()>;
}

/// Never waits: a peer that stops reading loses messages once its queue is
/// full instead of stalling the relay.
impl MessageSink for mpsc::Sender<ServerMsg> {
    fn deliver(&self, msg: &ServerMsg) -> anyhow::Result<()> {
        match self.try_send(msg.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => anyhow::bail!("outbound queue full"),
            Err(TrySendError::Closed(_)) => anyhow::bail!("connection writer has stopped"),
        }
    }
}

struct ConnectionRecord {
    id: ConnectionId,
    /// `None` once the connection has closed.
    sink: Option<Box<dyn MessageSink>>,
}

impl ConnectionRecord {
    fn is_closed(&self) -> bool {
        self.sink.is_none()
    }
}

/// Slot table of relay connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    records: Vec<ConnectionRecord>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection, reusing the first closed slot if any.
    pub fn accept(&mut self, sink: Box<dyn MessageSink>) -> ConnectionId {
        if let Some(record) = self.records.iter_mut().find(|r| r.is_closed()) {
            record.sink = Some(sink);
            return record.id;
        }
        let id = ConnectionId(self.records.len() as u32);
        self.records.push(ConnectionRecord {
            id,
            sink: Some(sink),
        });
        id
    }

    /// Delivers to one open connection.
    pub fn send(&self, id: ConnectionId, msg: &ServerMsg) -> anyhow::Result<()> {
        match self.records.get(id.index()).and_then(|r| r.sink.as_ref()) {
            Some(sink) => sink.deliver(msg),
            None => anyhow::bail!("connection {} is not open", id.0),
        }
    }

    /// Delivers to every open connection except `sender`.
    ///
    /// Per-peer failures are logged and skipped. Returns how many peers
    /// accepted the message.
    pub fn broadcast_except(&self, sender: ConnectionId, msg: &ServerMsg) -> usize {
        let mut delivered = 0;
        for record in &self.records {
            if record.id == sender {
                continue;
            }
            let Some(sink) = &record.sink else {
                continue;
            };
            match sink.deliver(msg) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(conn_id = ?record.id, error = %e, "Dropped message to stale peer"),
            }
        }
        delivered
    }

    /// Marks a connection closed. Returns false if it was not open.
    pub fn close(&mut self, id: ConnectionId) -> bool {
        match self.records.get_mut(id.index()) {
            Some(record) if !record.is_closed() => {
                record.sink = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_open(&self, id: ConnectionId) -> bool {
        self.records
            .get(id.index())
            .is_some_and(|r| !r.is_closed())
    }

    pub fn open_ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.records
            .iter()
            .filter(|r| !r.is_closed())
            .map(|r| r.id)
    }

    pub fn open_count(&self) -> usize {
        self.open_ids().count()
    }

    /// Number of slots, open or closed.
    pub fn slots(&self) -> usize {
        self.records.len()
    }
}
