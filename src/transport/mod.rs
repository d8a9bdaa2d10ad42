pub mod pipe;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::event::Frame;

pub type ConnectionId = u64;

/// A peer-to-peer connection supplied by the transport collaborator.
///
/// The transport owns connection lifecycles and moves decoded frames; the
/// core only requires the two delivery classes and a listener hook. The
/// reliable class is ordered; the unreliable class is an unordered
/// datagram.
#[async_trait]
pub trait Conn: Send + Sync {
    /// Stable identity of this connection for the lifetime of the
    /// process; keys the per-connection proxy cache.
    fn id(&self) -> ConnectionId;

    async fn send_reliable(&self, frame: Frame) -> Result<()>;

    async fn send_unreliable(&self, frame: Frame) -> Result<()>;

    /// Installs the frame listener. Frames received before a listener is
    /// installed are held back, not dropped.
    async fn set_listener(&self, listener: Arc<dyn ConnListener>);

    async fn close(&self) -> Result<()>;
}

/// Receives decoded frames and lifecycle events for one connection. The
/// implementation must not block the transport's delivery task on
/// business logic.
#[async_trait]
pub trait ConnListener: Send + Sync {
    async fn on_frame(&self, conn: &Arc<dyn Conn>, frame: Frame);

    async fn on_close(&self, conn: &Arc<dyn Conn>);
}

/// Connection acceptor supplied by the transport collaborator.
#[async_trait]
pub trait Server: Send + Sync {
    async fn set_listener(&self, listener: Arc<dyn ServerListener>);
}

/// Receives connection-establishment events; the runtime installs one
/// that attaches the invocation listener to every new connection.
#[async_trait]
pub trait ServerListener: Send + Sync {
    async fn on_connection(&self, conn: Arc<dyn Conn>);
}
