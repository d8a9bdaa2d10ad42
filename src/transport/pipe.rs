
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::event::Frame;
use crate::transport::{Conn, ConnListener, ConnectionId};

static NEXT_PIPE_ID: AtomicU64 = AtomicU64::new(0);

/// In-memory connection pair carrying decoded frames.
///
/// Both delivery classes arrive in send order (the pipe never reorders or
/// drops); each side delivers through its own pump task, one frame at a
/// time, so dispatch order matches arrival order. Sent frames are
/// recorded per class for test inspection.
pub struct PipeConn {
    id: ConnectionId,
    peer_tx: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    listener: AsyncMutex<Option<Arc<dyn ConnListener>>>,
    listener_set: Notify,
    closed: AtomicBool,
    close_notify: Notify,
    sent_reliable: Mutex<Vec<Frame>>,
    sent_unreliable: Mutex<Vec<Frame>>,
}

/// Creates a connected pair and spawns a delivery pump per side.
pub fn pipe() -> (Arc<PipeConn>, Arc<PipeConn>) {
    let (tx_to_second, rx_second) = mpsc::unbounded_channel();
    let (tx_to_first, rx_first) = mpsc::unbounded_channel();

    let first = Arc::new(PipeConn::new(tx_to_second));
    let second = Arc::new(PipeConn::new(tx_to_first));

    tokio::spawn(pump(first.clone(), rx_first));
    tokio::spawn(pump(second.clone(), rx_second));

    (first, second)
}

async fn pump(conn: Arc<PipeConn>, mut rx: mpsc::UnboundedReceiver<Frame>) {
    loop {
        tokio::select! {
            _ = conn.close_notify.notified() => break,
            frame = rx.recv() => match frame {
                Some(frame) => {
                    let listener = conn.wait_listener().await;
                    let as_conn: Arc<dyn Conn> = conn.clone();
                    listener.on_frame(&as_conn, frame).await;
                }
                // Peer dropped its sender: remote close.
                None => break,
            }
        }
    }

    conn.closed.store(true, Ordering::SeqCst);
    let listener = conn.listener.lock().await.clone();
    if let Some(listener) = listener {
        let as_conn: Arc<dyn Conn> = conn.clone();
        listener.on_close(&as_conn).await;
    }
}

impl PipeConn {
    fn new(peer_tx: mpsc::UnboundedSender<Frame>) -> Self {
        PipeConn {
            id: NEXT_PIPE_ID.fetch_add(1, Ordering::SeqCst),
            peer_tx: Mutex::new(Some(peer_tx)),
            listener: AsyncMutex::new(None),
            listener_set: Notify::new(),
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
            sent_reliable: Mutex::new(Vec::new()),
            sent_unreliable: Mutex::new(Vec::new()),
        }
    }

    async fn wait_listener(&self) -> Arc<dyn ConnListener> {
        loop {
            if let Some(listener) = self.listener.lock().await.clone() {
                return listener;
            }
            self.listener_set.notified().await;
        }
    }

    fn push(&self, frame: Frame) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }
        let peer_tx = self.peer_tx.lock();
        match peer_tx.as_ref() {
            Some(tx) => tx.send(frame).map_err(|_| Error::ErrConnectionClosed),
            None => Err(Error::ErrConnectionClosed),
        }
    }

    /// Frames sent on the reliable class, oldest first.
    pub fn reliable_sent(&self) -> Vec<Frame> {
        self.sent_reliable.lock().clone()
    }

    /// Frames sent on the unordered class, oldest first.
    pub fn unreliable_sent(&self) -> Vec<Frame> {
        self.sent_unreliable.lock().clone()
    }
}

#[async_trait]
impl Conn for PipeConn {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send_reliable(&self, frame: Frame) -> Result<()> {
        self.push(frame.clone())?;
        self.sent_reliable.lock().push(frame);
        Ok(())
    }

    async fn send_unreliable(&self, frame: Frame) -> Result<()> {
        self.push(frame.clone())?;
        self.sent_unreliable.lock().push(frame);
        Ok(())
    }

    async fn set_listener(&self, listener: Arc<dyn ConnListener>) {
        *self.listener.lock().await = Some(listener);
        self.listener_set.notify_one();
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // Dropping the sender tells the peer's pump; the notify tells our
        // own.
        self.peer_tx.lock().take();
        self.close_notify.notify_one();
        Ok(())
    }
}
