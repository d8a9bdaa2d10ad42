#[cfg(test)]
mod runtime_test;

mod dispatcher;
mod invoker;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::event::pool::{EventPool, DEFAULT_POOL_CAPACITY};
use crate::executor::Executor;
use crate::host::HostTable;
use crate::proxy::{Delegate, ProxyCache, ProxyHandle};
use crate::registry::remotable::{AbstractObject, TypeDescriptor};
use crate::registry::TypeRegistry;
use crate::rendezvous::RendezvousStore;
use crate::transport::{Conn, ConnectionId, Server};

use self::dispatcher::{AcceptListener, InboundListener};

/// Builds a [`Runtime`].
///
/// The default configuration serves the common case: one worker (so
/// target operations never run concurrently and complete in submission
/// order) and unbounded response waits unless a method policy says
/// otherwise.
pub struct RuntimeBuilder {
    worker_count: usize,
    default_response_timeout: Option<Duration>,
    pool_capacity: usize,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        RuntimeBuilder::new()
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        RuntimeBuilder {
            worker_count: 1,
            default_response_timeout: None,
            pool_capacity: DEFAULT_POOL_CAPACITY,
        }
    }

    /// Sets the worker pool size. More than one worker gives up the
    /// completion-in-submission-order guarantee.
    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Caps response waits for methods whose policy leaves the timeout
    /// unbounded.
    pub fn with_default_response_timeout(mut self, timeout: Duration) -> Self {
        self.default_response_timeout = Some(timeout);
        self
    }

    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    pub fn build(self) -> Arc<Runtime> {
        Arc::new(Runtime {
            registry: TypeRegistry::new(),
            host_table: HostTable::new(),
            rendezvous: RendezvousStore::new(),
            pool: EventPool::new(self.pool_capacity),
            executor: Executor::new(self.worker_count),
            default_response_timeout: self.default_response_timeout,
            next_transaction_id: AtomicI64::new(0),
            last_transaction_id: AtomicI64::new(-1),
            connections: Mutex::new(HashMap::new()),
            async_executions: Mutex::new(HashMap::new()),
        })
    }
}

pub(crate) struct ConnectionState {
    pub(crate) conn: Arc<dyn Conn>,
    pub(crate) proxies: ProxyCache,
    /// Transactions awaiting an execution frame from this connection;
    /// failed as a batch when the connection drops.
    pub(crate) outstanding: HashSet<i64>,
}

pub(crate) struct AsyncExecution {
    pub(crate) conn_id: ConnectionId,
    pub(crate) method_id: u32,
    pub(crate) response_timeout: Option<Duration>,
}

/// The peer-symmetric RMI runtime context.
///
/// One runtime per peer; any number of connections may attach. The
/// runtime owns the registries shared by all connections and the
/// per-connection proxy caches, correlates outbound calls with inbound
/// execution frames, and dispatches inbound invocations onto the worker
/// pool.
pub struct Runtime {
    pub(crate) registry: TypeRegistry,
    pub(crate) host_table: HostTable,
    pub(crate) rendezvous: RendezvousStore,
    pub(crate) pool: EventPool,
    pub(crate) executor: Executor,
    pub(crate) default_response_timeout: Option<Duration>,
    next_transaction_id: AtomicI64,
    last_transaction_id: AtomicI64,
    pub(crate) connections: Mutex<HashMap<ConnectionId, ConnectionState>>,
    pub(crate) async_executions: Mutex<HashMap<i64, AsyncExecution>>,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn new() -> Arc<Runtime> {
        RuntimeBuilder::new().build()
    }

    /// Registers a remotable type and its transitive closure of
    /// referenced remotable types. Registration order must be identical
    /// on both peers.
    pub fn register_remotable(&self, descriptor: &'static TypeDescriptor) -> Result<u32> {
        self.registry.register_remotable(descriptor)
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.registry.is_registered(type_name)
    }

    /// Makes a local object addressable under a fresh id.
    pub fn host(&self, object: Arc<dyn AbstractObject>) -> i64 {
        self.host_table.host(object)
    }

    /// Makes a local object addressable under an explicit id.
    pub fn host_with_id(&self, object_id: i64, object: Arc<dyn AbstractObject>) -> Result<()> {
        self.host_table.host_with_id(object_id, object)
    }

    /// Hosts an object and ensures the inbound invocation listener is
    /// attached to the connection.
    pub async fn host_on_connection(
        self: &Arc<Self>,
        conn: Arc<dyn Conn>,
        object: Arc<dyn AbstractObject>,
    ) -> Result<i64> {
        self.attach(conn).await?;
        Ok(self.host_table.host(object))
    }

    /// Hosts an object and arranges for every connection the server
    /// accepts to get the inbound invocation listener.
    pub async fn host_on_server(
        self: &Arc<Self>,
        server: &Arc<dyn Server>,
        object: Arc<dyn AbstractObject>,
    ) -> Result<i64> {
        server
            .set_listener(Arc::new(AcceptListener {
                runtime: Arc::downgrade(self),
            }))
            .await;
        Ok(self.host_table.host(object))
    }

    /// Attaches a connection: allocates its proxy cache and installs the
    /// inbound listener. Idempotent.
    pub async fn attach(self: &Arc<Self>, conn: Arc<dyn Conn>) -> Result<()> {
        let newly_attached = {
            let mut connections = self.connections.lock();
            match connections.entry(conn.id()) {
                std::collections::hash_map::Entry::Occupied(_) => false,
                std::collections::hash_map::Entry::Vacant(entry) => {
                    entry.insert(ConnectionState {
                        conn: conn.clone(),
                        proxies: ProxyCache::default(),
                        outstanding: HashSet::new(),
                    });
                    true
                }
            }
        };

        if newly_attached {
            conn.set_listener(Arc::new(InboundListener {
                runtime: Arc::downgrade(self),
            }))
            .await;
            log::debug!("attached connection {}", conn.id());
        }
        Ok(())
    }

    /// Obtains the proxy for a remote object. For a `(connection, id)`
    /// pair already cached, the existing handle is returned regardless of
    /// the requested capability set.
    pub async fn create_remote(
        self: &Arc<Self>,
        conn: Arc<dyn Conn>,
        object_id: i64,
        descriptor: &'static TypeDescriptor,
    ) -> Result<Arc<ProxyHandle>> {
        self.create_remote_inner(conn, object_id, descriptor, None)
            .await
    }

    /// Like [`Runtime::create_remote`], with a local delegate answering
    /// the delegate type's operations (and universal identity operations
    /// whose policy requests it) without crossing the transport.
    pub async fn create_remote_with_delegate(
        self: &Arc<Self>,
        conn: Arc<dyn Conn>,
        object_id: i64,
        descriptor: &'static TypeDescriptor,
        delegate: Arc<dyn AbstractObject>,
        delegate_descriptor: &'static TypeDescriptor,
    ) -> Result<Arc<ProxyHandle>> {
        self.create_remote_inner(
            conn,
            object_id,
            descriptor,
            Some(Delegate {
                object: delegate,
                descriptor: delegate_descriptor,
            }),
        )
        .await
    }

    async fn create_remote_inner(
        self: &Arc<Self>,
        conn: Arc<dyn Conn>,
        object_id: i64,
        descriptor: &'static TypeDescriptor,
        delegate: Option<Delegate>,
    ) -> Result<Arc<ProxyHandle>> {
        if !self.registry.is_registered(descriptor.name) {
            return Err(Error::ErrTypeNotRegistered(descriptor.name.to_owned()));
        }
        self.attach(conn.clone()).await?;

        let mut connections = self.connections.lock();
        let state = connections
            .get_mut(&conn.id())
            .ok_or(Error::ErrConnectionNotAttached)?;
        if let Some(existing) = state.proxies.get(object_id) {
            return Ok(existing);
        }

        let handle = Arc::new(ProxyHandle::new(
            Arc::downgrade(self),
            conn,
            object_id,
            descriptor,
            delegate,
        ));
        state.proxies.insert(object_id, handle.clone());
        Ok(handle)
    }

    /// Id of the most recently issued transaction, or -1 before the first
    /// call. Runtime-global: meaningful only when the caller knows no
    /// other task issued an intervening call.
    pub fn last_transaction_id(&self) -> i64 {
        self.last_transaction_id.load(Ordering::SeqCst)
    }

    /// Whether a deferred result can still be fetched for the most recent
    /// transaction. Subject to the same single-caller caveat as
    /// [`Runtime::last_transaction_id`].
    pub fn has_last_result(&self) -> bool {
        let transaction_id = self.last_transaction_id();
        transaction_id >= 0 && self.async_executions.lock().contains_key(&transaction_id)
    }

    pub async fn shutdown_executor(&self) {
        self.executor.shutdown().await;
    }

    pub(crate) fn next_transaction(&self) -> i64 {
        let transaction_id = self.next_transaction_id.fetch_add(1, Ordering::SeqCst);
        self.last_transaction_id
            .store(transaction_id, Ordering::SeqCst);
        transaction_id
    }

    pub(crate) fn connection(&self, conn_id: ConnectionId) -> Result<Arc<dyn Conn>> {
        self.connections
            .lock()
            .get(&conn_id)
            .map(|state| state.conn.clone())
            .ok_or(Error::ErrConnectionClosed)
    }

    pub(crate) fn mark_outstanding(&self, conn_id: ConnectionId, transaction_id: i64) {
        if let Some(state) = self.connections.lock().get_mut(&conn_id) {
            state.outstanding.insert(transaction_id);
        }
    }

    pub(crate) fn clear_outstanding(&self, conn_id: ConnectionId, transaction_id: i64) {
        if let Some(state) = self.connections.lock().get_mut(&conn_id) {
            state.outstanding.remove(&transaction_id);
        }
    }

    #[cfg(test)]
    pub(crate) fn proxy_count(&self, conn_id: ConnectionId) -> usize {
        self.connections
            .lock()
            .get(&conn_id)
            .map(|state| state.proxies.len())
            .unwrap_or(0)
    }
}
