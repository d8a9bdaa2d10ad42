use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::{Error, Result};
use crate::registry::remotable::{AbstractObject, CallValue, TypeDescriptor};
use crate::runtime::Runtime;
use crate::transport::Conn;

/// A local capability object backing a proxy: operations declared by the
/// delegate's type, and universal identity operations when the method
/// policy asks for it, execute here instead of crossing the transport.
#[derive(Clone)]
pub struct Delegate {
    pub object: Arc<dyn AbstractObject>,
    pub descriptor: &'static TypeDescriptor,
}

/// Local handle for an object owned by the remote peer.
///
/// The handle closes over the connection, the remote object id, and an
/// optional delegate; every operation resolves its cached method through
/// the registry and routes into the outbound invoker. Handles are
/// invariant per `(connection, object id)`: the proxy cache returns the
/// same handle for the lifetime of the connection.
pub struct ProxyHandle {
    runtime: Weak<Runtime>,
    conn: Arc<dyn Conn>,
    object_id: i64,
    descriptor: &'static TypeDescriptor,
    delegate: Option<Delegate>,
}

impl ProxyHandle {
    pub(crate) fn new(
        runtime: Weak<Runtime>,
        conn: Arc<dyn Conn>,
        object_id: i64,
        descriptor: &'static TypeDescriptor,
        delegate: Option<Delegate>,
    ) -> Self {
        ProxyHandle {
            runtime,
            conn,
            object_id,
            descriptor,
            delegate,
        }
    }

    pub fn object_id(&self) -> i64 {
        self.object_id
    }

    pub fn connection(&self) -> &Arc<dyn Conn> {
        &self.conn
    }

    pub fn descriptor(&self) -> &'static TypeDescriptor {
        self.descriptor
    }

    pub(crate) fn delegate(&self) -> Option<&Delegate> {
        self.delegate.as_ref()
    }

    /// Invokes an operation of the remote object. Typed proxies are thin
    /// wrappers over this entry point.
    pub async fn invoke(&self, method_name: &str, args: Vec<CallValue>) -> Result<CallValue> {
        let runtime = self.runtime.upgrade().ok_or(Error::ErrRuntimeDropped)?;
        runtime.outbound_invoke(self, method_name, args).await
    }
}

impl fmt::Debug for ProxyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyHandle")
            .field("conn", &self.conn.id())
            .field("object_id", &self.object_id)
            .field("type", &self.descriptor.name)
            .field("delegated", &self.delegate.is_some())
            .finish()
    }
}

/// Per-connection map of remote object id to proxy handle.
#[derive(Default)]
pub(crate) struct ProxyCache {
    handles: HashMap<i64, Arc<ProxyHandle>>,
}

impl ProxyCache {
    pub(crate) fn get(&self, object_id: i64) -> Option<Arc<ProxyHandle>> {
        self.handles.get(&object_id).cloned()
    }

    pub(crate) fn insert(&mut self, object_id: i64, handle: Arc<ProxyHandle>) {
        self.handles.insert(object_id, handle);
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }
}
