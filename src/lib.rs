//! Peer-symmetric remote method invocation runtime.
//!
//! Each peer hosts the same runtime: any peer may host objects, create
//! proxies for objects owned by the other side, or both. A call travels
//! as one invocation frame carrying a transaction id, the target object
//! id, a method id, and encoded arguments; unless the method policy says
//! otherwise, one execution frame travels back and wakes the caller
//! through the rendezvous store.
//!
//! The networked transport and the byte-level codec are external
//! collaborators behind the traits in [`transport`]; an in-memory pipe
//! implementation ships for tests and in-process embedding.

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod error;
pub mod event;
pub mod executor;
pub mod host;
pub mod proxy;
pub mod registry;
pub mod rendezvous;
pub mod runtime;
pub mod transport;
pub mod value;

pub use error::{Error, Result};
pub use event::{ExecutionEvent, Frame, InvocationEvent};
pub use proxy::{Delegate, ProxyHandle};
pub use registry::method::{CachedMethod, CallPolicy};
pub use registry::remotable::{
    AbstractObject, CallFuture, CallValue, MethodSpec, TypeDescriptor, TypeRef,
};
pub use runtime::{Runtime, RuntimeBuilder};
pub use transport::{Conn, ConnListener, ConnectionId, Server, ServerListener};
pub use value::{Value, NULL_OBJECT_ID};
