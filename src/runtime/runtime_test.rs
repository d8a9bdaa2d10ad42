use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::sleep;

use super::*;
use crate::event::{ExecutionEvent, Frame, InvocationEvent};
use crate::registry::method::{CachedMethod, CallPolicy};
use crate::registry::remotable::{CallFuture, CallValue, MethodSpec, TypeRef, STRINGIFY_OP};
use crate::transport::pipe::{pipe, PipeConn};
use crate::transport::ServerListener;
use crate::value::Value;

fn peers() -> (Arc<Runtime>, Arc<Runtime>, Arc<PipeConn>, Arc<PipeConn>) {
    let a = RuntimeBuilder::new().build();
    let b = RuntimeBuilder::new().build();
    let (ca, cb) = pipe();
    (a, b, ca, cb)
}

fn unknown(method: &CachedMethod) -> Error {
    Error::ErrUnknownMethod(method.name().to_owned())
}

// Echo: int id(int) returns its argument.

static ECHO_TYPE: TypeDescriptor = TypeDescriptor {
    name: "Echo",
    methods: &[MethodSpec {
        name: "id",
        params: &[TypeRef::Int],
        returns: TypeRef::Int,
        policy: CallPolicy::DEFAULT,
    }],
};

struct EchoImpl;

impl AbstractObject for EchoImpl {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &ECHO_TYPE
    }

    fn call<'a>(&'a self, method: &'a CachedMethod, mut args: Vec<CallValue>) -> CallFuture<'a> {
        Box::pin(async move {
            match method.name() {
                "id" => Ok(args.remove(0)),
                _ => Err(unknown(method)),
            }
        })
    }
}

// Bag/Item: void put(Item), String label().

fn item_descriptor() -> &'static TypeDescriptor {
    &ITEM_TYPE
}

static ITEM_TYPE: TypeDescriptor = TypeDescriptor {
    name: "Item",
    methods: &[MethodSpec {
        name: "label",
        params: &[],
        returns: TypeRef::Str,
        policy: CallPolicy::DEFAULT,
    }],
};

static BAG_TYPE: TypeDescriptor = TypeDescriptor {
    name: "Bag",
    methods: &[MethodSpec {
        name: "put",
        params: &[TypeRef::Remote(item_descriptor)],
        returns: TypeRef::Unit,
        policy: CallPolicy::DEFAULT,
    }],
};

struct ItemImpl {
    label: &'static str,
}

impl AbstractObject for ItemImpl {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &ITEM_TYPE
    }

    fn call<'a>(&'a self, method: &'a CachedMethod, _args: Vec<CallValue>) -> CallFuture<'a> {
        Box::pin(async move {
            match method.name() {
                "label" => Ok(CallValue::Wire(Value::from(self.label))),
                _ => Err(unknown(method)),
            }
        })
    }
}

#[derive(Default)]
struct BagImpl {
    labels: SyncMutex<Vec<String>>,
}

impl AbstractObject for BagImpl {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &BAG_TYPE
    }

    fn call<'a>(&'a self, method: &'a CachedMethod, mut args: Vec<CallValue>) -> CallFuture<'a> {
        Box::pin(async move {
            match method.name() {
                "put" => {
                    // The argument arrived as a proxy; reading its label
                    // re-enters the owning peer.
                    let item = args.remove(0);
                    let item = item.as_remote()?.clone();
                    let label = item.invoke("label", vec![]).await?.into_value()?;
                    self.labels.lock().push(label.as_str()?.to_owned());
                    Ok(CallValue::null())
                }
                _ => Err(unknown(method)),
            }
        })
    }
}

// Logger: void log(String), fire-and-forget.

static LOGGER_TYPE: TypeDescriptor = TypeDescriptor {
    name: "Logger",
    methods: &[MethodSpec {
        name: "log",
        params: &[TypeRef::Str],
        returns: TypeRef::Unit,
        policy: CallPolicy {
            no_return: true,
            ..CallPolicy::DEFAULT
        },
    }],
};

struct LoggerImpl {
    lines: UnboundedSender<String>,
}

impl AbstractObject for LoggerImpl {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &LOGGER_TYPE
    }

    fn call<'a>(&'a self, method: &'a CachedMethod, mut args: Vec<CallValue>) -> CallFuture<'a> {
        Box::pin(async move {
            match method.name() {
                "log" => {
                    let line = args.remove(0).into_value()?;
                    let _ = self.lines.send(line.as_str()?.to_owned());
                    Ok(CallValue::null())
                }
                _ => Err(unknown(method)),
            }
        })
    }
}

// Slow: int slow(), deferred result.

static SLOW_TYPE: TypeDescriptor = TypeDescriptor {
    name: "Slow",
    methods: &[MethodSpec {
        name: "slow",
        params: &[],
        returns: TypeRef::Int,
        policy: CallPolicy {
            non_blocking: true,
            ..CallPolicy::DEFAULT
        },
    }],
};

struct SlowImpl;

impl AbstractObject for SlowImpl {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &SLOW_TYPE
    }

    fn call<'a>(&'a self, method: &'a CachedMethod, _args: Vec<CallValue>) -> CallFuture<'a> {
        Box::pin(async move {
            match method.name() {
                "slow" => {
                    sleep(Duration::from_millis(100)).await;
                    Ok(CallValue::Wire(Value::Int(7)))
                }
                _ => Err(unknown(method)),
            }
        })
    }
}

// Switch: int off(), closed.

static SWITCH_TYPE: TypeDescriptor = TypeDescriptor {
    name: "Switch",
    methods: &[MethodSpec {
        name: "off",
        params: &[],
        returns: TypeRef::Int,
        policy: CallPolicy {
            closed: true,
            ..CallPolicy::DEFAULT
        },
    }],
};

struct SwitchImpl;

impl AbstractObject for SwitchImpl {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &SWITCH_TYPE
    }

    fn call<'a>(&'a self, method: &'a CachedMethod, _args: Vec<CallValue>) -> CallFuture<'a> {
        Box::pin(async move {
            match method.name() {
                "off" => Ok(CallValue::Wire(Value::Int(41))),
                _ => Err(unknown(method)),
            }
        })
    }
}

// Stall: int stall() with a 50ms response timeout (the target takes
// longer), int ping() as the follow-up transaction.

static STALL_TYPE: TypeDescriptor = TypeDescriptor {
    name: "Stall",
    methods: &[
        MethodSpec {
            name: "stall",
            params: &[],
            returns: TypeRef::Int,
            policy: CallPolicy {
                response_timeout_ms: 50,
                ..CallPolicy::DEFAULT
            },
        },
        MethodSpec {
            name: "ping",
            params: &[],
            returns: TypeRef::Int,
            policy: CallPolicy::DEFAULT,
        },
    ],
};

struct StallImpl;

impl AbstractObject for StallImpl {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &STALL_TYPE
    }

    fn call<'a>(&'a self, method: &'a CachedMethod, _args: Vec<CallValue>) -> CallFuture<'a> {
        Box::pin(async move {
            match method.name() {
                "stall" => {
                    sleep(Duration::from_millis(200)).await;
                    Ok(CallValue::Wire(Value::Int(99)))
                }
                "ping" => Ok(CallValue::Wire(Value::Int(1))),
                _ => Err(unknown(method)),
            }
        })
    }
}

// Hang: int hang() never answers within the test.

static HANG_TYPE: TypeDescriptor = TypeDescriptor {
    name: "Hang",
    methods: &[MethodSpec {
        name: "hang",
        params: &[],
        returns: TypeRef::Int,
        policy: CallPolicy::DEFAULT,
    }],
};

struct HangImpl;

impl AbstractObject for HangImpl {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &HANG_TYPE
    }

    fn call<'a>(&'a self, method: &'a CachedMethod, _args: Vec<CallValue>) -> CallFuture<'a> {
        Box::pin(async move {
            match method.name() {
                "hang" => {
                    sleep(Duration::from_secs(5)).await;
                    Ok(CallValue::Wire(Value::Int(0)))
                }
                _ => Err(unknown(method)),
            }
        })
    }
}

// Factory: Item make(), deferred remotable result.

static FACTORY_TYPE: TypeDescriptor = TypeDescriptor {
    name: "Factory",
    methods: &[MethodSpec {
        name: "make",
        params: &[],
        returns: TypeRef::Remote(item_descriptor),
        policy: CallPolicy {
            non_blocking: true,
            ..CallPolicy::DEFAULT
        },
    }],
};

struct FactoryImpl;

impl AbstractObject for FactoryImpl {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &FACTORY_TYPE
    }

    fn call<'a>(&'a self, method: &'a CachedMethod, _args: Vec<CallValue>) -> CallFuture<'a> {
        Box::pin(async move {
            match method.name() {
                "make" => Ok(CallValue::Local(Arc::new(ItemImpl { label: "made" }))),
                _ => Err(unknown(method)),
            }
        })
    }
}

// Chatty/Name: delegation of declared and universal operations.

static CHATTY_TYPE: TypeDescriptor = TypeDescriptor {
    name: "Chatty",
    methods: &[
        MethodSpec {
            name: "greet",
            params: &[],
            returns: TypeRef::Str,
            policy: CallPolicy::DEFAULT,
        },
        MethodSpec {
            name: STRINGIFY_OP,
            params: &[],
            returns: TypeRef::Str,
            policy: CallPolicy {
                delegate_identity: true,
                ..CallPolicy::DEFAULT
            },
        },
    ],
};

static NAME_TYPE: TypeDescriptor = TypeDescriptor {
    name: "Name",
    methods: &[MethodSpec {
        name: "nick",
        params: &[],
        returns: TypeRef::Str,
        policy: CallPolicy::DEFAULT,
    }],
};

struct ChattyImpl;

impl AbstractObject for ChattyImpl {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &CHATTY_TYPE
    }

    fn call<'a>(&'a self, method: &'a CachedMethod, _args: Vec<CallValue>) -> CallFuture<'a> {
        Box::pin(async move {
            match method.name() {
                "greet" => Ok(CallValue::Wire(Value::from("hello"))),
                name if name == STRINGIFY_OP => Ok(CallValue::Wire(Value::from("chatty-remote"))),
                _ => Err(unknown(method)),
            }
        })
    }
}

struct NameImpl;

impl AbstractObject for NameImpl {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &NAME_TYPE
    }

    fn call<'a>(&'a self, method: &'a CachedMethod, _args: Vec<CallValue>) -> CallFuture<'a> {
        Box::pin(async move {
            match method.name() {
                "nick" => Ok(CallValue::Wire(Value::from("nick-local"))),
                name if name == STRINGIFY_OP => Ok(CallValue::Wire(Value::from("name-local"))),
                _ => Err(unknown(method)),
            }
        })
    }
}

// Beacon: int mark(int) on the unordered class.

static BEACON_TYPE: TypeDescriptor = TypeDescriptor {
    name: "Beacon",
    methods: &[MethodSpec {
        name: "mark",
        params: &[TypeRef::Int],
        returns: TypeRef::Int,
        policy: CallPolicy {
            use_unreliable_transport: true,
            ..CallPolicy::DEFAULT
        },
    }],
};

struct BeaconImpl;

impl AbstractObject for BeaconImpl {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &BEACON_TYPE
    }

    fn call<'a>(&'a self, method: &'a CachedMethod, mut args: Vec<CallValue>) -> CallFuture<'a> {
        Box::pin(async move {
            match method.name() {
                "mark" => {
                    let value = args.remove(0).into_value()?.as_int()?;
                    Ok(CallValue::Wire(Value::Int(value + 1)))
                }
                _ => Err(unknown(method)),
            }
        })
    }
}

#[derive(Default)]
struct MockServer {
    listener: AsyncMutex<Option<Arc<dyn ServerListener>>>,
}

#[async_trait]
impl Server for MockServer {
    async fn set_listener(&self, listener: Arc<dyn ServerListener>) {
        *self.listener.lock().await = Some(listener);
    }
}

impl MockServer {
    async fn accept(&self, conn: Arc<dyn Conn>) {
        if let Some(listener) = self.listener.lock().await.clone() {
            listener.on_connection(conn).await;
        }
    }
}

#[tokio::test]
async fn test_identity_call() -> Result<()> {
    let (a, b, ca, cb) = peers();
    a.register_remotable(&ECHO_TYPE)?;
    b.register_remotable(&ECHO_TYPE)?;

    a.host_on_connection(ca.clone(), Arc::new(EchoImpl)).await?;
    let echo = b.create_remote(cb.clone(), 0, &ECHO_TYPE).await?;

    let result = echo
        .invoke("id", vec![CallValue::Wire(Value::Int(42))])
        .await?
        .into_value()?;
    assert_eq!(result, Value::Int(42));

    // Exactly one invocation frame out and one execution frame back.
    assert_eq!(
        cb.reliable_sent(),
        vec![Frame::Invocation(InvocationEvent {
            transaction_id: 0,
            object_id: 0,
            method_id: 0,
            params: vec![Value::Int(42)],
        })]
    );
    assert_eq!(
        ca.reliable_sent(),
        vec![Frame::Execution(ExecutionEvent {
            transaction_id: 0,
            object_id: 0,
            method_id: 0,
            result: Value::Int(42),
            error: None,
        })]
    );

    Ok(())
}

#[tokio::test]
async fn test_remotable_argument_round_trip() -> Result<()> {
    let (a, b, ca, cb) = peers();
    a.register_remotable(&BAG_TYPE)?;
    b.register_remotable(&BAG_TYPE)?;

    let bag_impl = Arc::new(BagImpl::default());
    a.host_on_connection(ca.clone(), bag_impl.clone()).await?;

    let item: Arc<dyn AbstractObject> = Arc::new(ItemImpl { label: "x" });
    b.host_with_id(5, item.clone())?;

    let bag = b.create_remote(cb.clone(), 0, &BAG_TYPE).await?;
    bag.invoke("put", vec![CallValue::Local(item)]).await?;

    // The argument travelled as its object id, and the handler's proxy
    // re-entered this peer for the label.
    assert_eq!(
        cb.reliable_sent()[0],
        Frame::Invocation(InvocationEvent {
            transaction_id: 0,
            object_id: 0,
            method_id: 0,
            params: vec![Value::Int(5)],
        })
    );
    assert_eq!(*bag_impl.labels.lock(), vec!["x".to_owned()]);

    Ok(())
}

#[tokio::test]
async fn test_fire_and_forget() -> Result<()> {
    let (a, b, ca, cb) = peers();
    a.register_remotable(&LOGGER_TYPE)?;
    b.register_remotable(&LOGGER_TYPE)?;

    let (lines_tx, mut lines_rx) = unbounded_channel();
    a.host_on_connection(ca.clone(), Arc::new(LoggerImpl { lines: lines_tx }))
        .await?;

    let logger = b.create_remote(cb.clone(), 0, &LOGGER_TYPE).await?;
    let immediate = logger
        .invoke("log", vec![CallValue::Wire(Value::from("hi"))])
        .await?;
    assert!(immediate.is_null());

    // The target ran...
    assert_eq!(lines_rx.recv().await, Some("hi".to_owned()));
    // ...but only the invocation frame ever existed.
    assert_eq!(cb.reliable_sent().len(), 1);
    assert!(ca.reliable_sent().is_empty());
    assert!(!b.has_last_result());

    Ok(())
}

#[tokio::test]
async fn test_deferred_result() -> Result<()> {
    let (a, b, ca, cb) = peers();
    a.register_remotable(&SLOW_TYPE)?;
    b.register_remotable(&SLOW_TYPE)?;

    a.host_on_connection(ca.clone(), Arc::new(SlowImpl)).await?;
    let slow = b.create_remote(cb.clone(), 0, &SLOW_TYPE).await?;

    // The call returns the zero value immediately.
    let immediate = slow.invoke("slow", vec![]).await?.into_value()?;
    assert_eq!(immediate, Value::Int(0));

    let transaction_id = b.last_transaction_id();
    assert!(b.has_last_result());

    let deferred = b
        .get_result(transaction_id, Some(Duration::from_millis(500)))
        .await?
        .into_value()?;
    assert_eq!(deferred, Value::Int(7));
    assert!(!b.has_last_result());

    Ok(())
}

#[tokio::test]
async fn test_closed_call() -> Result<()> {
    let (a, b, ca, cb) = peers();
    a.register_remotable(&SWITCH_TYPE)?;
    b.register_remotable(&SWITCH_TYPE)?;

    a.host_on_connection(ca.clone(), Arc::new(SwitchImpl))
        .await?;
    let switch = b.create_remote(cb.clone(), 0, &SWITCH_TYPE).await?;

    let result = switch.invoke("off", vec![]).await?.into_value()?;
    assert_eq!(result, Value::Int(0));

    // The call was elided entirely: no frame, no transaction.
    assert!(cb.reliable_sent().is_empty());
    assert!(cb.unreliable_sent().is_empty());
    assert_eq!(b.last_transaction_id(), -1);

    Ok(())
}

#[tokio::test]
async fn test_timeout_returns_sentinel() -> Result<()> {
    let (a, b, ca, cb) = peers();
    a.register_remotable(&STALL_TYPE)?;
    b.register_remotable(&STALL_TYPE)?;

    a.host_on_connection(ca.clone(), Arc::new(StallImpl))
        .await?;
    let stall = b.create_remote(cb.clone(), 0, &STALL_TYPE).await?;

    // The reply takes 200ms against a 50ms policy: the sentinel zero
    // comes back instead.
    let result = stall.invoke("stall", vec![]).await?.into_value()?;
    assert_eq!(result, Value::Int(0));
    let stalled_transaction = b.last_transaction_id();

    // Let the late execution frame arrive; the abandoned id discards it.
    sleep(Duration::from_millis(250)).await;
    assert!(!b.rendezvous.contains_delivered(stalled_transaction));
    assert!(!b.rendezvous.contains_pending(stalled_transaction));

    // The next transaction is unaffected and gets a fresh id.
    let result = stall.invoke("ping", vec![]).await?.into_value()?;
    assert_eq!(result, Value::Int(1));
    assert_eq!(b.last_transaction_id(), stalled_transaction + 1);

    Ok(())
}

#[tokio::test]
async fn test_idempotent_proxy() -> Result<()> {
    let (a, b, _ca, cb) = peers();
    a.register_remotable(&ECHO_TYPE)?;
    b.register_remotable(&ECHO_TYPE)?;
    b.register_remotable(&STALL_TYPE)?;

    let first = b.create_remote(cb.clone(), 0, &ECHO_TYPE).await?;
    let second = b.create_remote(cb.clone(), 0, &ECHO_TYPE).await?;
    assert!(Arc::ptr_eq(&first, &second));

    // The cache is keyed by object id alone: a different requested type
    // still returns the first handle.
    let third = b.create_remote(cb.clone(), 0, &STALL_TYPE).await?;
    assert!(Arc::ptr_eq(&first, &third));
    assert_eq!(third.descriptor().name, "Echo");
    assert_eq!(b.proxy_count(cb.id()), 1);

    Ok(())
}

#[tokio::test]
async fn test_deferred_remotable_result() -> Result<()> {
    let (a, b, ca, cb) = peers();
    a.register_remotable(&FACTORY_TYPE)?;
    b.register_remotable(&FACTORY_TYPE)?;

    a.host_on_connection(ca.clone(), Arc::new(FactoryImpl))
        .await?;
    let factory = b.create_remote(cb.clone(), 0, &FACTORY_TYPE).await?;

    let immediate = factory.invoke("make", vec![]).await?;
    assert!(immediate.is_null());

    let made = b
        .get_last_result(Some(Duration::from_millis(500)))
        .await?;
    let made = made.as_remote()?.clone();
    assert_eq!(made.descriptor().name, "Item");

    // The decoded proxy reaches the object the factory hosted.
    let label = made.invoke("label", vec![]).await?.into_value()?;
    assert_eq!(label.as_str()?, "made");

    Ok(())
}

#[tokio::test]
async fn test_delegation() -> Result<()> {
    let (a, b, ca, cb) = peers();
    for runtime in [&a, &b] {
        runtime.register_remotable(&CHATTY_TYPE)?;
        runtime.register_remotable(&NAME_TYPE)?;
    }

    a.host_on_connection(ca.clone(), Arc::new(ChattyImpl))
        .await?;
    let chatty = b
        .create_remote_with_delegate(cb.clone(), 0, &CHATTY_TYPE, Arc::new(NameImpl), &NAME_TYPE)
        .await?;

    // Declared by the delegate's type: answered locally.
    let nick = chatty.invoke("nick", vec![]).await?.into_value()?;
    assert_eq!(nick.as_str()?, "nick-local");

    // Universal stringification with delegate_identity: answered locally.
    let identity = chatty.invoke(STRINGIFY_OP, vec![]).await?.into_value()?;
    assert_eq!(identity.as_str()?, "name-local");
    assert!(cb.reliable_sent().is_empty());

    // Everything else crosses the transport.
    let greet = chatty.invoke("greet", vec![]).await?.into_value()?;
    assert_eq!(greet.as_str()?, "hello");
    assert_eq!(cb.reliable_sent().len(), 1);

    // Without a delegate the universal operation goes remote too.
    let (ca2, cb2) = pipe();
    a.attach(ca2.clone()).await?;
    let plain = b.create_remote(cb2.clone(), 0, &CHATTY_TYPE).await?;
    let identity = plain.invoke(STRINGIFY_OP, vec![]).await?.into_value()?;
    assert_eq!(identity.as_str()?, "chatty-remote");

    Ok(())
}

#[tokio::test]
async fn test_unreliable_transport_class() -> Result<()> {
    let (a, b, ca, cb) = peers();
    a.register_remotable(&BEACON_TYPE)?;
    b.register_remotable(&BEACON_TYPE)?;

    a.host_on_connection(ca.clone(), Arc::new(BeaconImpl))
        .await?;
    let beacon = b.create_remote(cb.clone(), 0, &BEACON_TYPE).await?;

    let result = beacon
        .invoke("mark", vec![CallValue::Wire(Value::Int(5))])
        .await?
        .into_value()?;
    assert_eq!(result, Value::Int(6));

    // Both directions used the unordered class.
    assert_eq!(cb.unreliable_sent().len(), 1);
    assert_eq!(ca.unreliable_sent().len(), 1);
    assert!(cb.reliable_sent().is_empty());
    assert!(ca.reliable_sent().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_unknown_object_fails_promptly() -> Result<()> {
    let (a, b, ca, cb) = peers();
    a.register_remotable(&ECHO_TYPE)?;
    b.register_remotable(&ECHO_TYPE)?;
    a.attach(ca.clone()).await?;

    // Nothing is hosted at id 99 on the remote peer.
    let ghost = b.create_remote(cb.clone(), 99, &ECHO_TYPE).await?;
    let outcome = ghost.invoke("id", vec![CallValue::Wire(Value::Int(1))]).await;
    assert_eq!(
        outcome.err(),
        Some(Error::ErrRemoteInvocation(
            Error::ErrUnknownObject(99).to_string()
        ))
    );

    Ok(())
}

#[tokio::test]
async fn test_connection_close_unblocks_waiter() -> Result<()> {
    let (a, b, ca, cb) = peers();
    a.register_remotable(&HANG_TYPE)?;
    b.register_remotable(&HANG_TYPE)?;

    a.host_on_connection(ca.clone(), Arc::new(HangImpl)).await?;
    let hang = b.create_remote(cb.clone(), 0, &HANG_TYPE).await?;

    let waiter = tokio::spawn(async move { hang.invoke("hang", vec![]).await });
    sleep(Duration::from_millis(50)).await;
    cb.close().await?;

    let outcome = waiter
        .await
        .map_err(|e| Error::ErrRemoteInvocation(e.to_string()))?;
    assert_eq!(
        outcome.err(),
        Some(Error::ErrRemoteInvocation("connection closed".to_owned()))
    );

    Ok(())
}

#[tokio::test]
async fn test_completed_transactions_return_frames_to_pools() -> Result<()> {
    let (a, b, ca, cb) = peers();
    a.register_remotable(&ECHO_TYPE)?;
    b.register_remotable(&ECHO_TYPE)?;

    a.host_on_connection(ca.clone(), Arc::new(EchoImpl)).await?;
    let echo = b.create_remote(cb.clone(), 0, &ECHO_TYPE).await?;

    for i in 0..3 {
        echo.invoke("id", vec![CallValue::Wire(Value::Int(i))])
            .await?;
    }

    // Every consumed frame went back to a free list: the dispatcher
    // releases invocation frames, the caller releases execution frames.
    assert_eq!(a.pool.pooled_invocations(), 3);
    assert_eq!(b.pool.pooled_executions(), 3);

    Ok(())
}

#[tokio::test]
async fn test_host_on_server_attaches_new_connections() -> Result<()> {
    let (a, b, ca, cb) = peers();
    a.register_remotable(&ECHO_TYPE)?;
    b.register_remotable(&ECHO_TYPE)?;

    let server: Arc<MockServer> = Arc::new(MockServer::default());
    let server_dyn: Arc<dyn Server> = server.clone();
    let hosted_id = a.host_on_server(&server_dyn, Arc::new(EchoImpl)).await?;
    assert_eq!(hosted_id, 0);

    // The acceptor wires the invocation listener into each connection.
    server.accept(ca.clone()).await;

    let echo = b.create_remote(cb.clone(), 0, &ECHO_TYPE).await?;
    let result = echo
        .invoke("id", vec![CallValue::Wire(Value::Int(9))])
        .await?
        .into_value()?;
    assert_eq!(result, Value::Int(9));

    Ok(())
}

#[tokio::test]
async fn test_default_response_timeout_from_builder() -> Result<()> {
    let a = RuntimeBuilder::new().build();
    let b = RuntimeBuilder::new()
        .with_default_response_timeout(Duration::from_millis(50))
        .build();
    let (ca, cb) = pipe();

    a.register_remotable(&HANG_TYPE)?;
    b.register_remotable(&HANG_TYPE)?;

    a.host_on_connection(ca.clone(), Arc::new(HangImpl)).await?;
    let hang = b.create_remote(cb.clone(), 0, &HANG_TYPE).await?;

    // The method policy leaves the wait unbounded; the builder default
    // caps it and the sentinel zero comes back.
    let result = hang.invoke("hang", vec![]).await?.into_value()?;
    assert_eq!(result, Value::Int(0));

    Ok(())
}

#[tokio::test]
async fn test_shutdown_executor_stops_dispatch() -> Result<()> {
    let (a, b, ca, cb) = peers();
    a.register_remotable(&ECHO_TYPE)?;
    b.register_remotable(&ECHO_TYPE)?;

    a.host_on_connection(ca.clone(), Arc::new(EchoImpl)).await?;
    let echo = b.create_remote(cb.clone(), 0, &ECHO_TYPE).await?;

    let result = echo
        .invoke("id", vec![CallValue::Wire(Value::Int(1))])
        .await?
        .into_value()?;
    assert_eq!(result, Value::Int(1));

    a.shutdown_executor().await;

    // Inbound invocations are dropped after shutdown; the bounded wait
    // surfaces the sentinel instead of hanging.
    let late = RuntimeBuilder::new()
        .with_default_response_timeout(Duration::from_millis(50))
        .build();
    late.register_remotable(&ECHO_TYPE)?;
    let (ca2, cb2) = pipe();
    a.attach(ca2.clone()).await?;
    let echo = late.create_remote(cb2.clone(), 0, &ECHO_TYPE).await?;
    let result = echo
        .invoke("id", vec![CallValue::Wire(Value::Int(2))])
        .await?
        .into_value()?;
    assert_eq!(result, Value::Int(0));

    Ok(())
}
