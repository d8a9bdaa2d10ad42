use std::sync::{Arc, Weak};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::event::{ExecutionEvent, Frame, InvocationEvent};
use crate::registry::method::CachedMethod;
use crate::registry::remotable::CallValue;
use crate::runtime::Runtime;
use crate::transport::{Conn, ConnListener, ServerListener};
use crate::value::Value;

/// Frame listener installed on every attached connection. Delivery tasks
/// never run business logic: invocations hop onto the worker pool,
/// execution frames complete their rendezvous entry in place.
pub(crate) struct InboundListener {
    pub(crate) runtime: Weak<Runtime>,
}

#[async_trait]
impl ConnListener for InboundListener {
    async fn on_frame(&self, conn: &Arc<dyn Conn>, frame: Frame) {
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };
        match frame {
            Frame::Invocation(event) => runtime.dispatch_invocation(conn.clone(), event),
            Frame::Execution(event) => runtime.accept_execution(conn, event),
        }
    }

    async fn on_close(&self, conn: &Arc<dyn Conn>) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.handle_close(conn);
        }
    }
}

/// Server-level listener: attaches the invocation listener to every
/// accepted connection.
pub(crate) struct AcceptListener {
    pub(crate) runtime: Weak<Runtime>,
}

#[async_trait]
impl ServerListener for AcceptListener {
    async fn on_connection(&self, conn: Arc<dyn Conn>) {
        if let Some(runtime) = self.runtime.upgrade() {
            if let Err(err) = runtime.attach(conn).await {
                log::warn!("failed to attach accepted connection: {err}");
            }
        }
    }
}

impl Runtime {
    fn accept_execution(&self, conn: &Arc<dyn Conn>, event: ExecutionEvent) {
        self.clear_outstanding(conn.id(), event.transaction_id);
        self.rendezvous.post(event);
    }

    /// Connection drop invalidates every outstanding transaction on it:
    /// waiters receive a connection-closed failure frame instead of
    /// hanging.
    fn handle_close(&self, conn: &Arc<dyn Conn>) {
        let state = self.connections.lock().remove(&conn.id());
        let Some(state) = state else {
            return;
        };
        if !state.outstanding.is_empty() {
            log::debug!(
                "connection {} closed with {} outstanding transactions",
                conn.id(),
                state.outstanding.len()
            );
        }
        for transaction_id in state.outstanding {
            self.rendezvous
                .post(ExecutionEvent::failure(transaction_id, 0, "connection closed"));
        }
    }

    fn dispatch_invocation(self: &Arc<Self>, conn: Arc<dyn Conn>, event: InvocationEvent) {
        let runtime = self.clone();
        let submitted = self.executor.submit(async move {
            runtime.execute_invocation(conn, event).await;
        });
        if let Err(err) = submitted {
            log::warn!("dropping inbound invocation: {err}");
        }
    }

    /// Worker-side execution of one inbound invocation. Failures are
    /// wrapped into the execution frame; the worker itself never dies.
    async fn execute_invocation(self: &Arc<Self>, conn: Arc<dyn Conn>, mut event: InvocationEvent) {
        let transaction_id = event.transaction_id;
        let object_id = event.object_id;
        let method_id = event.method_id;

        let outcome = self.run_target(&conn, &mut event).await;
        self.pool.release_invocation(event);

        match outcome {
            Ok((method, result)) => {
                if method.policy().no_return {
                    return;
                }
                let mut reply = self.pool.acquire_execution();
                reply.transaction_id = transaction_id;
                reply.object_id = object_id;
                reply.method_id = method_id;
                reply.result = result;
                reply.error = None;

                let frame = Frame::Execution(reply);
                let sent = if method.policy().use_unreliable_transport {
                    conn.send_unreliable(frame).await
                } else {
                    conn.send_reliable(frame).await
                };
                if let Err(err) = sent {
                    log::warn!("failed to send execution frame for transaction {transaction_id}: {err}");
                }
            }
            Err(err) => {
                log::warn!(
                    "invocation {transaction_id} on object {object_id} failed: {err}"
                );
                let no_return = self
                    .registry
                    .method_by_id(method_id)
                    .map(|m| m.policy().no_return)
                    .unwrap_or(false);
                if no_return {
                    return;
                }
                let frame =
                    Frame::Execution(ExecutionEvent::failure(transaction_id, method_id, err.to_string()));
                if let Err(err) = conn.send_reliable(frame).await {
                    log::warn!(
                        "failed to send failure frame for transaction {transaction_id}: {err}"
                    );
                }
            }
        }
    }

    /// Resolves the target, decodes remotable parameters into proxies,
    /// runs the operation, and encodes a remotable return value as an
    /// object id.
    async fn run_target(
        self: &Arc<Self>,
        conn: &Arc<dyn Conn>,
        event: &mut InvocationEvent,
    ) -> Result<(Arc<CachedMethod>, Value)> {
        let method = self.registry.method_by_id(event.method_id)?;
        let target = self
            .host_table
            .get(event.object_id)
            .ok_or(Error::ErrUnknownObject(event.object_id))?;

        let params = std::mem::take(&mut event.params);
        let mut args = Vec::with_capacity(params.len());
        for (index, value) in params.into_iter().enumerate() {
            if !method.local_param_indices().contains(&index) {
                args.push(CallValue::Wire(value));
                continue;
            }
            match value.as_object_id()? {
                None => args.push(CallValue::null()),
                Some(remote_id) => {
                    let descriptor = method.spec().params[index]
                        .remote_descriptor()
                        .ok_or_else(|| Error::ErrValueType(value.to_string()))?;
                    let handle = self
                        .create_remote(conn.clone(), remote_id, descriptor)
                        .await?;
                    args.push(CallValue::Remote(handle));
                }
            }
        }

        let outcome = target.call(&method, args).await?;
        let result = self.encode_result(conn, &method, outcome)?;
        Ok((method, result))
    }

    fn encode_result(
        &self,
        conn: &Arc<dyn Conn>,
        method: &CachedMethod,
        outcome: CallValue,
    ) -> Result<Value> {
        if !method.is_remote_return() {
            return outcome.into_value();
        }
        match outcome {
            CallValue::Wire(Value::Null) => Ok(Value::Int(crate::value::NULL_OBJECT_ID)),
            CallValue::Wire(other) => Err(Error::ErrValueType(other.to_string())),
            CallValue::Local(object) => Ok(Value::Int(self.host_table.host(object))),
            CallValue::Remote(handle) => {
                if handle.connection().id() != conn.id() {
                    return Err(Error::ErrForeignProxy);
                }
                Ok(Value::Int(handle.object_id()))
            }
        }
    }
}
