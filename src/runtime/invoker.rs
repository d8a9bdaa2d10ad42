use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::event::{ExecutionEvent, Frame};
use crate::proxy::ProxyHandle;
use crate::registry::method::CachedMethod;
use crate::registry::remotable::{CallValue, HASH_OP, STRINGIFY_OP};
use crate::runtime::{AsyncExecution, Runtime};
use crate::transport::{Conn, ConnectionId};
use crate::value::{Value, NULL_OBJECT_ID};

impl Runtime {
    /// Outbound invocation state machine: delegation check, descriptor
    /// lookup, argument promotion, send, and the policy-selected return
    /// path.
    pub(crate) async fn outbound_invoke(
        self: &Arc<Self>,
        proxy: &ProxyHandle,
        method_name: &str,
        args: Vec<CallValue>,
    ) -> Result<CallValue> {
        // Operations declared by the delegate's own capability set never
        // leave the process.
        if let Some(delegate) = proxy.delegate() {
            let declared = delegate
                .descriptor
                .methods
                .iter()
                .any(|m| m.name == method_name && m.params.len() == args.len());
            if declared {
                let method =
                    self.registry
                        .find_method(delegate.descriptor.name, method_name, args.len())?;
                return delegate.object.call(&method, args).await;
            }
        }

        let method =
            self.registry
                .find_method(proxy.descriptor().name, method_name, args.len())?;
        let policy = method.policy();

        // Universal identity operations may be answered locally when the
        // method policy delegates them.
        if let Some(delegate) = proxy.delegate() {
            let delegated = (method_name == STRINGIFY_OP && policy.delegate_identity)
                || (method_name == HASH_OP && policy.delegate_hash);
            if delegated {
                return delegate.object.call(&method, args).await;
            }
        }

        if policy.closed {
            return Ok(CallValue::Wire(method.zero_return()));
        }

        let conn = proxy.connection();
        let transaction_id = self.next_transaction();
        let params = self.promote_args(conn, &method, args)?;

        let mut frame = self.pool.acquire_invocation();
        frame.transaction_id = transaction_id;
        frame.object_id = proxy.object_id();
        frame.method_id = method.method_id();
        frame.params = params;

        // Register before sending so a fast peer can never answer an
        // unannounced transaction.
        let expects_result = !policy.no_return;
        if expects_result {
            self.rendezvous.register(transaction_id);
            self.mark_outstanding(conn.id(), transaction_id);
        }

        log::trace!(
            "invoking {:?} on object {} as transaction {transaction_id}",
            method,
            proxy.object_id()
        );
        let sent = if policy.use_unreliable_transport {
            conn.send_unreliable(Frame::Invocation(frame)).await
        } else {
            conn.send_reliable(Frame::Invocation(frame)).await
        };
        if let Err(err) = sent {
            self.clear_outstanding(conn.id(), transaction_id);
            return Err(err);
        }

        if policy.no_return {
            return Ok(CallValue::Wire(method.zero_return()));
        }

        if policy.non_blocking {
            self.async_executions.lock().insert(
                transaction_id,
                AsyncExecution {
                    conn_id: conn.id(),
                    method_id: method.method_id(),
                    response_timeout: policy.response_timeout(),
                },
            );
            return Ok(CallValue::Wire(method.zero_return()));
        }

        let timeout = policy.response_timeout().or(self.default_response_timeout);
        let waited = self.rendezvous.wait(transaction_id, timeout).await;
        self.clear_outstanding(conn.id(), transaction_id);
        match waited {
            Ok(event) => self.consume_execution(conn.id(), &method, event).await,
            // The sentinel outcome: indistinguishable from a legitimately
            // null/zero result.
            Err(Error::ErrResponseTimeout) => Ok(CallValue::Wire(method.zero_return())),
            Err(err) => Err(err),
        }
    }

    /// Fetches the deferred result of a `non_blocking` call.
    pub async fn get_result(
        self: &Arc<Self>,
        transaction_id: i64,
        extra_timeout: Option<Duration>,
    ) -> Result<CallValue> {
        let record = self
            .async_executions
            .lock()
            .remove(&transaction_id)
            .ok_or(Error::ErrNoAsyncExecution(transaction_id))?;

        // Unbounded on either side wins; otherwise the larger of the two.
        let timeout = match (record.response_timeout, extra_timeout) {
            (Some(baseline), Some(extra)) => Some(baseline.max(extra)),
            _ => None,
        };

        let method = self.registry.method_by_id(record.method_id)?;
        let waited = self.rendezvous.wait(transaction_id, timeout).await;
        self.clear_outstanding(record.conn_id, transaction_id);
        match waited {
            Ok(event) => self.consume_execution(record.conn_id, &method, event).await,
            Err(Error::ErrResponseTimeout) => Ok(CallValue::Wire(method.zero_return())),
            Err(err) => Err(err),
        }
    }

    /// Fetches the deferred result of the most recent transaction. Safe
    /// only when no other task issued an intervening call.
    pub async fn get_last_result(
        self: &Arc<Self>,
        extra_timeout: Option<Duration>,
    ) -> Result<CallValue> {
        self.get_result(self.last_transaction_id(), extra_timeout)
            .await
    }

    /// Extracts the outcome of an execution frame, releases the frame to
    /// the pool, and decodes a remotable result into a proxy.
    async fn consume_execution(
        self: &Arc<Self>,
        conn_id: ConnectionId,
        method: &CachedMethod,
        mut event: ExecutionEvent,
    ) -> Result<CallValue> {
        let error = event.error.take();
        let result = std::mem::take(&mut event.result);
        self.pool.release_execution(event);

        if let Some(message) = error {
            return Err(Error::ErrRemoteInvocation(message));
        }
        if !method.is_remote_return() {
            return Ok(CallValue::Wire(result));
        }

        match result.as_object_id()? {
            None => Ok(CallValue::Wire(Value::Null)),
            Some(object_id) => {
                let descriptor = method
                    .spec()
                    .returns
                    .remote_descriptor()
                    .ok_or_else(|| Error::ErrValueType(result.to_string()))?;
                let conn = self.connection(conn_id)?;
                let handle = self.create_remote(conn, object_id, descriptor).await?;
                Ok(CallValue::Remote(handle))
            }
        }
    }

    /// Substitutes object ids for remotable arguments: a local object is
    /// hosted (idempotently) and travels as its id, null travels as the
    /// sentinel, and a proxy travelling back over its own connection
    /// collapses to the original object id.
    fn promote_args(
        &self,
        conn: &Arc<dyn Conn>,
        method: &CachedMethod,
        args: Vec<CallValue>,
    ) -> Result<Vec<Value>> {
        args.into_iter()
            .enumerate()
            .map(|(index, arg)| {
                let remote_slot = method.local_param_indices().contains(&index);
                match arg {
                    CallValue::Wire(value) => {
                        if remote_slot {
                            match value {
                                Value::Null => Ok(Value::Int(NULL_OBJECT_ID)),
                                Value::Int(id) => Ok(Value::Int(id)),
                                other => Err(Error::ErrValueType(other.to_string())),
                            }
                        } else {
                            Ok(value)
                        }
                    }
                    CallValue::Local(object) => {
                        if !remote_slot {
                            return Err(Error::ErrValueType(format!(
                                "local {} in data parameter {index}",
                                object.descriptor().name
                            )));
                        }
                        Ok(Value::Int(self.host_table.host(object)))
                    }
                    CallValue::Remote(handle) => {
                        if !remote_slot {
                            return Err(Error::ErrValueType(format!(
                                "remote reference in data parameter {index}"
                            )));
                        }
                        if handle.connection().id() != conn.id() {
                            return Err(Error::ErrForeignProxy);
                        }
                        Ok(Value::Int(handle.object_id()))
                    }
                }
            })
            .collect()
    }
}
