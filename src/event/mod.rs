
pub mod pool;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::{Value, NULL_OBJECT_ID};

/// Request frame: one per outbound operation call. Remotable arguments
/// have already been substituted for object ids by the invoker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationEvent {
    pub transaction_id: i64,
    pub object_id: i64,
    pub method_id: u32,
    pub params: Vec<Value>,
}

/// Response frame: one per invocation unless the call policy elides it.
/// A failed execution carries the failure text instead of a result; the
/// result slot then holds the null sentinel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub transaction_id: i64,
    pub object_id: i64,
    pub method_id: u32,
    pub result: Value,
    pub error: Option<String>,
}

impl ExecutionEvent {
    pub fn failure(transaction_id: i64, method_id: u32, message: impl Into<String>) -> Self {
        ExecutionEvent {
            transaction_id,
            object_id: NULL_OBJECT_ID,
            method_id,
            result: Value::Null,
            error: Some(message.into()),
        }
    }

    /// Splits the frame into its outcome, surfacing a wrapped remote
    /// failure as an error on the caller's side.
    pub fn into_outcome(self) -> Result<Value> {
        match self.error {
            Some(message) => Err(Error::ErrRemoteInvocation(message)),
            None => Ok(self.result),
        }
    }
}

/// The two frame shapes exchanged on the wire. The serialization
/// collaborator registers exactly these shapes; no other traffic is
/// generated by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    Invocation(InvocationEvent),
    Execution(ExecutionEvent),
}

impl Frame {
    pub fn transaction_id(&self) -> i64 {
        match self {
            Frame::Invocation(ev) => ev.transaction_id,
            Frame::Execution(ev) => ev.transaction_id,
        }
    }
}
