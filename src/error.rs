use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// ErrTypeAlreadyRegistered indicates a remotable type was registered
    /// twice. Registration order is user-controlled, so a double
    /// registration is a configuration defect.
    #[error("remotable type already registered: {0}")]
    ErrTypeAlreadyRegistered(String),

    /// ErrTypeNotRegistered indicates an operation referenced a remotable
    /// type before it was registered.
    #[error("remotable type not registered: {0}")]
    ErrTypeNotRegistered(String),

    /// ErrDuplicateSignature indicates a registered type declares two
    /// operations with identical canonical signatures.
    #[error("duplicate method signature: {0}")]
    ErrDuplicateSignature(String),

    /// ErrDuplicateObjectId indicates an explicit host id is already bound
    /// to another object.
    #[error("object id already hosted: {0}")]
    ErrDuplicateObjectId(i64),

    /// ErrUnknownObject indicates an object id with no hosted object
    /// behind it.
    #[error("unknown object id: {0}")]
    ErrUnknownObject(i64),

    /// ErrUnknownMethod indicates a method id or name with no descriptor
    /// behind it.
    #[error("unknown method: {0}")]
    ErrUnknownMethod(String),

    /// ErrUnknownTransaction indicates a transaction id the rendezvous
    /// store has never seen or has already forgotten.
    #[error("unknown transaction id: {0}")]
    ErrUnknownTransaction(i64),

    /// ErrNoAsyncExecution indicates get_result was called for a
    /// transaction that has no deferred-result record.
    #[error("no async execution recorded for transaction {0}")]
    ErrNoAsyncExecution(i64),

    /// ErrResponseTimeout indicates no execution frame arrived within the
    /// response timeout.
    #[error("response timed out")]
    ErrResponseTimeout,

    /// ErrRemoteInvocation carries a failure raised while executing the
    /// target operation on the remote peer.
    #[error("remote invocation failed: {0}")]
    ErrRemoteInvocation(String),

    /// ErrConnectionClosed indicates an operation executed after the
    /// connection has already been closed.
    #[error("connection closed")]
    ErrConnectionClosed,

    /// ErrConnectionNotAttached indicates a connection the runtime has no
    /// state for; attach it before use.
    #[error("connection not attached to runtime")]
    ErrConnectionNotAttached,

    /// ErrForeignProxy indicates a proxy was passed as an argument over a
    /// connection other than the one it was created on.
    #[error("proxy belongs to another connection")]
    ErrForeignProxy,

    /// ErrRuntimeDropped indicates a proxy outlived its runtime.
    #[error("runtime dropped")]
    ErrRuntimeDropped,

    /// ErrExecutorClosed indicates a dispatch was submitted after executor
    /// shutdown.
    #[error("executor closed")]
    ErrExecutorClosed,

    /// ErrValueType indicates a wire value did not carry the expected
    /// variant.
    #[error("unexpected value type: {0}")]
    ErrValueType(String),
}
