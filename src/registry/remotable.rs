use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::proxy::ProxyHandle;
use crate::registry::method::{CachedMethod, CallPolicy};
use crate::value::Value;

/// Operation name of the universal stringification capability. A proxy
/// whose method policy sets `delegate_identity` answers this locally on
/// its delegate instead of crossing the transport.
pub const STRINGIFY_OP: &str = "to_string";

/// Operation name of the universal hash capability, delegated locally
/// when the method policy sets `delegate_hash`.
pub const HASH_OP: &str = "hash_code";

/// Static description of a remotable type: a named capability set with at
/// least one operation. Declared once per interface and registered with
/// the type registry, which assigns the numeric identities used on the
/// wire.
pub struct TypeDescriptor {
    pub name: &'static str,
    pub methods: &'static [MethodSpec],
}

/// One callable operation of a remotable type.
#[derive(PartialEq)]
pub struct MethodSpec {
    pub name: &'static str,
    pub params: &'static [TypeRef],
    pub returns: TypeRef,
    pub policy: CallPolicy,
}

/// Reference to a parameter or return type. Remotable references carry a
/// descriptor accessor so registration can walk the transitive closure.
#[derive(Clone, Copy)]
pub enum TypeRef {
    Unit,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    List,
    Remote(fn() -> &'static TypeDescriptor),
}

impl TypeRef {
    /// Canonical type name used by the method comparator. Both peers
    /// derive identical names from source alone.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            TypeRef::Unit => "unit",
            TypeRef::Bool => "bool",
            TypeRef::Int => "int",
            TypeRef::Float => "float",
            TypeRef::Str => "str",
            TypeRef::Bytes => "bytes",
            TypeRef::List => "list",
            TypeRef::Remote(descriptor) => descriptor().name,
        }
    }

    /// The zero value returned by closed, fire-and-forget, deferred, and
    /// timed-out calls: canonical zero for primitives, null for reference
    /// types.
    pub fn zero(&self) -> Value {
        match self {
            TypeRef::Bool => Value::Bool(false),
            TypeRef::Int => Value::Int(0),
            TypeRef::Float => Value::Float(0.0),
            TypeRef::Unit | TypeRef::Str | TypeRef::Bytes | TypeRef::List | TypeRef::Remote(_) => {
                Value::Null
            }
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, TypeRef::Remote(_))
    }

    pub fn remote_descriptor(&self) -> Option<&'static TypeDescriptor> {
        match self {
            TypeRef::Remote(descriptor) => Some(descriptor()),
            _ => None,
        }
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_name() == other.canonical_name()
    }
}

impl Eq for TypeRef {}

pub type CallFuture<'a> = Pin<Box<dyn Future<Output = Result<CallValue>> + Send + 'a>>;

/// A dispatchable local object. Implementations are the hand-written
/// per-type dispatchers: they know their own descriptor and route a cached
/// method plus decoded arguments onto the real operation.
///
/// Hosted objects, proxy delegates, and promoted arguments all travel
/// through this trait.
pub trait AbstractObject: Send + Sync + 'static {
    fn descriptor(&self) -> &'static TypeDescriptor;

    fn call<'a>(&'a self, method: &'a CachedMethod, args: Vec<CallValue>) -> CallFuture<'a>;
}

/// A call-layer value: plain wire data, a local object on its way out
/// (promoted to an object id before the frame is sent), or a decoded
/// remote reference on its way in.
#[derive(Clone)]
pub enum CallValue {
    Wire(Value),
    Local(Arc<dyn AbstractObject>),
    Remote(Arc<ProxyHandle>),
}

impl CallValue {
    pub fn null() -> Self {
        CallValue::Wire(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CallValue::Wire(Value::Null))
    }

    /// Unwraps plain wire data; remotable references are not wire values.
    pub fn into_value(self) -> Result<Value> {
        match self {
            CallValue::Wire(v) => Ok(v),
            CallValue::Local(obj) => Err(Error::ErrValueType(format!(
                "local object of type {}",
                obj.descriptor().name
            ))),
            CallValue::Remote(proxy) => Err(Error::ErrValueType(format!(
                "remote reference to object {}",
                proxy.object_id()
            ))),
        }
    }

    pub fn as_remote(&self) -> Result<&Arc<ProxyHandle>> {
        match self {
            CallValue::Remote(proxy) => Ok(proxy),
            other => Err(Error::ErrValueType(format!("{other:?}"))),
        }
    }
}

impl From<Value> for CallValue {
    fn from(v: Value) -> Self {
        CallValue::Wire(v)
    }
}

impl fmt::Debug for CallValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallValue::Wire(v) => write!(f, "Wire({v:?})"),
            CallValue::Local(obj) => write!(f, "Local({})", obj.descriptor().name),
            CallValue::Remote(proxy) => write!(f, "Remote({})", proxy.object_id()),
        }
    }
}
