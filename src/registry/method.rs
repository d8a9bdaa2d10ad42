use std::time::Duration;

use crate::registry::remotable::MethodSpec;
use crate::value::Value;

/// Per-method call policy. Every attribute defaults to the plain blocking
/// reliable call; declarations override individual fields with struct
/// update syntax against [`CallPolicy::DEFAULT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    /// Send the invocation (and its execution frame) on the unordered
    /// datagram class instead of the reliable ordered class.
    pub use_unreliable_transport: bool,
    /// Fire-and-forget: no execution frame, no rendezvous entry, the call
    /// returns the zero value immediately.
    pub no_return: bool,
    /// Defer the result: the call returns the zero value immediately and
    /// the caller fetches the real result later via `get_result`.
    pub non_blocking: bool,
    /// Silently elide the call and return the zero value. No frame is
    /// sent and no transaction id is allocated.
    pub closed: bool,
    /// Response timeout in milliseconds; zero or negative means
    /// unbounded.
    pub response_timeout_ms: i64,
    /// Answer the universal stringification operation locally on the
    /// proxy delegate.
    pub delegate_identity: bool,
    /// Answer the universal hash operation locally on the proxy delegate.
    pub delegate_hash: bool,
}

impl CallPolicy {
    pub const DEFAULT: CallPolicy = CallPolicy {
        use_unreliable_transport: false,
        no_return: false,
        non_blocking: false,
        closed: false,
        response_timeout_ms: 0,
        delegate_identity: false,
        delegate_hash: false,
    };

    pub fn response_timeout(&self) -> Option<Duration> {
        if self.response_timeout_ms > 0 {
            Some(Duration::from_millis(self.response_timeout_ms as u64))
        } else {
            None
        }
    }
}

impl Default for CallPolicy {
    fn default() -> Self {
        CallPolicy::DEFAULT
    }
}

/// Cached metadata for one callable operation: its runtime-unique id, the
/// canonical signature, and the precomputed remotable-reference positions
/// the invoker and dispatcher consult on every call.
#[derive(PartialEq)]
pub struct CachedMethod {
    method_id: u32,
    type_name: &'static str,
    spec: &'static MethodSpec,
    is_remote_return: bool,
    local_param_indices: Vec<usize>,
}

impl CachedMethod {
    pub(crate) fn new(method_id: u32, type_name: &'static str, spec: &'static MethodSpec) -> Self {
        let local_param_indices = spec
            .params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_remote())
            .map(|(i, _)| i)
            .collect();

        CachedMethod {
            method_id,
            type_name,
            spec,
            is_remote_return: spec.returns.is_remote(),
            local_param_indices,
        }
    }

    pub fn method_id(&self) -> u32 {
        self.method_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    pub fn arity(&self) -> usize {
        self.spec.params.len()
    }

    pub fn spec(&self) -> &'static MethodSpec {
        self.spec
    }

    pub fn policy(&self) -> &CallPolicy {
        &self.spec.policy
    }

    /// True iff the return type is a registered remotable type; the result
    /// then travels as an object id.
    pub fn is_remote_return(&self) -> bool {
        self.is_remote_return
    }

    /// Positions of parameters whose declared type is remotable; those
    /// slots travel as object ids.
    pub fn local_param_indices(&self) -> &[usize] {
        &self.local_param_indices
    }

    pub fn zero_return(&self) -> Value {
        self.spec.returns.zero()
    }
}

impl std::fmt::Debug for CachedMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}#{} {}/{}",
            self.type_name,
            self.method_id,
            self.spec.name,
            self.spec.params.len()
        )
    }
}
