use parking_lot::Mutex;

use crate::event::{ExecutionEvent, InvocationEvent};
use crate::value::Value;

pub(crate) const DEFAULT_POOL_CAPACITY: usize = 32;

/// Free lists for the two frame kinds. Consumers release frames after
/// use; release resets the fields and keeps the allocation (params
/// vector, result buffers) for the next acquire. Pooling is a performance
/// optimization only: a full pool simply drops the frame.
pub struct EventPool {
    invocations: Mutex<Vec<InvocationEvent>>,
    executions: Mutex<Vec<ExecutionEvent>>,
    capacity: usize,
}

impl Default for EventPool {
    fn default() -> Self {
        EventPool::new(DEFAULT_POOL_CAPACITY)
    }
}

impl EventPool {
    pub fn new(capacity: usize) -> Self {
        EventPool {
            invocations: Mutex::new(Vec::new()),
            executions: Mutex::new(Vec::new()),
            capacity,
        }
    }

    pub fn acquire_invocation(&self) -> InvocationEvent {
        self.invocations.lock().pop().unwrap_or_default()
    }

    pub fn release_invocation(&self, mut event: InvocationEvent) {
        event.transaction_id = 0;
        event.object_id = 0;
        event.method_id = 0;
        event.params.clear();

        let mut free = self.invocations.lock();
        if free.len() < self.capacity {
            free.push(event);
        }
    }

    pub fn acquire_execution(&self) -> ExecutionEvent {
        self.executions.lock().pop().unwrap_or_default()
    }

    pub fn release_execution(&self, mut event: ExecutionEvent) {
        event.transaction_id = 0;
        event.object_id = 0;
        event.method_id = 0;
        event.result = Value::Null;
        event.error = None;

        let mut free = self.executions.lock();
        if free.len() < self.capacity {
            free.push(event);
        }
    }

    pub fn pooled_invocations(&self) -> usize {
        self.invocations.lock().len()
    }

    pub fn pooled_executions(&self) -> usize {
        self.executions.lock().len()
    }
}
