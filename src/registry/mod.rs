
pub mod method;
pub mod remotable;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use self::method::CachedMethod;
use self::remotable::{MethodSpec, TypeDescriptor};

/// Registry of remotable types and their cached methods.
///
/// Type ids and method ids are dense and deterministic given a
/// registration order, which must be identical on both peers. The
/// canonical method comparator erases any dependence on declaration
/// order, so peers agree on ids from source alone.
#[derive(Default)]
pub struct TypeRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    type_ids: HashMap<&'static str, u32>,
    methods: Vec<Arc<CachedMethod>>,
    by_type: HashMap<&'static str, Vec<Arc<CachedMethod>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    /// Registers a remotable type and, transitively, every remotable type
    /// referenced by its parameters and return types. Registering the
    /// same type twice is a configuration error; the user controls
    /// ordering.
    pub fn register_remotable(&self, descriptor: &'static TypeDescriptor) -> Result<u32> {
        let mut inner = self.inner.lock();
        if inner.type_ids.contains_key(descriptor.name) {
            return Err(Error::ErrTypeAlreadyRegistered(descriptor.name.to_owned()));
        }
        inner.register(descriptor)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.inner.lock().type_ids.contains_key(name)
    }

    pub fn type_id(&self, name: &str) -> Option<u32> {
        self.inner.lock().type_ids.get(name).copied()
    }

    pub fn method_by_id(&self, method_id: u32) -> Result<Arc<CachedMethod>> {
        self.inner
            .lock()
            .methods
            .get(method_id as usize)
            .cloned()
            .ok_or_else(|| Error::ErrUnknownMethod(format!("#{method_id}")))
    }

    /// Resolves a method by declaring type, operation name, and arity.
    pub fn find_method(
        &self,
        type_name: &str,
        method_name: &str,
        arity: usize,
    ) -> Result<Arc<CachedMethod>> {
        let inner = self.inner.lock();
        let methods = inner
            .by_type
            .get(type_name)
            .ok_or_else(|| Error::ErrTypeNotRegistered(type_name.to_owned()))?;
        methods
            .iter()
            .find(|m| m.name() == method_name && m.arity() == arity)
            .cloned()
            .ok_or_else(|| Error::ErrUnknownMethod(format!("{type_name}.{method_name}/{arity}")))
    }

    pub fn methods_of(&self, type_name: &str) -> Vec<Arc<CachedMethod>> {
        self.inner
            .lock()
            .by_type
            .get(type_name)
            .cloned()
            .unwrap_or_default()
    }
}

impl RegistryInner {
    fn register(&mut self, descriptor: &'static TypeDescriptor) -> Result<u32> {
        let mut specs: Vec<&'static MethodSpec> = descriptor.methods.iter().collect();
        specs.sort_by(|a, b| canonical_cmp(a, b));
        for pair in specs.windows(2) {
            if canonical_cmp(pair[0], pair[1]) == Ordering::Equal {
                return Err(Error::ErrDuplicateSignature(format!(
                    "{}.{}/{}",
                    descriptor.name,
                    pair[0].name,
                    pair[0].params.len()
                )));
            }
        }

        let type_id = self.type_ids.len() as u32;
        self.type_ids.insert(descriptor.name, type_id);
        log::debug!(
            "registered remotable type {} as #{type_id} with {} methods",
            descriptor.name,
            specs.len()
        );

        let mut cached = Vec::with_capacity(specs.len());
        for spec in specs.iter().copied() {
            let method_id = self.methods.len() as u32;
            let method = Arc::new(CachedMethod::new(method_id, descriptor.name, spec));
            self.methods.push(method.clone());
            cached.push(method);
        }
        self.by_type.insert(descriptor.name, cached);

        // Transitive closure: referenced remotables register after the
        // referencing type, in method order. Already-registered types are
        // skipped, so recursion terminates.
        for spec in &specs {
            for type_ref in spec.params.iter().chain(std::iter::once(&spec.returns)) {
                if let Some(referenced) = type_ref.remote_descriptor() {
                    if !self.type_ids.contains_key(referenced.name) {
                        self.register(referenced)?;
                    }
                }
            }
        }

        Ok(type_id)
    }
}

/// Total order over operations: name, then arity, then pairwise canonical
/// parameter type names. Residual equality means the type declares
/// duplicate signatures, which registration rejects.
fn canonical_cmp(a: &MethodSpec, b: &MethodSpec) -> Ordering {
    a.name
        .cmp(b.name)
        .then_with(|| a.params.len().cmp(&b.params.len()))
        .then_with(|| {
            for (pa, pb) in a.params.iter().zip(b.params.iter()) {
                let ord = pa.canonical_name().cmp(pb.canonical_name());
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        })
}
